//! PETSCII <-> ASCII text mapping for entry names and type tags.
//!
//! Both directions are very conservative: lower-case and shifted letters
//! fold to upper case, control bytes and anything without a stable PETSCII
//! counterpart become `?`, and a handful of ASCII punctuation characters
//! are substituted on the way in (`\` and `|` become `/`, `_` becomes a
//! space, a backtick becomes an apostrophe, braces become parentheses).
//! The pair is deliberately lossy and is *not* a bijection; round-trips
//! only hold for the stable subset (upper-case letters, digits, and the
//! printable punctuation that maps to itself).

/// Controls whether names and type tags are converted at all.
///
/// With `convert` off, [`decode`] and [`encode`] are the per-byte
/// identity, which makes round-trips exact for arbitrary archives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextConfig {
    pub convert: bool,
}

impl Default for TextConfig {
    fn default() -> Self {
        Self { convert: true }
    }
}

/// Convert PETSCII bytes from an archive into printable ASCII text.
pub fn decode(native: &[u8], config: &TextConfig) -> String {
    if !config.convert {
        return native.iter().map(|&b| b as char).collect();
    }
    native.iter().map(|&b| decode_byte(b)).collect()
}

/// Convert ASCII text into the PETSCII bytes stored in an archive.
pub fn encode(text: &str, config: &TextConfig) -> Vec<u8> {
    if !config.convert {
        return text
            .chars()
            .map(|c| if (c as u32) <= 0xFF { c as u8 } else { b'?' })
            .collect();
    }
    text.chars().map(encode_char).collect()
}

fn decode_byte(b: u8) -> char {
    if b < 0x20 {
        '?'
    } else if (0x61..=0x7A).contains(&b) {
        // PETSCII unshifted letters
        (b - 0x20) as char
    } else if (0xC1..=0xCA).contains(&b) {
        // PETSCII shifted letters
        (b - 0x80) as char
    } else if b == 0x5B || b == 0x5D {
        b as char
    } else if b > 0x5A {
        '?'
    } else {
        b as char
    }
}

fn encode_char(c: char) -> u8 {
    let c = c as u32;
    if c < 0x20 {
        b'?'
    } else if c == 0x5C {
        // backslash
        b'/'
    } else if c == 0x5F {
        // underscore
        b' '
    } else if c == 0x60 {
        // backtick -> apostrophe
        0x27
    } else if (0x61..=0x7A).contains(&c) {
        // lower case
        (c - 0x20) as u8
    } else if c == 0x7B {
        b'('
    } else if c == 0x7D {
        b')'
    } else if c == 0x7C {
        b'/'
    } else if c > 0x7C {
        b'?'
    } else {
        c as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_folds_case() {
        let config = TextConfig::default();
        assert_eq!(encode("hello.prg", &config), b"HELLO.PRG".to_vec());
    }

    #[test]
    fn decode_folds_unshifted_letters() {
        let config = TextConfig::default();
        assert_eq!(decode(b"hello", &config), "HELLO");
    }

    #[test]
    fn decode_folds_shifted_letters() {
        let config = TextConfig::default();
        assert_eq!(decode(&[0xC1, 0xC2, 0xCA], &config), "ABJ");
    }

    #[test]
    fn encode_punctuation_substitutions() {
        let config = TextConfig::default();
        assert_eq!(encode("a\\b", &config), b"A/B".to_vec());
        assert_eq!(encode("a_b", &config), b"A B".to_vec());
        assert_eq!(encode("a`b", &config), b"A'B".to_vec());
        assert_eq!(encode("{x}", &config), b"(X)".to_vec());
        assert_eq!(encode("a|b", &config), b"A/B".to_vec());
    }

    #[test]
    fn control_and_high_bytes_become_question_marks() {
        let config = TextConfig::default();
        assert_eq!(decode(&[0x01, 0x1F], &config), "??");
        assert_eq!(decode(&[0x7E, 0xFF], &config), "??");
        assert_eq!(encode("\u{1}\u{7F}\u{FF}", &config), b"???".to_vec());
    }

    #[test]
    fn brackets_pass_through_decode() {
        let config = TextConfig::default();
        assert_eq!(decode(b"[A]", &config), "[A]");
    }

    #[test]
    fn stable_subset_round_trips() {
        let config = TextConfig::default();
        let stable = "ABCXYZ0189 !\"#$%&'()*+,-./:;<=>?@[]";
        let encoded = encode(stable, &config);
        assert_eq!(decode(&encoded, &config), stable);
    }

    #[test]
    fn disabled_conversion_is_identity() {
        let config = TextConfig { convert: false };
        let raw: Vec<u8> = (0..=255).collect();
        let text = decode(&raw, &config);
        assert_eq!(encode(&text, &config), raw);
    }
}
