//! Streaming archive rewrites: delete, wipe, retype, append.
//!
//! Every mutating operation is one forward pass: the source archive is
//! streamed into a temporary file in the same directory, with the edit
//! spliced in at the right cut point, and the temporary is then renamed
//! over the original. A failure anywhere before the rename drops the
//! temporary and leaves the original byte-for-byte intact.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::archive::{
    parse_decimal, AppendOptions, LbrError, CR, MAX_SANE_LENGTH, SIGNATURE, SPACE,
};
use crate::decoder::{locate, Location, Scanner};
use crate::encoder::{collect_sources, write_record};
use crate::petscii::{self, TextConfig};

fn open_source(archive: &Path) -> Result<Scanner<BufReader<File>>, LbrError> {
    Ok(Scanner::new(BufReader::new(File::open(archive)?)))
}

fn open_temp(archive: &Path) -> Result<NamedTempFile, LbrError> {
    // Same directory as the archive, so the final rename stays on one
    // filesystem and is atomic.
    let dir = match archive.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    Ok(NamedTempFile::new_in(dir)?)
}

fn persist(tmp: NamedTempFile, archive: &Path) -> Result<(), LbrError> {
    tmp.persist(archive).map_err(|e| LbrError::from(e.error))?;
    Ok(())
}

fn find(
    archive: &Path,
    target: &str,
    skip_deleted: bool,
    text: &TextConfig,
) -> Result<Location, LbrError> {
    locate(
        BufReader::new(File::open(archive)?),
        target,
        skip_deleted,
        text,
    )
}

/// Remove an entry's payload but keep its directory slot as a tombstone:
/// same name, type `D`, length 0. The entry count is unchanged.
pub fn delete(
    archive: &Path,
    target: &str,
    skip_deleted: bool,
    text: &TextConfig,
) -> Result<(), LbrError> {
    remove_payload(archive, target, skip_deleted, text, false)
}

/// Remove an entry entirely: payload and directory record, with the
/// declared count decremented.
pub fn wipe(
    archive: &Path,
    target: &str,
    skip_deleted: bool,
    text: &TextConfig,
) -> Result<(), LbrError> {
    remove_payload(archive, target, skip_deleted, text, true)
}

fn remove_payload(
    archive: &Path,
    target: &str,
    skip_deleted: bool,
    text: &TextConfig,
    drop_record: bool,
) -> Result<(), LbrError> {
    let loc = find(archive, target, skip_deleted, text)?;
    let mut scan = open_source(archive)?;
    let tmp = open_temp(archive)?;
    let mut out = BufWriter::new(tmp.as_file());

    scan.read_signature()?;
    out.write_all(SIGNATURE)?;
    if drop_record {
        scan.copy_to(1, &mut out)?; // space
        let count = scan.field(SPACE, "entry count")?;
        write!(out, "{} ", parse_decimal(&count) - 1)?;
        scan.copy_to(1, &mut out)?; // cr
    }
    scan.copy_to(loc.record_offset - scan.position(), &mut out)?;
    if drop_record {
        scan.field(CR, "entry name")?;
        scan.field(CR, "entry type")?;
        scan.field(CR, "entry length")?;
    } else {
        let name = scan.field(CR, "entry name")?;
        out.write_all(&name)?;
        out.write_all(b"\rD\r 0 \r")?;
        scan.field(CR, "entry type")?;
        scan.field(CR, "entry length")?;
    }
    scan.copy_to(loc.payload_offset - scan.position(), &mut out)?;
    scan.skip(loc.length as u64)?;
    scan.copy_remaining(&mut out)?;

    out.flush()?;
    drop(out);
    persist(tmp, archive)
}

/// Rewrite one entry's type field, leaving everything else untouched.
/// The payload is not moved, so the archive size only changes if the new
/// tag's encoded width differs from the old one.
pub fn change_type(
    archive: &Path,
    target: &str,
    new_type: &str,
    skip_deleted: bool,
    text: &TextConfig,
) -> Result<(), LbrError> {
    let loc = find(archive, target, skip_deleted, text)?;
    let mut scan = open_source(archive)?;
    let tmp = open_temp(archive)?;
    let mut out = BufWriter::new(tmp.as_file());

    scan.read_signature()?;
    out.write_all(SIGNATURE)?;
    scan.copy_to(loc.record_offset - scan.position(), &mut out)?;
    let name = scan.field(CR, "entry name")?;
    out.write_all(&name)?;
    out.write_all(b"\r")?;
    out.write_all(&petscii::encode(new_type, text))?;
    out.write_all(b"\r")?;
    scan.field(CR, "entry type")?;
    scan.copy_remaining(&mut out)?;

    out.flush()?;
    drop(out);
    persist(tmp, archive)
}

/// Append files to the end of an archive.
///
/// The header count is rewritten increased by the input count, the
/// existing directory is copied field-by-field while its payload lengths
/// are summed, the new records go in right after the last existing one,
/// and the new payloads land after all existing payload bytes. An
/// existing entry with a bad length aborts the rewrite, since the payload
/// boundary cannot be computed past it.
pub fn append(archive: &Path, inputs: &[PathBuf], opts: &AppendOptions) -> Result<(), LbrError> {
    let files = collect_sources(inputs)?;
    let mut scan = open_source(archive)?;
    let tmp = open_temp(archive)?;
    let mut out = BufWriter::new(tmp.as_file());

    scan.read_signature()?;
    out.write_all(SIGNATURE)?;
    scan.copy_to(1, &mut out)?; // space
    let count_field = scan.field(SPACE, "entry count")?;
    let count = parse_decimal(&count_field);
    write!(out, "{} ", count + files.len() as i64)?;
    scan.copy_to(1, &mut out)?; // cr

    let mut existing_payload: u64 = 0;
    for _ in 0..count {
        let name = scan.field(CR, "entry name")?;
        out.write_all(&name)?;
        out.write_all(b"\r")?;
        let type_tag = scan.field(CR, "entry type")?;
        out.write_all(&type_tag)?;
        out.write_all(b"\r")?;
        scan.copy_to(1, &mut out)?; // leading space
        let length_field = scan.field(SPACE, "entry length")?;
        out.write_all(&length_field)?;
        out.write_all(b" ")?;
        scan.copy_to(1, &mut out)?; // cr
        let length = parse_decimal(&length_field);
        if length < 0 || length > MAX_SANE_LENGTH {
            return Err(LbrError::BadLength {
                name: petscii::decode(&name, &opts.text),
                length,
            });
        }
        existing_payload += length as u64;
    }
    for file in &files {
        write_record(&mut out, file, opts.strip_extension, &opts.text)?;
    }
    scan.copy_to(existing_payload, &mut out)?;
    for file in &files {
        if file.length == 0 {
            continue;
        }
        if let Some(path) = &file.path {
            let data = fs::read(path)?;
            out.write_all(&data)?;
        }
    }
    scan.copy_remaining(&mut out)?;

    out.flush()?;
    drop(out);
    persist(tmp, archive)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{BuildOptions, ListOptions};
    use crate::decoder::list;
    use crate::encoder::build;
    use std::io::Cursor;

    fn fixture(dir: &Path) -> PathBuf {
        for (name, data) in [
            ("A.PRG", &b"one"[..]),
            ("B.SEQ", &b"four"[..]),
            ("C.USR", &b"fifth"[..]),
        ] {
            fs::write(dir.join(name), data).unwrap();
        }
        let archive = dir.join("test.lbr");
        let inputs = vec![dir.join("A.PRG"), dir.join("B.SEQ"), dir.join("C.USR")];
        build(&archive, &inputs, &BuildOptions::default()).unwrap();
        archive
    }

    fn lines_of(archive: &Path) -> Vec<String> {
        list(
            Cursor::new(fs::read(archive).unwrap()),
            &ListOptions::default(),
        )
        .unwrap()
        .collect()
    }

    #[test]
    fn delete_keeps_the_entry_as_a_tombstone() {
        let dir = tempfile::tempdir().unwrap();
        let archive = fixture(dir.path());
        let before = fs::read(&archive).unwrap().len();

        delete(&archive, "B.SEQ", false, &TextConfig::default()).unwrap();

        assert_eq!(
            lines_of(&archive),
            vec!["A.PRG (P) 3", "B.SEQ (D) 0", "C.USR (U) 5"]
        );
        // Only the 4 payload bytes are gone; the record width is the same.
        let after = fs::read(&archive).unwrap();
        assert_eq!(after.len(), before - 4);
        // Neighbouring payloads survive in order.
        assert!(after.ends_with(b"onefifth"));
    }

    #[test]
    fn wipe_drops_the_record_and_decrements_the_count() {
        let dir = tempfile::tempdir().unwrap();
        let archive = fixture(dir.path());
        let before = fs::read(&archive).unwrap().len();

        wipe(&archive, "B.SEQ", false, &TextConfig::default()).unwrap();

        let bytes = fs::read(&archive).unwrap();
        // Record "B.SEQ\rS\r 4 \r" is 12 bytes, payload is 4.
        assert_eq!(bytes.len(), before - 12 - 4);
        assert!(bytes.starts_with(b"DWB 2 \r"));
        assert_eq!(lines_of(&archive), vec!["A.PRG (P) 3", "C.USR (U) 5"]);
        assert!(bytes.ends_with(b"onefifth"));
    }

    #[test]
    fn change_type_preserves_size_exactly() {
        let dir = tempfile::tempdir().unwrap();
        let archive = fixture(dir.path());
        let before = fs::read(&archive).unwrap();

        change_type(&archive, "B.SEQ", "U", false, &TextConfig::default()).unwrap();

        let after = fs::read(&archive).unwrap();
        assert_eq!(after.len(), before.len());
        assert_eq!(
            lines_of(&archive),
            vec!["A.PRG (P) 3", "B.SEQ (U) 4", "C.USR (U) 5"]
        );
        // Payload bytes did not move.
        assert!(after.ends_with(b"onefourfifth"));
    }

    #[test]
    fn append_adds_records_and_payload_at_the_end() {
        let dir = tempfile::tempdir().unwrap();
        let archive = fixture(dir.path());
        fs::write(dir.path().join("D.REL"), b"xy").unwrap();

        append(
            &archive,
            &[dir.path().join("D.REL")],
            &AppendOptions::default(),
        )
        .unwrap();

        let bytes = fs::read(&archive).unwrap();
        assert!(bytes.starts_with(b"DWB 4 \r"));
        assert_eq!(
            lines_of(&archive),
            vec![
                "A.PRG (P) 3",
                "B.SEQ (S) 4",
                "C.USR (U) 5",
                "D.REL (R) 2",
            ]
        );
        assert!(bytes.ends_with(b"onefourfifthxy"));
    }

    #[test]
    fn append_then_extract_round_trips_payloads() {
        let dir = tempfile::tempdir().unwrap();
        let archive = fixture(dir.path());
        fs::write(dir.path().join("D.REL"), b"xy").unwrap();
        append(
            &archive,
            &[dir.path().join("D.REL")],
            &AppendOptions::default(),
        )
        .unwrap();

        let out = dir.path().join("out");
        fs::create_dir(&out).unwrap();
        crate::decoder::extract(
            Cursor::new(fs::read(&archive).unwrap()),
            &out,
            &[],
            &crate::archive::ExtractOptions::default(),
        )
        .unwrap();
        assert_eq!(fs::read(out.join("A.PRG")).unwrap(), b"one");
        assert_eq!(fs::read(out.join("D.REL")).unwrap(), b"xy");
    }

    #[test]
    fn missing_target_leaves_the_archive_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let archive = fixture(dir.path());
        let before = fs::read(&archive).unwrap();

        let err = delete(&archive, "NOPE", false, &TextConfig::default()).unwrap_err();
        assert!(matches!(err, LbrError::NotFound { .. }));
        assert_eq!(fs::read(&archive).unwrap(), before);
    }

    #[test]
    fn append_to_bad_directory_leaves_the_archive_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("bad.lbr");
        let mut bytes = b"DWB 1 \r".to_vec();
        bytes.extend_from_slice(b"BAD\rS\r 9999999 \r");
        fs::write(&archive, &bytes).unwrap();
        fs::write(dir.path().join("D.REL"), b"xy").unwrap();

        let err = append(
            &archive,
            &[dir.path().join("D.REL")],
            &AppendOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, LbrError::BadLength { .. }));
        assert_eq!(fs::read(&archive).unwrap(), bytes);
    }

    #[test]
    fn delete_skip_deleted_targets_the_live_duplicate() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("dup.lbr");
        let mut bytes = b"DWB 2 \r".to_vec();
        bytes.extend_from_slice(b"X\rD\r 0 \r");
        bytes.extend_from_slice(b"X\rS\r 2 \r");
        bytes.extend_from_slice(b"ab");
        fs::write(&archive, &bytes).unwrap();

        delete(&archive, "X", true, &TextConfig::default()).unwrap();

        assert_eq!(lines_of(&archive), vec!["X (D) 0", "X (D) 0"]);
        let after = fs::read(&archive).unwrap();
        assert_eq!(after.len(), bytes.len() - 2);
    }

    #[test]
    fn retype_runs_the_new_tag_through_the_codec() {
        let dir = tempfile::tempdir().unwrap();
        let archive = fixture(dir.path());

        change_type(&archive, "B.SEQ", "p", false, &TextConfig::default()).unwrap();

        // Lower case folds up on the way in.
        assert_eq!(
            lines_of(&archive),
            vec!["A.PRG (P) 3", "B.SEQ (P) 4", "C.USR (U) 5"]
        );
    }
}
