//! Archive reading: directory scanning, entry location, listing,
//! extraction.
//!
//! The format has no offset table. Every field's position depends on the
//! previous field, and an entry's payload position is the sum of the
//! lengths declared before it, so all read paths are one forward walk over
//! the stream: signature, declared count, directory records, payload
//! region. [`Scanner`] owns that walk and tracks the stream position;
//! [`Reader`] layers the record grammar on top of it.

use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;

use crate::archive::{
    extension_for, numeric_name_order, parse_decimal, Entry, ExtractOptions, LbrError,
    ListOptions, CR, FIELD_LOOKAHEAD, MAX_SANE_LENGTH, SIGNATURE, SPACE,
};
use crate::petscii::{self, TextConfig};

/// Position-tracking byte walker over an archive stream.
///
/// Each primitive advances the position by exactly the bytes it consumed,
/// so callers can compute copy spans from [`Scanner::position`] without a
/// seekable stream.
pub struct Scanner<R> {
    inner: R,
    pos: u64,
}

impl<R: Read> Scanner<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, pos: 0 }
    }

    /// Bytes consumed from the stream so far.
    pub fn position(&self) -> u64 {
        self.pos
    }

    fn next_byte(&mut self) -> Result<Option<u8>, LbrError> {
        let mut byte = [0u8; 1];
        loop {
            match self.inner.read(&mut byte) {
                Ok(0) => return Ok(None),
                Ok(_) => {
                    self.pos += 1;
                    return Ok(Some(byte[0]));
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Read and check the three-byte archive signature.
    pub fn read_signature(&mut self) -> Result<(), LbrError> {
        let mut sig = [0u8; 3];
        match self.inner.read_exact(&mut sig) {
            Ok(()) => self.pos += 3,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                return Err(LbrError::InvalidSignature)
            }
            Err(e) => return Err(e.into()),
        }
        if &sig != SIGNATURE {
            return Err(LbrError::InvalidSignature);
        }
        Ok(())
    }

    /// Scan forward to `delim`, returning the bytes before it.
    ///
    /// The delimiter is consumed but not returned. Hitting end of stream
    /// or running [`FIELD_LOOKAHEAD`] bytes without a delimiter is a
    /// [`LbrError::MalformedField`] naming `what`.
    pub fn field(&mut self, delim: u8, what: &'static str) -> Result<Vec<u8>, LbrError> {
        let start = self.pos;
        let mut out = Vec::new();
        loop {
            match self.next_byte()? {
                Some(b) if b == delim => return Ok(out),
                Some(b) => {
                    out.push(b);
                    if out.len() >= FIELD_LOOKAHEAD {
                        return Err(LbrError::MalformedField {
                            field: what,
                            offset: start,
                        });
                    }
                }
                None => {
                    return Err(LbrError::MalformedField {
                        field: what,
                        offset: start,
                    })
                }
            }
        }
    }

    /// Read and discard exactly `n` bytes.
    pub fn skip(&mut self, n: u64) -> Result<(), LbrError> {
        let mut limited = self.inner.by_ref().take(n);
        let copied = io::copy(&mut limited, &mut io::sink())?;
        self.pos += copied;
        if copied != n {
            return Err(truncated());
        }
        Ok(())
    }

    /// Copy exactly `n` bytes from the stream into `out`.
    pub fn copy_to<W: Write>(&mut self, n: u64, out: &mut W) -> Result<(), LbrError> {
        let mut limited = self.inner.by_ref().take(n);
        let copied = io::copy(&mut limited, out)?;
        self.pos += copied;
        if copied != n {
            return Err(truncated());
        }
        Ok(())
    }

    /// Copy everything left in the stream into `out`.
    pub fn copy_remaining<W: Write>(&mut self, out: &mut W) -> Result<u64, LbrError> {
        let copied = io::copy(&mut self.inner, out)?;
        self.pos += copied;
        Ok(copied)
    }

    /// Fill `buf` exactly from the stream.
    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), LbrError> {
        match self.inner.read_exact(buf) {
            Ok(()) => {
                self.pos += buf.len() as u64;
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(truncated()),
            Err(e) => Err(e.into()),
        }
    }

    /// Read everything left in the stream.
    pub fn read_remaining(&mut self) -> Result<Vec<u8>, LbrError> {
        let mut buf = Vec::new();
        let n = self.inner.read_to_end(&mut buf)?;
        self.pos += n as u64;
        Ok(buf)
    }
}

fn truncated() -> LbrError {
    LbrError::Io("unexpected end of archive".into())
}

/// Directory reader: the record grammar on top of a [`Scanner`].
pub struct Reader<R> {
    scan: Scanner<R>,
    text: TextConfig,
}

impl<R: Read> Reader<R> {
    pub fn new(inner: R, text: TextConfig) -> Self {
        Self {
            scan: Scanner::new(inner),
            text,
        }
    }

    /// Stream position, in bytes from the start of the archive.
    pub fn position(&self) -> u64 {
        self.scan.position()
    }

    /// Read the archive header: signature, then the declared entry
    /// count (`"DWB" <space> <count> <space> <CR>`).
    pub fn read_header(&mut self) -> Result<i64, LbrError> {
        self.scan.read_signature()?;
        self.scan.skip(1)?; // space
        let count = self.scan.field(SPACE, "entry count")?;
        self.scan.skip(1)?; // cr
        Ok(parse_decimal(&count))
    }

    /// Read one directory record: `name <CR> type <CR> <space> length
    /// <space> <CR>`. A length outside the sane range flags the entry
    /// instead of failing; the caller decides the recovery strategy.
    pub fn read_entry(&mut self) -> Result<Entry, LbrError> {
        let name = self.scan.field(CR, "entry name")?;
        let type_tag = self.scan.field(CR, "entry type")?;
        self.scan.skip(1)?; // leading space of the length field
        let length_field = self.scan.field(SPACE, "entry length")?;
        self.scan.skip(1)?; // cr
        let length = parse_decimal(&length_field);
        Ok(Entry {
            name: petscii::decode(&name, &self.text),
            type_tag: petscii::decode(&type_tag, &self.text),
            length,
            bad_length: length < 0 || length > MAX_SANE_LENGTH,
        })
    }

    /// Read the header and every directory record. Afterwards the stream
    /// is positioned at the start of the payload region.
    pub fn read_directory(&mut self) -> Result<Vec<Entry>, LbrError> {
        let count = self.read_header()?;
        let mut entries = Vec::new();
        for _ in 0..count {
            entries.push(self.read_entry()?);
        }
        Ok(entries)
    }

    /// Skip `n` payload bytes.
    pub fn skip_payload(&mut self, n: u64) -> Result<(), LbrError> {
        self.scan.skip(n)
    }

    /// Read `n` payload bytes.
    pub fn read_payload(&mut self, n: u64) -> Result<Vec<u8>, LbrError> {
        let mut buf = vec![0u8; n as usize];
        self.scan.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Read everything left in the stream.
    pub fn read_remaining(&mut self) -> Result<Vec<u8>, LbrError> {
        self.scan.read_remaining()
    }
}

/// Where an entry sits inside the archive byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    /// The entry's declared payload length.
    pub length: i64,
    /// Offset of the entry's directory record.
    pub record_offset: u64,
    /// Offset of the entry's payload bytes.
    pub payload_offset: u64,
}

/// Find `target` in the directory and compute its offsets.
///
/// The scan is sequential and the first matching entry wins; duplicate
/// names are permitted by the format and later duplicates are never
/// considered once a match is confirmed. With `skip_deleted`, a matching
/// tombstone is rejected and the scan continues, so a later duplicate can
/// still match. The payload offset is the end of the directory plus the
/// lengths of every entry confirmed before the match, which is only
/// trustworthy if no entry declares a bad length; any such entry aborts
/// the scan with [`LbrError::BadLength`].
pub fn locate<R: Read>(
    input: R,
    target: &str,
    skip_deleted: bool,
    text: &TextConfig,
) -> Result<Location, LbrError> {
    let mut reader = Reader::new(input, *text);
    let count = reader.read_header()?;
    let mut before: i64 = 0;
    let mut found: Option<(i64, u64)> = None;
    for _ in 0..count {
        let record_offset = reader.position();
        let entry = reader.read_entry()?;
        if entry.bad_length {
            return Err(LbrError::BadLength {
                name: entry.name,
                length: entry.length,
            });
        }
        if found.is_none() {
            if entry.name == target && (!skip_deleted || !entry.is_deleted()) {
                found = Some((entry.length, record_offset));
            } else {
                before += entry.length;
            }
        }
    }
    match found {
        Some((length, record_offset)) => Ok(Location {
            length,
            record_offset,
            payload_offset: reader.position() + before as u64,
        }),
        None => Err(LbrError::NotFound {
            name: target.to_string(),
        }),
    }
}

/// Parse the directory and return a [`Listing`] of rendered lines.
///
/// Bad lengths are flagged, not fatal: parsing continues on the stated
/// lengths so the output is best-effort. Re-calling re-parses from the
/// start; nothing is cached between listings.
pub fn list<R: Read>(input: R, opts: &ListOptions) -> Result<Listing, LbrError> {
    let mut reader = Reader::new(input, opts.text);
    let declared_count = reader.read_header()?;
    let mut entries = Vec::new();
    for _ in 0..declared_count {
        entries.push(reader.read_entry()?);
    }
    if opts.numeric_sort {
        entries.sort_by(|a, b| numeric_name_order(&a.name, &b.name));
    }
    Ok(Listing {
        declared_count,
        skip_deleted: opts.skip_deleted,
        entries: entries.into_iter(),
    })
}

/// Lazily rendered directory listing.
#[derive(Debug)]
pub struct Listing {
    declared_count: i64,
    skip_deleted: bool,
    entries: std::vec::IntoIter<Entry>,
}

impl Listing {
    /// The entry count the archive header declares.
    pub fn declared_count(&self) -> i64 {
        self.declared_count
    }
}

impl Iterator for Listing {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        loop {
            let entry = self.entries.next()?;
            if self.skip_deleted && entry.is_deleted() {
                continue;
            }
            return Some(entry.render());
        }
    }
}

/// Extract entries into `dest`, returning the file names written.
///
/// A non-empty `targets` list restricts extraction to those names;
/// everything else has its payload skipped. Zero-length entries produce
/// no file. The first entry flagged with a bad length abandons structured
/// parsing: all remaining stream bytes are dumped verbatim into one file
/// named after that entry, and extraction stops there.
pub fn extract<R: Read>(
    input: R,
    dest: &Path,
    targets: &[String],
    opts: &ExtractOptions,
) -> Result<Vec<String>, LbrError> {
    let mut reader = Reader::new(input, opts.text);
    let entries = reader.read_directory()?;
    let mut written = Vec::new();
    for entry in &entries {
        if entry.bad_length {
            // Offsets past this record cannot be trusted; glob up
            // everything that is left under this entry's name.
            let rest = reader.read_remaining()?;
            fs::write(dest.join(&entry.name), rest)?;
            written.push(entry.name.clone());
            break;
        }
        if entry.length == 0 {
            continue;
        }
        if opts.skip_deleted && entry.is_deleted() {
            reader.skip_payload(entry.length as u64)?;
            continue;
        }
        if !targets.is_empty() && !targets.iter().any(|t| t == &entry.name) {
            reader.skip_payload(entry.length as u64)?;
            continue;
        }
        let data = reader.read_payload(entry.length as u64)?;
        let mut name = entry.name.clone();
        if opts.add_extension {
            if let Some(ext) = extension_for(&entry.type_tag) {
                name.push('.');
                name.push_str(ext);
            }
        }
        fs::write(dest.join(&name), data)?;
        written.push(name);
    }
    Ok(written)
}
