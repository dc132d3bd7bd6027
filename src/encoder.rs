//! Archive building: synthesize a fresh LBR archive from source files.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::archive::{
    numeric_name_order, parse_decimal, type_tag_for, BuildOptions, LbrError,
};
use crate::petscii::{self, TextConfig};

/// A file queued for writing into an archive.
///
/// Padding fillers have no backing path; their length is zero and they
/// contribute no payload bytes.
#[derive(Debug, Clone)]
pub(crate) struct SourceFile {
    pub(crate) name: String,
    pub(crate) path: Option<PathBuf>,
    pub(crate) length: u64,
}

/// Derive entry names and lengths from the filesystem. Payload bytes are
/// not read here; that happens only while writing.
pub(crate) fn collect_sources(inputs: &[PathBuf]) -> Result<Vec<SourceFile>, LbrError> {
    let mut files = Vec::with_capacity(inputs.len());
    for path in inputs {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| LbrError::Io(format!("no file name in path: {}", path.display())))?;
        let length = fs::metadata(path)?.len();
        files.push(SourceFile {
            name,
            path: Some(path.clone()),
            length,
        });
    }
    Ok(files)
}

/// Fill numeric gaps in a sorted file list with zero-length fillers.
///
/// The first and last names are read as integers; every missing value in
/// between gets a filler entry at its sorted position. Fails if the last
/// value is not strictly greater than the first.
pub(crate) fn pad_numeric_gaps(files: &mut Vec<SourceFile>) -> Result<(), LbrError> {
    let first = files
        .first()
        .map(|f| parse_decimal(f.name.as_bytes()))
        .unwrap_or(0);
    let last = files
        .last()
        .map(|f| parse_decimal(f.name.as_bytes()))
        .unwrap_or(0);
    if last <= first {
        return Err(LbrError::PaddingImpossible { first, last });
    }
    let mut i = first;
    while i < last {
        let cur = match files.get((i - first) as usize) {
            Some(f) => parse_decimal(f.name.as_bytes()),
            None => break,
        };
        while i < cur {
            files.insert(
                (i - first) as usize,
                SourceFile {
                    name: i.to_string(),
                    path: None,
                    length: 0,
                },
            );
            i += 1;
        }
        i += 1;
    }
    Ok(())
}

/// Write one directory record for `file`.
///
/// The type tag is derived from the unstripped name, so stripping the
/// extension from the written name does not change the tag.
pub(crate) fn write_record<W: Write>(
    out: &mut W,
    file: &SourceFile,
    strip_extension: bool,
    text: &TextConfig,
) -> io::Result<()> {
    let written = if strip_extension {
        match file.name.rfind('.') {
            Some(dot) => &file.name[..dot],
            None => file.name.as_str(),
        }
    } else {
        file.name.as_str()
    };
    out.write_all(&petscii::encode(written, text))?;
    out.write_all(b"\r")?;
    out.write_all(&[type_tag_for(&file.name, file.length) as u8])?;
    out.write_all(b"\r")?;
    write!(out, " {} \r", file.length)?;
    Ok(())
}

/// Build a fresh archive at `output` from `inputs`.
///
/// Entry names and lengths come from the filesystem; payloads are read
/// fully into memory one file at a time while writing. Sorting and
/// padding happen before the output file is created, so a padding
/// failure leaves nothing behind.
pub fn build(output: &Path, inputs: &[PathBuf], opts: &BuildOptions) -> Result<(), LbrError> {
    let mut files = collect_sources(inputs)?;
    if opts.numeric_sort {
        files.sort_by(|a, b| numeric_name_order(&a.name, &b.name));
        if opts.numeric_pad {
            pad_numeric_gaps(&mut files)?;
        }
    }
    let mut out = BufWriter::new(File::create(output)?);
    write!(out, "DWB {} \r", files.len())?;
    for file in &files {
        write_record(&mut out, file, opts.strip_extension, &opts.text)?;
    }
    for file in &files {
        if file.length == 0 {
            continue;
        }
        if let Some(path) = &file.path {
            let data = fs::read(path)?;
            out.write_all(&data)?;
        }
    }
    out.flush()?;
    Ok(())
}
