//! I/O helpers for reading uploads and writing row exports.
//!
//! Uploaded sheets arrive as raw bytes: they are size-checked, decoded with the
//! requested encoding (UTF-8 by default, BOM sniffed) and only then handed to
//! the CSV parser. Exports go to a file or stdout (`-` or no path).

use std::{
    fs::File,
    io::{BufWriter, Read, Write},
    path::Path,
};

use anyhow::{Context, Result, anyhow};
use csv::QuoteStyle;
use encoding_rs::{Encoding, UTF_8};

pub const DEFAULT_CSV_DELIMITER: u8 = b',';
pub const DEFAULT_TSV_DELIMITER: u8 = b'\t';

pub fn is_dash(path: &Path) -> bool {
    path == Path::new("-")
}

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    if let Some(value) = label {
        Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| anyhow!("Unknown encoding '{value}'"))
    } else {
        Ok(UTF_8)
    }
}

pub fn resolve_input_delimiter(path: &Path, provided: Option<u8>) -> u8 {
    provided.unwrap_or_else(|| match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => DEFAULT_TSV_DELIMITER,
        _ => DEFAULT_CSV_DELIMITER,
    })
}

#[derive(Debug)]
pub enum UploadBytes {
    Loaded(Vec<u8>),
    /// Larger than the limit. For stdin `size` is a lower bound.
    TooLarge { size: u64 },
}

/// Reads the whole upload into memory unless it exceeds `max_bytes`. Files are
/// rejected from their metadata; stdin is read at most one byte past the limit.
pub fn read_upload(path: &Path, max_bytes: u64) -> Result<UploadBytes> {
    if is_dash(path) {
        return read_bounded(std::io::stdin().lock(), max_bytes).context("Reading upload from stdin");
    }
    let file = File::open(path).with_context(|| format!("Opening upload file {path:?}"))?;
    let size = file
        .metadata()
        .with_context(|| format!("Reading metadata of {path:?}"))?
        .len();
    if size > max_bytes {
        return Ok(UploadBytes::TooLarge { size });
    }
    read_bounded(file, max_bytes).with_context(|| format!("Reading upload file {path:?}"))
}

fn read_bounded<R: Read>(reader: R, max_bytes: u64) -> std::io::Result<UploadBytes> {
    let mut buffer = Vec::new();
    reader.take(max_bytes.saturating_add(1)).read_to_end(&mut buffer)?;
    let size = buffer.len() as u64;
    if size > max_bytes {
        Ok(UploadBytes::TooLarge { size })
    } else {
        Ok(UploadBytes::Loaded(buffer))
    }
}

pub fn decode_bytes(bytes: &[u8], encoding: &'static Encoding) -> Result<String> {
    let (text, actual, had_errors) = encoding.decode(bytes);
    if had_errors {
        Err(anyhow!(
            "Failed to decode text with encoding {}",
            actual.name()
        ))
    } else {
        Ok(text.into_owned())
    }
}

pub fn open_csv_reader<R>(reader: R, delimiter: u8) -> csv::Reader<R>
where
    R: Read,
{
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(true)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(false);
    builder.from_reader(reader)
}

pub fn open_csv_writer(path: Option<&Path>, delimiter: u8) -> Result<csv::Writer<Box<dyn Write>>> {
    let sink: Box<dyn Write> = match path {
        Some(p) if !is_dash(p) => Box::new(BufWriter::new(
            File::create(p).with_context(|| format!("Creating output file {p:?}"))?,
        )),
        _ => Box::new(std::io::stdout()),
    };
    let mut builder = csv::WriterBuilder::new();
    builder
        .delimiter(delimiter)
        .quote_style(QuoteStyle::Necessary)
        .double_quote(true);
    Ok(builder.from_writer(sink))
}

pub fn content_type_for(file_name: &str) -> &'static str {
    match Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .as_deref()
    {
        Some("csv") => "text/csv",
        Some("tsv") => "text/tab-separated-values",
        Some("txt") => "text/plain",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_strips_utf8_bom() {
        let bytes = b"\xEF\xBB\xBFgpa\n3.5\n";
        let text = decode_bytes(bytes, UTF_8).expect("decoded");
        assert_eq!(text, "gpa\n3.5\n");
    }

    #[test]
    fn decode_latin1_input() {
        let encoding = resolve_encoding(Some("latin1")).expect("known label");
        let text = decode_bytes(b"caf\xE9", encoding).expect("decoded");
        assert_eq!(text, "café");
    }

    #[test]
    fn oversized_reader_stops_one_byte_past_limit() {
        let data = vec![b'x'; 100];
        match read_bounded(&data[..], 10).expect("read") {
            UploadBytes::TooLarge { size } => assert_eq!(size, 11),
            UploadBytes::Loaded(_) => panic!("limit not enforced"),
        }
        match read_bounded(&data[..], 100).expect("read") {
            UploadBytes::Loaded(bytes) => assert_eq!(bytes.len(), 100),
            UploadBytes::TooLarge { .. } => panic!("exact limit rejected"),
        }
    }

    #[test]
    fn oversized_file_is_rejected_from_metadata() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("big.csv");
        std::fs::write(&path, vec![b'a'; 64]).expect("write");
        assert!(matches!(
            read_upload(&path, 63).expect("read"),
            UploadBytes::TooLarge { size: 64 }
        ));
        assert!(matches!(
            read_upload(&path, 64).expect("read"),
            UploadBytes::Loaded(ref bytes) if bytes.len() == 64
        ));
    }

    #[test]
    fn content_type_follows_extension() {
        assert_eq!(content_type_for("sheet.CSV"), "text/csv");
        assert_eq!(content_type_for("sheet"), "application/octet-stream");
    }
}
