use std::fmt;

use thiserror::Error;

use crate::io_utils;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowIssue {
    /// 1-based line of the offending record, when the reader knows it.
    pub line: Option<u64>,
    pub message: String,
}

impl fmt::Display for RowIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "line {line}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("No headers found in CSV input")]
    NoHeaders,
    #[error(
        "Invalid CSV format: {count} malformed record(s), first at {first}",
        count = .issues.len(),
        first = first_issue(.issues)
    )]
    Malformed { issues: Vec<RowIssue> },
    #[error("Failed to read CSV headers: {0}")]
    Headers(#[source] csv::Error),
    #[error("{0}")]
    Decode(String),
}

fn first_issue(issues: &[RowIssue]) -> String {
    issues
        .first()
        .map(RowIssue::to_string)
        .unwrap_or_else(|| "unknown position".to_string())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvRow {
    values: Vec<String>,
}

impl CsvRow {
    pub fn values(&self) -> &[String] {
        &self.values
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCsv {
    pub headers: Vec<String>,
    pub rows: Vec<CsvRow>,
}

impl ParsedCsv {
    /// Looks up a cell by header name; with duplicate headers the first wins.
    pub fn value<'a>(&'a self, row: &'a CsvRow, header: &str) -> Option<&'a str> {
        let idx = self.headers.iter().position(|h| h == header)?;
        row.values.get(idx).map(String::as_str)
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

pub fn parse_csv_text(text: &str, delimiter: u8) -> Result<ParsedCsv, ParseError> {
    let mut reader = io_utils::open_csv_reader(text.as_bytes(), delimiter);
    let headers = reader
        .headers()
        .map_err(ParseError::Headers)?
        .iter()
        .map(str::to_string)
        .collect::<Vec<_>>();
    if headers.iter().all(|h| h.trim().is_empty()) {
        return Err(ParseError::NoHeaders);
    }

    let mut rows = Vec::new();
    let mut issues = Vec::new();
    for result in reader.records() {
        match result {
            Ok(record) => rows.push(CsvRow {
                values: record.iter().map(str::to_string).collect(),
            }),
            Err(err) => issues.push(RowIssue {
                line: err.position().map(|pos| pos.line()),
                message: err.to_string(),
            }),
        }
    }
    if !issues.is_empty() {
        return Err(ParseError::Malformed { issues });
    }
    Ok(ParsedCsv { headers, rows })
}

pub fn parse_csv_bytes(
    bytes: &[u8],
    encoding: &'static encoding_rs::Encoding,
    delimiter: u8,
) -> Result<ParsedCsv, ParseError> {
    let text = io_utils::decode_bytes(bytes, encoding)
        .map_err(|err| ParseError::Decode(err.to_string()))?;
    parse_csv_text(&text, delimiter)
}
