use std::path::Path;

use anyhow::{Context, Result};
use log::{debug, info};
use serde_json::Value;
use thiserror::Error;

use crate::{
    backend::{Backend, BackendError, Row, RowQuery, value_to_text},
    naming::{self, IdentifierError, PRIMARY_KEY_COLUMN},
    parser::{self, ParseError},
    schema::cell_value,
    table::TextTable,
};

#[derive(Debug, Error)]
pub enum EditError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("Edits must include an 'id' column identifying the row to change")]
    MissingId,
    #[error("Row {row}: id '{value}' is not a row number")]
    InvalidId { row: usize, value: String },
    #[error("Edit column '{header}' is unusable: {source}")]
    Column {
        header: String,
        #[source]
        source: IdentifierError,
    },
    #[error(transparent)]
    Backend(#[from] BackendError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowSet {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RowSet {
    pub fn from_rows(rows: &[Row]) -> Self {
        let mut headers: Vec<String> = Vec::new();
        for row in rows {
            for key in row.keys() {
                if !headers.contains(key) {
                    headers.push(key.clone());
                }
            }
        }
        if let Some(pos) = headers.iter().position(|h| h == PRIMARY_KEY_COLUMN) {
            let id = headers.remove(pos);
            headers.insert(0, id);
        }
        let rows = rows
            .iter()
            .map(|row| {
                headers
                    .iter()
                    .map(|h| row.get(h).map(value_to_text).unwrap_or_default())
                    .collect()
            })
            .collect();
        Self { headers, rows }
    }

    pub fn to_text_table(&self) -> TextTable {
        let mut table = TextTable::new(self.headers.clone());
        for row in &self.rows {
            table.push_row(row.clone());
        }
        table
    }

    pub fn write_csv(&self, output: Option<&Path>, delimiter: u8) -> Result<()> {
        let mut writer = crate::io_utils::open_csv_writer(output, delimiter)?;
        writer
            .write_record(&self.headers)
            .context("Writing export header")?;
        for row in &self.rows {
            writer.write_record(row).context("Writing export row")?;
        }
        writer.flush().context("Flushing export output")?;
        Ok(())
    }
}

pub fn fetch_rows(backend: &dyn Backend, table: &str) -> Result<Vec<Row>, BackendError> {
    let rows = backend.select_rows(table, &RowQuery::all().order(PRIMARY_KEY_COLUMN, true))?;
    debug!("Fetched {} row(s) from {table}", rows.len());
    Ok(rows)
}

/// Turns an edits CSV into row payloads keyed by sanitized column names.
///
/// The `id` column is mandatory and must hold the row number; blank cells
/// clear the stored value.
pub fn parse_edits(text: &str, delimiter: u8, max_identifier_len: usize) -> Result<Vec<Row>, EditError> {
    let parsed = parser::parse_csv_text(text, delimiter)?;
    let mut keys = Vec::with_capacity(parsed.headers.len());
    for header in &parsed.headers {
        let key = naming::sanitize_identifier(header);
        if key != PRIMARY_KEY_COLUMN {
            naming::validate_identifier(&key, header, max_identifier_len).map_err(|source| {
                EditError::Column {
                    header: header.clone(),
                    source,
                }
            })?;
        }
        keys.push(key);
    }
    let id_idx = keys
        .iter()
        .position(|k| k == PRIMARY_KEY_COLUMN)
        .ok_or(EditError::MissingId)?;

    let mut payloads = Vec::with_capacity(parsed.rows.len());
    for (row_idx, row) in parsed.rows.iter().enumerate() {
        let raw_id = row.values().get(id_idx).map(|v| v.trim()).unwrap_or_default();
        let id = raw_id.parse::<i64>().map_err(|_| EditError::InvalidId {
            row: row_idx + 1,
            value: raw_id.to_string(),
        })?;
        let mut payload = Row::new();
        for (idx, (key, raw)) in keys.iter().zip(row.values()).enumerate() {
            if idx == id_idx {
                payload.insert(key.clone(), Value::Number(id.into()));
            } else {
                payload.insert(key.clone(), cell_value(raw));
            }
        }
        payloads.push(payload);
    }
    Ok(payloads)
}

pub fn apply_edits(backend: &dyn Backend, table: &str, edits: &[Row]) -> Result<usize, EditError> {
    if edits.is_empty() {
        return Ok(0);
    }
    backend.upsert_rows(table, edits, PRIMARY_KEY_COLUMN)?;
    info!("edit_event table={table} rows={}", edits.len());
    Ok(edits.len())
}
