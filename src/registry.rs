use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::{
    backend::{Backend, BackendError, Row, RowQuery, escape_like, value_to_text},
    form::{self, TableTitle},
};

#[derive(Debug, Error)]
#[error("Recording '{table_name}' in registry '{registry}' failed: {source}")]
pub struct MetadataError {
    pub registry: String,
    pub table_name: String,
    #[source]
    pub source: BackendError,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetadataRecord {
    pub table_name: String,
    pub uploaded_at: String,
}

impl MetadataRecord {
    pub fn new(table_name: &str, uploaded_at: DateTime<Utc>) -> Self {
        Self {
            table_name: table_name.to_string(),
            uploaded_at: uploaded_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }

    pub fn title(&self) -> Option<TableTitle> {
        form::describe_table_name(&self.table_name)
    }

    fn to_row(&self) -> Row {
        let mut row = Row::new();
        row.insert("table_name".to_string(), Value::String(self.table_name.clone()));
        row.insert("uploaded_at".to_string(), Value::String(self.uploaded_at.clone()));
        row
    }

    fn from_row(row: &Row) -> Option<Self> {
        let table_name = row.get("table_name").map(value_to_text)?;
        let uploaded_at = row.get("uploaded_at").map(value_to_text).unwrap_or_default();
        Some(Self {
            table_name,
            uploaded_at,
        })
    }
}

pub fn bootstrap_sql(registry: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {registry} (\n  id SERIAL PRIMARY KEY,\n  table_name VARCHAR(255) NOT NULL,\n  uploaded_at VARCHAR(64) NOT NULL\n);"
    )
}

pub fn ensure_registry(backend: &dyn Backend, registry: &str) -> Result<(), BackendError> {
    backend.execute_sql(registry, &bootstrap_sql(registry))
}

pub fn record_table(
    backend: &dyn Backend,
    registry: &str,
    record: &MetadataRecord,
) -> Result<(), MetadataError> {
    backend
        .insert_rows(registry, &[record.to_row()])
        .map_err(|source| MetadataError {
            registry: registry.to_string(),
            table_name: record.table_name.clone(),
            source,
        })
}

/// Registered tables, newest first, optionally narrowed to a name prefix
/// (case-insensitive, e.g. `csit`).
pub fn list_tables(
    backend: &dyn Backend,
    registry: &str,
    prefix: Option<&str>,
) -> Result<Vec<MetadataRecord>, BackendError> {
    let mut query = RowQuery::all().order("uploaded_at", false);
    if let Some(prefix) = prefix.map(str::trim).filter(|p| !p.is_empty()) {
        query = query.ilike("table_name", &format!("{}%", escape_like(prefix)));
    }
    let rows = backend.select_rows(registry, &query)?;
    Ok(rows.iter().filter_map(MetadataRecord::from_row).collect())
}
