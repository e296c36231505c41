pub mod memory;
pub mod rest;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

pub use memory::MemoryBackend;
pub use rest::RestBackend;

pub type Row = Map<String, Value>;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("rejected: {0}")]
    Rejected(String),
    #[error("backend returned HTTP {status}: {message}")]
    Http { status: u16, message: String },
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("state i/o failure: {0}")]
    Io(String),
    #[error("backend misconfigured: {0}")]
    Config(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Filter {
    Eq { column: String, value: String },
    /// Case-insensitive LIKE: `%` matches any run of characters, `_` one
    /// character, and `\` makes the next character literal.
    ILike { column: String, pattern: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowQuery {
    pub filters: Vec<Filter>,
    pub order_by: Option<(String, bool)>,
    pub limit: Option<usize>,
}

impl RowQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: &str, value: &str) -> Self {
        self.filters.push(Filter::Eq {
            column: column.to_string(),
            value: value.to_string(),
        });
        self
    }

    pub fn ilike(mut self, column: &str, pattern: &str) -> Self {
        self.filters.push(Filter::ILike {
            column: column.to_string(),
            pattern: pattern.to_string(),
        });
        self
    }

    pub fn order(mut self, column: &str, ascending: bool) -> Self {
        self.order_by = Some((column.to_string(), ascending));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectInfo {
    pub name: String,
    pub size: u64,
    pub content_type: String,
    pub created_at: Option<String>,
}

pub trait Backend {
    /// Runs one privileged DDL statement through the generic SQL gateway.
    fn execute_sql(&self, table_name: &str, sql_query: &str) -> Result<(), BackendError>;

    fn insert_rows(&self, table: &str, rows: &[Row]) -> Result<(), BackendError>;

    fn upsert_rows(&self, table: &str, rows: &[Row], on_conflict: &str) -> Result<(), BackendError>;

    fn select_rows(&self, table: &str, query: &RowQuery) -> Result<Vec<Row>, BackendError>;

    fn upload_object(
        &self,
        bucket: &str,
        path: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<(), BackendError>;

    /// Objects directly under `prefix`, newest first.
    fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectInfo>, BackendError>;

    fn public_url(&self, bucket: &str, path: &str) -> String;
}

/// Escapes LIKE wildcards so `value` only matches itself.
pub fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
