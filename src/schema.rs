//! Column type inference and result-table DDL.
//!
//! Types are decided from the header *name* alone, never from cell values:
//! result sheets carry grades as scores, so sampling values would turn grade
//! columns numeric. The rules are checked in priority order and the first
//! match wins:
//!
//! | header contains (case-insensitive)          | type           |
//! |---------------------------------------------|----------------|
//! | `grade`, `matriculation_number`, `remarks`  | `VARCHAR(255)` |
//! | `gpa`, `tgp`                                | `FLOAT`        |
//! | `units`, `attendance`                       | `INTEGER`      |
//! | anything else                               | `VARCHAR(255)` |
//!
//! Column names are the sanitized headers (see [`crate::naming`]); a result
//! table is always `id SERIAL PRIMARY KEY` followed by one column per header.

use std::{collections::HashMap, fmt, sync::OnceLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::{
    backend::Row,
    naming::{self, IdentifierError, PRIMARY_KEY_COLUMN},
    parser::{CsvRow, ParsedCsv},
};

pub const DEFAULT_VARCHAR_LEN: u32 = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SqlType {
    Varchar(u32),
    Float,
    Integer,
}

impl SqlType {
    pub fn text() -> Self {
        SqlType::Varchar(DEFAULT_VARCHAR_LEN)
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlType::Varchar(len) => write!(f, "VARCHAR({len})"),
            SqlType::Float => f.write_str("FLOAT"),
            SqlType::Integer => f.write_str("INTEGER"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub header: String,
    pub sql_type: SqlType,
}

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("Column for header '{header}' is unusable: {source}")]
    Column {
        header: String,
        #[source]
        source: IdentifierError,
    },
    #[error("Headers '{first}' and '{second}' both map to column '{column}'")]
    DuplicateColumn {
        column: String,
        first: String,
        second: String,
    },
    #[error("Header '{header}' collides with the generated 'id' primary key")]
    PrimaryKeyCollision { header: String },
}

struct TypeRule {
    pattern: Regex,
    sql_type: SqlType,
}

fn type_rules() -> &'static [TypeRule] {
    static RULES: OnceLock<Vec<TypeRule>> = OnceLock::new();
    RULES.get_or_init(|| {
        [
            ("(?i)grade|matriculation_number|remarks", SqlType::text()),
            ("(?i)gpa|tgp", SqlType::Float),
            ("(?i)units|attendance", SqlType::Integer),
        ]
        .into_iter()
        .filter_map(|(pattern, sql_type)| {
            Regex::new(pattern)
                .ok()
                .map(|pattern| TypeRule { pattern, sql_type })
        })
        .collect()
    })
}

pub fn infer_column_type(header: &str) -> SqlType {
    type_rules()
        .iter()
        .find(|rule| rule.pattern.is_match(header))
        .map(|rule| rule.sql_type)
        .unwrap_or_else(SqlType::text)
}

pub fn infer_column(header: &str, max_identifier_len: usize) -> Result<ColumnSpec, SchemaError> {
    let name = naming::sanitize_identifier(header);
    naming::validate_identifier(&name, header, max_identifier_len).map_err(|source| {
        SchemaError::Column {
            header: header.to_string(),
            source,
        }
    })?;
    if name == PRIMARY_KEY_COLUMN {
        return Err(SchemaError::PrimaryKeyCollision {
            header: header.to_string(),
        });
    }
    Ok(ColumnSpec {
        name,
        header: header.to_string(),
        sql_type: infer_column_type(header),
    })
}

/// One [`ColumnSpec`] per header, in header order. Headers that sanitize to
/// the same column name are rejected here rather than left to the store.
pub fn infer_columns(headers: &[String], max_identifier_len: usize) -> Result<Vec<ColumnSpec>, SchemaError> {
    let mut seen: HashMap<String, &str> = HashMap::with_capacity(headers.len());
    let mut columns = Vec::with_capacity(headers.len());
    for header in headers {
        let column = infer_column(header, max_identifier_len)?;
        if let Some(first) = seen.insert(column.name.clone(), header.as_str()) {
            return Err(SchemaError::DuplicateColumn {
                column: column.name,
                first: first.to_string(),
                second: header.clone(),
            });
        }
        columns.push(column);
    }
    Ok(columns)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub table_name: String,
    pub columns: Vec<ColumnSpec>,
}

impl TableSchema {
    pub fn new(table_name: impl Into<String>, columns: Vec<ColumnSpec>) -> Self {
        Self {
            table_name: table_name.into(),
            columns,
        }
    }

    pub fn create_table_sql(&self) -> String {
        let mut sql = format!(
            "CREATE TABLE {} (\n  {PRIMARY_KEY_COLUMN} SERIAL PRIMARY KEY",
            self.table_name
        );
        for column in &self.columns {
            sql.push_str(&format!(",\n  {} {}", column.name, column.sql_type));
        }
        sql.push_str("\n);");
        sql
    }

    pub fn drop_table_sql(&self) -> String {
        format!("DROP TABLE IF EXISTS {};", self.table_name)
    }

    /// Insert payload for one CSV row, keyed by column name. Empty cells are
    /// sent as `null` so typed columns do not reject blank strings.
    pub fn row_payload(&self, row: &CsvRow) -> Row {
        self.columns
            .iter()
            .zip(row.values())
            .map(|(column, value)| (column.name.clone(), cell_value(value)))
            .collect()
    }

    pub fn row_payloads(&self, parsed: &ParsedCsv) -> Vec<Row> {
        parsed.rows.iter().map(|row| self.row_payload(row)).collect()
    }
}

pub fn cell_value(raw: &str) -> Value {
    if raw.trim().is_empty() {
        Value::Null
    } else {
        Value::String(raw.to_string())
    }
}
