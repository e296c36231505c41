//! In-process backend with optional on-disk persistence.
//!
//! Behaves like the hosted store for everything the portal does with it: it
//! executes the DDL this crate emits, enforces column existence, `NOT NULL`,
//! unique keys and type coercion on writes, and keeps uploaded objects per
//! bucket. Bulk writes are atomic: a batch is applied to a copy of the table
//! and only swapped in when every row passed.
//!
//! When opened with a state directory, tables are written to `state.json`
//! after every mutation and objects live under `objects/<bucket>/<path>`.
//! Every call is recorded and faults can be injected per operation, which the
//! pipeline tests use to simulate remote failures.

use std::{
    cmp::Ordering,
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard},
};

use chrono::Utc;
use log::debug;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use sqlparser::{
    ast::{CharacterLength, ColumnDef, ColumnOption, DataType, Ident, ObjectName, ObjectType, Statement},
    dialect::PostgreSqlDialect,
    parser::Parser,
};

use super::{Backend, BackendError, Filter, ObjectInfo, Row, RowQuery, value_to_text};
use crate::schema::SqlType;

const STATE_FILE: &str = "state.json";
const OBJECTS_DIR: &str = "objects";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    ExecuteSql,
    Insert,
    Upsert,
    Select,
    Upload,
    List,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendCall {
    pub operation: Operation,
    /// Table name for row and DDL calls, `bucket/path` for object calls.
    pub target: String,
}

#[derive(Debug, Clone)]
struct Fault {
    operation: Operation,
    target: Option<String>,
    message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredColumn {
    name: String,
    /// `None` for `SERIAL` columns.
    sql_type: Option<SqlType>,
    primary_key: bool,
    unique: bool,
    not_null: bool,
}

impl StoredColumn {
    fn is_serial(&self) -> bool {
        self.sql_type.is_none()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoredTable {
    columns: Vec<StoredColumn>,
    rows: Vec<Row>,
    next_serial: i64,
}

impl StoredTable {
    fn column(&self, name: &str) -> Option<&StoredColumn> {
        self.columns.iter().find(|c| c.name == name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredObject {
    size: u64,
    content_type: String,
    created_at: String,
    #[serde(skip)]
    bytes: Vec<u8>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreState {
    tables: BTreeMap<String, StoredTable>,
    objects: BTreeMap<String, BTreeMap<String, StoredObject>>,
}

#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: Mutex<StoreState>,
    calls: Mutex<Vec<BackendCall>>,
    faults: Mutex<Vec<Fault>>,
    state_dir: Option<PathBuf>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn io_error(context: &str, path: &Path, err: impl std::fmt::Display) -> BackendError {
    BackendError::Io(format!("{context} {path:?}: {err}"))
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(dir: &Path) -> Result<Self, BackendError> {
        fs::create_dir_all(dir).map_err(|err| io_error("Creating state directory", dir, err))?;
        let state_path = dir.join(STATE_FILE);
        let mut state = if state_path.exists() {
            let text = fs::read_to_string(&state_path)
                .map_err(|err| io_error("Reading state file", &state_path, err))?;
            serde_json::from_str::<StoreState>(&text)
                .map_err(|err| io_error("Parsing state file", &state_path, err))?
        } else {
            StoreState::default()
        };
        for (bucket, objects) in state.objects.iter_mut() {
            for (path, object) in objects.iter_mut() {
                let blob_path = dir.join(OBJECTS_DIR).join(bucket).join(path);
                object.bytes = fs::read(&blob_path)
                    .map_err(|err| io_error("Reading stored object", &blob_path, err))?;
            }
        }
        debug!(
            "Opened local store at {:?} with {} table(s)",
            dir,
            state.tables.len()
        );
        Ok(Self {
            state: Mutex::new(state),
            state_dir: Some(dir.to_path_buf()),
            ..Self::default()
        })
    }

    /// Makes every later call of `operation` fail with `Rejected(message)`;
    /// `target` narrows the fault to one table (or `bucket/path`).
    pub fn inject_fault(&self, operation: Operation, target: Option<&str>, message: &str) {
        lock(&self.faults).push(Fault {
            operation,
            target: target.map(str::to_string),
            message: message.to_string(),
        });
    }

    pub fn clear_faults(&self) {
        lock(&self.faults).clear();
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        lock(&self.calls).clone()
    }

    pub fn calls_of(&self, operation: Operation) -> Vec<BackendCall> {
        lock(&self.calls)
            .iter()
            .filter(|call| call.operation == operation)
            .cloned()
            .collect()
    }

    pub fn has_table(&self, table: &str) -> bool {
        lock(&self.state).tables.contains_key(table)
    }

    /// `(name, type)` pairs in declaration order; `SERIAL` columns report `SERIAL`.
    pub fn table_columns(&self, table: &str) -> Option<Vec<(String, String)>> {
        lock(&self.state).tables.get(table).map(|t| {
            t.columns
                .iter()
                .map(|c| {
                    let ty = c
                        .sql_type
                        .map(|ty| ty.to_string())
                        .unwrap_or_else(|| "SERIAL".to_string());
                    (c.name.clone(), ty)
                })
                .collect()
        })
    }

    pub fn object(&self, bucket: &str, path: &str) -> Option<Vec<u8>> {
        lock(&self.state)
            .objects
            .get(bucket)
            .and_then(|objects| objects.get(path))
            .map(|object| object.bytes.clone())
    }

    fn begin(&self, operation: Operation, target: &str) -> Result<(), BackendError> {
        lock(&self.calls).push(BackendCall {
            operation,
            target: target.to_string(),
        });
        let faults = lock(&self.faults);
        let hit = faults.iter().find(|fault| {
            fault.operation == operation
                && fault.target.as_deref().is_none_or(|t| t == target)
        });
        match hit {
            Some(fault) => Err(BackendError::Rejected(fault.message.clone())),
            None => Ok(()),
        }
    }

    fn persist(&self, state: &StoreState) -> Result<(), BackendError> {
        let Some(dir) = &self.state_dir else {
            return Ok(());
        };
        let path = dir.join(STATE_FILE);
        let text = serde_json::to_string_pretty(state)
            .map_err(|err| io_error("Serializing state for", &path, err))?;
        fs::write(&path, text).map_err(|err| io_error("Writing state file", &path, err))
    }

    fn object_file(&self, bucket: &str, path: &str) -> Option<PathBuf> {
        self.state_dir
            .as_ref()
            .map(|dir| dir.join(OBJECTS_DIR).join(bucket).join(path))
    }
}

enum Ddl {
    Create {
        table: String,
        if_not_exists: bool,
        columns: Vec<StoredColumn>,
    },
    Drop {
        table: String,
        if_exists: bool,
    },
}

fn rejected(message: impl Into<String>) -> BackendError {
    BackendError::Rejected(message.into())
}

/// Unquoted identifiers fold to lower case, as in PostgreSQL.
fn ident_name(ident: &Ident) -> String {
    if ident.quote_style.is_some() {
        ident.value.clone()
    } else {
        ident.value.to_ascii_lowercase()
    }
}

fn relation_name(name: &ObjectName) -> Result<String, BackendError> {
    name.0
        .last()
        .map(ident_name)
        .ok_or_else(|| rejected("syntax error: missing relation name"))
}

fn parse_ddl(sql: &str) -> Result<Ddl, BackendError> {
    let statements = Parser::parse_sql(&PostgreSqlDialect {}, sql)
        .map_err(|err| rejected(format!("syntax error: {err}")))?;
    let [statement] = statements.as_slice() else {
        return Err(rejected(format!(
            "expected a single statement, found {}",
            statements.len()
        )));
    };
    match statement {
        Statement::CreateTable(create) => {
            let mut columns: Vec<StoredColumn> = Vec::new();
            for definition in &create.columns {
                let column = stored_column(definition)?;
                if columns.iter().any(|c| c.name == column.name) {
                    return Err(rejected(format!(
                        "column \"{}\" specified more than once",
                        column.name
                    )));
                }
                columns.push(column);
            }
            Ok(Ddl::Create {
                table: relation_name(&create.name)?,
                if_not_exists: create.if_not_exists,
                columns,
            })
        }
        Statement::Drop {
            object_type: ObjectType::Table,
            if_exists,
            names,
            ..
        } => {
            let [name] = names.as_slice() else {
                return Err(rejected("only one table can be dropped per statement"));
            };
            Ok(Ddl::Drop {
                table: relation_name(name)?,
                if_exists: *if_exists,
            })
        }
        other => Err(rejected(format!("unsupported statement '{other}'"))),
    }
}

/// `None` stands for `SERIAL`.
fn column_type(data_type: &DataType, column: &str) -> Result<Option<SqlType>, BackendError> {
    match data_type {
        DataType::Custom(name, modifiers)
            if modifiers.is_empty() && name.to_string().eq_ignore_ascii_case("serial") =>
        {
            Ok(None)
        }
        DataType::Varchar(Some(CharacterLength::IntegerLength { length, .. }))
        | DataType::CharacterVarying(Some(CharacterLength::IntegerLength { length, .. })) => {
            u32::try_from(*length)
                .map(|len| Some(SqlType::Varchar(len)))
                .map_err(|_| rejected(format!("length {length} for type varchar is too large")))
        }
        DataType::Float { .. }
        | DataType::Real { .. }
        | DataType::Double { .. }
        | DataType::DoublePrecision { .. }
        | DataType::Float4 { .. }
        | DataType::Float8 { .. } => Ok(Some(SqlType::Float)),
        DataType::Integer { .. } | DataType::Int { .. } | DataType::Int4 { .. } => {
            Ok(Some(SqlType::Integer))
        }
        other => Err(rejected(format!(
            "type {other} of column \"{column}\" is not supported"
        ))),
    }
}

fn stored_column(definition: &ColumnDef) -> Result<StoredColumn, BackendError> {
    let name = ident_name(&definition.name);
    let sql_type = column_type(&definition.data_type, &name)?;
    let has = |test: fn(&ColumnOption) -> bool| definition.options.iter().any(|o| test(&o.option));
    let primary_key = has(|option| matches!(option, ColumnOption::Unique { is_primary: true, .. }));
    Ok(StoredColumn {
        name,
        sql_type,
        primary_key,
        unique: has(|option| matches!(option, ColumnOption::Unique { .. })),
        not_null: primary_key || has(|option| matches!(option, ColumnOption::NotNull)),
    })
}

fn coerce(value: &Value, column: &StoredColumn) -> Result<Value, BackendError> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    let invalid = |kind: &str| {
        BackendError::Rejected(format!(
            "invalid input syntax for type {kind}: \"{}\" (column \"{}\")",
            value_to_text(value),
            column.name
        ))
    };
    match column.sql_type {
        None | Some(SqlType::Integer) => {
            let parsed = match value {
                Value::Number(n) => n.as_i64(),
                Value::String(s) => s.trim().parse::<i64>().ok(),
                _ => None,
            };
            let parsed = parsed.ok_or_else(|| invalid("integer"))?;
            let int4 = i32::try_from(parsed).map_err(|_| {
                BackendError::Rejected(format!(
                    "value \"{parsed}\" is out of range for type integer (column \"{}\")",
                    column.name
                ))
            })?;
            Ok(Value::Number(int4.into()))
        }
        Some(SqlType::Float) => {
            let parsed = match value {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse::<f64>().ok(),
                _ => None,
            };
            parsed
                .and_then(Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| invalid("double precision"))
        }
        Some(SqlType::Varchar(max)) => {
            let text = match value {
                Value::String(s) => s.clone(),
                Value::Number(_) | Value::Bool(_) => value.to_string(),
                _ => return Err(invalid("character varying")),
            };
            if text.chars().count() > max as usize {
                return Err(BackendError::Rejected(format!(
                    "value too long for type character varying({max}) (column \"{}\")",
                    column.name
                )));
            }
            Ok(Value::String(text))
        }
    }
}

fn coerce_row(table_name: &str, table: &StoredTable, row: &Row) -> Result<Row, BackendError> {
    let mut coerced = Row::new();
    for (key, value) in row {
        let column = table.column(key).ok_or_else(|| {
            BackendError::Rejected(format!(
                "column \"{key}\" of relation \"{table_name}\" does not exist"
            ))
        })?;
        coerced.insert(key.clone(), coerce(value, column)?);
    }
    Ok(coerced)
}

fn check_constraints(table_name: &str, table: &StoredTable, row: &Row, skip: Option<usize>) -> Result<(), BackendError> {
    for column in &table.columns {
        let value = row.get(&column.name).unwrap_or(&Value::Null);
        if column.not_null && value.is_null() {
            return Err(BackendError::Rejected(format!(
                "null value in column \"{}\" of relation \"{table_name}\" violates not-null constraint",
                column.name
            )));
        }
        if column.unique && !value.is_null() {
            let duplicate = table
                .rows
                .iter()
                .enumerate()
                .filter(|(idx, _)| Some(*idx) != skip)
                .any(|(_, existing)| existing.get(&column.name) == Some(value));
            if duplicate {
                return Err(BackendError::Conflict(format!(
                    "duplicate key value violates unique constraint on \"{table_name}\".\"{}\"",
                    column.name
                )));
            }
        }
    }
    Ok(())
}

fn insert_one(table_name: &str, table: &mut StoredTable, row: &Row) -> Result<(), BackendError> {
    let mut coerced = coerce_row(table_name, table, row)?;
    for column in table.columns.iter().filter(|c| c.is_serial()) {
        match coerced.get(&column.name).and_then(Value::as_i64) {
            Some(explicit) => table.next_serial = table.next_serial.max(explicit),
            None => {
                let next = table
                    .next_serial
                    .checked_add(1)
                    .filter(|next| *next <= i64::from(i32::MAX))
                    .ok_or_else(|| {
                        BackendError::Rejected(format!(
                            "nextval: reached maximum value of sequence \"{table_name}_{}_seq\" ({})",
                            column.name,
                            i32::MAX
                        ))
                    })?;
                table.next_serial = next;
                coerced.insert(column.name.clone(), Value::Number(next.into()));
            }
        }
    }
    check_constraints(table_name, table, &coerced, None)?;
    let ordered = table
        .columns
        .iter()
        .map(|c| {
            let value = coerced.remove(&c.name).unwrap_or(Value::Null);
            (c.name.clone(), value)
        })
        .collect();
    table.rows.push(ordered);
    Ok(())
}

fn upsert_one(table_name: &str, table: &mut StoredTable, row: &Row, on_conflict: &str) -> Result<(), BackendError> {
    let coerced = coerce_row(table_name, table, row)?;
    let key = coerced.get(on_conflict).filter(|v| !v.is_null());
    let existing = key.and_then(|key| {
        table
            .rows
            .iter()
            .position(|r| r.get(on_conflict) == Some(key))
    });
    match existing {
        Some(idx) => {
            let mut merged = table.rows[idx].clone();
            for (column, value) in coerced {
                merged.insert(column, value);
            }
            check_constraints(table_name, table, &merged, Some(idx))?;
            table.rows[idx] = merged;
            Ok(())
        }
        None => insert_one(table_name, table, &coerced),
    }
}

fn like_to_regex(pattern: &str) -> Result<Regex, BackendError> {
    let mut expr = String::from("(?is)^");
    let mut chars = pattern.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => {
                let literal = chars.next().unwrap_or('\\');
                expr.push_str(&regex::escape(&literal.to_string()));
            }
            '%' => expr.push_str(".*"),
            '_' => expr.push('.'),
            other => expr.push_str(&regex::escape(&other.to_string())),
        }
    }
    expr.push('$');
    Regex::new(&expr).map_err(|err| BackendError::Rejected(format!("invalid pattern '{pattern}': {err}")))
}

fn compare_values(left: &Value, right: &Value) -> Ordering {
    match (left, right) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Greater,
        (_, Value::Null) => Ordering::Less,
        (Value::Number(a), Value::Number(b)) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        (a, b) => value_to_text(a).cmp(&value_to_text(b)),
    }
}

impl Backend for MemoryBackend {
    fn execute_sql(&self, table_name: &str, sql_query: &str) -> Result<(), BackendError> {
        self.begin(Operation::ExecuteSql, table_name)?;
        let statement = parse_ddl(sql_query)?;
        let mut state = lock(&self.state);
        match statement {
            Ddl::Create {
                table,
                if_not_exists,
                columns,
            } => {
                if state.tables.contains_key(&table) {
                    if if_not_exists {
                        return Ok(());
                    }
                    return Err(BackendError::Conflict(format!(
                        "relation \"{table}\" already exists"
                    )));
                }
                debug!("Creating table {table} with {} column(s)", columns.len());
                state.tables.insert(
                    table,
                    StoredTable {
                        columns,
                        ..StoredTable::default()
                    },
                );
            }
            Ddl::Drop { table, if_exists } => {
                if state.tables.remove(&table).is_none() && !if_exists {
                    return Err(BackendError::NotFound(format!(
                        "table \"{table}\" does not exist"
                    )));
                }
                debug!("Dropped table {table}");
            }
        }
        self.persist(&state)
    }

    fn insert_rows(&self, table: &str, rows: &[Row]) -> Result<(), BackendError> {
        self.begin(Operation::Insert, table)?;
        let mut state = lock(&self.state);
        let stored = state
            .tables
            .get(table)
            .ok_or_else(|| BackendError::NotFound(format!("relation \"{table}\" does not exist")))?;
        let mut staged = stored.clone();
        for row in rows {
            insert_one(table, &mut staged, row)?;
        }
        state.tables.insert(table.to_string(), staged);
        self.persist(&state)
    }

    fn upsert_rows(&self, table: &str, rows: &[Row], on_conflict: &str) -> Result<(), BackendError> {
        self.begin(Operation::Upsert, table)?;
        let mut state = lock(&self.state);
        let stored = state
            .tables
            .get(table)
            .ok_or_else(|| BackendError::NotFound(format!("relation \"{table}\" does not exist")))?;
        if stored.column(on_conflict).is_none() {
            return Err(BackendError::Rejected(format!(
                "column \"{on_conflict}\" of relation \"{table}\" does not exist"
            )));
        }
        let mut staged = stored.clone();
        for row in rows {
            upsert_one(table, &mut staged, row, on_conflict)?;
        }
        state.tables.insert(table.to_string(), staged);
        self.persist(&state)
    }

    fn select_rows(&self, table: &str, query: &RowQuery) -> Result<Vec<Row>, BackendError> {
        self.begin(Operation::Select, table)?;
        let state = lock(&self.state);
        let stored = state
            .tables
            .get(table)
            .ok_or_else(|| BackendError::NotFound(format!("relation \"{table}\" does not exist")))?;
        let mut predicates: Vec<(String, Box<dyn Fn(&Value) -> bool>)> = Vec::new();
        for filter in &query.filters {
            let column = match filter {
                Filter::Eq { column, .. } | Filter::ILike { column, .. } => column,
            };
            if stored.column(column).is_none() {
                return Err(BackendError::Rejected(format!(
                    "column {table}.{column} does not exist"
                )));
            }
            match filter {
                Filter::Eq { column, value } => {
                    let expected = value.clone();
                    predicates.push((
                        column.clone(),
                        Box::new(move |v: &Value| !v.is_null() && value_to_text(v) == expected),
                    ));
                }
                Filter::ILike { column, pattern } => {
                    let regex = like_to_regex(pattern)?;
                    predicates.push((
                        column.clone(),
                        Box::new(move |v: &Value| !v.is_null() && regex.is_match(&value_to_text(v))),
                    ));
                }
            }
        }
        let mut rows = stored
            .rows
            .iter()
            .filter(|row| {
                predicates
                    .iter()
                    .all(|(column, test)| test(row.get(column).unwrap_or(&Value::Null)))
            })
            .cloned()
            .collect::<Vec<_>>();
        if let Some((column, ascending)) = &query.order_by {
            rows.sort_by(|a, b| {
                let ordering = compare_values(
                    a.get(column).unwrap_or(&Value::Null),
                    b.get(column).unwrap_or(&Value::Null),
                );
                if *ascending { ordering } else { ordering.reverse() }
            });
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    fn upload_object(
        &self,
        bucket: &str,
        path: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<(), BackendError> {
        self.begin(Operation::Upload, &format!("{bucket}/{path}"))?;
        let mut state = lock(&self.state);
        let objects = state.objects.entry(bucket.to_string()).or_default();
        if objects.contains_key(path) {
            return Err(BackendError::Conflict(format!(
                "object {bucket}/{path} already exists"
            )));
        }
        if let Some(file) = self.object_file(bucket, path) {
            if let Some(parent) = file.parent() {
                fs::create_dir_all(parent)
                    .map_err(|err| io_error("Creating object directory", parent, err))?;
            }
            fs::write(&file, bytes).map_err(|err| io_error("Writing object", &file, err))?;
        }
        objects.insert(
            path.to_string(),
            StoredObject {
                size: bytes.len() as u64,
                content_type: content_type.to_string(),
                created_at: Utc::now().to_rfc3339(),
                bytes: bytes.to_vec(),
            },
        );
        self.persist(&state)
    }

    fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectInfo>, BackendError> {
        self.begin(Operation::List, &format!("{bucket}/{prefix}"))?;
        let state = lock(&self.state);
        let folder = format!("{}/", prefix.trim_end_matches('/'));
        let mut listed = state
            .objects
            .get(bucket)
            .map(|objects| {
                objects
                    .iter()
                    .filter_map(|(path, object)| {
                        let name = path.strip_prefix(&folder)?;
                        (!name.contains('/')).then(|| ObjectInfo {
                            name: name.to_string(),
                            size: object.size,
                            content_type: object.content_type.clone(),
                            created_at: Some(object.created_at.clone()),
                        })
                    })
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        listed.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.name.cmp(&b.name)));
        Ok(listed)
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        match self.object_file(bucket, path) {
            Some(file) => format!("file://{}", file.display()),
            None => format!("memory://{bucket}/{path}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_pattern_is_anchored_and_case_insensitive() {
        let regex = like_to_regex("csit%").unwrap();
        assert!(regex.is_match("CSIT_nd_1"));
        assert!(!regex.is_match("cet_csit"));
        let escaped = like_to_regex("csit\\_nd%").unwrap();
        assert!(escaped.is_match("csit_nd_1"));
        assert!(!escaped.is_match("csitxnd_1"));
    }

    #[test]
    fn create_table_reads_types_and_constraints() {
        let Ddl::Create { table, if_not_exists, columns } = parse_ddl(
            "CREATE TABLE IF NOT EXISTS \"Scores\" (id SERIAL PRIMARY KEY, \"GPA\" DOUBLE PRECISION NOT NULL, matric CHARACTER VARYING(20) UNIQUE, units INT);",
        )
        .unwrap() else {
            panic!("expected CREATE TABLE");
        };
        assert_eq!(table, "Scores");
        assert!(if_not_exists);
        let names = columns.iter().map(|c| c.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["id", "GPA", "matric", "units"]);
        assert!(columns[0].is_serial() && columns[0].primary_key && columns[0].not_null);
        assert_eq!(columns[1].sql_type, Some(SqlType::Float));
        assert!(columns[1].not_null);
        assert_eq!(columns[2].sql_type, Some(SqlType::Varchar(20)));
        assert!(columns[2].unique && !columns[2].not_null);
        assert_eq!(columns[3].sql_type, Some(SqlType::Integer));
    }

    #[test]
    fn drop_table_folds_unquoted_names() {
        let Ddl::Drop { table, if_exists } = parse_ddl("DROP TABLE IF EXISTS CSIT_ND_1;").unwrap() else {
            panic!("expected DROP TABLE");
        };
        assert_eq!(table, "csit_nd_1");
        assert!(if_exists);
    }

    #[test]
    fn parse_rejects_unknown_statements_and_types() {
        let err = parse_ddl("DELETE FROM results_metadata").err().unwrap();
        assert!(err.to_string().contains("unsupported statement"));
        let err = parse_ddl("CREATE TABLE t (payload BYTEA)").err().unwrap();
        assert!(err.to_string().contains("not supported"));
        assert!(parse_ddl("CREATE TABLE t (a INTEGER); DROP TABLE t").is_err());
    }

    #[test]
    fn integer_values_are_bounded_to_int4() {
        let column = StoredColumn {
            name: "units".to_string(),
            sql_type: Some(SqlType::Integer),
            primary_key: false,
            unique: false,
            not_null: false,
        };
        assert_eq!(
            coerce(&Value::String("2147483647".to_string()), &column).unwrap(),
            serde_json::json!(2147483647)
        );
        let err = coerce(&serde_json::json!(2147483648i64), &column).unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn float_coercion_rejects_text() {
        let column = StoredColumn {
            name: "gpa".to_string(),
            sql_type: Some(SqlType::Float),
            primary_key: false,
            unique: false,
            not_null: false,
        };
        assert!(coerce(&Value::String("abc".to_string()), &column).is_err());
        assert_eq!(
            coerce(&Value::String("3.5".to_string()), &column).unwrap(),
            serde_json::json!(3.5)
        );
    }
}
