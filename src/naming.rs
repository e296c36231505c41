use thiserror::Error;

/// PostgreSQL truncates identifiers longer than `NAMEDATALEN - 1` bytes.
pub const DEFAULT_MAX_IDENTIFIER_LEN: usize = 63;

pub const PRIMARY_KEY_COLUMN: &str = "id";

/// PostgreSQL reserved key words, including those that may still name a
/// function or type. Sorted for `binary_search`.
const RESERVED_WORDS: &[&str] = &[
    "all",
    "analyse",
    "analyze",
    "and",
    "any",
    "array",
    "as",
    "asc",
    "asymmetric",
    "authorization",
    "binary",
    "both",
    "case",
    "cast",
    "check",
    "collate",
    "collation",
    "column",
    "concurrently",
    "constraint",
    "create",
    "cross",
    "current_catalog",
    "current_date",
    "current_role",
    "current_schema",
    "current_time",
    "current_timestamp",
    "current_user",
    "default",
    "deferrable",
    "desc",
    "distinct",
    "do",
    "else",
    "end",
    "except",
    "false",
    "fetch",
    "for",
    "foreign",
    "freeze",
    "from",
    "full",
    "grant",
    "group",
    "having",
    "ilike",
    "in",
    "initially",
    "inner",
    "intersect",
    "into",
    "is",
    "isnull",
    "join",
    "lateral",
    "leading",
    "left",
    "like",
    "limit",
    "localtime",
    "localtimestamp",
    "natural",
    "not",
    "notnull",
    "null",
    "offset",
    "on",
    "only",
    "or",
    "order",
    "outer",
    "overlaps",
    "placing",
    "primary",
    "references",
    "returning",
    "right",
    "select",
    "session_user",
    "similar",
    "some",
    "symmetric",
    "system_user",
    "table",
    "tablesample",
    "then",
    "to",
    "trailing",
    "true",
    "union",
    "unique",
    "user",
    "using",
    "variadic",
    "verbose",
    "when",
    "where",
    "window",
    "with",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    #[error("Identifier derived from '{source_text}' is empty after sanitizing")]
    Empty { source_text: String },
    #[error("Identifier '{identifier}' starts with a digit")]
    LeadingDigit { identifier: String },
    #[error("Identifier '{identifier}' is {len} bytes long (maximum {max})")]
    TooLong {
        identifier: String,
        len: usize,
        max: usize,
    },
    #[error("Identifier '{identifier}' is a reserved SQL word")]
    Reserved { identifier: String },
}

/// Replaces every character outside `[A-Za-z0-9_]` with `_` and lowercases.
///
/// Idempotent: the output only contains characters the function keeps.
pub fn sanitize_identifier(raw: &str) -> String {
    raw.chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '_' {
                ch.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}

pub fn is_reserved_word(identifier: &str) -> bool {
    RESERVED_WORDS.binary_search(&identifier).is_ok()
}

pub fn validate_identifier(
    identifier: &str,
    source_text: &str,
    max_len: usize,
) -> Result<(), IdentifierError> {
    if identifier.trim_matches('_').is_empty() {
        return Err(IdentifierError::Empty {
            source_text: source_text.to_string(),
        });
    }
    if identifier.starts_with(|ch: char| ch.is_ascii_digit()) {
        return Err(IdentifierError::LeadingDigit {
            identifier: identifier.to_string(),
        });
    }
    if identifier.len() > max_len {
        return Err(IdentifierError::TooLong {
            identifier: identifier.to_string(),
            len: identifier.len(),
            max: max_len,
        });
    }
    if is_reserved_word(identifier) {
        return Err(IdentifierError::Reserved {
            identifier: identifier.to_string(),
        });
    }
    Ok(())
}

/// Joins the four form fields with `_` and sanitizes the result.
///
/// Pure: identical inputs always produce the identical name. No uniqueness
/// check is made against existing tables.
pub fn synthesize_table_name(department: &str, level: &str, semester: &str, session: &str) -> String {
    sanitize_identifier(&format!("{department}_{level}_{semester}_{session}"))
}

pub fn checked_table_name(
    department: &str,
    level: &str,
    semester: &str,
    session: &str,
    max_len: usize,
) -> Result<String, IdentifierError> {
    let name = synthesize_table_name(department, level, semester, session);
    let source = format!("{department}_{level}_{semester}_{session}");
    validate_identifier(&name, &source, max_len)?;
    Ok(name)
}
