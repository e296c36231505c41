use std::fmt;

use log::debug;
use serde::Serialize;
use thiserror::Error;

use crate::{
    backend::{Backend, BackendError, Row, RowQuery, value_to_text},
    form::{Department, Level, Semester, UploadForm},
    naming::IdentifierError,
    table::TextTable,
};

const GRADE_SUFFIX: &str = "_grade";
const UNITS_SUFFIX: &str = "_units";
const MATRIC_COLUMN: &str = "matriculation_number";

#[derive(Debug, Error)]
pub enum TranscriptError {
    #[error("Matriculation number '{0}' does not have the DEPT/PROG/CODE/YEAR/NO shape")]
    MalformedMatric(String),
    #[error("Department '{code}' from matriculation number '{matric}' is not offered")]
    UnknownDepartment { matric: String, code: String },
    #[error(transparent)]
    TableName(#[from] IdentifierError),
    #[error("No result for '{matric}' in '{table}'")]
    NotFound { matric: String, table: String },
    #[error("Fetching result from '{table}' failed: {source}")]
    Backend {
        table: String,
        #[source]
        source: BackendError,
    },
}

/// Third `/`-separated segment of a matriculation number; at least four
/// segments are required.
pub fn department_from_matric(matric: &str) -> Result<Department, TranscriptError> {
    let parts = matric.trim().split('/').collect::<Vec<_>>();
    if parts.len() < 4 || parts[2].trim().is_empty() {
        return Err(TranscriptError::MalformedMatric(matric.to_string()));
    }
    parts[2]
        .trim()
        .parse::<Department>()
        .map_err(|_| TranscriptError::UnknownDepartment {
            matric: matric.to_string(),
            code: parts[2].trim().to_string(),
        })
}

/// Polytechnic letter scale; non-numeric scores map to `-`.
pub fn letter_grade(score: &str) -> &'static str {
    let Ok(score) = score.trim().parse::<f64>() else {
        return "-";
    };
    match score {
        s if s >= 75.0 => "A",
        s if s >= 70.0 => "AB",
        s if s >= 65.0 => "B",
        s if s >= 60.0 => "BC",
        s if s >= 55.0 => "C",
        s if s >= 50.0 => "CD",
        s if s >= 45.0 => "D",
        s if s >= 40.0 => "E",
        _ => "F",
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CourseLine {
    pub code: String,
    pub units: String,
    pub score: String,
    pub grade: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transcript {
    pub matriculation_number: String,
    pub caption: String,
    pub courses: Vec<CourseLine>,
    pub tgp: String,
    pub gpa: String,
    pub remarks: String,
}

fn text_or_dash(row: &Row, column: &str) -> String {
    row.get(column)
        .map(value_to_text)
        .filter(|text| !text.trim().is_empty())
        .unwrap_or_else(|| "-".to_string())
}

impl Transcript {
    pub fn from_row(matric: &str, caption: &str, row: &Row) -> Self {
        let courses = row
            .keys()
            .filter_map(|key| key.strip_suffix(GRADE_SUFFIX).map(|code| (key, code)))
            .filter(|(_, code)| !code.is_empty())
            .map(|(key, code)| {
                let score = text_or_dash(row, key);
                CourseLine {
                    code: code.to_ascii_uppercase(),
                    units: text_or_dash(row, &format!("{code}{UNITS_SUFFIX}")),
                    grade: letter_grade(&score).to_string(),
                    score,
                }
            })
            .collect();
        Self {
            matriculation_number: matric.to_string(),
            caption: caption.to_string(),
            courses,
            tgp: text_or_dash(row, "tgp"),
            gpa: text_or_dash(row, "gpa"),
            remarks: text_or_dash(row, "remarks"),
        }
    }

    pub fn render(&self) -> String {
        let headers = ["COURSE", "UNITS", "SCORE", "GRADE"]
            .iter()
            .map(|h| h.to_string())
            .collect();
        let mut table = TextTable::new(headers).with_caption(format!(
            "{}\nMATRICULATION NUMBER: {}",
            self.caption, self.matriculation_number
        ));
        for course in &self.courses {
            table.push_row(vec![
                course.code.clone(),
                course.units.clone(),
                course.score.clone(),
                course.grade.clone(),
            ]);
        }
        format!(
            "{}\nTGP: {}\nGPA: {}\nREMARK: {}\n",
            table.render(),
            self.tgp,
            self.gpa,
            self.remarks
        )
    }
}

impl fmt::Display for Transcript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

pub fn lookup_transcript(
    backend: &dyn Backend,
    matric: &str,
    level: Level,
    semester: Semester,
    session: &str,
    max_identifier_len: usize,
) -> Result<Transcript, TranscriptError> {
    let matric = matric.trim();
    let department = department_from_matric(matric)?;
    let form = UploadForm::new(department, level, semester, session);
    let table = form.checked_table_name(max_identifier_len)?;
    debug!("Looking up {matric} in {table}");
    let rows = backend
        .select_rows(&table, &RowQuery::all().eq(MATRIC_COLUMN, matric).limit(1))
        .map_err(|source| match source {
            BackendError::NotFound(_) => TranscriptError::NotFound {
                matric: matric.to_string(),
                table: table.clone(),
            },
            source => TranscriptError::Backend {
                table: table.clone(),
                source,
            },
        })?;
    let row = rows.first().ok_or_else(|| TranscriptError::NotFound {
        matric: matric.to_string(),
        table: table.clone(),
    })?;
    Ok(Transcript::from_row(matric, &form.caption(), row))
}
