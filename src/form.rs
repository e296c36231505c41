use std::{fmt, str::FromStr};

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::naming;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Department {
    Csit,
    Cet,
    Peg,
    Pmbs,
    Pngpd,
    Iset,
    Mec,
    Eeed,
}

impl Department {
    pub const ALL: [Department; 8] = [
        Department::Csit,
        Department::Cet,
        Department::Peg,
        Department::Pmbs,
        Department::Pngpd,
        Department::Iset,
        Department::Mec,
        Department::Eeed,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Department::Csit => "CSIT",
            Department::Cet => "CET",
            Department::Peg => "PEG",
            Department::Pmbs => "PMBS",
            Department::Pngpd => "PNGPD",
            Department::Iset => "ISET",
            Department::Mec => "MEC",
            Department::Eeed => "EEED",
        }
    }
}

impl fmt::Display for Department {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Department {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        let trimmed = value.trim();
        Department::ALL
            .into_iter()
            .find(|dept| dept.code().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| {
                let known = Department::ALL.map(|d| d.code()).join(", ");
                anyhow!("Unknown department '{trimmed}' (expected one of {known})")
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Level {
    Nd1,
    Nd2,
    Hnd1,
    Hnd2,
}

impl Level {
    pub const ALL: [Level; 4] = [Level::Nd1, Level::Nd2, Level::Hnd1, Level::Hnd2];

    pub fn label(&self) -> &'static str {
        match self {
            Level::Nd1 => "ND 1",
            Level::Nd2 => "ND 2",
            Level::Hnd1 => "HND 1",
            Level::Hnd2 => "HND 2",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Level {
    type Err = anyhow::Error;

    /// Accepts the form label (`ND 1`) as well as compact spellings such as
    /// `nd_1` or `hnd2`.
    fn from_str(value: &str) -> Result<Self> {
        let compact = compact_token(value);
        Level::ALL
            .into_iter()
            .find(|level| compact_token(level.label()) == compact)
            .ok_or_else(|| anyhow!("Unknown level '{}' (expected ND 1, ND 2, HND 1 or HND 2)", value.trim()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Semester {
    First,
    Second,
}

impl Semester {
    pub const ALL: [Semester; 2] = [Semester::First, Semester::Second];

    pub fn label(&self) -> &'static str {
        match self {
            Semester::First => "First Semester",
            Semester::Second => "Second Semester",
        }
    }
}

impl fmt::Display for Semester {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Semester {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        let compact = compact_token(value);
        match compact.as_str() {
            "first" | "firstsemester" | "1" => Ok(Semester::First),
            "second" | "secondsemester" | "2" => Ok(Semester::Second),
            _ => Err(anyhow!(
                "Unknown semester '{}' (expected First Semester or Second Semester)",
                value.trim()
            )),
        }
    }
}

fn compact_token(value: &str) -> String {
    value
        .chars()
        .filter(|ch| ch.is_ascii_alphanumeric())
        .map(|ch| ch.to_ascii_lowercase())
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadForm {
    pub department: Department,
    pub level: Level,
    pub semester: Semester,
    pub session: String,
}

impl UploadForm {
    pub fn new(department: Department, level: Level, semester: Semester, session: &str) -> Self {
        Self {
            department,
            level,
            semester,
            session: session.to_string(),
        }
    }

    pub fn table_name(&self) -> String {
        naming::synthesize_table_name(
            self.department.code(),
            self.level.label(),
            self.semester.label(),
            &self.session,
        )
    }

    pub fn checked_table_name(&self, max_len: usize) -> Result<String, naming::IdentifierError> {
        naming::checked_table_name(
            self.department.code(),
            self.level.label(),
            self.semester.label(),
            &self.session,
            max_len,
        )
    }

    pub fn caption(&self) -> String {
        format!(
            "{} {} - {}, {}",
            self.level, self.department, self.semester, self.session
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableTitle {
    pub department: Department,
    pub level: Level,
    pub semester: Semester,
    pub session: String,
}

impl fmt::Display for TableTitle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}, {}, {}",
            self.department, self.level, self.semester, self.session
        )
    }
}

/// Decodes `csit_nd_1_first_semester_2023_2024` back into its form fields.
///
/// Sessions are assumed to be `YYYY/YYYY`; anything else after the semester is
/// rejoined with `/` so that unusual sessions still round-trip legibly.
pub fn describe_table_name(table_name: &str) -> Option<TableTitle> {
    let parts = table_name.split('_').collect::<Vec<_>>();
    if parts.len() < 6 {
        return None;
    }
    let department = parts[0].parse::<Department>().ok()?;
    let level = format!("{}{}", parts[1], parts[2]).parse::<Level>().ok()?;
    if parts[4] != "semester" {
        return None;
    }
    let semester = parts[3].parse::<Semester>().ok()?;
    let session = parts[5..].join("/");
    if session.is_empty() {
        return None;
    }
    Some(TableTitle {
        department,
        level,
        semester,
        session,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_accepts_label_and_compact_forms() {
        assert_eq!("ND 1".parse::<Level>().unwrap(), Level::Nd1);
        assert_eq!("hnd_2".parse::<Level>().unwrap(), Level::Hnd2);
        assert!("ND 3".parse::<Level>().is_err());
    }

    #[test]
    fn department_is_case_insensitive() {
        assert_eq!("pngpd".parse::<Department>().unwrap(), Department::Pngpd);
        let err = "XYZ".parse::<Department>().unwrap_err();
        assert!(err.to_string().contains("CSIT"));
    }

    #[test]
    fn caption_matches_form_layout() {
        let form = UploadForm::new(Department::Csit, Level::Nd1, Semester::First, "2023/2024");
        assert_eq!(form.caption(), "ND 1 CSIT - First Semester, 2023/2024");
    }

    #[test]
    fn describe_table_name_round_trips_form() {
        let form = UploadForm::new(Department::Eeed, Level::Hnd2, Semester::Second, "2022/2023");
        let title = describe_table_name(&form.table_name()).expect("decodable");
        assert_eq!(title.department, Department::Eeed);
        assert_eq!(title.level, Level::Hnd2);
        assert_eq!(title.semester, Semester::Second);
        assert_eq!(title.to_string(), "EEED HND 2, Second Semester, 2022/2023");
    }

    #[test]
    fn describe_table_name_rejects_foreign_names() {
        assert!(describe_table_name("results_metadata").is_none());
        assert!(describe_table_name("csit_nd_1_first_term_2023_2024").is_none());
    }
}
