use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::form::{Department, Level, Semester};

#[derive(Debug, Parser)]
#[command(author, version, about = "Ingest and manage student result sheets", long_about = None)]
pub struct Cli {
    /// YAML configuration file (defaults apply when omitted)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// Use the local store in this directory instead of the configured backend
    #[arg(long = "state-dir", global = true)]
    pub state_dir: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Provision the results metadata registry
    Init,
    /// Upload a result sheet: create its table, insert rows, archive and register it
    Upload(UploadArgs),
    /// List registered result tables, newest first
    Tables(TablesArgs),
    /// Export the rows of a result table
    Show(ShowArgs),
    /// Apply corrections to a result table from a CSV keyed by id
    Edit(EditArgs),
    /// Print a student's result for one semester
    Transcript(TranscriptArgs),
    /// List archived result sheets with their public URLs
    Archives,
}

#[derive(Debug, Args)]
pub struct UploadArgs {
    /// Result sheet to upload ('-' reads stdin)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Department code (CSIT, CET, PEG, PMBS, PNGPD, ISET, MEC, EEED)
    #[arg(long, value_parser = parse_department)]
    pub department: Department,
    /// Level such as 'ND 1' or 'hnd2'
    #[arg(long, value_parser = parse_level)]
    pub level: Level,
    /// Semester ('first' or 'second')
    #[arg(long, value_parser = parse_semester)]
    pub semester: Semester,
    /// Academic session, e.g. 2023/2024
    #[arg(long)]
    pub session: String,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    /// Keep the table when the row insert fails
    #[arg(long = "no-rollback")]
    pub no_rollback: bool,
    /// Parse and infer only; print the table definition without touching the backend
    #[arg(long = "dry-run")]
    pub dry_run: bool,
}

#[derive(Debug, Args)]
pub struct TablesArgs {
    /// Only tables whose name starts with this prefix (case-insensitive)
    #[arg(long)]
    pub prefix: Option<String>,
}

#[derive(Debug, Args)]
pub struct ShowArgs {
    /// Result table name
    #[arg(short = 't', long = "table-name")]
    pub table_name: String,
    /// Output CSV file (stdout if omitted)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    /// Print an aligned text table instead of CSV
    #[arg(long = "table")]
    pub as_table: bool,
    /// Output delimiter
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
}

#[derive(Debug, Args)]
pub struct EditArgs {
    /// Result table name
    #[arg(short = 't', long = "table-name")]
    pub table_name: String,
    /// CSV of edits with an 'id' column
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct TranscriptArgs {
    /// Matriculation number, e.g. FPE/ND/CSIT/2021/001
    #[arg(long)]
    pub matric: String,
    /// Level such as 'ND 1' or 'hnd2'
    #[arg(long, value_parser = parse_level)]
    pub level: Level,
    /// Semester ('first' or 'second')
    #[arg(long, value_parser = parse_semester)]
    pub semester: Semester,
    /// Academic session, e.g. 2023/2024
    #[arg(long)]
    pub session: String,
}

pub fn parse_department(value: &str) -> Result<Department, String> {
    value.parse::<Department>().map_err(|err| err.to_string())
}

pub fn parse_level(value: &str) -> Result<Level, String> {
    value.parse::<Level>().map_err(|err| err.to_string())
}

pub fn parse_semester(value: &str) -> Result<Semester, String> {
    value.parse::<Semester>().map_err(|err| err.to_string())
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}
