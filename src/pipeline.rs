//! The result-sheet upload pipeline.
//!
//! One upload attempt walks a fixed sequence of stages:
//!
//! ```text
//! Idle -> Parsing -> Inferring -> CreatingSchema -> Inserting -> Archiving -> RecordingMetadata -> Done
//! ```
//!
//! Any stage may fail. Parsing and inferring are local, so failing there
//! leaves nothing behind. From `CreatingSchema` on, every step is a remote
//! write and there is no transaction spanning them:
//!
//! - an insert failure drops the new table again (when rollback is enabled);
//! - an archive failure keeps the table and its rows and skips the registry;
//! - a registry failure does not fail the upload: the report carries
//!   [`RegistryStatus::Orphaned`] so the caller can warn that the table is
//!   invisible to the listing screens.

use std::fmt;

use chrono::Utc;
use encoding_rs::{Encoding, UTF_8};
use log::{debug, info, warn};
use thiserror::Error;
use uuid::Uuid;

use crate::{
    archive::{self, ArchivedObject},
    backend::{Backend, BackendError},
    config::PortalConfig,
    form::UploadForm,
    io_utils,
    naming::IdentifierError,
    parser::{self, ParseError, ParsedCsv},
    registry::{self, MetadataError, MetadataRecord},
    schema::{self, SchemaError, TableSchema},
};

/// The only message shown to the admin when an upload fails.
pub const USER_FAILURE_MESSAGE: &str =
    "Failed to process result. Please check the CSV format or try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Parsing,
    Inferring,
    CreatingSchema,
    Inserting,
    Archiving,
    RecordingMetadata,
    Done,
    Failed,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Idle => "idle",
            Stage::Parsing => "parsing",
            Stage::Inferring => "inferring",
            Stage::CreatingSchema => "creating_schema",
            Stage::Inserting => "inserting",
            Stage::Archiving => "archiving",
            Stage::RecordingMetadata => "recording_metadata",
            Stage::Done => "done",
            Stage::Failed => "failed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Upload is {size} bytes, larger than the {max} byte limit")]
    TooLarge { size: u64, max: u64 },
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error("Result table name is unusable: {0}")]
    TableName(#[from] IdentifierError),
    #[error("Creating table '{table}' failed: {source}")]
    SchemaCreate {
        table: String,
        #[source]
        source: BackendError,
    },
    #[error("Inserting rows into '{table}' failed ({}): {source}", rollback_note(.rolled_back))]
    Insert {
        table: String,
        rolled_back: bool,
        #[source]
        source: BackendError,
    },
    #[error("Archiving to '{path}' failed; table '{table}' and its rows were kept: {source}")]
    Archive {
        table: String,
        path: String,
        #[source]
        source: BackendError,
    },
}

fn rollback_note(rolled_back: &bool) -> &'static str {
    if *rolled_back {
        "table dropped"
    } else {
        "table left in place"
    }
}

impl UploadError {
    pub fn stage(&self) -> Stage {
        match self {
            UploadError::TooLarge { .. } | UploadError::Parse(_) => Stage::Parsing,
            UploadError::Schema(_) | UploadError::TableName(_) => Stage::Inferring,
            UploadError::SchemaCreate { .. } => Stage::CreatingSchema,
            UploadError::Insert { .. } => Stage::Inserting,
            UploadError::Archive { .. } => Stage::Archiving,
        }
    }

    /// Name of a table that still exists remotely after this failure.
    pub fn surviving_table(&self) -> Option<&str> {
        match self {
            UploadError::Insert {
                table,
                rolled_back: false,
                ..
            }
            | UploadError::Archive { table, .. } => Some(table.as_str()),
            _ => None,
        }
    }

    pub fn user_message(&self) -> &'static str {
        USER_FAILURE_MESSAGE
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSettings {
    pub bucket: String,
    pub archive_prefix: String,
    pub registry: String,
    pub max_upload_bytes: u64,
    pub max_identifier_len: usize,
    pub rollback_on_failure: bool,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self::from(&PortalConfig::default())
    }
}

impl From<&PortalConfig> for UploadSettings {
    fn from(config: &PortalConfig) -> Self {
        Self {
            bucket: config.storage.bucket.clone(),
            archive_prefix: config.storage.archive_prefix.clone(),
            registry: config.registry.table.clone(),
            max_upload_bytes: config.limits.max_upload_bytes,
            max_identifier_len: config.limits.max_identifier_len,
            rollback_on_failure: config.pipeline.rollback_on_failure,
        }
    }
}

#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub form: UploadForm,
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub encoding: &'static Encoding,
    pub delimiter: u8,
}

impl UploadRequest {
    pub fn new(form: UploadForm, file_name: &str, bytes: Vec<u8>) -> Self {
        Self {
            form,
            file_name: file_name.to_string(),
            bytes,
            encoding: UTF_8,
            delimiter: io_utils::DEFAULT_CSV_DELIMITER,
        }
    }

    pub fn with_encoding(mut self, encoding: &'static Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn content_type(&self) -> &'static str {
        io_utils::content_type_for(&self.file_name)
    }
}

#[derive(Debug, Clone)]
pub struct UploadPlan {
    pub table: TableSchema,
    pub parsed: ParsedCsv,
}

impl UploadPlan {
    pub fn create_table_sql(&self) -> String {
        self.table.create_table_sql()
    }
}

#[derive(Debug)]
pub enum RegistryStatus {
    Recorded(MetadataRecord),
    /// The table exists but the registry write failed.
    Orphaned(MetadataError),
}

#[derive(Debug)]
pub struct UploadReport {
    pub upload_id: Uuid,
    pub table: TableSchema,
    pub rows_inserted: usize,
    pub archive: ArchivedObject,
    pub registry: RegistryStatus,
}

impl UploadReport {
    pub fn table_name(&self) -> &str {
        &self.table.table_name
    }
}

fn parse_request(request: &UploadRequest, settings: &UploadSettings) -> Result<ParsedCsv, UploadError> {
    let size = request.bytes.len() as u64;
    if size > settings.max_upload_bytes {
        return Err(UploadError::TooLarge {
            size,
            max: settings.max_upload_bytes,
        });
    }
    Ok(parser::parse_csv_bytes(
        &request.bytes,
        request.encoding,
        request.delimiter,
    )?)
}

fn infer_plan(
    request: &UploadRequest,
    parsed: ParsedCsv,
    settings: &UploadSettings,
) -> Result<UploadPlan, UploadError> {
    let columns = schema::infer_columns(&parsed.headers, settings.max_identifier_len)?;
    let table_name = request
        .form
        .checked_table_name(settings.max_identifier_len)?;
    Ok(UploadPlan {
        table: TableSchema::new(table_name, columns),
        parsed,
    })
}

/// Runs the local stages only (size check, parse, infer, table name) and
/// touches no backend. Used by `upload --dry-run`.
pub fn prepare(request: &UploadRequest, settings: &UploadSettings) -> Result<UploadPlan, UploadError> {
    let parsed = parse_request(request, settings)?;
    infer_plan(request, parsed, settings)
}

pub struct UploadPipeline<'a> {
    backend: &'a dyn Backend,
    settings: UploadSettings,
    stage: Stage,
    upload_id: Uuid,
}

impl<'a> UploadPipeline<'a> {
    pub fn new(backend: &'a dyn Backend, settings: UploadSettings) -> Self {
        Self {
            backend,
            settings,
            stage: Stage::Idle,
            upload_id: Uuid::new_v4(),
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    fn enter(&mut self, stage: Stage) {
        debug!(
            "upload_id={} transition {} -> {}",
            self.upload_id, self.stage, stage
        );
        self.stage = stage;
    }

    fn fail(&mut self, error: UploadError) -> UploadError {
        warn!(
            "upload_event upload_id={} outcome=failed stage={} surviving_table={} error=\"{}\"",
            self.upload_id,
            error.stage(),
            error.surviving_table().unwrap_or("-"),
            error
        );
        self.stage = Stage::Failed;
        error
    }

    pub fn run(&mut self, request: &UploadRequest) -> Result<UploadReport, UploadError> {
        self.enter(Stage::Parsing);
        let plan = match self.plan(request) {
            Ok(plan) => plan,
            Err(err) => return Err(self.fail(err)),
        };
        let table_name = plan.table.table_name.clone();

        self.enter(Stage::CreatingSchema);
        if let Err(source) = self
            .backend
            .execute_sql(&table_name, &plan.create_table_sql())
        {
            return Err(self.fail(UploadError::SchemaCreate {
                table: table_name,
                source,
            }));
        }

        self.enter(Stage::Inserting);
        let rows = plan.table.row_payloads(&plan.parsed);
        if rows.is_empty() {
            debug!("upload_id={} sheet has no data rows; skipping insert", self.upload_id);
        } else if let Err(source) = self.backend.insert_rows(&table_name, &rows) {
            let rolled_back = self.settings.rollback_on_failure && self.drop_table(&plan.table);
            return Err(self.fail(UploadError::Insert {
                table: table_name,
                rolled_back,
                source,
            }));
        }

        self.enter(Stage::Archiving);
        let path = archive::archive_path(&self.settings.archive_prefix, &table_name, &request.file_name);
        let archive = match archive::upload_archive(
            self.backend,
            &self.settings.bucket,
            &path,
            &request.bytes,
            request.content_type(),
        ) {
            Ok(archive) => archive,
            Err(source) => {
                return Err(self.fail(UploadError::Archive {
                    table: table_name,
                    path,
                    source,
                }));
            }
        };

        self.enter(Stage::RecordingMetadata);
        let record = MetadataRecord::new(&table_name, Utc::now());
        let registry = match registry::record_table(self.backend, &self.settings.registry, &record) {
            Ok(()) => RegistryStatus::Recorded(record),
            Err(err) => {
                warn!(
                    "upload_event upload_id={} outcome=orphaned table={} error=\"{}\"",
                    self.upload_id, table_name, err
                );
                RegistryStatus::Orphaned(err)
            }
        };

        self.enter(Stage::Done);
        info!(
            "upload_event upload_id={} outcome=done table={} columns={} rows={} archive={} sha256={}",
            self.upload_id,
            table_name,
            plan.table.columns.len(),
            rows.len(),
            archive.path,
            archive.sha256
        );
        Ok(UploadReport {
            upload_id: self.upload_id,
            rows_inserted: rows.len(),
            table: plan.table,
            archive,
            registry,
        })
    }

    fn plan(&mut self, request: &UploadRequest) -> Result<UploadPlan, UploadError> {
        let parsed = parse_request(request, &self.settings)?;
        debug!(
            "upload_id={} parsed {} header(s) and {} row(s)",
            self.upload_id,
            parsed.headers.len(),
            parsed.row_count()
        );
        self.enter(Stage::Inferring);
        infer_plan(request, parsed, &self.settings)
    }

    /// Best-effort compensation for a failed insert. Returns whether the drop succeeded.
    fn drop_table(&self, table: &TableSchema) -> bool {
        match self.backend.execute_sql(&table.table_name, &table.drop_table_sql()) {
            Ok(()) => {
                info!(
                    "upload_event upload_id={} compensation=drop_table table={} outcome=ok",
                    self.upload_id, table.table_name
                );
                true
            }
            Err(err) => {
                warn!(
                    "upload_event upload_id={} compensation=drop_table table={} outcome=failed error=\"{}\"",
                    self.upload_id, table.table_name, err
                );
                false
            }
        }
    }
}

pub fn run_upload(
    backend: &dyn Backend,
    settings: UploadSettings,
    request: &UploadRequest,
) -> Result<UploadReport, UploadError> {
    UploadPipeline::new(backend, settings).run(request)
}
