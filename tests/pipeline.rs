mod common;

use results_portal::backend::memory::Operation;
use results_portal::backend::{Backend, MemoryBackend, RowQuery};
use results_portal::parser::ParseError;
use results_portal::pipeline::{
    self, RegistryStatus, Stage, USER_FAILURE_MESSAGE, UploadError, UploadPipeline, UploadSettings,
};
use results_portal::registry;
use results_portal::schema::SchemaError;

use common::{RESULT_SHEET, TABLE_NAME, sheet_request};

fn bootstrapped() -> MemoryBackend {
    let backend = MemoryBackend::new();
    registry::ensure_registry(&backend, "results_metadata").expect("registry");
    backend
}

#[test]
fn upload_creates_table_inserts_archives_and_registers() {
    let backend = bootstrapped();
    let report = pipeline::run_upload(&backend, UploadSettings::default(), &sheet_request(RESULT_SHEET))
        .expect("upload succeeds");

    assert_eq!(report.table_name(), TABLE_NAME);
    assert_eq!(report.rows_inserted, 3);
    assert_eq!(report.upload_id.get_version_num(), 4);
    assert!(matches!(report.registry, RegistryStatus::Recorded(_)));
    assert_eq!(report.archive.path, format!("uploads/{TABLE_NAME}.csv"));
    assert_eq!(report.archive.size, RESULT_SHEET.len() as u64);
    assert_eq!(
        backend.object("results", &report.archive.path).as_deref(),
        Some(RESULT_SHEET.as_bytes())
    );

    let columns = backend.table_columns(TABLE_NAME).expect("table exists");
    let expected = [
        ("id", "SERIAL"),
        ("matriculation_number", "VARCHAR(255)"),
        ("com111_grade", "VARCHAR(255)"),
        ("com111_units", "INTEGER"),
        ("gns101_grade", "VARCHAR(255)"),
        ("gns101_units", "INTEGER"),
        ("tgp", "FLOAT"),
        ("gpa", "FLOAT"),
        ("remarks", "VARCHAR(255)"),
    ];
    assert_eq!(
        columns,
        expected
            .iter()
            .map(|(n, t)| (n.to_string(), t.to_string()))
            .collect::<Vec<_>>()
    );

    let listed = registry::list_tables(&backend, "results_metadata", Some("CSIT")).expect("listing");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].table_name, TABLE_NAME);
}

#[test]
fn blank_cells_are_stored_as_null() {
    let backend = bootstrapped();
    pipeline::run_upload(&backend, UploadSettings::default(), &sheet_request(RESULT_SHEET))
        .expect("upload succeeds");
    let rows = backend
        .select_rows(
            TABLE_NAME,
            &RowQuery::all().eq("matriculation_number", "FPE/ND/CSIT/2021/003"),
        )
        .expect("select");
    assert_eq!(rows.len(), 1);
    assert!(rows[0]["gns101_grade"].is_null());
    assert_eq!(rows[0]["com111_units"], serde_json::json!(3));
}

#[test]
fn empty_header_row_fails_before_any_remote_call() {
    let backend = MemoryBackend::new();
    let mut pipeline = UploadPipeline::new(&backend, UploadSettings::default());
    let err = pipeline.run(&sheet_request("")).unwrap_err();

    assert!(matches!(err, UploadError::Parse(ParseError::NoHeaders)));
    assert_eq!(err.stage(), Stage::Parsing);
    assert_eq!(pipeline.stage(), Stage::Failed);
    assert!(backend.calls().is_empty());
    assert_eq!(err.user_message(), USER_FAILURE_MESSAGE);
}

#[test]
fn ragged_rows_fail_at_parsing() {
    let backend = MemoryBackend::new();
    let err = pipeline::run_upload(
        &backend,
        UploadSettings::default(),
        &sheet_request("Matriculation_Number,GPA\nFPE/ND/CSIT/2021/001,3.1,extra\n"),
    )
    .unwrap_err();
    assert!(matches!(err, UploadError::Parse(ParseError::Malformed { .. })));
    assert!(backend.calls().is_empty());
}

#[test]
fn colliding_headers_are_rejected_before_create() {
    let backend = MemoryBackend::new();
    let err = pipeline::run_upload(
        &backend,
        UploadSettings::default(),
        &sheet_request("COM 111 Grade,COM-111-Grade\n70,71\n"),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        UploadError::Schema(SchemaError::DuplicateColumn { ref column, .. }) if column == "com_111_grade"
    ));
    assert_eq!(err.stage(), Stage::Inferring);
    assert!(backend.calls().is_empty());
}

#[test]
fn oversized_upload_is_rejected_up_front() {
    let backend = MemoryBackend::new();
    let settings = UploadSettings {
        max_upload_bytes: 16,
        ..UploadSettings::default()
    };
    let err = pipeline::run_upload(&backend, settings, &sheet_request(RESULT_SHEET)).unwrap_err();
    assert!(matches!(err, UploadError::TooLarge { max: 16, .. }));
    assert!(backend.calls().is_empty());
}

#[test]
fn second_upload_of_same_form_fails_at_schema_create() {
    let backend = bootstrapped();
    pipeline::run_upload(&backend, UploadSettings::default(), &sheet_request(RESULT_SHEET))
        .expect("first upload");
    let err = pipeline::run_upload(&backend, UploadSettings::default(), &sheet_request(RESULT_SHEET))
        .unwrap_err();
    assert!(matches!(err, UploadError::SchemaCreate { .. }));
    assert_eq!(err.surviving_table(), None);
    assert_eq!(backend.calls_of(Operation::Insert).len(), 2);
}

#[test]
fn insert_failure_drops_the_new_table() {
    let backend = bootstrapped();
    let err = pipeline::run_upload(
        &backend,
        UploadSettings::default(),
        &sheet_request("Matriculation_Number,COM111_Units\nFPE/ND/CSIT/2021/001,three\n"),
    )
    .unwrap_err();
    match &err {
        UploadError::Insert { rolled_back, table, .. } => {
            assert!(*rolled_back);
            assert_eq!(table, TABLE_NAME);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.stage(), Stage::Inserting);
    assert!(!backend.has_table(TABLE_NAME));
    assert!(backend.calls_of(Operation::Upload).is_empty());
}

#[test]
fn insert_failure_without_rollback_keeps_table() {
    let backend = bootstrapped();
    let settings = UploadSettings {
        rollback_on_failure: false,
        ..UploadSettings::default()
    };
    backend.inject_fault(Operation::Insert, Some(TABLE_NAME), "permission denied");
    let err = pipeline::run_upload(&backend, settings, &sheet_request(RESULT_SHEET)).unwrap_err();
    assert!(matches!(err, UploadError::Insert { rolled_back: false, .. }));
    assert_eq!(err.surviving_table(), Some(TABLE_NAME));
    assert!(backend.has_table(TABLE_NAME));
}

#[test]
fn archive_failure_keeps_rows_and_skips_registry() {
    let backend = bootstrapped();
    backend.inject_fault(Operation::Upload, None, "bucket not found");
    let err = pipeline::run_upload(&backend, UploadSettings::default(), &sheet_request(RESULT_SHEET))
        .unwrap_err();

    assert!(matches!(err, UploadError::Archive { .. }));
    assert_eq!(err.stage(), Stage::Archiving);
    assert_eq!(err.surviving_table(), Some(TABLE_NAME));
    let rows = backend.select_rows(TABLE_NAME, &RowQuery::all()).expect("rows kept");
    assert_eq!(rows.len(), 3);
    let listed = registry::list_tables(&backend, "results_metadata", None).expect("listing");
    assert!(listed.is_empty());
}

#[test]
fn registry_failure_leaves_queryable_orphan() {
    let backend = bootstrapped();
    backend.inject_fault(Operation::Insert, Some("results_metadata"), "registry unavailable");
    let report = pipeline::run_upload(&backend, UploadSettings::default(), &sheet_request(RESULT_SHEET))
        .expect("upload completes");

    assert!(matches!(report.registry, RegistryStatus::Orphaned(_)));
    match &report.registry {
        RegistryStatus::Orphaned(err) => assert_eq!(err.table_name, TABLE_NAME),
        RegistryStatus::Recorded(_) => panic!("registry write should have failed"),
    }
    let rows = backend.select_rows(TABLE_NAME, &RowQuery::all()).expect("table queryable");
    assert_eq!(rows.len(), 3);
    let listed = registry::list_tables(&backend, "results_metadata", None).expect("listing");
    assert!(listed.is_empty());
}

#[test]
fn missing_registry_table_is_reported_as_orphan() {
    let backend = MemoryBackend::new();
    let report = pipeline::run_upload(&backend, UploadSettings::default(), &sheet_request(RESULT_SHEET))
        .expect("upload completes");
    assert!(matches!(report.registry, RegistryStatus::Orphaned(_)));
    assert!(backend.has_table(TABLE_NAME));
}

#[test]
fn dry_run_plan_touches_nothing() {
    let plan = pipeline::prepare(&sheet_request(RESULT_SHEET), &UploadSettings::default())
        .expect("plan");
    assert_eq!(plan.table.table_name, TABLE_NAME);
    assert_eq!(plan.parsed.row_count(), 3);
    let sql = plan.create_table_sql();
    assert!(sql.starts_with(&format!("CREATE TABLE {TABLE_NAME} (")));
    assert!(sql.contains("gpa FLOAT"));
}
