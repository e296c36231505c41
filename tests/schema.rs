use proptest::prelude::*;
use results_portal::parser::parse_csv_text;
use results_portal::schema::{
    SchemaError, SqlType, TableSchema, infer_column, infer_column_type, infer_columns,
};
use serde_json::{Value, json};

#[test]
fn result_sheet_headers_map_to_expected_columns() {
    let grade = infer_column("COM113_Grade", 63).expect("grade column");
    assert_eq!(grade.name, "com113_grade");
    assert_eq!(grade.sql_type, SqlType::Varchar(255));

    let gpa = infer_column("GPA", 63).expect("gpa column");
    assert_eq!(gpa.name, "gpa");
    assert_eq!(gpa.sql_type, SqlType::Float);

    let units = infer_column("COM113_Units", 63).expect("units column");
    assert_eq!(units.name, "com113_units");
    assert_eq!(units.sql_type, SqlType::Integer);
}

#[test]
fn earlier_rules_win_over_later_ones() {
    // "grade" outranks "units"; "gpa" outranks "attendance".
    assert_eq!(infer_column_type("units_grade"), SqlType::Varchar(255));
    assert_eq!(infer_column_type("Attendance GPA"), SqlType::Float);
    assert_eq!(infer_column_type("Attendance"), SqlType::Integer);
    assert_eq!(infer_column_type("Student Name"), SqlType::Varchar(255));
}

#[test]
fn id_header_collides_with_primary_key() {
    let err = infer_column("ID", 63).unwrap_err();
    assert!(matches!(err, SchemaError::PrimaryKeyCollision { .. }));
}

#[test]
fn blank_header_is_unusable() {
    let headers = vec!["Matriculation_Number".to_string(), " ".to_string()];
    let err = infer_columns(&headers, 63).unwrap_err();
    assert!(matches!(err, SchemaError::Column { .. }));
}

#[test]
fn row_payload_uses_sanitized_keys() {
    let parsed = parse_csv_text("Matriculation Number,COM 111 Units,Remarks\nFPE/ND/CSIT/2021/001,3,\n", b',')
        .expect("parse");
    let schema = TableSchema::new("t", infer_columns(&parsed.headers, 63).expect("columns"));
    let payload = schema.row_payload(&parsed.rows[0]);
    assert_eq!(payload.get("matriculation_number"), Some(&json!("FPE/ND/CSIT/2021/001")));
    assert_eq!(payload.get("com_111_units"), Some(&json!("3")));
    assert_eq!(payload.get("remarks"), Some(&Value::Null));
    assert_eq!(payload.len(), 3);
}

fn word() -> impl Strategy<Value = String> {
    "[a-z]{0,6}"
}

proptest! {
    #[test]
    fn text_keywords_always_yield_varchar(
        prefix in word(),
        keyword in prop::sample::select(vec!["grade", "MATRICULATION_NUMBER", "Remarks"]),
        other in prop::sample::select(vec!["", "gpa", "units", "tgp", "attendance"]),
        suffix in word()
    ) {
        let header = format!("{prefix}{keyword}{other}{suffix}");
        prop_assert_eq!(infer_column_type(&header), SqlType::Varchar(255));
    }

    #[test]
    fn score_keywords_yield_float_without_text_keywords(
        prefix in "[h-z]{0,4}",
        keyword in prop::sample::select(vec!["GPA", "tgp"]),
        other in prop::sample::select(vec!["", "_units", "_attendance"])
    ) {
        let header = format!("{prefix}{keyword}{other}");
        prop_assume!(!header.to_ascii_lowercase().contains("grade"));
        prop_assume!(!header.to_ascii_lowercase().contains("remarks"));
        prop_assert_eq!(infer_column_type(&header), SqlType::Float);
    }

    #[test]
    fn count_keywords_yield_integer_without_earlier_keywords(
        prefix in "[h-z0-9_ ]{0,5}",
        keyword in prop::sample::select(vec!["units", "Units", "ATTENDANCE", "attendance"]),
        suffix in "[h-z0-9_ ]{0,5}"
    ) {
        let header = format!("{prefix}{keyword}{suffix}");
        let lower = header.to_ascii_lowercase();
        for earlier in ["grade", "matriculation_number", "remarks", "gpa", "tgp"] {
            prop_assume!(!lower.contains(earlier));
        }
        prop_assert_eq!(infer_column_type(&header), SqlType::Integer);
    }

    #[test]
    fn unmatched_headers_default_to_varchar(header in "[b-f0-9 ]{1,12}") {
        prop_assert_eq!(infer_column_type(&header), SqlType::Varchar(255));
    }
}
