use encoding_rs::{UTF_8, WINDOWS_1252};
use proptest::prelude::*;
use results_portal::parser::{ParseError, parse_csv_bytes, parse_csv_text};

#[test]
fn headers_keep_order_and_rows_map_by_header() {
    let parsed = parse_csv_text("Matriculation_Number,GPA,Remarks\nFPE/ND/CSIT/2021/001,3.40,Pass\n", b',')
        .expect("parse");
    assert_eq!(parsed.headers, vec!["Matriculation_Number", "GPA", "Remarks"]);
    assert_eq!(parsed.row_count(), 1);
    let row = &parsed.rows[0];
    assert_eq!(parsed.value(row, "GPA"), Some("3.40"));
    assert_eq!(parsed.value(row, "Remarks"), Some("Pass"));
    assert_eq!(parsed.value(row, "Attendance"), None);
}

#[test]
fn empty_input_has_no_headers() {
    assert!(matches!(parse_csv_text("", b','), Err(ParseError::NoHeaders)));
    assert!(matches!(parse_csv_text(",,\n1,2,3\n", b','), Err(ParseError::NoHeaders)));
}

#[test]
fn ragged_rows_are_collected_not_thrown() {
    let err = parse_csv_text("a,b\n1,2\n3\n4,5,6\n", b',').unwrap_err();
    match err {
        ParseError::Malformed { issues } => {
            assert_eq!(issues.len(), 2);
            assert_eq!(issues[0].line, Some(3));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn header_only_sheet_has_no_rows() {
    let parsed = parse_csv_text("Matriculation_Number,GPA\n", b',').expect("parse");
    assert_eq!(parsed.row_count(), 0);
}

#[test]
fn bytes_are_decoded_with_requested_encoding() {
    let parsed = parse_csv_bytes(b"Remarks\nR\xe9sit\n", WINDOWS_1252, b',').expect("parse");
    assert_eq!(parsed.rows[0].values()[0], "Résit");

    let with_bom = b"\xef\xbb\xbfGPA;TGP\n3.1;20\n";
    let parsed = parse_csv_bytes(with_bom, UTF_8, b';').expect("parse");
    assert_eq!(parsed.headers[0], "GPA");
}

#[test]
fn invalid_utf8_is_a_decode_error() {
    let err = parse_csv_bytes(b"GPA\n\xff\xfe\n", UTF_8, b',').unwrap_err();
    assert!(matches!(err, ParseError::Decode(_)));
}

proptest! {
    #[test]
    fn every_row_has_one_value_per_header(
        width in 1usize..6,
        cells in proptest::collection::vec("[A-Za-z0-9 ./]{0,8}", 1..40)
    ) {
        let headers = (0..width).map(|i| format!("h{i}")).collect::<Vec<_>>();
        let mut text = headers.join(",");
        text.push('\n');
        let rows = cells.chunks(width).filter(|chunk| chunk.len() == width).collect::<Vec<_>>();
        for chunk in &rows {
            text.push_str(&chunk.join(","));
            text.push('\n');
        }
        let parsed = parse_csv_text(&text, b',').expect("parse");
        for row in &parsed.rows {
            prop_assert_eq!(row.values().len(), parsed.headers.len());
        }
    }
}
