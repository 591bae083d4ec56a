use bookstore_queries::DbError;
use std::error::Error;

#[test]
fn step_failure_names_step_and_label() {
    let e = DbError::StepFailed {
        step: 4,
        label: "Update result (Harry Potter price)".into(),
        source: Box::new(DbError::query("update document requires atomic operators")),
    };
    assert_eq!(
        format!("{e}"),
        "operation failed at step 4 (Update result (Harry Potter price)): Query error: update document requires atomic operators"
    );
    assert!(e.source().is_some());
    assert!(matches!(e.root(), DbError::Query(_)));
}

#[test]
fn conversions_from_library_errors() {
    let io: DbError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
    assert_eq!(format!("{io}"), "I/O error: gone");
    let json: DbError = serde_json::from_str::<serde_json::Value>("{").unwrap_err().into();
    assert!(matches!(json, DbError::Json(_)));
    assert_eq!(format!("{}", DbError::Config("bad".into())), "Config error: bad");
}
