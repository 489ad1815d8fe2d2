//! Tests for error types

use jerez_telemetry::Error;

#[test]
fn test_invalid_input_error() {
    let error = Error::InvalidInput("sample_rate_hz must be > 0".to_string());
    let error_str = format!("{error}");
    assert!(error_str.contains("Invalid input"));
    assert!(error_str.contains("sample_rate_hz"));
}

#[test]
fn test_insufficient_data_error() {
    let error = Error::InsufficientData {
        what: "Welch t-test".to_string(),
        needed: 2,
        got: 1,
    };
    let error_str = format!("{error}");
    assert!(error_str.contains("Welch t-test"));
    assert!(error_str.contains("need at least 2, got 1"));
}

#[test]
fn test_schema_mismatch_suggests_regeneration() {
    let error = Error::SchemaMismatch {
        expected: "37 columns".to_string(),
        got: "12 columns".to_string(),
    };
    let error_str = format!("{error}");
    assert!(error_str.contains("expected 37 columns, got 12 columns"));
    assert!(error_str.contains("--data-only"));
}

#[test]
fn test_storage_error() {
    let error = Error::StorageError("file not found".to_string());
    let error_str = format!("{error}");
    assert!(error_str.contains("Storage error"));
    assert!(error_str.contains("file not found"));
}

#[test]
fn test_mdf4_and_figure_errors() {
    assert!(format!("{}", Error::Mdf4("bad magic".to_string())).starts_with("MDF4 error"));
    assert!(format!("{}", Error::Figure("no font".to_string())).contains("no font"));
}

#[test]
fn test_verification_and_interrupt_errors() {
    assert_eq!(
        format!("{}", Error::VerificationFailed(3)),
        "Dataset verification failed with 3 critical error(s)"
    );
    assert_eq!(format!("{}", Error::Interrupted), "Run interrupted by user");
}

#[test]
fn test_io_error_conversion() {
    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.csv");
    let error: Error = io.into();
    assert!(matches!(error, Error::Io(_)));
    assert!(format!("{error}").contains("missing.csv"));
}

#[test]
fn test_json_error_conversion() {
    let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
    let error: Error = json_err.into();
    assert!(matches!(error, Error::Json(_)));
}

#[test]
fn test_other_error() {
    let error = Error::Other("custom".to_string());
    assert_eq!(format!("{error}"), "custom");
}

#[test]
fn test_error_debug() {
    let error = Error::InvalidInput("x".to_string());
    let debug_str = format!("{error:?}");
    assert!(debug_str.contains("InvalidInput"));
}
