//! Tests for error types

use benchlog::context::RunId;
use benchlog::logger::eah::{Scale, ScaleConfig};
use benchlog::Error;

#[test]
fn test_configuration_error() {
    let error = Error::Configuration("interval must be positive".to_string());
    let error_str = format!("{error}");
    assert!(error_str.contains("Configuration error"));
    assert!(error_str.contains("interval must be positive"));
    assert!(!error.is_recoverable());
}

#[test]
fn test_duplicate_name_error() {
    let error = Error::DuplicateName("raw_y".to_string());
    let error_str = format!("{error}");
    assert!(error_str.contains("Duplicate property name"));
    assert!(error_str.contains("\"raw_y\""));
    assert!(!error.is_recoverable());
}

#[test]
fn test_unavailable_error() {
    let error = Error::Unavailable("sigma".to_string());
    assert!(format!("{error}").contains("\"sigma\" is unavailable"));
    assert!(error.is_recoverable());
}

#[test]
fn test_domain_error_from_scale() {
    let scale = Scale::log10(1e-2, 1e2, 4).unwrap();
    let error = scale.index(-1.0).unwrap_err();
    let error_str = format!("{error}");
    assert!(matches!(error, Error::Domain { .. }));
    assert!(error_str.contains("-1"));
    assert!(error_str.contains("log10"));
    assert!(error.is_recoverable());
}

#[test]
fn test_closed_run_error() {
    let error = Error::ClosedRun(RunId(7));
    assert_eq!(
        format!("{error}"),
        "Run 7 is closed, no further observations are accepted"
    );
    assert!(error.is_recoverable());
}

#[test]
fn test_run_state_error() {
    let error = Error::RunState("run 2 is not open".to_string());
    assert!(format!("{error}").contains("Run lifecycle error"));
    assert!(!error.is_recoverable());
}

#[test]
fn test_io_error_conversion() {
    let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
    let error: Error = io_error.into();
    let error_str = format!("{error}");
    assert!(error_str.contains("IO error"));
    assert!(error_str.contains("file not found"));
}

#[test]
fn test_json_error_conversion() {
    let json_error = serde_json::from_str::<ScaleConfig>("{").unwrap_err();
    let error: Error = json_error.into();
    assert!(format!("{error}").contains("JSON error"));
}

#[test]
fn test_aggregate_recoverability() {
    let recoverable = Error::Aggregate(vec![
        Error::ClosedRun(RunId(1)),
        Error::Unavailable("x".to_string()),
    ]);
    assert!(recoverable.is_recoverable());

    let fatal = Error::Aggregate(vec![
        Error::ClosedRun(RunId(1)),
        Error::Other("disk full".to_string()),
    ]);
    assert!(!fatal.is_recoverable());
    assert!(format!("{fatal}").contains("disk full"));
}

#[test]
fn test_error_debug_format() {
    let error = Error::Other("test".to_string());
    let debug_str = format!("{error:?}");
    assert!(debug_str.contains("Other"));
}
