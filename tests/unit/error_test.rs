//! Tests for error types

use telemetry_delivery::core::{DeliveryError, ExecutorError, StorageError};

#[test]
fn test_queue_full_error() {
    let err = ExecutorError::QueueFull("max queue depth 8 reached".to_string());
    assert_eq!(format!("{}", err), "queue full: max queue depth 8 reached");
}

#[test]
fn test_executor_shutdown_error() {
    assert_eq!(ExecutorError::Shutdown.to_string(), "executor has been shut down");
    assert_eq!(ExecutorError::Timeout.to_string(), "timed out waiting for workers");
}

#[test]
fn test_storage_not_found_error() {
    let err = StorageError::NotFound("log:abc".to_string());
    assert_eq!(format!("{}", err), "payload not found: log:abc");
}

#[test]
fn test_storage_io_error_conversion() {
    let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
    let err: StorageError = io.into();
    assert!(matches!(err, StorageError::Io(_)));
    assert_eq!(err.to_string(), "storage io error: read-only");
}

#[test]
fn test_delivery_error_wraps_executor_error() {
    let err: DeliveryError = ExecutorError::Timeout.into();
    assert!(matches!(err, DeliveryError::Executor(ExecutorError::Timeout)));
    assert_eq!(err.to_string(), "timed out waiting for workers");
}

#[test]
fn test_errors_convert_into_anyhow() {
    fn fails() -> telemetry_delivery::core::AppResult<()> {
        let result: Result<(), DeliveryError> =
            Err(DeliveryError::InvalidConfig("initial_delay_ms must be greater than 0".into()));
        result?;
        Ok(())
    }
    let err = fails().unwrap_err();
    assert!(err.to_string().contains("initial_delay_ms"));
}

#[test]
fn test_delivery_error_kinds() {
    let kind = |err: &DeliveryError| match err {
        DeliveryError::InvalidConfig(_) => "config",
        DeliveryError::Executor(_) => "executor",
    };
    assert_eq!(kind(&DeliveryError::InvalidConfig("x".into())), "config");
    assert_eq!(kind(&ExecutorError::Shutdown.into()), "executor");
}
