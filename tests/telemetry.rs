//! Global subscriber bootstrap.
//!
//! Kept in its own test binary: the subscriber is process-global.

use atom_graph_kernel::{init_tracing, LogFormat, TelemetryError};

#[test]
fn test_second_init_is_an_error_not_a_panic() {
    init_tracing(LogFormat::Json).unwrap();
    let err = init_tracing(LogFormat::Pretty).unwrap_err();
    assert!(matches!(err, TelemetryError::AlreadyInitialized(_)));
}
