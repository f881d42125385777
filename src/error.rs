//! # Error Types
//!
//! Custom error types for the telemetry recorder using `thiserror`.

use thiserror::Error;

/// Main error type for the telemetry recorder
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Malformed field declarations (fatal when building a schema)
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    /// Unknown field name or out-of-range field index
    #[error("Field not found: {0}")]
    FieldNotFound(String),

    /// Wrong number of values for the field's arity
    #[error("Field '{field}' expects {expected} value(s), got {got}")]
    ValueCount {
        field: String,
        expected: usize,
        got: usize,
    },

    /// Raw byte slice does not match the field's storage width
    #[error("Field '{field}' is {expected} byte(s) wide, got {got}")]
    RawLength {
        field: String,
        expected: usize,
        got: usize,
    },

    /// Scalar accessor used on a vector field
    #[error("Field '{0}' is a vector field and has no scalar value")]
    NotScalar(String),

    /// Log file header or embedded schema cannot be parsed consistently
    #[error("Incompatible log format: {0}")]
    IncompatibleFormat(String),

    /// Write, flush, read or delete failed at the device layer
    #[error("Storage failure: {0}")]
    StorageFailure(#[from] std::io::Error),

    /// Packet could not be handed to the link
    #[error("Transport failure: {0}")]
    TransportFailure(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),
}

/// Result type alias for the telemetry recorder
pub type Result<T> = std::result::Result<T, TelemetryError>;
