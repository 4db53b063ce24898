//! # Error Types
//!
//! Custom error types for the telemetry pipeline using `thiserror`.

use thiserror::Error;

use crate::telemetry::decoder::DecodeError;

/// Main error type for the telemetry pipeline
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Payload could not be decoded into a sample
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Radio link I/O errors
    #[error("Link error: {0}")]
    Link(String),

    /// No radio link device could be opened
    #[error("No radio link found (tried: {0})")]
    LinkNotFound(String),

    /// Writing the session file failed
    #[error("Persistence failure: {0}")]
    Persistence(String),

    /// The consumer side of the handoff channel is gone
    #[error("Handoff channel closed while session was running")]
    HandoffClosed,

    /// The ingestion worker thread panicked
    #[error("Ingestion worker panicked")]
    WorkerPanicked,

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<csv::Error> for TelemetryError {
    fn from(err: csv::Error) -> Self {
        TelemetryError::Persistence(err.to_string())
    }
}

/// Result type alias for the telemetry pipeline
pub type Result<T> = std::result::Result<T, TelemetryError>;
