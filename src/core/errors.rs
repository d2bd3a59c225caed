/*!
 * Error Types
 * Centralized error handling with thiserror and serde support
 */

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Metric emission errors with serialization support
///
/// `Busy` is the only locally-recoverable error that reaches the caller: the
/// previous emission has not drained its completions yet, so the aggregates
/// are preserved and the caller retries at the next scheduled tick.
#[derive(Error, Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "error_type", rename_all = "snake_case")]
pub enum EmitError {
    #[error("previous emission still in flight")]
    Busy,
}

/// Unified telemetry error type
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum TelemetryError {
    #[error("statsd socket error: {0}")]
    Socket(String),

    #[error("emit error: {0}")]
    Emit(#[from] EmitError),

    #[error("configuration error: {0}")]
    Configuration(String),
}

// Socket setup goes through std::io; carry the message only so the error
// stays Clone + Serialize like the rest of the crate's errors.
impl From<std::io::Error> for TelemetryError {
    fn from(err: std::io::Error) -> Self {
        TelemetryError::Socket(err.to_string())
    }
}
