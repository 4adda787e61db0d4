//! Error types for data parsing in miflora-types.

use thiserror::Error;

/// Errors that can occur when decoding Mi Flora payloads.
///
/// This error type is platform-agnostic and does not include
/// BLE-specific errors (those belong in miflora-core).
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ParseError {
    /// The payload is shorter than the format requires.
    #[error("Insufficient bytes: requires {expected} bytes, got {actual}")]
    InsufficientBytes {
        /// Number of bytes the format requires.
        expected: usize,
        /// Number of bytes received.
        actual: usize,
    },

    /// The sensor answered with its "no data available" marker.
    #[error("Sensor returned no data")]
    NoData,

    /// A decoded value is outside the range the sensor can produce.
    #[error("Invalid value: {0}")]
    InvalidValue(String),
}
