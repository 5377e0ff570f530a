//! # Error Types
//!
//! Custom error types for Crashtrack using `thiserror`.
//!
//! [`TelemetryError`] is the pipeline taxonomy: every failure the position
//! source, submitter and poller can report. None of them is fatal; the worst
//! outcome is a dropped sample or a stale map. [`CrashtrackError`] covers
//! application setup (configuration, files, devices).

use thiserror::Error;

use crate::position::{PositionError, PositionErrorCategory};

/// Failures surfaced by the telemetry pipeline.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TelemetryError {
    /// Platform refused access to the position (code 1)
    #[error("Location permission denied")]
    PermissionDenied,

    /// Platform could not determine a position (code 2)
    #[error("Location unavailable: {0}")]
    PositionUnavailable(String),

    /// Platform gave up waiting for a position (code 3)
    #[error("Location request timed out")]
    PositionTimeout,

    /// Any other platform failure, including an unsupported platform
    #[error("Failed to fetch location: {0}")]
    PositionFailed(String),

    /// No bearer token in the credential store
    #[error("Authentication token missing")]
    Unauthenticated,

    /// Network or server failure while sending a reading
    #[error("Failed to send location data: {0}")]
    SubmitFailed(String),

    /// Network or server failure while fetching the latest reading
    #[error("Failed to fetch latest reading: {0}")]
    FetchFailed(String),
}

impl From<PositionError> for TelemetryError {
    fn from(err: PositionError) -> Self {
        match err.category() {
            PositionErrorCategory::PermissionDenied => TelemetryError::PermissionDenied,
            PositionErrorCategory::Unavailable => {
                TelemetryError::PositionUnavailable(err.message().to_string())
            }
            PositionErrorCategory::Timeout => TelemetryError::PositionTimeout,
            PositionErrorCategory::Other => {
                TelemetryError::PositionFailed(err.message().to_string())
            }
        }
    }
}

/// Main error type for Crashtrack
#[derive(Debug, Error)]
pub enum CrashtrackError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client setup errors
    #[error("HTTP client error: {0}")]
    Http(String),

    /// Credential store errors
    #[error("Credential store error: {0}")]
    Credentials(String),

    /// Motion sensor errors
    #[error("Sensor error: {0}")]
    Sensor(String),

    /// No accelerometer input device found
    #[error("No accelerometer found under /dev/input")]
    SensorNotFound,

    /// Pipeline errors
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
}

/// Result type alias for Crashtrack
pub type Result<T> = std::result::Result<T, CrashtrackError>;
