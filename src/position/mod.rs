//! # Position Source Module
//!
//! One-shot position queries against the device's positioning platform.
//!
//! This module handles:
//! - The [`PositionSource`] trait the controller samples through
//! - Normalizing platform failures into [`PositionError`] codes
//! - A serial NMEA GPS receiver backend ([`serial::SerialGpsSource`])
//! - A fixed-coordinate backend for stationary installs ([`fixed::FixedPositionSource`])
//!
//! Sources never retry. The controller's sampling timer is the retry policy.

pub mod fixed;
pub mod nmea;
pub mod serial;

use async_trait::async_trait;
use std::fmt;

use crate::model::PositionSample;

/// Platform error codes interpreted by the pipeline.
pub mod codes {
    /// Access to the position was refused
    pub const PERMISSION_DENIED: u16 = 1;
    /// The platform could not produce a position
    pub const POSITION_UNAVAILABLE: u16 = 2;
    /// The platform gave up waiting for a position
    pub const TIMEOUT: u16 = 3;
    /// Not a platform code: positioning is not supported at all
    pub const UNSUPPORTED: u16 = 0;
}

/// User-facing grouping of [`PositionError`] codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionErrorCategory {
    PermissionDenied,
    Unavailable,
    Timeout,
    Other,
}

impl PositionErrorCategory {
    /// Maps a platform code; unknown codes fall into [`PositionErrorCategory::Other`].
    #[must_use]
    pub fn from_code(code: u16) -> Self {
        match code {
            codes::PERMISSION_DENIED => Self::PermissionDenied,
            codes::POSITION_UNAVAILABLE => Self::Unavailable,
            codes::TIMEOUT => Self::Timeout,
            _ => Self::Other,
        }
    }

    /// Notification text shown when a permission request fails.
    #[must_use]
    pub fn user_message(self) -> &'static str {
        match self {
            Self::PermissionDenied => "Location permission denied",
            Self::Unavailable => "Location unavailable. Please check your GPS settings.",
            Self::Timeout => "Location request timed out. Please try again.",
            Self::Other => "Failed to get location",
        }
    }
}

/// Failure reported by a position platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionError {
    code: u16,
    message: String,
}

impl PositionError {
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(codes::PERMISSION_DENIED, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(codes::POSITION_UNAVAILABLE, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(codes::TIMEOUT, message)
    }

    pub fn code(&self) -> u16 {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn category(&self) -> PositionErrorCategory {
        PositionErrorCategory::from_code(self.code)
    }
}

impl fmt::Display for PositionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "position error {}: {}", self.code, self.message)
    }
}

impl std::error::Error for PositionError {}

/// A device positioning platform.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PositionSource: Send + Sync {
    /// Whether the platform exists on this device at all.
    fn is_available(&self) -> bool;

    /// Query the current position once.
    ///
    /// Suspends until the platform answers. Any timeout is the platform's
    /// own and surfaces as [`codes::TIMEOUT`].
    async fn sample_once(&self) -> Result<PositionSample, PositionError>;
}
