//! # Motion Sensor Module
//!
//! Optional accelerometer readings attached to each submitted sample.
//!
//! This module handles:
//! - The [`MotionSensor`] trait the submitter reads through
//! - Linux evdev accelerometer detection and scaling ([`accelerometer`])
//!
//! A missing or failing sensor never blocks a submission; the envelope is
//! simply sent without the `accelerometer` field.

pub mod accelerometer;

use crate::model::AccelerometerReading;

/// A device motion sensor.
pub trait MotionSensor: Send + Sync {
    /// Current acceleration, or `None` if the sensor cannot be read right now.
    fn read(&self) -> Option<AccelerometerReading>;
}
