//! # Telemetry Data Model
//!
//! Position samples, wire envelopes and backend records.
//!
//! ## Coordinate Ordering
//!
//! The backend stores points as `[latitude, longitude]`. GeoJSON normally
//! uses `[longitude, latitude]`; this backend does not. Both directions of
//! the wire format (the envelope we post and the latest reading we read back)
//! use latitude first, and [`GeoPoint`] keeps it that way.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// GeoJSON geometry type used for every point on the wire
pub const POINT_TYPE: &str = "Point";

/// One instantaneous position reading from the device.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionSample {
    /// Latitude in decimal degrees (positive north)
    pub latitude: f64,
    /// Longitude in decimal degrees (positive east)
    pub longitude: f64,
    /// When the platform produced the fix
    pub captured_at: DateTime<Utc>,
}

impl PositionSample {
    /// Creates a sample captured now.
    #[must_use]
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self::at(latitude, longitude, Utc::now())
    }

    /// Creates a sample with an explicit capture time.
    #[must_use]
    pub fn at(latitude: f64, longitude: f64, captured_at: DateTime<Utc>) -> Self {
        Self {
            latitude,
            longitude,
            captured_at,
        }
    }
}

/// Accelerometer reading in m/s².
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AccelerometerReading {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Point geometry in the backend's `[lat, lng]` order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    #[serde(rename = "type")]
    pub kind: String,
    pub coordinates: [f64; 2],
}

impl GeoPoint {
    /// Builds a point with latitude first.
    #[must_use]
    pub fn from_lat_lng(latitude: f64, longitude: f64) -> Self {
        Self {
            kind: POINT_TYPE.to_string(),
            coordinates: [latitude, longitude],
        }
    }

    pub fn latitude(&self) -> f64 {
        self.coordinates[0]
    }

    pub fn longitude(&self) -> f64 {
        self.coordinates[1]
    }
}

/// Payload of `POST /api/readings`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryEnvelope {
    pub location: GeoPoint,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accelerometer: Option<AccelerometerReading>,
}

impl TelemetryEnvelope {
    /// Wraps a sample, placing latitude before longitude.
    ///
    /// # Examples
    ///
    /// ```
    /// use crashtrack::model::{PositionSample, TelemetryEnvelope};
    ///
    /// let envelope = TelemetryEnvelope::from_sample(&PositionSample::new(12.9, 77.6), None);
    /// assert_eq!(envelope.location.coordinates, [12.9, 77.6]);
    /// ```
    #[must_use]
    pub fn from_sample(
        sample: &PositionSample,
        accelerometer: Option<AccelerometerReading>,
    ) -> Self {
        Self {
            location: GeoPoint::from_lat_lng(sample.latitude, sample.longitude),
            accelerometer,
        }
    }
}

/// The most recent backend-confirmed record for the authenticated user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatestReading {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    pub user_id: String,
    pub location: GeoPoint,
    #[serde(default)]
    pub accelerometer: Option<AccelerometerReading>,
    #[serde(default)]
    pub crash_detected: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Profile fields returned by `GET /api/auth`.
///
/// Every field is optional; the profile view renders whatever is present.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub name: Option<String>,
    pub email: Option<String>,
    #[serde(rename = "DOB")]
    pub dob: Option<String>,
    pub contact_number: Option<String>,
    pub father_name: Option<String>,
    pub emergency_contact_number: Option<String>,
    pub blood_group: Option<String>,
    pub address: Option<String>,
    pub height: Option<f64>,
    pub created_at: Option<DateTime<Utc>>,
}
