//! Fixed-coordinate position source for stationary installs and bench testing.

use async_trait::async_trait;

use super::{PositionError, PositionSource};
use crate::model::PositionSample;

/// Always reports the configured coordinates.
#[derive(Debug, Clone, Copy)]
pub struct FixedPositionSource {
    latitude: f64,
    longitude: f64,
}

impl FixedPositionSource {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }
}

#[async_trait]
impl PositionSource for FixedPositionSource {
    fn is_available(&self) -> bool {
        true
    }

    async fn sample_once(&self) -> Result<PositionSample, PositionError> {
        Ok(PositionSample::new(self.latitude, self.longitude))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fixed_source_reports_configured_position() {
        let source = FixedPositionSource::new(12.9, 77.6);
        assert!(source.is_available());

        let sample = source.sample_once().await.unwrap();
        assert_eq!(sample.latitude, 12.9);
        assert_eq!(sample.longitude, 77.6);
    }
}
