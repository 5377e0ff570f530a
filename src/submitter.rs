//! # Telemetry Submitter
//!
//! Sends one position sample to the backend.
//!
//! The submitter checks for a token before building anything, so a signed-out
//! device never touches the network. Failures are logged and handed back;
//! deciding whether to tell the user is the caller's job.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::api::BackendApi;
use crate::credentials::CredentialAccessor;
use crate::error::TelemetryError;
use crate::model::{PositionSample, TelemetryEnvelope};
use crate::sensor::MotionSensor;

/// Authenticated writer for position samples.
#[derive(Clone)]
pub struct TelemetrySubmitter {
    credentials: Arc<dyn CredentialAccessor>,
    api: Arc<dyn BackendApi>,
    sensor: Option<Arc<dyn MotionSensor>>,
}

impl TelemetrySubmitter {
    pub fn new(credentials: Arc<dyn CredentialAccessor>, api: Arc<dyn BackendApi>) -> Self {
        Self {
            credentials,
            api,
            sensor: None,
        }
    }

    /// Attach an accelerometer whose reading rides along with each sample.
    pub fn with_sensor(mut self, sensor: Arc<dyn MotionSensor>) -> Self {
        self.sensor = Some(sensor);
        self
    }

    /// Build the envelope that [`submit`](Self::submit) would send.
    pub fn envelope_for(&self, sample: &PositionSample) -> TelemetryEnvelope {
        let accelerometer = self.sensor.as_ref().and_then(|sensor| sensor.read());
        TelemetryEnvelope::from_sample(sample, accelerometer)
    }

    /// Post `sample` to `/api/readings`.
    ///
    /// # Errors
    ///
    /// - `Unauthenticated`: no token stored; no request is made
    /// - `SubmitFailed`: transport or server failure
    pub async fn submit(&self, sample: &PositionSample) -> Result<(), TelemetryError> {
        let Some(token) = self.credentials.token() else {
            warn!("Authentication token missing, location not sent");
            return Err(TelemetryError::Unauthenticated);
        };

        let envelope = self.envelope_for(sample);

        match self.api.post_reading(&token, &envelope).await {
            Ok(()) => {
                debug!(
                    lat = sample.latitude,
                    lng = sample.longitude,
                    accelerometer = envelope.accelerometer.is_some(),
                    "Location sent"
                );
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Error sending location data");
                Err(TelemetryError::SubmitFailed(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mocks::MockBackend;
    use crate::api::ApiError;
    use crate::credentials::MockCredentialAccessor;
    use crate::model::AccelerometerReading;

    struct StaticSensor(Option<AccelerometerReading>);

    impl MotionSensor for StaticSensor {
        fn read(&self) -> Option<AccelerometerReading> {
            self.0
        }
    }

    fn credentials(token: Option<&str>) -> Arc<dyn CredentialAccessor> {
        let token = token.map(str::to_string);
        let mut mock = MockCredentialAccessor::new();
        mock.expect_token().returning(move || token.clone());
        Arc::new(mock)
    }

    #[tokio::test]
    async fn test_submit_without_token_makes_no_request() {
        let backend = MockBackend::new();
        let submitter = TelemetrySubmitter::new(credentials(None), Arc::new(backend.clone()));

        let result = submitter.submit(&PositionSample::new(12.9, 77.6)).await;

        assert_eq!(result, Err(TelemetryError::Unauthenticated));
        assert_eq!(backend.total_calls(), 0);
    }

    /// Log sink shared with a test subscriber.
    #[derive(Clone, Default)]
    struct CapturedLog(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLog {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_missing_token_is_logged() {
        let log = CapturedLog::default();
        let writer = log.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let submitter = TelemetrySubmitter::new(credentials(None), Arc::new(MockBackend::new()));
        let _ = submitter.submit(&PositionSample::new(12.9, 77.6)).await;

        let output = String::from_utf8(log.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("WARN"));
        assert!(output.contains("Authentication token missing"));
    }

    #[tokio::test]
    async fn test_submit_sends_lat_lng_with_bearer_token() {
        let backend = MockBackend::new();
        let submitter =
            TelemetrySubmitter::new(credentials(Some("tok-1")), Arc::new(backend.clone()));

        tokio_test::assert_ok!(submitter.submit(&PositionSample::new(12.9, 77.6)).await);

        let posted = backend.posted();
        assert_eq!(posted.len(), 1);
        assert_eq!(posted[0].0, "tok-1");
        assert_eq!(posted[0].1.location.kind, "Point");
        assert_eq!(posted[0].1.location.coordinates, [12.9, 77.6]);
        assert!(posted[0].1.accelerometer.is_none());
    }

    #[tokio::test]
    async fn test_submit_attaches_sensor_reading() {
        let backend = MockBackend::new();
        let reading = AccelerometerReading { x: 0.5, y: 0.0, z: 9.8 };
        let submitter = TelemetrySubmitter::new(credentials(Some("tok")), Arc::new(backend.clone()))
            .with_sensor(Arc::new(StaticSensor(Some(reading))));

        submitter.submit(&PositionSample::new(1.0, 2.0)).await.unwrap();

        assert_eq!(backend.posted()[0].1.accelerometer, Some(reading));
    }

    #[tokio::test]
    async fn test_unreadable_sensor_still_submits() {
        let backend = MockBackend::new();
        let submitter = TelemetrySubmitter::new(credentials(Some("tok")), Arc::new(backend.clone()))
            .with_sensor(Arc::new(StaticSensor(None)));

        submitter.submit(&PositionSample::new(1.0, 2.0)).await.unwrap();

        assert_eq!(backend.posted().len(), 1);
        assert!(backend.posted()[0].1.accelerometer.is_none());
    }

    #[tokio::test]
    async fn test_server_failure_is_submit_failed() {
        let backend = MockBackend::new();
        backend.set_post_error(Some(ApiError::Status(500)));
        let submitter =
            TelemetrySubmitter::new(credentials(Some("tok")), Arc::new(backend.clone()));

        let result = submitter.submit(&PositionSample::new(1.0, 2.0)).await;

        assert_eq!(
            result,
            Err(TelemetryError::SubmitFailed("Server returned 500".to_string()))
        );
    }
}
