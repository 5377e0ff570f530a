//! # Backend API Client
//!
//! The three endpoints the pipeline depends on:
//!
//! | Method | Path | Body / Response |
//! |--------|------|-----------------|
//! | POST | `/api/readings` | [`TelemetryEnvelope`] / ignored |
//! | GET | `/api/readings/latest` | - / [`LatestReading`] |
//! | GET | `/api/auth` | - / [`UserProfile`] |
//!
//! Every request carries `Authorization: Bearer <token>`. Callers check for
//! a token before calling in; this layer only transports.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::error::{CrashtrackError, Result};
use crate::model::{LatestReading, TelemetryEnvelope, UserProfile};

pub const READINGS_PATH: &str = "/api/readings";
pub const LATEST_READING_PATH: &str = "/api/readings/latest";
pub const PROFILE_PATH: &str = "/api/auth";

/// Transport-level failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    /// Request never got a response
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Server answered with a non-success status
    #[error("Server returned {0}")]
    Status(u16),

    /// Response body did not decode
    #[error("Failed to parse response: {0}")]
    Json(String),
}

/// Backend operations used by the pipeline.
#[async_trait]
pub trait BackendApi: Send + Sync {
    /// `POST /api/readings`
    async fn post_reading(
        &self,
        token: &str,
        envelope: &TelemetryEnvelope,
    ) -> std::result::Result<(), ApiError>;

    /// `GET /api/readings/latest`
    async fn latest_reading(&self, token: &str) -> std::result::Result<LatestReading, ApiError>;

    /// `GET /api/auth`
    async fn profile(&self, token: &str) -> std::result::Result<UserProfile, ApiError>;
}

/// reqwest-backed client with a pooled connection.
pub struct HttpBackend {
    http: reqwest::Client,
    base_url: String,
}

impl std::fmt::Debug for HttpBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBackend")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl HttpBackend {
    /// Build a client against `base_url` (trailing slashes are ignored).
    ///
    /// # Errors
    ///
    /// Returns `Http` if the TLS backend cannot be initialized.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CrashtrackError::Http(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        token: &str,
    ) -> std::result::Result<T, ApiError> {
        let response = self
            .http
            .get(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| ApiError::Http(e.to_string()))?;

        let response = check_status(response)?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ApiError::Http(e.to_string()))?;

        serde_json::from_slice(&bytes).map_err(|e| ApiError::Json(e.to_string()))
    }
}

fn check_status(response: reqwest::Response) -> std::result::Result<reqwest::Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(ApiError::Status(status.as_u16()))
    }
}

#[async_trait]
impl BackendApi for HttpBackend {
    async fn post_reading(
        &self,
        token: &str,
        envelope: &TelemetryEnvelope,
    ) -> std::result::Result<(), ApiError> {
        let response = self
            .http
            .post(self.url(READINGS_PATH))
            .bearer_auth(token)
            .json(envelope)
            .send()
            .await
            .map_err(|e| ApiError::Http(e.to_string()))?;

        check_status(response)?;
        debug!("Reading posted");
        Ok(())
    }

    async fn latest_reading(&self, token: &str) -> std::result::Result<LatestReading, ApiError> {
        self.get_json(LATEST_READING_PATH, token).await
    }

    async fn profile(&self, token: &str) -> std::result::Result<UserProfile, ApiError> {
        self.get_json(PROFILE_PATH, token).await
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_paths() {
        assert_eq!(READINGS_PATH, "/api/readings");
        assert_eq!(LATEST_READING_PATH, "/api/readings/latest");
        assert_eq!(PROFILE_PATH, "/api/auth");
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let backend = HttpBackend::new("http://localhost:3000/", Duration::from_secs(5)).unwrap();
        assert_eq!(backend.base_url(), "http://localhost:3000");
        assert_eq!(backend.url(LATEST_READING_PATH), "http://localhost:3000/api/readings/latest");
    }

    #[tokio::test]
    async fn test_unreachable_server_is_http_error() {
        // Port 9 (discard) on localhost is closed on CI runners
        let backend = HttpBackend::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        let result = backend.latest_reading("token").await;
        assert!(matches!(result, Err(ApiError::Http(_))));
    }

    #[test]
    fn test_api_error_messages() {
        assert_eq!(ApiError::Status(500).to_string(), "Server returned 500");
        assert_eq!(ApiError::Http("refused".into()).to_string(), "HTTP request failed: refused");
    }
}
