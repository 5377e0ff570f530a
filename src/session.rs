//! # Session
//!
//! The owning context for one signed-in device: wires the credential
//! store, position source, motion sensor and backend into the sampling
//! controller and the live poller, and tears both loops down together.
//!
//! ## Startup
//!
//! 1. Request location permission (grant sample is submitted)
//! 2. On grant: load the user profile once, then start polling
//! 3. On denial: retry after a delay if configured, otherwise stay idle

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::{BackendApi, HttpBackend};
use crate::config::{Config, PositionSourceKind};
use crate::controller::{PermissionState, SamplingController, DEFAULT_SAMPLING_INTERVAL};
use crate::credentials::{CredentialAccessor, FileCredentialStore};
use crate::error::Result;
use crate::model::UserProfile;
use crate::notify::{Notification, Notifier};
use crate::poller::{FeedState, LivePositionPoller, PollHandle, DEFAULT_POLL_INTERVAL};
use crate::position::fixed::FixedPositionSource;
use crate::position::serial::SerialGpsSource;
use crate::position::PositionSource;
use crate::presenter::{MapFrame, MapPresenter};
use crate::sensor::accelerometer::EvdevAccelerometer;
use crate::sensor::MotionSensor;
use crate::submitter::TelemetrySubmitter;

/// External collaborators of a session.
pub struct SessionParts {
    pub credentials: Arc<dyn CredentialAccessor>,
    pub api: Arc<dyn BackendApi>,
    pub source: Arc<dyn PositionSource>,
    pub sensor: Option<Arc<dyn MotionSensor>>,
    pub notifier: Arc<dyn Notifier>,
}

/// Timing and retry behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    pub sampling_interval: Duration,
    pub polling_interval: Duration,
    pub retry_on_denied: bool,
    pub retry_delay: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            sampling_interval: DEFAULT_SAMPLING_INTERVAL,
            polling_interval: DEFAULT_POLL_INTERVAL,
            retry_on_denied: false,
            retry_delay: Duration::from_secs(30),
        }
    }
}

impl SessionOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            sampling_interval: config.sampling.interval(),
            polling_interval: config.polling.interval(),
            retry_on_denied: config.sampling.retry_on_denied,
            retry_delay: config.sampling.retry_delay(),
        }
    }
}

/// A running telemetry session.
pub struct Session {
    credentials: Arc<dyn CredentialAccessor>,
    api: Arc<dyn BackendApi>,
    notifier: Arc<dyn Notifier>,
    controller: SamplingController,
    poller: LivePositionPoller,
    poll_handle: Mutex<Option<PollHandle>>,
    profile: Mutex<Option<UserProfile>>,
    options: SessionOptions,
    shutdown: CancellationToken,
}

impl Session {
    pub fn new(parts: SessionParts, options: SessionOptions) -> Self {
        let mut submitter = TelemetrySubmitter::new(parts.credentials.clone(), parts.api.clone());
        if let Some(sensor) = parts.sensor {
            submitter = submitter.with_sensor(sensor);
        }

        let controller = SamplingController::new(parts.source, submitter, parts.notifier.clone())
            .with_interval(options.sampling_interval);

        let poller = LivePositionPoller::new(
            parts.credentials.clone(),
            parts.api.clone(),
            parts.notifier.clone(),
        )
        .with_interval(options.polling_interval);

        Self {
            credentials: parts.credentials,
            api: parts.api,
            notifier: parts.notifier,
            controller,
            poller,
            poll_handle: Mutex::new(None),
            profile: Mutex::new(None),
            options,
            shutdown: CancellationToken::new(),
        }
    }

    /// Build a session from configuration.
    ///
    /// A configured but missing motion sensor is logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be constructed.
    pub fn from_config(config: &Config, notifier: Arc<dyn Notifier>) -> Result<Self> {
        let credentials = Arc::new(FileCredentialStore::new(&config.credentials.path));
        let api = Arc::new(HttpBackend::new(&config.api.base_url, config.api.timeout())?);
        info!("Backend: {}", api.base_url());

        let source: Arc<dyn PositionSource> = match config.position.source {
            PositionSourceKind::Serial => {
                info!(
                    port = %config.position.port,
                    baud_rate = config.position.baud_rate,
                    "Using serial GPS receiver"
                );
                Arc::new(SerialGpsSource::new(
                    config.position.port.clone(),
                    config.position.baud_rate,
                    config.position.fix_timeout(),
                ))
            }
            PositionSourceKind::Fixed => {
                info!(
                    lat = config.position.latitude,
                    lng = config.position.longitude,
                    "Using fixed position"
                );
                Arc::new(FixedPositionSource::new(
                    config.position.latitude,
                    config.position.longitude,
                ))
            }
        };

        let sensor = if config.sensor.enabled {
            open_sensor(&config.sensor.device_path)
        } else {
            None
        };

        Ok(Self::new(
            SessionParts {
                credentials,
                api,
                source,
                sensor,
                notifier,
            },
            SessionOptions::from_config(config),
        ))
    }

    /// Request permission and, once granted, bring up the live feed.
    ///
    /// Returns once the feed is running, permission is settled as denied
    /// (with no retry configured), or the session is shut down.
    pub async fn run(&self) -> PermissionState {
        let mut state = self.controller.request_permission().await;

        while state == PermissionState::Denied && self.options.retry_on_denied {
            info!(
                delay_secs = self.options.retry_delay.as_secs(),
                "Location permission denied, retrying later"
            );
            tokio::select! {
                _ = tokio::time::sleep(self.options.retry_delay) => {}
                _ = self.shutdown.cancelled() => return state,
            }
            state = self.controller.retry().await;
        }

        match state {
            PermissionState::Granted => {
                self.load_profile().await;
                self.start_feed();
            }
            _ => {
                info!("Location permission not granted; retry to enable tracking");
            }
        }

        state
    }

    /// User-triggered retry after a denial.
    pub async fn retry(&self) -> PermissionState {
        let state = self.controller.retry().await;
        if state == PermissionState::Granted {
            self.load_profile().await;
            self.start_feed();
        }
        state
    }

    pub fn permission(&self) -> watch::Receiver<PermissionState> {
        self.controller.subscribe()
    }

    pub fn feed(&self) -> watch::Receiver<FeedState> {
        self.poller.subscribe()
    }

    /// The map as it would be drawn right now.
    ///
    /// While permission is denied no feed is running, so the map shows
    /// "no data" rather than loading.
    pub fn frame(&self) -> MapFrame {
        let feed = self.poller.subscribe();
        let state = feed.borrow();
        let loading = state.loading && self.controller.state() != PermissionState::Denied;
        MapPresenter::render(state.reading.as_ref(), loading)
    }

    pub fn profile(&self) -> Option<UserProfile> {
        self.profile.lock().ok().and_then(|p| p.clone())
    }

    pub fn is_polling(&self) -> bool {
        self.poll_handle
            .lock()
            .map(|h| h.as_ref().is_some_and(|h| !h.is_cancelled()))
            .unwrap_or(false)
    }

    /// Stop both loops.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.controller.shutdown().await;

        let handle = self.poll_handle.lock().ok().and_then(|mut h| h.take());
        if let Some(handle) = handle {
            handle.shutdown().await;
        }
        info!("Session stopped");
    }

    /// Stop both loops and forget the stored token.
    ///
    /// # Errors
    ///
    /// Returns error if the credential store cannot be rewritten.
    pub async fn logout(&self) -> Result<()> {
        self.shutdown().await;
        self.credentials.sign_out()?;
        self.notifier.notify(Notification::info("Logged out"));
        info!("Signed out");
        Ok(())
    }

    async fn load_profile(&self) {
        let Some(token) = self.credentials.token() else {
            warn!("No token, skipping profile fetch");
            self.notifier.notify(Notification::error("Failed to load user data"));
            return;
        };

        match self.api.profile(&token).await {
            Ok(profile) => {
                info!(
                    name = profile.name.as_deref().unwrap_or("unknown"),
                    "User profile loaded"
                );
                if let Ok(mut slot) = self.profile.lock() {
                    *slot = Some(profile);
                }
            }
            Err(e) => {
                warn!(error = %e, "Error fetching user data");
                self.notifier.notify(Notification::error("Failed to load user data"));
            }
        }
    }

    fn start_feed(&self) {
        let Ok(mut slot) = self.poll_handle.lock() else {
            return;
        };
        if slot.as_ref().is_some_and(|h| !h.is_cancelled()) {
            debug!("Live feed already running");
            return;
        }

        let handle = self.poller.start(|reading| {
            let frame = MapPresenter::render(Some(reading), false);
            info!(target: "crashtrack::map", crash = reading.crash_detected, "\n{}", frame);
        });
        *slot = Some(handle);
    }
}

fn open_sensor(device_path: &str) -> Option<Arc<dyn MotionSensor>> {
    let result = if device_path.is_empty() {
        EvdevAccelerometer::open()
    } else {
        EvdevAccelerometer::open_path(device_path)
    };

    match result {
        Ok(sensor) => {
            info!("Accelerometer: {}", sensor.device_path());
            Some(Arc::new(sensor))
        }
        Err(e) => {
            warn!("Accelerometer unavailable, continuing without it: {}", e);
            None
        }
    }
}
