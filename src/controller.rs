//! # Permission/Sampling Controller
//!
//! Owns the write side of the pipeline: asks the positioning platform for
//! permission once, then samples and submits on a fixed period.
//!
//! ## State Machine
//!
//! ```text
//! Unknown --grant--> Granted --teardown--> [stopped]
//! Unknown --deny---> Denied  --retry-----> Unknown
//! ```
//!
//! `Denied` is only left through an explicit [`SamplingController::retry`]
//! (or another [`SamplingController::request_permission`] call from the
//! user). A sample failing with code 1 while sampling counts as the
//! permission being revoked: the loop stops and the state becomes `Denied`.
//!
//! ## Sampling Loop
//!
//! Ticks are scheduled by wall-clock time. Each tick's sample-and-submit runs
//! as its own task, so a slow backend can leave requests overlapping. A
//! failing tick raises a notification and the loop carries on.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::model::PositionSample;
use crate::notify::{Notification, Notifier};
use crate::position::{PositionErrorCategory, PositionSource};
use crate::submitter::TelemetrySubmitter;

/// Reference sampling period
pub const DEFAULT_SAMPLING_INTERVAL: Duration = Duration::from_secs(60);

/// Whether the pipeline may read the device position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PermissionState {
    #[default]
    Unknown,
    Granted,
    Denied,
}

struct SamplingLoop {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Everything a sampling tick needs, cloned into each tick task.
#[derive(Clone)]
struct SamplingContext {
    source: Arc<dyn PositionSource>,
    submitter: TelemetrySubmitter,
    notifier: Arc<dyn Notifier>,
    state_tx: Arc<watch::Sender<PermissionState>>,
}

impl SamplingContext {
    /// Submit a sample, notifying the user on failure.
    async fn submit_and_report(&self, sample: &PositionSample) {
        if let Err(e) = self.submitter.submit(sample).await {
            self.notifier.notify(Notification::error(e.to_string()));
        }
    }

    /// One tick: fresh sample, then submit. Results after `cancel` are dropped.
    async fn tick(&self, cancel: &CancellationToken) {
        let result = self.source.sample_once().await;
        if cancel.is_cancelled() {
            debug!("Sampling loop stopped while sampling, dropping result");
            return;
        }

        match result {
            Ok(sample) => {
                self.submit_and_report(&sample).await;
            }
            Err(e) if e.category() == PositionErrorCategory::PermissionDenied => {
                warn!(error = %e, "Location permission revoked, stopping sampling");
                cancel.cancel();
                self.state_tx.send_replace(PermissionState::Denied);
                let message = PositionErrorCategory::PermissionDenied.user_message();
                self.notifier.notify(Notification::error(message));
            }
            Err(e) => {
                warn!(error = %e, "Error fetching location");
                self.notifier.notify(Notification::error("Failed to fetch location"));
            }
        }
    }
}

/// Permission and sampling lifecycle for one session.
pub struct SamplingController {
    ctx: SamplingContext,
    interval: Duration,
    sampling: Mutex<Option<SamplingLoop>>,
}

impl SamplingController {
    pub fn new(
        source: Arc<dyn PositionSource>,
        submitter: TelemetrySubmitter,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let (state_tx, _) = watch::channel(PermissionState::Unknown);
        Self {
            ctx: SamplingContext {
                source,
                submitter,
                notifier,
                state_tx: Arc::new(state_tx),
            },
            interval: DEFAULT_SAMPLING_INTERVAL,
            sampling: Mutex::new(None),
        }
    }

    /// Sets a custom sampling period.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn state(&self) -> PermissionState {
        *self.ctx.state_tx.borrow()
    }

    /// Watch permission changes from a presentation layer.
    pub fn subscribe(&self) -> watch::Receiver<PermissionState> {
        self.ctx.state_tx.subscribe()
    }

    /// Whether a sampling loop is currently scheduled.
    pub fn is_sampling(&self) -> bool {
        self.sampling
            .lock()
            .map(|slot| slot.as_ref().is_some_and(|l| !l.cancel.is_cancelled()))
            .unwrap_or(false)
    }

    /// Ask the platform for a position to settle the permission question.
    ///
    /// On success the grant sample is submitted before this returns and the
    /// sampling loop starts. Calling this while `Granted` does nothing.
    pub async fn request_permission(&self) -> PermissionState {
        if self.state() == PermissionState::Granted {
            debug!("Location permission already granted");
            return PermissionState::Granted;
        }

        self.set_state(PermissionState::Unknown);

        if !self.ctx.source.is_available() {
            warn!("No positioning platform available");
            self.ctx
                .notifier
                .notify(Notification::error("Geolocation is not supported by this device"));
            self.set_state(PermissionState::Denied);
            return PermissionState::Denied;
        }

        match self.ctx.source.sample_once().await {
            Ok(sample) => {
                info!(lat = sample.latitude, lng = sample.longitude, "Location permission granted");
                self.set_state(PermissionState::Granted);
                self.ctx.submit_and_report(&sample).await;
                self.start_sampling();
                PermissionState::Granted
            }
            Err(e) => {
                let category = e.category();
                warn!(code = e.code(), error = %e, "Error getting location");
                self.ctx
                    .notifier
                    .notify(Notification::error(category.user_message()));
                self.set_state(PermissionState::Denied);
                PermissionState::Denied
            }
        }
    }

    /// User-triggered retry from `Denied`.
    pub async fn retry(&self) -> PermissionState {
        if self.state() == PermissionState::Denied {
            info!("Retrying location permission");
            self.set_state(PermissionState::Unknown);
        }
        self.request_permission().await
    }

    /// Stop the sampling loop and wait for the scheduler task to exit.
    ///
    /// Tick tasks already in flight finish on their own; their results are
    /// discarded.
    pub async fn shutdown(&self) {
        let sampling = self.sampling.lock().ok().and_then(|mut slot| slot.take());
        if let Some(sampling) = sampling {
            sampling.cancel.cancel();
            if let Err(e) = sampling.task.await {
                warn!("Sampling loop task failed: {}", e);
            }
            info!("Sampling loop stopped");
        }
    }

    fn set_state(&self, state: PermissionState) {
        let previous = self.ctx.state_tx.send_replace(state);
        if previous != state {
            debug!(?previous, ?state, "Permission state changed");
        }
    }

    fn start_sampling(&self) {
        let Ok(mut slot) = self.sampling.lock() else {
            return;
        };

        if slot.as_ref().is_some_and(|l| !l.cancel.is_cancelled()) {
            debug!("Sampling loop already running");
            return;
        }

        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_sampling_loop(
            self.ctx.clone(),
            self.interval,
            cancel.clone(),
        ));
        info!(interval_secs = self.interval.as_secs(), "Sampling loop started");
        *slot = Some(SamplingLoop { cancel, task });
    }
}

impl Drop for SamplingController {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.sampling.lock() {
            if let Some(sampling) = slot.take() {
                sampling.cancel.cancel();
            }
        }
    }
}

/// Scheduler: the grant already produced a sample, so the first tick is one
/// period out.
async fn run_sampling_loop(ctx: SamplingContext, period: Duration, cancel: CancellationToken) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let ctx = ctx.clone();
                let cancel = cancel.clone();
                tokio::spawn(async move { ctx.tick(&cancel).await });
            }
            _ = cancel.cancelled() => {
                break;
            }
        }
    }

    debug!("Sampling scheduler exited");
}
