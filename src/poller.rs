//! # Live Position Poller
//!
//! Read side of the pipeline: periodically fetches the latest
//! backend-confirmed reading and keeps a cached copy for the map.
//!
//! ## Cancellation
//!
//! Requests already in flight when [`PollHandle::cancel`] is called are not
//! aborted. Their results are dropped: the cache, the notifier and the
//! update callback are only touched while the handle's gate is open, and
//! `cancel()` closes the gate before returning. The callback may cancel or
//! drop its own handle.
//!
//! A poller runs at most one loop. Calling `start` again cancels the
//! previous loop before the new one begins.
//!
//! ## Ordering
//!
//! Every tick fetches in its own task, so a slow response can land after a
//! newer one. The cache takes whichever completes last.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, ThreadId};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::BackendApi;
use crate::credentials::CredentialAccessor;
use crate::error::TelemetryError;
use crate::model::LatestReading;
use crate::notify::{Notification, Notifier};

/// Reference polling period
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(20);

/// What the map view renders from.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedState {
    pub reading: Option<LatestReading>,
    /// True until the first fetch settles
    pub loading: bool,
}

impl Default for FeedState {
    fn default() -> Self {
        Self {
            reading: None,
            loading: true,
        }
    }
}

/// Callback invoked with each successfully fetched reading.
pub type UpdateCallback = Arc<dyn Fn(&LatestReading) + Send + Sync>;

#[derive(Clone)]
struct Feed {
    credentials: Arc<dyn CredentialAccessor>,
    api: Arc<dyn BackendApi>,
    notifier: Arc<dyn Notifier>,
    state_tx: Arc<watch::Sender<FeedState>>,
}

impl Feed {
    /// Network half of a fetch. Touches no shared state.
    async fn request(&self) -> Result<LatestReading, TelemetryError> {
        let token = self
            .credentials
            .token()
            .ok_or(TelemetryError::Unauthenticated)?;

        self.api
            .latest_reading(&token)
            .await
            .map_err(|e| TelemetryError::FetchFailed(e.to_string()))
    }

    /// Publish a settled fetch: replace the cache on success, notify on failure.
    fn apply(&self, result: &Result<LatestReading, TelemetryError>) {
        match result {
            Ok(reading) => {
                debug!(
                    id = %reading.id,
                    crash = reading.crash_detected,
                    "Latest reading updated"
                );
                self.state_tx.send_replace(FeedState {
                    reading: Some(reading.clone()),
                    loading: false,
                });
            }
            Err(e) => {
                let message = match e {
                    TelemetryError::Unauthenticated => "Authentication token missing",
                    _ => "Error updating location data",
                };
                warn!(error = %e, "Error fetching latest reading");
                self.notifier.notify(Notification::error(message));
                self.state_tx.send_if_modified(|state| {
                    let was_loading = state.loading;
                    state.loading = false;
                    was_loading
                });
            }
        }
    }
}

/// Open/closed switch shared by one poll loop, its fetches and its handle.
struct PollGate {
    open: AtomicBool,
    /// Held while a fetch result is applied and handed to `on_update`
    publishing: Mutex<()>,
    /// Thread currently inside `on_update`
    publisher: Mutex<Option<ThreadId>>,
    cancel: CancellationToken,
}

impl PollGate {
    fn new() -> Self {
        Self {
            open: AtomicBool::new(true),
            publishing: Mutex::new(()),
            publisher: Mutex::new(None),
            cancel: CancellationToken::new(),
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Close the gate and stop the scheduler.
    ///
    /// Blocks until a result being published on another thread is done.
    /// Called from inside `on_update` it returns at once.
    fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
        self.cancel.cancel();

        let current = thread::current().id();
        let inside_callback = *self
            .publisher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            == Some(current);
        if !inside_callback {
            drop(self.publishing.lock());
        }
    }
}

/// Marks the current thread as the publisher until dropped.
struct PublisherMark<'a>(&'a PollGate);

impl<'a> PublisherMark<'a> {
    fn set(gate: &'a PollGate) -> Self {
        *gate.publisher.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(thread::current().id());
        Self(gate)
    }
}

impl Drop for PublisherMark<'_> {
    fn drop(&mut self) {
        *self
            .0
            .publisher
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// Periodic reader of `/api/readings/latest`.
pub struct LivePositionPoller {
    feed: Feed,
    interval: Duration,
    /// Gate of the loop started last
    running: Mutex<Option<Arc<PollGate>>>,
}

impl LivePositionPoller {
    pub fn new(
        credentials: Arc<dyn CredentialAccessor>,
        api: Arc<dyn BackendApi>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let (state_tx, _) = watch::channel(FeedState::default());
        Self {
            feed: Feed {
                credentials,
                api,
                notifier,
                state_tx: Arc::new(state_tx),
            },
            interval: DEFAULT_POLL_INTERVAL,
            running: Mutex::new(None),
        }
    }

    /// Sets a custom polling period.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Fetch once and publish the result.
    ///
    /// # Errors
    ///
    /// - `Unauthenticated`: no token stored; no request is made
    /// - `FetchFailed`: transport or server failure; the cache is kept
    pub async fn fetch_latest(&self) -> Result<LatestReading, TelemetryError> {
        let result = self.feed.request().await;
        self.feed.apply(&result);
        result
    }

    /// The cached reading, if any fetch has succeeded.
    pub fn latest(&self) -> Option<LatestReading> {
        self.feed.state_tx.borrow().reading.clone()
    }

    /// Watch the feed from a presentation layer.
    pub fn subscribe(&self) -> watch::Receiver<FeedState> {
        self.feed.state_tx.subscribe()
    }

    /// Fetch now and then every period until the handle is cancelled or dropped.
    ///
    /// A loop started earlier by this poller is cancelled first.
    pub fn start<F>(&self, on_update: F) -> PollHandle
    where
        F: Fn(&LatestReading) + Send + Sync + 'static,
    {
        let gate = Arc::new(PollGate::new());
        let previous = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(gate.clone());
        if let Some(previous) = previous {
            if previous.is_open() {
                info!("Restarting polling");
            }
            previous.close();
        }

        let task = tokio::spawn(run_poll_loop(
            self.feed.clone(),
            self.interval,
            Arc::new(on_update),
            gate.clone(),
        ));

        info!(interval_secs = self.interval.as_secs(), "Polling started");
        PollHandle {
            gate,
            task: Some(task),
        }
    }
}

/// Owner of a running poll loop.
pub struct PollHandle {
    gate: Arc<PollGate>,
    task: Option<JoinHandle<()>>,
}

impl PollHandle {
    /// Stop polling. Once this returns, `on_update` is never called again.
    pub fn cancel(&self) {
        self.gate.close();
    }

    pub fn is_cancelled(&self) -> bool {
        self.gate.cancel.is_cancelled()
    }

    /// Cancel and wait for the scheduler task to exit.
    pub async fn shutdown(mut self) {
        self.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("Poll loop task failed: {}", e);
            }
        }
        info!("Polling stopped");
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

async fn run_poll_loop(
    feed: Feed,
    period: Duration,
    on_update: UpdateCallback,
    gate: Arc<PollGate>,
) {
    // First tick completes immediately
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;

            _ = gate.cancel.cancelled() => {
                break;
            }
            _ = ticker.tick() => {
                tokio::spawn(poll_once(feed.clone(), on_update.clone(), gate.clone()));
            }
        }
    }

    debug!("Poll scheduler exited");
}

async fn poll_once(feed: Feed, on_update: UpdateCallback, gate: Arc<PollGate>) {
    let result = feed.request().await;

    let _publishing = gate
        .publishing
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    if !gate.is_open() {
        debug!("Polling cancelled, discarding fetch result");
        return;
    }

    feed.apply(&result);
    if let Ok(reading) = &result {
        let _mark = PublisherMark::set(&gate);
        on_update(reading);
    }
}
