//! # User Notifications
//!
//! Non-blocking, toast-style messages raised by the controller and poller.
//!
//! Raising a notification never waits on the consumer: [`ChannelNotifier`]
//! pushes into an unbounded channel and [`LogNotifier`] writes through
//! `tracing`.

use tokio::sync::mpsc;
use tracing::{info, warn};

/// Severity of a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Error,
}

/// A user-visible message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}

impl Notification {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Info,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Error,
            message: message.into(),
        }
    }
}

/// Sink for user notifications.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Forwards notifications to a receiver owned by the presentation layer.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelNotifier {
    /// Create a notifier and the receiving end for the UI.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, notification: Notification) {
        // Receiver gone means nobody is watching; dropping is fine.
        let _ = self.tx.send(notification);
    }
}

/// Writes notifications to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: Notification) {
        log_notification(&notification);
    }
}

/// Emit a notification as a log event at a matching level.
pub fn log_notification(notification: &Notification) {
    match notification.level {
        NotificationLevel::Info => info!(target: "crashtrack::notify", "{}", notification.message),
        NotificationLevel::Error => warn!(target: "crashtrack::notify", "{}", notification.message),
    }
}
