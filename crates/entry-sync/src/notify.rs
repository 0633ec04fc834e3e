//! User-facing notifications
//!
//! Every outcome of a submission is surfaced as a transient notification.
//! The coordinator emits at most one notification per category per round.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Notification severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    /// Something went through
    Success,
    /// Something needs the user's attention
    Error,
    /// Informational
    Info,
}

/// One transient notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Severity
    pub kind: NotificationKind,
    /// Text shown to the user
    pub message: String,
    /// When it was raised
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// Create a notification stamped now
    pub fn new(kind: NotificationKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            created_at: Utc::now(),
        }
    }

    /// Success notification
    #[inline]
    pub fn success(message: impl Into<String>) -> Self {
        Self::new(NotificationKind::Success, message)
    }

    /// Error notification
    #[inline]
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(NotificationKind::Error, message)
    }

    /// Info notification
    #[inline]
    pub fn info(message: impl Into<String>) -> Self {
        Self::new(NotificationKind::Info, message)
    }
}

/// Notification texts
pub mod messages {
    /// Parent and figures went through
    pub const ENTRY_SAVED: &str = "Entry saved successfully!";
    /// Parent save or a figure page failed
    pub const ENTRY_NOT_SAVED: &str = "Could not save entry!";
    /// Reminder text
    pub const UNSAVED_CHANGES: &str = "You have unsaved changes.";

    /// Saved figures
    #[must_use]
    pub fn figures_saved(count: usize) -> String {
        format!("{count} figures saved successfully!")
    }

    /// Rejected or skipped saves
    #[must_use]
    pub fn figures_not_saved(count: usize) -> String {
        format!("{count} figures could not be saved!")
    }

    /// Confirmed deletes
    #[must_use]
    pub fn figures_deleted(count: usize) -> String {
        format!("{count} figures deleted successfully!")
    }

    /// Unconfirmed deletes
    #[must_use]
    pub fn figures_not_deleted(count: usize) -> String {
        format!("{count} figures could not be deleted!")
    }
}

/// Sink for notifications
#[cfg_attr(test, mockall::automock)]
pub trait Notifier: Send + Sync {
    /// Show a notification
    fn notify(&self, notification: Notification);
}

/// Writes notifications to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notification: Notification) {
        match notification.kind {
            NotificationKind::Error => {
                tracing::warn!(message = %notification.message, "notification");
            }
            NotificationKind::Success | NotificationKind::Info => {
                tracing::info!(message = %notification.message, "notification");
            }
        }
    }
}

/// Keeps every notification in memory
#[derive(Debug, Default)]
pub struct CollectingNotifier {
    inner: Mutex<Vec<Notification>>,
}

impl CollectingNotifier {
    /// Empty collector
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every notification
    #[must_use]
    pub fn notifications(&self) -> Vec<Notification> {
        self.inner.lock().clone()
    }

    /// Snapshot of the messages only
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.inner.lock().iter().map(|n| n.message.clone()).collect()
    }

    /// Number collected
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// True when nothing was collected
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Forget everything collected
    pub fn clear(&self) {
        self.inner.lock().clear();
    }
}

impl Notifier for CollectingNotifier {
    fn notify(&self, notification: Notification) {
        self.inner.lock().push(notification);
    }
}
