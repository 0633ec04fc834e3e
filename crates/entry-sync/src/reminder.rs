//! Unsaved-changes reminder
//!
//! Periodically reminds the user that the form holds unsubmitted edits.
//! Purely informational: it never touches the save protocol.

use crate::notify::{messages, Notification, Notifier};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Shared "form has unsaved edits" flag
#[derive(Debug, Clone, Default)]
pub struct DirtyFlag(Arc<AtomicBool>);

impl DirtyFlag {
    /// New clean flag
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Update the flag
    #[inline]
    pub fn set(&self, dirty: bool) {
        self.0.store(dirty, Ordering::Release);
    }

    /// Read the flag
    #[inline]
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Background reminder task; stops when dropped
#[derive(Debug)]
pub struct UnsavedChangesReminder {
    handle: JoinHandle<()>,
}

impl UnsavedChangesReminder {
    /// Shortest period between reminders
    pub const MIN_INTERVAL: Duration = Duration::from_secs(1);

    /// Start reminding every `interval` while `flag` is dirty
    ///
    /// Intervals below [`Self::MIN_INTERVAL`] are raised to it.
    /// Must be called inside a tokio runtime.
    #[must_use]
    pub fn spawn(interval: Duration, flag: DirtyFlag, notifier: Arc<dyn Notifier>) -> Self {
        let interval = interval.max(Self::MIN_INTERVAL);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // First tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if flag.is_dirty() {
                    notifier.notify(Notification::info(messages::UNSAVED_CHANGES));
                }
            }
        });
        Self { handle }
    }

    /// Stop reminding
    pub fn stop(self) {
        drop(self);
    }

    /// True while the task runs
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for UnsavedChangesReminder {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
