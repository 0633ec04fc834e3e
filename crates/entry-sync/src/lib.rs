//! Entry Sync - paged bulk save of entry figures
//!
//! Saves an entry form in two steps: the parent entry first, then all of its
//! pending figure changes through a paginated bulk mutation. Provides:
//! - A pending request queue with an explicit Idle/Submitting/Reconciling
//!   state machine
//! - A sequential page submitter
//! - Swappable response matching (positional or keyed)
//! - A reconciler that classifies every request and merges the outcome back
//!   into the form
//! - Option caches, notifications and an unsaved-changes reminder
//! - An in-memory backend for simulation and tests
//!
//! # Example
//!
//! ```rust,no_run
//! use entry_sync::prelude::*;
//! use entry_sync::simulator::{BackendBehavior, InMemoryBackend};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), SaveError> {
//! let backend = Arc::new(InMemoryBackend::new(BackendBehavior::default()));
//! let mut coordinator =
//!     EntrySaveCoordinator::<Figure, Entry>::new(SyncConfig::new(), backend.clone(), backend);
//!
//! let mut form = EntryForm::new(Entry::new("Floods displace thousands"));
//! form.figures.add(Figure::new("NPL").with_reported(1200));
//!
//! let summary = coordinator.submit(&mut form).await?;
//! println!("{} figures saved", summary.counts.saved);
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]

pub mod api;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod matcher;
pub mod notify;
pub mod options;
pub mod queue;
pub mod reconciler;
pub mod reminder;
pub mod simulator;
pub mod submitter;

pub use api::{EntryApi, FigureBulkApi};
pub use config::{MatchingMode, SyncConfig};
pub use coordinator::{EntrySaveCoordinator, RoundSummary};
pub use error::{ConfigError, QueueError, SaveError, SubmitError, TransportError};
pub use matcher::{matcher_for, KeyedMatcher, PositionalMatcher, ResponseMatcher, SaveMatch};
pub use notify::{
    CollectingNotifier, Notification, NotificationKind, Notifier, TracingNotifier,
};
pub use options::{OptionCache, OptionStore};
pub use queue::{
    AnsweredPage, Page, PendingRequestQueue, QueueState, RoundRecord,
};
pub use reconciler::{
    Outcome, Reconciler, Reconciliation, RoundCounts, DELETE_SKIPPED_MESSAGE,
    SAVE_SKIPPED_MESSAGE,
};
pub use reminder::{DirtyFlag, UnsavedChangesReminder};
pub use submitter::{DrainOutcome, PagedSubmitter};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for saving entry forms
    pub use crate::{
        EntryApi, EntrySaveCoordinator, FigureBulkApi, MatchingMode, Notifier, OptionStore,
        RoundSummary, SaveError, SyncConfig,
    };
    pub use entry_model::{Entry, EntryForm, Figure, FigureCollection};
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
