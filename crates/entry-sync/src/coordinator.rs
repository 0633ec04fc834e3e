//! Entry save coordinator
//!
//! Runs one submission of an entry form end to end:
//! - Saves the parent entry; nothing else is sent if that fails
//! - Points stale figures at the saved entry and plans the round
//! - Drains the queue page by page
//! - Reconciles every answered page and merges the outcome into the form
//! - Feeds referenced entities into the option caches
//! - Reports one notification per outcome category
//!
//! A coordinator belongs to exactly one form. `submit` takes `&mut self`, so
//! two submissions of the same form can never interleave; the queue's state
//! machine guards against a round left behind by a dropped `submit` future
//! until [`EntrySaveCoordinator::abandon_round`] is called.

use crate::api::{EntryApi, FigureBulkApi};
use crate::config::SyncConfig;
use crate::error::{QueueError, SaveError, SubmitError, TransportError};
use crate::matcher::ResponseMatcher;
use crate::notify::{messages, Notification, Notifier, TracingNotifier};
use crate::options::OptionStore;
use crate::queue::{PendingRequestQueue, QueueState};
use crate::reconciler::{Reconciler, RoundCounts};
use crate::reminder::{DirtyFlag, UnsavedChangesReminder};
use crate::submitter::PagedSubmitter;
use entry_model::{ChildPayload, EntryForm, FieldErrors, ParentPayload, ServerId};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::Instrument;

/// What a submission achieved
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoundSummary {
    /// Server id of the saved entry
    pub entry_id: ServerId,
    /// Outcome counts of the answered pages
    pub counts: RoundCounts,
    /// Bulk calls that were answered
    pub pages_sent: usize,
    /// Requests carried by the answered calls
    pub requests_sent: usize,
    /// Requests of a failed page plus those never sent
    pub unanswered: usize,
}

impl RoundSummary {
    /// True when every planned request went through
    #[inline]
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.unanswered == 0 && self.counts.all_succeeded()
    }
}

/// Coordinates parent and figure saves of one entry form
pub struct EntrySaveCoordinator<T, E> {
    config: SyncConfig,
    queue: PendingRequestQueue<T>,
    submitter: PagedSubmitter,
    reconciler: Reconciler<T>,
    entry_api: Arc<dyn EntryApi<E>>,
    figure_api: Arc<dyn FigureBulkApi<T>>,
    options: Arc<OptionStore>,
    notifier: Arc<dyn Notifier>,
    dirty: DirtyFlag,
}

impl<T, E> fmt::Debug for EntrySaveCoordinator<T, E>
where
    T: ChildPayload,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntrySaveCoordinator")
            .field("config", &self.config)
            .field("queue", &self.queue)
            .field("matcher", &self.reconciler.matcher_name())
            .field("dirty", &self.dirty.is_dirty())
            .finish_non_exhaustive()
    }
}

impl<T: ChildPayload, E: ParentPayload> EntrySaveCoordinator<T, E> {
    /// Create a coordinator with a private option store and log notifications
    #[must_use]
    pub fn new(
        config: SyncConfig,
        entry_api: Arc<dyn EntryApi<E>>,
        figure_api: Arc<dyn FigureBulkApi<T>>,
    ) -> Self {
        Self {
            queue: PendingRequestQueue::new(config.page_size),
            submitter: PagedSubmitter::new(),
            reconciler: Reconciler::for_mode(config.matching),
            config,
            entry_api,
            figure_api,
            options: Arc::new(OptionStore::new()),
            notifier: Arc::new(TracingNotifier),
            dirty: DirtyFlag::new(),
        }
    }

    /// Share an option store with other forms or widgets
    #[must_use]
    pub fn with_options(mut self, options: Arc<OptionStore>) -> Self {
        self.options = options;
        self
    }

    /// Route notifications elsewhere
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Override the matcher chosen by the configuration
    #[must_use]
    pub fn with_matcher(mut self, matcher: Box<dyn ResponseMatcher<T>>) -> Self {
        self.reconciler = Reconciler::new(matcher);
        self
    }

    /// Configuration in use
    #[inline]
    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// State of the round lock
    #[inline]
    #[must_use]
    pub fn queue_state(&self) -> QueueState {
        self.queue.state()
    }

    /// Option caches fed by saved figures
    #[inline]
    #[must_use]
    pub fn options(&self) -> &Arc<OptionStore> {
        &self.options
    }

    /// Flag read by the unsaved-changes reminder
    #[inline]
    #[must_use]
    pub fn dirty_flag(&self) -> &DirtyFlag {
        &self.dirty
    }

    /// Sync the dirty flag with the form after a local edit
    pub fn track(&self, form: &EntryForm<E, T>) {
        self.dirty.set(form.is_dirty());
    }

    /// Start the unsaved-changes reminder for this form
    ///
    /// Must be called inside a tokio runtime.
    #[must_use]
    pub fn spawn_reminder(&self) -> UnsavedChangesReminder {
        UnsavedChangesReminder::spawn(
            self.config.reminder_interval(),
            self.dirty.clone(),
            Arc::clone(&self.notifier),
        )
    }

    /// Discard a round left behind by a cancelled submission
    pub fn abandon_round(&mut self) {
        self.queue.reset();
    }

    /// Save the entry and all of its pending figure changes
    ///
    /// # Errors
    /// - `SaveError::Queue` if a round is already in progress
    /// - `SaveError::ParentSave` / `SaveError::ParentRejected` if the entry
    ///   could not be saved; no figure request was sent
    /// - `SaveError::PageTransport` if a figure page failed; answered pages
    ///   were merged into the form before returning
    pub async fn submit(&mut self, form: &mut EntryForm<E, T>) -> Result<RoundSummary, SaveError> {
        if !self.queue.is_idle() {
            return Err(QueueError::RoundInProgress.into());
        }

        let span = tracing::info_span!(
            "entry_submit",
            entry = ?form.entry.server_id(),
            figures = form.figures.len(),
            page_size = self.queue.page_size(),
            matcher = self.reconciler.matcher_name(),
        );
        let result = self.run_round(form).instrument(span).await;
        self.dirty.set(form.is_dirty());
        result
    }

    async fn run_round(&mut self, form: &mut EntryForm<E, T>) -> Result<RoundSummary, SaveError> {
        let entry_id = self.save_parent(form).await?;

        form.figures.attach_parent(&entry_id);
        let batch = form.figures.plan_round();
        tracing::info!(
            deletes = batch.delete_requests.len(),
            saves = batch.save_requests.len(),
            "figure round planned"
        );
        self.queue.start(batch)?;

        let drained = self
            .submitter
            .drain(&mut self.queue, self.figure_api.as_ref(), &entry_id)
            .await;
        let failure = match drained {
            Ok(_) => None,
            Err(SubmitError::Transport { page_index, source }) => Some((page_index, source)),
            Err(SubmitError::Queue(e)) => {
                self.queue.reset();
                return Err(e.into());
            }
        };

        let round = self.queue.end()?;
        let reconciliation = self.reconciler.reconcile(&round);
        reconciliation.merge_into(&mut form.figures);
        self.options.merge(reconciliation.linked_options());
        self.queue.finish()?;

        let summary = RoundSummary {
            entry_id,
            counts: reconciliation.counts(),
            pages_sent: round.pages.len(),
            requests_sent: round.pages.iter().map(|p| p.page.len()).sum(),
            unanswered: round.unanswered_len(),
        };
        self.announce(&summary.counts, failure.is_some());

        match failure {
            None => {
                tracing::info!(
                    pages = summary.pages_sent,
                    requests = summary.requests_sent,
                    "entry submitted"
                );
                Ok(summary)
            }
            Some((page_index, source)) => Err(SaveError::PageTransport {
                page_index,
                source,
                partial: Box::new(summary),
            }),
        }
    }

    /// Save the parent and adopt the server's value
    async fn save_parent(&self, form: &mut EntryForm<E, T>) -> Result<ServerId, SaveError> {
        let response = match self.entry_api.save_entry(form.entry.clone()).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(error = %e, "entry save failed");
                self.notifier
                    .notify(Notification::error(messages::ENTRY_NOT_SAVED));
                return Err(SaveError::ParentSave(e));
            }
        };

        if let Some(payloads) = response.errors.filter(|e| !e.is_empty()) {
            let errors = FieldErrors::from_payloads(&payloads);
            tracing::warn!(count = payloads.len(), "entry rejected");
            form.errors = Some(errors.clone());
            self.notifier
                .notify(Notification::error(messages::ENTRY_NOT_SAVED));
            return Err(SaveError::ParentRejected(errors));
        }

        let Some((saved, id)) = response
            .result
            .and_then(|saved| saved.server_id().cloned().map(|id| (saved, id)))
        else {
            self.notifier
                .notify(Notification::error(messages::ENTRY_NOT_SAVED));
            return Err(SaveError::ParentSave(TransportError::Malformed(
                "entry saved without an id".into(),
            )));
        };

        tracing::debug!(%id, "entry saved");
        self.options.merge(saved.linked_options());
        form.entry = saved;
        form.entry_dirty = false;
        form.errors = None;
        Ok(id)
    }

    fn announce(&self, counts: &RoundCounts, page_failed: bool) {
        if counts.saved > 0 {
            self.notifier
                .notify(Notification::success(messages::figures_saved(counts.saved)));
        }
        if counts.failed_saves() > 0 {
            self.notifier.notify(Notification::error(messages::figures_not_saved(
                counts.failed_saves(),
            )));
        }
        if counts.deleted > 0 {
            self.notifier
                .notify(Notification::success(messages::figures_deleted(counts.deleted)));
        }
        if counts.delete_skipped > 0 {
            self.notifier.notify(Notification::error(messages::figures_not_deleted(
                counts.delete_skipped,
            )));
        }

        if page_failed {
            self.notifier
                .notify(Notification::error(messages::ENTRY_NOT_SAVED));
        } else if counts.all_succeeded() {
            self.notifier
                .notify(Notification::success(messages::ENTRY_SAVED));
        }
    }
}
