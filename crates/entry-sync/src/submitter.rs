//! Paged submitter
//!
//! Drives a [`PendingRequestQueue`] to completion, one bulk call per page.
//! A page is only requested after the previous response has been recorded,
//! so calls for one form never overlap. Transport failures end the round;
//! nothing is retried here.

use crate::api::FigureBulkApi;
use crate::error::SubmitError;
use crate::queue::PendingRequestQueue;
use entry_model::{ChildPayload, ServerId};
use tracing::Instrument;

/// Result of a fully drained queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrainOutcome {
    /// Bulk calls made
    pub pages_sent: usize,
    /// Requests carried by those calls
    pub requests_sent: usize,
}

/// Sequential page pump
#[derive(Debug, Clone, Copy, Default)]
pub struct PagedSubmitter;

impl PagedSubmitter {
    /// Create new submitter
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Send every page of the running round
    ///
    /// # Errors
    /// - `SubmitError::Transport` when a call fails; the failed page is
    ///   abandoned and later pages are never requested
    /// - `SubmitError::Queue` if the queue is not in a round
    pub async fn drain<T: ChildPayload>(
        &self,
        queue: &mut PendingRequestQueue<T>,
        api: &dyn FigureBulkApi<T>,
        entry: &ServerId,
    ) -> Result<DrainOutcome, SubmitError> {
        let mut outcome = DrainOutcome::default();

        while let Some(page) = queue.next_page()? {
            let span = tracing::info_span!(
                "bulk_page",
                page = page.index,
                deletes = page.delete_requests.len(),
                saves = page.save_requests.len(),
            );
            let request = page.to_request();
            let carried = request.len();

            match api.bulk_save(entry, request).instrument(span).await {
                Ok(response) => {
                    queue.update_responses(response)?;
                    outcome.pages_sent += 1;
                    outcome.requests_sent += carried;
                }
                Err(source) => {
                    tracing::error!(page = page.index, error = %source, "bulk figure call failed");
                    queue.abandon_in_flight()?;
                    return Err(SubmitError::Transport {
                        page_index: page.index,
                        source,
                    });
                }
            }
        }

        tracing::debug!(
            pages = outcome.pages_sent,
            requests = outcome.requests_sent,
            "queue drained"
        );
        Ok(outcome)
    }
}
