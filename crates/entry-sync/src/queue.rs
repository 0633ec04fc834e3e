//! Pending request queue
//!
//! Holds the deletions and saves of one submission round and hands them out
//! page by page. One round per form at a time, enforced by [`QueueState`]:
//!
//! ```text
//! Idle --start--> Submitting --end--> Reconciling --finish--> Idle
//! ```
//!
//! Within a round at most one page is in flight; the next page is only
//! handed out once the previous one has been answered.

use crate::error::QueueError;
use entry_model::{
    BulkRequest, BulkResponse, ChildPayload, DeleteRequest, RequestBatch, SaveRequest,
};
use std::collections::VecDeque;

/// Lifecycle state of the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueState {
    /// No round running
    Idle,
    /// Pages are being handed out and answered
    Submitting,
    /// Responses are being merged into the form
    Reconciling,
}

/// States reachable from `from`
#[must_use]
pub fn allowed_transitions(from: QueueState) -> Vec<QueueState> {
    match from {
        QueueState::Idle => vec![QueueState::Submitting],
        QueueState::Submitting => vec![QueueState::Reconciling],
        QueueState::Reconciling => vec![QueueState::Idle],
    }
}

/// Validates a state transition.
///
/// # Errors
/// `QueueError::IllegalTransition` for anything not in
/// [`allowed_transitions`]
pub fn validate_transition(from: QueueState, to: QueueState) -> Result<(), QueueError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(QueueError::IllegalTransition { from, to })
    }
}

/// One bounded slice of a round, sent in a single call
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    /// Position of the page within the round
    pub index: usize,
    /// Deletions carried by this page
    pub delete_requests: Vec<DeleteRequest>,
    /// Saves carried by this page
    pub save_requests: Vec<SaveRequest<T>>,
}

impl<T: ChildPayload> Page<T> {
    /// Wire request; only payloads and correlation keys leave the client
    #[must_use]
    pub fn to_request(&self) -> BulkRequest<T> {
        BulkRequest {
            save_items: self.save_requests.iter().map(SaveRequest::to_item).collect(),
            delete_ids: self.delete_requests.iter().map(|d| d.id.clone()).collect(),
        }
    }
}

impl<T> Page<T> {
    /// Requests on this page
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.delete_requests.len() + self.save_requests.len()
    }

    /// True for an empty page (never handed out)
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A page together with the response it received
#[derive(Debug, Clone, PartialEq)]
pub struct AnsweredPage<T> {
    /// Page as sent
    pub page: Page<T>,
    /// Response as received
    pub response: BulkResponse<T>,
}

/// Everything one round sent and received
#[derive(Debug, Clone, PartialEq)]
pub struct RoundRecord<T> {
    /// Answered pages, in dispatch order
    pub pages: Vec<AnsweredPage<T>>,
    /// Page whose call failed, if any
    pub abandoned: Option<Page<T>>,
    /// Requests never handed out
    pub unsent: RequestBatch<T>,
}

impl<T> RoundRecord<T> {
    /// Saves that received a response
    pub fn save_requests(&self) -> impl Iterator<Item = &SaveRequest<T>> {
        self.pages.iter().flat_map(|p| p.page.save_requests.iter())
    }

    /// Deletes that received a response
    pub fn delete_requests(&self) -> impl Iterator<Item = &DeleteRequest> {
        self.pages.iter().flat_map(|p| p.page.delete_requests.iter())
    }

    /// Requests that were sent but never answered, plus those never sent
    #[must_use]
    pub fn unanswered_len(&self) -> usize {
        self.abandoned.as_ref().map_or(0, Page::len) + self.unsent.len()
    }
}

/// Pending request queue of one entry form
#[derive(Debug)]
pub struct PendingRequestQueue<T> {
    page_size: usize,
    state: QueueState,
    pending_deletes: VecDeque<DeleteRequest>,
    pending_saves: VecDeque<SaveRequest<T>>,
    in_flight: Option<Page<T>>,
    answered: Vec<AnsweredPage<T>>,
    abandoned: Option<Page<T>>,
    next_index: usize,
}

impl<T: ChildPayload> PendingRequestQueue<T> {
    /// Create an idle queue; a page size of zero is treated as one
    #[must_use]
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size: page_size.max(1),
            state: QueueState::Idle,
            pending_deletes: VecDeque::new(),
            pending_saves: VecDeque::new(),
            in_flight: None,
            answered: Vec::new(),
            abandoned: None,
            next_index: 0,
        }
    }

    /// Begin a round
    ///
    /// # Errors
    /// `QueueError::RoundInProgress` unless idle
    pub fn start(&mut self, batch: RequestBatch<T>) -> Result<(), QueueError> {
        if self.state != QueueState::Idle {
            return Err(QueueError::RoundInProgress);
        }
        self.transition(QueueState::Submitting)?;

        tracing::debug!(
            deletes = batch.delete_requests.len(),
            saves = batch.save_requests.len(),
            page_size = self.page_size,
            "submission round started"
        );

        self.pending_deletes = batch.delete_requests.into();
        self.pending_saves = batch.save_requests.into();
        self.in_flight = None;
        self.answered.clear();
        self.abandoned = None;
        self.next_index = 0;
        Ok(())
    }

    /// Hand out the next page, `None` once the round is exhausted
    ///
    /// Deletions go first, then saves; a page holds at most `page_size`
    /// requests in total.
    ///
    /// # Errors
    /// - `QueueError::NotSubmitting` outside a round
    /// - `QueueError::PageInFlight` if the previous page is unanswered
    pub fn next_page(&mut self) -> Result<Option<Page<T>>, QueueError> {
        self.ensure_submitting()?;
        if let Some(page) = &self.in_flight {
            return Err(QueueError::PageInFlight(page.index));
        }
        if self.abandoned.is_some() {
            return Ok(None);
        }

        let take_deletes = self.pending_deletes.len().min(self.page_size);
        let delete_requests: Vec<_> = self.pending_deletes.drain(..take_deletes).collect();
        let take_saves = self
            .pending_saves
            .len()
            .min(self.page_size - delete_requests.len());
        let save_requests: Vec<_> = self.pending_saves.drain(..take_saves).collect();

        if delete_requests.is_empty() && save_requests.is_empty() {
            return Ok(None);
        }

        let page = Page {
            index: self.next_index,
            delete_requests,
            save_requests,
        };
        self.next_index += 1;
        self.in_flight = Some(page.clone());
        Ok(Some(page))
    }

    /// Record the response of the in-flight page
    ///
    /// # Errors
    /// - `QueueError::NotSubmitting` outside a round
    /// - `QueueError::NoPageInFlight` if nothing awaits a response
    pub fn update_responses(&mut self, response: BulkResponse<T>) -> Result<(), QueueError> {
        self.ensure_submitting()?;
        let page = self.in_flight.take().ok_or(QueueError::NoPageInFlight)?;
        self.answered.push(AnsweredPage { page, response });
        Ok(())
    }

    /// Give up on the in-flight page after its call failed
    ///
    /// The remaining requests stay unsent; [`next_page`](Self::next_page)
    /// reports the round as exhausted from now on.
    ///
    /// # Errors
    /// - `QueueError::NotSubmitting` outside a round
    /// - `QueueError::NoPageInFlight` if nothing awaits a response
    pub fn abandon_in_flight(&mut self) -> Result<(), QueueError> {
        self.ensure_submitting()?;
        let page = self.in_flight.take().ok_or(QueueError::NoPageInFlight)?;
        tracing::warn!(page = page.index, requests = page.len(), "page abandoned");
        self.abandoned = Some(page);
        Ok(())
    }

    /// Close the round and hand over what was sent and received
    ///
    /// # Errors
    /// `QueueError::IllegalTransition` unless submitting
    pub fn end(&mut self) -> Result<RoundRecord<T>, QueueError> {
        self.transition(QueueState::Reconciling)?;

        if let Some(page) = self.in_flight.take() {
            tracing::warn!(page = page.index, "round ended with an unanswered page");
            self.abandoned.get_or_insert(page);
        }

        Ok(RoundRecord {
            pages: std::mem::take(&mut self.answered),
            abandoned: self.abandoned.take(),
            unsent: RequestBatch {
                delete_requests: self.pending_deletes.drain(..).collect(),
                save_requests: self.pending_saves.drain(..).collect(),
            },
        })
    }

    /// Release the round lock after reconciliation
    ///
    /// # Errors
    /// `QueueError::IllegalTransition` unless reconciling
    pub fn finish(&mut self) -> Result<(), QueueError> {
        self.transition(QueueState::Idle)
    }

    /// Drop any round in progress and return to idle
    pub fn reset(&mut self) {
        if self.state != QueueState::Idle {
            tracing::warn!(state = ?self.state, "submission round discarded");
        }
        self.state = QueueState::Idle;
        self.pending_deletes.clear();
        self.pending_saves.clear();
        self.in_flight = None;
        self.answered.clear();
        self.abandoned = None;
        self.next_index = 0;
    }

    /// Current state
    #[inline]
    #[must_use]
    pub fn state(&self) -> QueueState {
        self.state
    }

    /// True when a new round may start
    #[inline]
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.state == QueueState::Idle
    }

    /// Requests not handed out yet
    #[inline]
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending_deletes.len() + self.pending_saves.len()
    }

    /// Configured page size
    #[inline]
    #[must_use]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    fn ensure_submitting(&self) -> Result<(), QueueError> {
        if self.state == QueueState::Submitting {
            Ok(())
        } else {
            Err(QueueError::NotSubmitting(self.state))
        }
    }

    fn transition(&mut self, to: QueueState) -> Result<(), QueueError> {
        validate_transition(self.state, to)?;
        self.state = to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use entry_model::{CorrelationKey, Figure, ServerId};

    fn save(reported: u64) -> SaveRequest<Figure> {
        SaveRequest {
            key: CorrelationKey::new(),
            payload: Figure::new("NPL").with_reported(reported),
        }
    }

    fn delete(id: u64) -> DeleteRequest {
        DeleteRequest {
            id: ServerId::from(id),
            key: CorrelationKey::new(),
        }
    }

    fn batch(deletes: usize, saves: usize) -> RequestBatch<Figure> {
        RequestBatch {
            delete_requests: (0..deletes as u64).map(delete).collect(),
            save_requests: (0..saves as u64).map(save).collect(),
        }
    }

    #[test]
    fn transitions_follow_the_cycle() {
        assert!(validate_transition(QueueState::Idle, QueueState::Submitting).is_ok());
        assert!(validate_transition(QueueState::Submitting, QueueState::Reconciling).is_ok());
        assert!(validate_transition(QueueState::Reconciling, QueueState::Idle).is_ok());

        assert!(validate_transition(QueueState::Idle, QueueState::Reconciling).is_err());
        assert!(validate_transition(QueueState::Submitting, QueueState::Idle).is_err());
        assert!(validate_transition(QueueState::Reconciling, QueueState::Submitting).is_err());
    }

    #[test]
    fn start_rejected_while_running() {
        let mut queue = PendingRequestQueue::new(10);
        queue.start(batch(0, 1)).unwrap();

        assert_eq!(queue.start(batch(0, 1)), Err(QueueError::RoundInProgress));

        queue.end().unwrap();
        assert_eq!(queue.start(batch(0, 1)), Err(QueueError::RoundInProgress));

        queue.finish().unwrap();
        assert!(queue.start(batch(0, 1)).is_ok());
    }

    #[test]
    fn pages_put_deletes_first() {
        let mut queue = PendingRequestQueue::new(3);
        queue.start(batch(2, 4)).unwrap();

        let first = queue.next_page().unwrap().unwrap();
        assert_eq!(first.index, 0);
        assert_eq!(first.delete_requests.len(), 2);
        assert_eq!(first.save_requests.len(), 1);
        queue.update_responses(BulkResponse::new()).unwrap();

        let second = queue.next_page().unwrap().unwrap();
        assert_eq!(second.index, 1);
        assert!(second.delete_requests.is_empty());
        assert_eq!(second.save_requests.len(), 3);
        queue.update_responses(BulkResponse::new()).unwrap();

        assert!(queue.next_page().unwrap().is_none());
    }

    #[test]
    fn next_page_blocks_until_answered() {
        let mut queue = PendingRequestQueue::new(1);
        queue.start(batch(0, 2)).unwrap();

        queue.next_page().unwrap().unwrap();
        assert_eq!(queue.next_page(), Err(QueueError::PageInFlight(0)));

        queue.update_responses(BulkResponse::new()).unwrap();
        assert!(queue.next_page().unwrap().is_some());
    }

    #[test]
    fn update_without_page_fails() {
        let mut queue: PendingRequestQueue<Figure> = PendingRequestQueue::new(5);
        queue.start(batch(0, 1)).unwrap();
        assert_eq!(
            queue.update_responses(BulkResponse::new()),
            Err(QueueError::NoPageInFlight)
        );
    }

    #[test]
    fn operations_outside_round_fail() {
        let mut queue: PendingRequestQueue<Figure> = PendingRequestQueue::new(5);
        assert_eq!(
            queue.next_page(),
            Err(QueueError::NotSubmitting(QueueState::Idle))
        );
        assert!(matches!(
            queue.end(),
            Err(QueueError::IllegalTransition { .. })
        ));
    }

    #[test]
    fn abandon_keeps_remainder_unsent() {
        let mut queue = PendingRequestQueue::new(2);
        queue.start(batch(0, 5)).unwrap();

        queue.next_page().unwrap().unwrap();
        queue.update_responses(BulkResponse::new()).unwrap();
        queue.next_page().unwrap().unwrap();
        queue.abandon_in_flight().unwrap();

        assert!(queue.next_page().unwrap().is_none());

        let round = queue.end().unwrap();
        assert_eq!(round.pages.len(), 1);
        assert_eq!(round.abandoned.as_ref().map(Page::len), Some(2));
        assert_eq!(round.unsent.len(), 1);
        assert_eq!(round.unanswered_len(), 3);
    }

    #[test]
    fn page_request_strips_client_state() {
        let mut queue = PendingRequestQueue::new(10);
        queue.start(batch(1, 1)).unwrap();
        let page = queue.next_page().unwrap().unwrap();

        let request = page.to_request();
        assert_eq!(request.delete_ids, vec![ServerId::from(0)]);
        assert_eq!(request.save_items.len(), 1);
        assert_eq!(request.save_items[0].uuid, page.save_requests[0].key);
    }

    #[test]
    fn zero_page_size_is_clamped() {
        let queue: PendingRequestQueue<Figure> = PendingRequestQueue::new(0);
        assert_eq!(queue.page_size(), 1);
    }

    #[test]
    fn reset_returns_to_idle() {
        let mut queue = PendingRequestQueue::new(1);
        queue.start(batch(0, 3)).unwrap();
        queue.next_page().unwrap();

        queue.reset();
        assert!(queue.is_idle());
        assert_eq!(queue.pending_len(), 0);
    }
}
