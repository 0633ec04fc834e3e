//! Response reconciler
//!
//! Classifies every answered request of a round and merges the result back
//! into the form's figures. Each request ends up in exactly one bucket:
//!
//! | request | response                     | outcome          |
//! |---------|------------------------------|------------------|
//! | save    | saved value                  | `Saved`          |
//! | save    | errors                       | `Errored`        |
//! | save    | nothing                      | `SaveSkipped`    |
//! | delete  | id in `deletedResult`        | `Deleted`        |
//! | delete  | id absent                    | `DeleteSkipped`  |
//!
//! Requests of an abandoned or unsent page get no outcome; their figures are
//! left exactly as they were.

use crate::config::MatchingMode;
use crate::matcher::{confirmed_deletes, matcher_for, ResponseMatcher, SaveMatch};
use crate::queue::RoundRecord;
use entry_model::{
    ChildPayload, ChildRecord, CorrelationKey, FieldErrors, FigureCollection, LinkedOption,
};
use indexmap::IndexMap;
use serde::Serialize;
use std::cmp::Ordering;

/// Non-field error for a save that got no response
pub const SAVE_SKIPPED_MESSAGE: &str = "Could not save figure. Please try again.";

/// Non-field error for a delete that got no confirmation
pub const DELETE_SKIPPED_MESSAGE: &str = "Could not delete figure. Please try again.";

/// Classification of one request
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    /// Saved; `is_new` when the figure had no server id before
    Saved {
        /// Authoritative server value
        value: T,
        /// First save of this figure
        is_new: bool,
    },
    /// Deletion confirmed
    Deleted,
    /// Server rejected the save
    Errored(FieldErrors),
    /// Save sent, nothing came back
    SaveSkipped,
    /// Delete sent, no confirmation came back
    DeleteSkipped,
}

/// Per-bucket counts of a round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RoundCounts {
    /// Saves confirmed
    pub saved: usize,
    /// Of those, first saves
    pub created: usize,
    /// Deletes confirmed
    pub deleted: usize,
    /// Saves rejected
    pub errored: usize,
    /// Saves without response
    pub save_skipped: usize,
    /// Deletes without confirmation
    pub delete_skipped: usize,
}

impl RoundCounts {
    /// Saves that did not go through
    #[inline]
    #[must_use]
    pub fn failed_saves(&self) -> usize {
        self.errored + self.save_skipped
    }

    /// Requests classified
    #[inline]
    #[must_use]
    pub fn total(&self) -> usize {
        self.saved + self.deleted + self.errored + self.save_skipped + self.delete_skipped
    }

    /// True when every request went through
    #[inline]
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.failed_saves() == 0 && self.delete_skipped == 0
    }

    fn record<T>(&mut self, outcome: &Outcome<T>) {
        match outcome {
            Outcome::Saved { is_new, .. } => {
                self.saved += 1;
                if *is_new {
                    self.created += 1;
                }
            }
            Outcome::Deleted => self.deleted += 1,
            Outcome::Errored(_) => self.errored += 1,
            Outcome::SaveSkipped => self.save_skipped += 1,
            Outcome::DeleteSkipped => self.delete_skipped += 1,
        }
    }
}

/// Outcomes of a round, keyed by correlation key in dispatch order
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation<T> {
    outcomes: IndexMap<CorrelationKey, Outcome<T>>,
    counts: RoundCounts,
}

impl<T> Default for Reconciliation<T> {
    fn default() -> Self {
        Self {
            outcomes: IndexMap::new(),
            counts: RoundCounts::default(),
        }
    }
}

impl<T: ChildPayload> Reconciliation<T> {
    /// Outcome for a figure
    #[inline]
    #[must_use]
    pub fn outcome(&self, key: CorrelationKey) -> Option<&Outcome<T>> {
        self.outcomes.get(&key)
    }

    /// Every outcome, in dispatch order
    pub fn outcomes(&self) -> impl Iterator<Item = (&CorrelationKey, &Outcome<T>)> {
        self.outcomes.iter()
    }

    /// Bucket counts
    #[inline]
    #[must_use]
    pub fn counts(&self) -> RoundCounts {
        self.counts
    }

    /// Number of classified requests
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    /// True when nothing was classified
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Server values of saved figures
    pub fn saved_values(&self) -> impl Iterator<Item = &T> {
        self.outcomes.values().filter_map(|o| match o {
            Outcome::Saved { value, .. } => Some(value),
            _ => None,
        })
    }

    /// Lookup entities referenced by saved figures
    #[must_use]
    pub fn linked_options(&self) -> Vec<LinkedOption> {
        self.saved_values()
            .flat_map(|value| value.linked_options())
            .collect()
    }

    /// Rebuild the collection from this round's outcomes
    ///
    /// - untouched figures stay as they are, in place
    /// - saved figures take the server value and lose their stale flag
    /// - deleted figures disappear
    /// - errored and skipped figures keep their payload, stay stale and
    ///   carry the error
    /// - first saves move to the end, ordered by numeric server id
    pub fn merge_into(&self, figures: &mut FigureCollection<T>) {
        let previous = figures.replace(Vec::new());
        let mut kept = Vec::with_capacity(previous.len());
        let mut created: Vec<ChildRecord<T>> = Vec::new();

        for mut record in previous {
            if record.meta.deleted && !record.is_persisted() {
                continue;
            }

            match self.outcomes.get(&record.key) {
                None => kept.push(record),
                Some(Outcome::Saved { value, is_new }) => {
                    record.confirm_saved(value.clone());
                    if *is_new {
                        created.push(record);
                    } else {
                        kept.push(record);
                    }
                }
                Some(Outcome::Deleted) => {}
                Some(Outcome::Errored(errors)) => {
                    record.attach_errors(errors.clone());
                    kept.push(record);
                }
                Some(Outcome::SaveSkipped) => {
                    record.attach_errors(FieldErrors::non_field(SAVE_SKIPPED_MESSAGE));
                    kept.push(record);
                }
                Some(Outcome::DeleteSkipped) => {
                    record.attach_errors(FieldErrors::non_field(DELETE_SKIPPED_MESSAGE));
                    kept.push(record);
                }
            }
        }

        created.sort_by(|a, b| match (a.server_id(), b.server_id()) {
            (Some(x), Some(y)) => x.numeric_order(y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        });
        kept.extend(created);
        figures.replace(kept);
    }

    fn insert(&mut self, key: CorrelationKey, outcome: Outcome<T>) {
        self.counts.record(&outcome);
        if self.outcomes.insert(key, outcome).is_some() {
            tracing::warn!(%key, "figure classified twice in one round");
        }
    }
}

/// Turns a [`RoundRecord`] into a [`Reconciliation`]
#[derive(Debug)]
pub struct Reconciler<T> {
    matcher: Box<dyn ResponseMatcher<T>>,
}

impl<T: ChildPayload> Reconciler<T> {
    /// Create with an explicit matcher
    #[inline]
    #[must_use]
    pub fn new(matcher: Box<dyn ResponseMatcher<T>>) -> Self {
        Self { matcher }
    }

    /// Create for a configured matching mode
    #[inline]
    #[must_use]
    pub fn for_mode(mode: MatchingMode) -> Self {
        Self::new(matcher_for(mode))
    }

    /// Name of the matcher in use
    #[inline]
    #[must_use]
    pub fn matcher_name(&self) -> &'static str {
        self.matcher.name()
    }

    /// Classify every answered request of a round
    #[must_use]
    pub fn reconcile(&self, round: &RoundRecord<T>) -> Reconciliation<T> {
        let mut result = Reconciliation::default();

        for answered in &round.pages {
            let page = &answered.page;
            let response = &answered.response;

            let matches = self.matcher.match_saves(&page.save_requests, response);
            for (request, matched) in page.save_requests.iter().zip(matches) {
                let outcome = match matched {
                    SaveMatch::Saved(item) => Outcome::Saved {
                        value: item.value.clone(),
                        is_new: request.is_new(),
                    },
                    SaveMatch::Errored(errors) => {
                        Outcome::Errored(FieldErrors::from_payloads(errors))
                    }
                    SaveMatch::Missing => {
                        tracing::error!(
                            key = %request.key,
                            page = page.index,
                            "Could not save figure: no result or error returned"
                        );
                        Outcome::SaveSkipped
                    }
                };
                result.insert(request.key, outcome);
            }

            let confirmed = confirmed_deletes(&page.delete_requests, response);
            for request in &page.delete_requests {
                let outcome = if confirmed.contains(&request.key) {
                    Outcome::Deleted
                } else {
                    tracing::error!(
                        key = %request.key,
                        id = %request.id,
                        page = page.index,
                        "Could not delete figure: deletion not confirmed"
                    );
                    Outcome::DeleteSkipped
                };
                result.insert(request.key, outcome);
            }
        }

        let counts = result.counts;
        tracing::info!(
            saved = counts.saved,
            deleted = counts.deleted,
            errored = counts.errored,
            save_skipped = counts.save_skipped,
            delete_skipped = counts.delete_skipped,
            unanswered = round.unanswered_len(),
            "round reconciled"
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{AnsweredPage, Page};
    use entry_model::{
        BulkResponse, ErrorPayload, Figure, RequestBatch, SaveRequest, SavedItem, ServerId,
    };

    fn single_page(
        save_requests: Vec<SaveRequest<Figure>>,
        response: BulkResponse<Figure>,
    ) -> RoundRecord<Figure> {
        RoundRecord {
            pages: vec![AnsweredPage {
                page: Page {
                    index: 0,
                    delete_requests: Vec::new(),
                    save_requests,
                },
                response,
            }],
            abandoned: None,
            unsent: RequestBatch::default(),
        }
    }

    #[test]
    fn missing_response_is_skipped_not_dropped() {
        let mut figures = FigureCollection::new();
        let key = figures.add(Figure::new("NPL").with_reported(4));
        let batch = figures.plan_round();

        let round = single_page(batch.save_requests, BulkResponse::new());
        let reconciliation = Reconciler::for_mode(MatchingMode::Positional).reconcile(&round);

        assert_eq!(reconciliation.outcome(key), Some(&Outcome::SaveSkipped));
        assert_eq!(reconciliation.counts().save_skipped, 1);

        reconciliation.merge_into(&mut figures);
        let record = figures.get(key).unwrap();
        assert!(record.meta.stale);
        assert_eq!(
            record.errors.as_ref().map(|e| e.non_field.clone()),
            Some(vec![SAVE_SKIPPED_MESSAGE.to_string()])
        );
    }

    #[test]
    fn errored_save_keeps_payload_and_attaches_errors() {
        let mut figures = FigureCollection::new();
        let key = figures.add(Figure::new("NPL"));
        let batch = figures.plan_round();

        let response = BulkResponse::new()
            .with_errors(vec![Some(vec![ErrorPayload::field("reported", "required")])]);
        let round = single_page(batch.save_requests, response);
        let reconciliation = Reconciler::for_mode(MatchingMode::Positional).reconcile(&round);
        reconciliation.merge_into(&mut figures);

        let record = figures.get(key).unwrap();
        assert!(record.meta.stale);
        assert!(record.server_id().is_none());
        assert_eq!(
            record.errors.as_ref().and_then(|e| e.message("reported")),
            Some("required")
        );
    }

    #[test]
    fn update_stays_in_place() {
        let mut figures = FigureCollection::from_loaded(vec![
            Figure::new("NPL").with_id("1").with_reported(1),
            Figure::new("NPL").with_id("2").with_reported(2),
        ]);
        let first = figures.records()[0].key;
        figures.edit(first, |f| f.reported = Some(10)).unwrap();
        let batch = figures.plan_round();

        let response = BulkResponse::new().with_result(vec![Some(SavedItem::new(
            Figure::new("NPL").with_id("1").with_reported(10),
        ))]);
        let round = single_page(batch.save_requests, response);
        let reconciliation = Reconciler::for_mode(MatchingMode::Positional).reconcile(&round);

        assert_eq!(reconciliation.counts().created, 0);
        reconciliation.merge_into(&mut figures);

        assert_eq!(figures.records()[0].key, first);
        assert_eq!(figures.records()[0].payload.reported, Some(10));
        assert!(!figures.records()[0].meta.stale);
    }

    #[test]
    fn new_records_sorted_by_numeric_id() {
        let mut figures = FigureCollection::new();
        let a = figures.add(Figure::new("NPL").with_reported(1));
        let b = figures.add(Figure::new("NPL").with_reported(2));
        let batch = figures.plan_round();

        let response = BulkResponse::new().with_result(vec![
            Some(SavedItem::new(Figure::new("NPL").with_id("10"))),
            Some(SavedItem::new(Figure::new("NPL").with_id("9"))),
        ]);
        let round = single_page(batch.save_requests, response);
        Reconciler::for_mode(MatchingMode::Positional)
            .reconcile(&round)
            .merge_into(&mut figures);

        let ids: Vec<_> = figures
            .records()
            .iter()
            .map(|r| r.server_id().cloned())
            .collect();
        assert_eq!(
            ids,
            vec![Some(ServerId::from("9")), Some(ServerId::from("10"))]
        );
        assert_eq!(figures.records()[0].key, b);
        assert_eq!(figures.records()[1].key, a);
    }

    #[test]
    fn counts_helpers() {
        let counts = RoundCounts {
            saved: 2,
            created: 1,
            deleted: 1,
            errored: 1,
            save_skipped: 1,
            delete_skipped: 0,
        };
        assert_eq!(counts.failed_saves(), 2);
        assert_eq!(counts.total(), 5);
        assert!(!counts.all_succeeded());
        assert!(RoundCounts::default().all_succeeded());
    }
}
