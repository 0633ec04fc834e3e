//! Response matching
//!
//! Ties each save request of a page to its entry in the page's response.
//! The backend's contract is positional (`result[i]`/`errors[i]` belong to
//! the i-th save item); [`KeyedMatcher`] uses echoed correlation keys instead
//! and is selected through [`MatchingMode::Keyed`].

use crate::config::MatchingMode;
use entry_model::{
    BulkResponse, ChildPayload, CorrelationKey, DeleteRequest, ItemErrors, SaveRequest,
    SavedItem,
};
use std::collections::{HashMap, HashSet};
use std::fmt::Debug;

/// What a page's response says about one save request
#[derive(Debug, Clone, PartialEq)]
pub enum SaveMatch<'a, T> {
    /// Server returned a saved value
    Saved(&'a SavedItem<T>),
    /// Server returned validation errors
    Errored(&'a ItemErrors),
    /// Server said nothing
    Missing,
}

/// Strategy for matching save responses to requests
pub trait ResponseMatcher<T>: Send + Sync + Debug {
    /// One match per request, in request order
    fn match_saves<'a>(
        &self,
        requests: &[SaveRequest<T>],
        response: &'a BulkResponse<T>,
    ) -> Vec<SaveMatch<'a, T>>;

    /// Strategy name
    fn name(&self) -> &'static str;
}

/// Legacy positional contract
#[derive(Debug, Clone, Copy, Default)]
pub struct PositionalMatcher;

impl<T: ChildPayload> ResponseMatcher<T> for PositionalMatcher {
    fn match_saves<'a>(
        &self,
        requests: &[SaveRequest<T>],
        response: &'a BulkResponse<T>,
    ) -> Vec<SaveMatch<'a, T>> {
        let returned = response.result.as_ref().map_or(0, Vec::len);
        if returned > requests.len() {
            tracing::warn!(
                returned,
                sent = requests.len(),
                "more save results than requests"
            );
        }

        (0..requests.len())
            .map(|i| pick(response.saved_at(i), response.errors_at(i), i))
            .collect()
    }

    fn name(&self) -> &'static str {
        "positional"
    }
}

/// Matching by correlation keys echoed by the server
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyedMatcher;

impl<T: ChildPayload> ResponseMatcher<T> for KeyedMatcher {
    fn match_saves<'a>(
        &self,
        requests: &[SaveRequest<T>],
        response: &'a BulkResponse<T>,
    ) -> Vec<SaveMatch<'a, T>> {
        let mut saved: HashMap<CorrelationKey, &SavedItem<T>> = HashMap::new();
        for item in response.saved_items() {
            match item.uuid {
                Some(key) => {
                    saved.insert(key, item);
                }
                None => tracing::warn!("saved figure without correlation key ignored"),
            }
        }

        let mut errored: HashMap<CorrelationKey, &ItemErrors> = HashMap::new();
        for errors in response.item_errors() {
            match errors.iter().find_map(|e| e.client_id) {
                Some(key) => {
                    errored.insert(key, errors);
                }
                None => tracing::warn!("figure errors without correlation key ignored"),
            }
        }

        requests
            .iter()
            .enumerate()
            .map(|(i, r)| pick(saved.get(&r.key).copied(), errored.get(&r.key).copied(), i))
            .collect()
    }

    fn name(&self) -> &'static str {
        "keyed"
    }
}

fn pick<'a, T>(
    saved: Option<&'a SavedItem<T>>,
    errors: Option<&'a ItemErrors>,
    position: usize,
) -> SaveMatch<'a, T> {
    match (saved, errors) {
        (Some(item), Some(_)) => {
            // Server state changed, so the saved value wins
            tracing::warn!(position, "figure reported both saved and failed");
            SaveMatch::Saved(item)
        }
        (Some(item), None) => SaveMatch::Saved(item),
        (None, Some(errors)) => SaveMatch::Errored(errors),
        (None, None) => SaveMatch::Missing,
    }
}

/// Keys of the delete requests confirmed by a response, matched by id
#[must_use]
pub fn confirmed_deletes<T>(
    requests: &[DeleteRequest],
    response: &BulkResponse<T>,
) -> HashSet<CorrelationKey> {
    let mut confirmed = HashSet::new();
    for item in response.deleted_items() {
        match requests.iter().find(|r| r.id == item.id) {
            Some(request) => {
                confirmed.insert(request.key);
            }
            None => tracing::warn!(id = %item.id, "deleted figure that was not requested"),
        }
    }
    confirmed
}

/// Matcher for a configured mode
#[must_use]
pub fn matcher_for<T: ChildPayload>(mode: MatchingMode) -> Box<dyn ResponseMatcher<T>> {
    match mode {
        MatchingMode::Positional => Box::new(PositionalMatcher),
        MatchingMode::Keyed => Box::new(KeyedMatcher),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use entry_model::{ErrorPayload, Figure, ServerId};

    fn request(reported: u64) -> SaveRequest<Figure> {
        SaveRequest {
            key: CorrelationKey::new(),
            payload: Figure::new("NPL").with_reported(reported),
        }
    }

    fn saved(id: &str) -> SavedItem<Figure> {
        SavedItem::new(Figure::new("NPL").with_id(id))
    }

    #[test]
    fn positional_aligns_by_index() {
        let requests = vec![request(1), request(2), request(3)];
        let response = BulkResponse::new()
            .with_result(vec![Some(saved("1")), None])
            .with_errors(vec![None, Some(vec![ErrorPayload::field("reported", "required")])]);

        let matches = PositionalMatcher.match_saves(&requests, &response);

        assert!(matches!(matches[0], SaveMatch::Saved(_)));
        assert!(matches!(matches[1], SaveMatch::Errored(_)));
        assert!(matches!(matches[2], SaveMatch::Missing));
    }

    #[test]
    fn positional_with_null_sections_is_all_missing() {
        let requests = vec![request(1), request(2)];
        let response: BulkResponse<Figure> = BulkResponse::new();

        let matches = PositionalMatcher.match_saves(&requests, &response);
        assert!(matches.iter().all(|m| matches!(m, SaveMatch::Missing)));
    }

    #[test]
    fn saved_wins_over_errors() {
        let requests = vec![request(1)];
        let response = BulkResponse::new()
            .with_result(vec![Some(saved("1"))])
            .with_errors(vec![Some(vec![ErrorPayload::field("term", "bad")])]);

        let matches = PositionalMatcher.match_saves(&requests, &response);
        assert!(matches!(matches[0], SaveMatch::Saved(_)));
    }

    #[test]
    fn keyed_ignores_order() {
        let requests = vec![request(1), request(2)];
        let response = BulkResponse::new()
            .with_result(vec![Some(saved("20").with_uuid(requests[1].key))])
            .with_errors(vec![Some(vec![
                ErrorPayload::field("reported", "required").with_client_id(requests[0].key),
            ])]);

        let matches = KeyedMatcher.match_saves(&requests, &response);
        assert!(matches!(matches[0], SaveMatch::Errored(_)));
        match &matches[1] {
            SaveMatch::Saved(item) => assert_eq!(item.value.id, Some(ServerId::from("20"))),
            other => panic!("expected saved, got {other:?}"),
        }
    }

    #[test]
    fn keyed_without_echo_is_missing() {
        let requests = vec![request(1)];
        let response = BulkResponse::new().with_result(vec![Some(saved("1"))]);

        let matches = KeyedMatcher.match_saves(&requests, &response);
        assert!(matches!(matches[0], SaveMatch::Missing));
    }

    #[test]
    fn deletes_match_by_id() {
        let requests = vec![
            DeleteRequest {
                id: ServerId::from("7"),
                key: CorrelationKey::new(),
            },
            DeleteRequest {
                id: ServerId::from("8"),
                key: CorrelationKey::new(),
            },
        ];
        let response: BulkResponse<Figure> = BulkResponse::new().with_deleted(["8", "99"]);

        let confirmed = confirmed_deletes(&requests, &response);
        assert_eq!(confirmed.len(), 1);
        assert!(confirmed.contains(&requests[1].key));
    }

    #[test]
    fn matcher_for_mode() {
        assert_eq!(
            matcher_for::<Figure>(MatchingMode::Positional).name(),
            "positional"
        );
        assert_eq!(matcher_for::<Figure>(MatchingMode::Keyed).name(), "keyed");
    }
}
