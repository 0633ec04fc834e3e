//! Request and response shapes of the bulk figure mutation
//!
//! Save results and save errors are positionally aligned with the save items
//! of the request that produced them: `result[i]` and `errors[i]` both refer
//! to `save_items[i]`, with `null` on whichever side did not apply. Deleted
//! items are matched by id.

use crate::ids::{CorrelationKey, ServerId};
use serde::{Deserialize, Serialize};

/// One figure to create or update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveItem<T> {
    /// Payload sent to the server (no client bookkeeping)
    #[serde(flatten)]
    pub payload: T,
    /// Correlation key carried alongside
    pub uuid: CorrelationKey,
}

/// Body of one bulk mutation call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkRequest<T> {
    /// Figures to create or update
    pub save_items: Vec<SaveItem<T>>,
    /// Server ids of figures to delete
    pub delete_ids: Vec<ServerId>,
}

impl<T> BulkRequest<T> {
    /// Total number of requests carried
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.save_items.len() + self.delete_ids.len()
    }

    /// True when nothing is carried
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Server value of a saved figure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedItem<T> {
    /// Authoritative payload returned by the server
    #[serde(flatten)]
    pub value: T,
    /// Correlation key, when the server echoes it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<CorrelationKey>,
}

impl<T> SavedItem<T> {
    /// Saved value without an echoed key
    #[inline]
    pub fn new(value: T) -> Self {
        Self { value, uuid: None }
    }

    /// Attach the echoed key
    #[inline]
    #[must_use]
    pub fn with_uuid(mut self, uuid: CorrelationKey) -> Self {
        self.uuid = Some(uuid);
        self
    }
}

/// Confirmation of a deleted figure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedItem {
    /// Server id that was deleted
    pub id: ServerId,
}

/// Backend validation error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    /// Offending field
    pub field: String,
    /// Human-readable message
    #[serde(default)]
    pub messages: Option<String>,
    /// Errors of a nested object
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_errors: Option<Vec<ErrorPayload>>,
    /// Correlation key, when the server echoes it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<CorrelationKey>,
}

impl ErrorPayload {
    /// Simple field error
    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            messages: Some(message.into()),
            object_errors: None,
            client_id: None,
        }
    }

    /// Attach the echoed key
    #[inline]
    #[must_use]
    pub fn with_client_id(mut self, key: CorrelationKey) -> Self {
        self.client_id = Some(key);
        self
    }
}

/// Errors reported for one save item
pub type ItemErrors = Vec<ErrorPayload>;

/// Response of one bulk mutation call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkResponse<T> {
    /// Per-item errors, aligned with the save items
    #[serde(default)]
    pub errors: Option<Vec<Option<ItemErrors>>>,
    /// Per-item saved values, aligned with the save items
    #[serde(default)]
    pub result: Option<Vec<Option<SavedItem<T>>>>,
    /// Deleted figures
    #[serde(default)]
    pub deleted_result: Option<Vec<DeletedItem>>,
}

impl<T> Default for BulkResponse<T> {
    fn default() -> Self {
        Self {
            errors: None,
            result: None,
            deleted_result: None,
        }
    }
}

impl<T> BulkResponse<T> {
    /// Empty response
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With saved values
    #[inline]
    #[must_use]
    pub fn with_result(mut self, result: Vec<Option<SavedItem<T>>>) -> Self {
        self.result = Some(result);
        self
    }

    /// With per-item errors
    #[inline]
    #[must_use]
    pub fn with_errors(mut self, errors: Vec<Option<ItemErrors>>) -> Self {
        self.errors = Some(errors);
        self
    }

    /// With deleted ids
    #[must_use]
    pub fn with_deleted<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<ServerId>,
    {
        self.deleted_result = Some(
            ids.into_iter()
                .map(|id| DeletedItem { id: id.into() })
                .collect(),
        );
        self
    }

    /// Saved value at a save position
    #[must_use]
    pub fn saved_at(&self, index: usize) -> Option<&SavedItem<T>> {
        self.result
            .as_ref()
            .and_then(|r| r.get(index))
            .and_then(Option::as_ref)
    }

    /// Errors at a save position
    #[must_use]
    pub fn errors_at(&self, index: usize) -> Option<&ItemErrors> {
        self.errors
            .as_ref()
            .and_then(|e| e.get(index))
            .and_then(Option::as_ref)
    }

    /// Every saved value present
    pub fn saved_items(&self) -> impl Iterator<Item = &SavedItem<T>> {
        self.result.iter().flatten().flatten()
    }

    /// Every error list present
    pub fn item_errors(&self) -> impl Iterator<Item = &ItemErrors> {
        self.errors.iter().flatten().flatten()
    }

    /// Every deleted item present
    pub fn deleted_items(&self) -> impl Iterator<Item = &DeletedItem> {
        self.deleted_result.iter().flatten()
    }
}

/// Response of the single parent save
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntrySaveResponse<E> {
    /// Saved parent
    #[serde(default)]
    pub result: Option<E>,
    /// Validation errors
    #[serde(default)]
    pub errors: Option<Vec<ErrorPayload>>,
}

impl<E> EntrySaveResponse<E> {
    /// Successful save
    #[inline]
    pub fn ok(result: E) -> Self {
        Self {
            result: Some(result),
            errors: None,
        }
    }

    /// Rejected save
    #[inline]
    #[must_use]
    pub fn rejected(errors: Vec<ErrorPayload>) -> Self {
        Self {
            result: None,
            errors: Some(errors),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Payload {
        id: Option<String>,
        reported: u32,
    }

    #[test]
    fn request_uses_camel_case_and_flattens_payload() {
        let key = CorrelationKey::new();
        let request = BulkRequest {
            save_items: vec![SaveItem {
                payload: Payload {
                    id: None,
                    reported: 12,
                },
                uuid: key,
            }],
            delete_ids: vec![ServerId::from("7")],
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["deleteIds"], json!(["7"]));
        assert_eq!(value["saveItems"][0]["reported"], json!(12));
        assert_eq!(value["saveItems"][0]["uuid"], json!(key.to_string()));
    }

    #[test]
    fn response_parses_sparse_arrays() {
        let body = json!({
            "result": [{ "id": "101", "reported": 3 }, null],
            "errors": [null, [{ "field": "reported", "messages": "required" }]],
            "deletedResult": [{ "id": "7" }]
        });

        let response: BulkResponse<Payload> = serde_json::from_value(body).unwrap();
        assert_eq!(
            response.saved_at(0).map(|s| s.value.id.clone()),
            Some(Some("101".to_string()))
        );
        assert!(response.saved_at(1).is_none());
        assert!(response.errors_at(0).is_none());
        assert_eq!(response.errors_at(1).map(Vec::len), Some(1));
        assert_eq!(response.deleted_items().count(), 1);
    }

    #[test]
    fn null_sections_parse_as_none() {
        let body = json!({ "result": null, "errors": null, "deletedResult": null });
        let response: BulkResponse<Payload> = serde_json::from_value(body).unwrap();
        assert_eq!(response.saved_items().count(), 0);
        assert_eq!(response.item_errors().count(), 0);
        assert!(response.saved_at(0).is_none());
    }

    #[test]
    fn short_arrays_read_as_missing() {
        let response: BulkResponse<Payload> = BulkResponse::new().with_result(vec![]);
        assert!(response.saved_at(3).is_none());
    }
}
