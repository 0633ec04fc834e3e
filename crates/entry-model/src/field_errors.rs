//! Structured field errors
//!
//! Server error payloads are folded into the same tree shape the form's
//! synchronous validation produces, so a failed figure highlights the right
//! field when it is shown again.

use crate::wire::ErrorPayload;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Field names the backend uses for errors not tied to one field
const NON_FIELD_KEYS: [&str; 2] = ["nonFieldErrors", "__all__"];

/// Error attached to a single field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldError {
    /// Plain message
    Message(String),
    /// Errors of a nested object
    Nested(FieldErrors),
}

/// Error tree for one record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldErrors {
    /// Errors not tied to a field
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub non_field: Vec<String>,
    /// Errors keyed by field name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, FieldError>,
}

impl FieldErrors {
    /// Empty error tree
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Tree holding a single non-field message
    #[inline]
    pub fn non_field(message: impl Into<String>) -> Self {
        Self {
            non_field: vec![message.into()],
            fields: BTreeMap::new(),
        }
    }

    /// Add a field message
    #[must_use]
    pub fn with_field(mut self, field: impl Into<String>, message: impl Into<String>) -> Self {
        self.add_field(field, message);
        self
    }

    /// Add a field message, joining with any message already present
    pub fn add_field(&mut self, field: impl Into<String>, message: impl Into<String>) {
        let message = message.into();
        match self.fields.entry(field.into()) {
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(FieldError::Message(message));
            }
            std::collections::btree_map::Entry::Occupied(mut slot) => match slot.get_mut() {
                FieldError::Message(existing) => {
                    existing.push_str("; ");
                    existing.push_str(&message);
                }
                FieldError::Nested(nested) => nested.non_field.push(message),
            },
        }
    }

    /// Add a non-field message
    pub fn add_non_field(&mut self, message: impl Into<String>) {
        self.non_field.push(message.into());
    }

    /// Look up a field's error
    #[inline]
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&FieldError> {
        self.fields.get(field)
    }

    /// Message for a field, if it holds a plain message
    #[must_use]
    pub fn message(&self, field: &str) -> Option<&str> {
        match self.fields.get(field) {
            Some(FieldError::Message(m)) => Some(m.as_str()),
            _ => None,
        }
    }

    /// True when nothing is recorded
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.non_field.is_empty() && self.fields.is_empty()
    }

    /// Build from backend error payloads
    #[must_use]
    pub fn from_payloads(payloads: &[ErrorPayload]) -> Self {
        let mut errors = Self::new();

        for payload in payloads {
            let message = payload
                .messages
                .clone()
                .unwrap_or_else(|| "Invalid value".to_string());

            if NON_FIELD_KEYS.contains(&payload.field.as_str()) {
                errors.add_non_field(message);
                continue;
            }

            match payload.object_errors.as_deref() {
                Some(children) if !children.is_empty() => {
                    let mut nested = Self::from_payloads(children);
                    if let Some(own) = &payload.messages {
                        nested.add_non_field(own.clone());
                    }
                    errors
                        .fields
                        .insert(payload.field.clone(), FieldError::Nested(nested));
                }
                _ => errors.add_field(payload.field.clone(), message),
            }
        }

        errors
    }
}
