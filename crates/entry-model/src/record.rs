//! Child records and payload traits
//!
//! A [`ChildRecord`] keeps the server payload and the client bookkeeping in
//! separate fields. [`ClientMeta`] deliberately implements no serde traits so
//! it cannot end up in a network request.

use crate::field_errors::FieldErrors;
use crate::ids::{CorrelationKey, ServerId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Kinds of lookup entities that figures reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionKind {
    /// Source or publisher organization
    Organization,
    /// Free-form tag
    Tag,
    /// Context of violence lookup
    ContextOfViolence,
    /// Parent event
    Event,
}

impl OptionKind {
    /// All kinds, in display order
    pub const ALL: [OptionKind; 4] = [
        OptionKind::Organization,
        OptionKind::Tag,
        OptionKind::ContextOfViolence,
        OptionKind::Event,
    ];
}

/// Reference to a lookup entity carried by a payload
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkedOption {
    /// Entity kind
    pub kind: OptionKind,
    /// Entity id
    pub id: ServerId,
    /// Display name
    pub name: String,
}

impl LinkedOption {
    /// Create a new linked option
    pub fn new(kind: OptionKind, id: impl Into<ServerId>, name: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Payload of a child record (a figure)
pub trait ChildPayload:
    Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Server id, absent until the first successful save
    fn server_id(&self) -> Option<&ServerId>;

    /// Forget the server id (used when cloning a record)
    fn clear_server_id(&mut self);

    /// Point the payload at its saved parent
    fn attach_parent(&mut self, parent: &ServerId);

    /// Lookup entities referenced by this payload
    fn linked_options(&self) -> Vec<LinkedOption> {
        Vec::new()
    }
}

/// Payload of the parent record (an entry)
pub trait ParentPayload: Clone + Debug + Send + Sync + 'static {
    /// Server id, absent until the first successful save
    fn server_id(&self) -> Option<&ServerId>;

    /// Lookup entities referenced by this payload
    fn linked_options(&self) -> Vec<LinkedOption> {
        Vec::new()
    }
}

/// Client-only bookkeeping for a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClientMeta {
    /// Edited locally since the last confirmed save
    pub stale: bool,
    /// Tombstone: hidden, waiting for delete confirmation
    pub deleted: bool,
    /// Never saved on the server
    pub is_new: bool,
}

impl ClientMeta {
    /// Meta for a record created on the client
    #[inline]
    #[must_use]
    pub fn fresh() -> Self {
        Self {
            stale: true,
            deleted: false,
            is_new: true,
        }
    }

    /// Meta for a record loaded from the server
    #[inline]
    #[must_use]
    pub fn persisted() -> Self {
        Self::default()
    }
}

/// A figure as held by the form
#[derive(Debug, Clone, PartialEq)]
pub struct ChildRecord<T> {
    /// Correlation key, immutable
    pub key: CorrelationKey,
    /// Server payload
    pub payload: T,
    /// Client bookkeeping
    pub meta: ClientMeta,
    /// Errors surfaced by the last submission
    pub errors: Option<FieldErrors>,
}

impl<T: ChildPayload> ChildRecord<T> {
    /// Record loaded from the server
    pub fn loaded(payload: T) -> Self {
        let is_new = payload.server_id().is_none();
        Self {
            key: CorrelationKey::new(),
            payload,
            meta: ClientMeta {
                is_new,
                ..ClientMeta::persisted()
            },
            errors: None,
        }
    }

    /// Record created on the client
    pub fn created(mut payload: T) -> Self {
        payload.clear_server_id();
        Self {
            key: CorrelationKey::new(),
            payload,
            meta: ClientMeta::fresh(),
            errors: None,
        }
    }

    /// Server id of the payload
    #[inline]
    #[must_use]
    pub fn server_id(&self) -> Option<&ServerId> {
        self.payload.server_id()
    }

    /// True when the server knows this record
    #[inline]
    #[must_use]
    pub fn is_persisted(&self) -> bool {
        self.payload.server_id().is_some()
    }

    /// True unless tombstoned
    #[inline]
    #[must_use]
    pub fn is_visible(&self) -> bool {
        !self.meta.deleted
    }

    /// Replace the payload with a confirmed server value
    pub fn confirm_saved(&mut self, value: T) {
        self.payload = value;
        self.meta.stale = false;
        self.meta.is_new = false;
        self.errors = None;
    }

    /// Attach errors from a failed submission; the record stays stale
    pub fn attach_errors(&mut self, errors: FieldErrors) {
        self.meta.stale = true;
        self.errors = Some(errors);
    }
}
