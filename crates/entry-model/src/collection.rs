//! Figure collection owned by an entry form
//!
//! Lifecycle of a figure:
//! - added or cloned: fresh key, no server id, stale
//! - edited: stale
//! - removed: tombstoned when persisted, dropped otherwise
//! - submitted: see [`FigureCollection::plan_round`]

use crate::error::ModelError;
use crate::field_errors::FieldErrors;
use crate::ids::{CorrelationKey, ServerId};
use crate::record::{ChildPayload, ChildRecord, ParentPayload};
use crate::wire::SaveItem;

/// Create or update request for one figure
#[derive(Debug, Clone, PartialEq)]
pub struct SaveRequest<T> {
    /// Correlation key of the record
    pub key: CorrelationKey,
    /// Payload as sent to the server
    pub payload: T,
}

impl<T: ChildPayload> SaveRequest<T> {
    /// True when the record had no server id
    #[inline]
    #[must_use]
    pub fn is_new(&self) -> bool {
        self.payload.server_id().is_none()
    }

    /// Wire form of the request
    #[must_use]
    pub fn to_item(&self) -> SaveItem<T> {
        SaveItem {
            payload: self.payload.clone(),
            uuid: self.key,
        }
    }
}

/// Delete request for one persisted figure
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeleteRequest {
    /// Server id to delete
    pub id: ServerId,
    /// Correlation key of the record
    pub key: CorrelationKey,
}

/// Work for one submission round
#[derive(Debug, Clone, PartialEq)]
pub struct RequestBatch<T> {
    /// Deletions
    pub delete_requests: Vec<DeleteRequest>,
    /// Creates and updates
    pub save_requests: Vec<SaveRequest<T>>,
}

impl<T> Default for RequestBatch<T> {
    fn default() -> Self {
        Self {
            delete_requests: Vec::new(),
            save_requests: Vec::new(),
        }
    }
}

impl<T> RequestBatch<T> {
    /// Total number of requests
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.delete_requests.len() + self.save_requests.len()
    }

    /// True when there is nothing to send
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Result of [`FigureCollection::remove`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    /// Persisted record, kept until the delete is confirmed
    Tombstoned,
    /// Never-saved record, gone immediately
    Dropped,
}

/// Ordered figures of one entry
#[derive(Debug, Clone, PartialEq)]
pub struct FigureCollection<T> {
    records: Vec<ChildRecord<T>>,
}

impl<T> Default for FigureCollection<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
        }
    }
}

impl<T: ChildPayload> FigureCollection<T> {
    /// Empty collection
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Collection of figures loaded from the server
    pub fn from_loaded(payloads: impl IntoIterator<Item = T>) -> Self {
        Self {
            records: payloads.into_iter().map(ChildRecord::loaded).collect(),
        }
    }

    /// Add a new figure
    pub fn add(&mut self, payload: T) -> CorrelationKey {
        let record = ChildRecord::created(payload);
        let key = record.key;
        self.records.push(record);
        key
    }

    /// Insert a prepared record
    ///
    /// # Errors
    /// `ModelError::DuplicateKey` if the key is already used
    pub fn push_record(&mut self, record: ChildRecord<T>) -> Result<(), ModelError> {
        if self.position(record.key).is_some() {
            return Err(ModelError::DuplicateKey(record.key));
        }
        self.records.push(record);
        Ok(())
    }

    /// Copy a figure into a new, unsaved one placed after it
    ///
    /// # Errors
    /// `ModelError::UnknownRecord` if the key is unknown
    pub fn clone_record(&mut self, key: CorrelationKey) -> Result<CorrelationKey, ModelError> {
        let idx = self.position(key).ok_or(ModelError::UnknownRecord(key))?;
        let copy = ChildRecord::created(self.records[idx].payload.clone());
        let new_key = copy.key;
        self.records.insert(idx + 1, copy);
        Ok(new_key)
    }

    /// Edit a figure in place
    ///
    /// # Errors
    /// - `ModelError::UnknownRecord` if the key is unknown
    /// - `ModelError::RecordDeleted` if the figure is tombstoned
    pub fn edit<F>(&mut self, key: CorrelationKey, f: F) -> Result<(), ModelError>
    where
        F: FnOnce(&mut T),
    {
        let record = self
            .records
            .iter_mut()
            .find(|r| r.key == key)
            .ok_or(ModelError::UnknownRecord(key))?;

        if record.meta.deleted {
            return Err(ModelError::RecordDeleted(key));
        }

        f(&mut record.payload);
        record.meta.stale = true;
        record.errors = None;
        Ok(())
    }

    /// Remove a figure
    ///
    /// # Errors
    /// `ModelError::UnknownRecord` if the key is unknown
    pub fn remove(&mut self, key: CorrelationKey) -> Result<Removal, ModelError> {
        let idx = self.position(key).ok_or(ModelError::UnknownRecord(key))?;

        if self.records[idx].is_persisted() {
            self.records[idx].meta.deleted = true;
            Ok(Removal::Tombstoned)
        } else {
            self.records.remove(idx);
            Ok(Removal::Dropped)
        }
    }

    /// Point every stale figure at the saved parent
    pub fn attach_parent(&mut self, parent: &ServerId) {
        for record in self.records.iter_mut().filter(|r| r.meta.stale) {
            record.payload.attach_parent(parent);
        }
    }

    /// Build the requests of a submission round
    ///
    /// Tombstones that were never saved are pruned here and produce no
    /// request. Clean figures are left out entirely.
    pub fn plan_round(&mut self) -> RequestBatch<T> {
        let before = self.records.len();
        self.records.retain(|r| !(r.meta.deleted && !r.is_persisted()));
        let pruned = before - self.records.len();
        if pruned > 0 {
            tracing::debug!(pruned, "dropped unsaved tombstones");
        }

        let mut batch = RequestBatch::default();
        for record in &self.records {
            if record.meta.deleted {
                if let Some(id) = record.server_id() {
                    batch.delete_requests.push(DeleteRequest {
                        id: id.clone(),
                        key: record.key,
                    });
                }
            } else if record.meta.stale {
                batch.save_requests.push(SaveRequest {
                    key: record.key,
                    payload: record.payload.clone(),
                });
            }
        }
        batch
    }

    /// Look up a figure
    #[must_use]
    pub fn get(&self, key: CorrelationKey) -> Option<&ChildRecord<T>> {
        self.records.iter().find(|r| r.key == key)
    }

    /// Errors attached to a figure
    #[must_use]
    pub fn errors(&self, key: CorrelationKey) -> Option<&FieldErrors> {
        self.get(key).and_then(|r| r.errors.as_ref())
    }

    /// Every record, tombstones included
    #[inline]
    #[must_use]
    pub fn records(&self) -> &[ChildRecord<T>] {
        &self.records
    }

    /// Records shown to the user
    pub fn visible(&self) -> impl Iterator<Item = &ChildRecord<T>> {
        self.records.iter().filter(|r| r.is_visible())
    }

    /// Swap in a rebuilt record list, returning the previous one
    pub fn replace(&mut self, records: Vec<ChildRecord<T>>) -> Vec<ChildRecord<T>> {
        std::mem::replace(&mut self.records, records)
    }

    /// Number of records, tombstones included
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// True when anything awaits submission
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.records.iter().any(|r| r.meta.stale || r.meta.deleted)
    }

    fn position(&self, key: CorrelationKey) -> Option<usize> {
        self.records.iter().position(|r| r.key == key)
    }
}

/// Parent entry with its figures
#[derive(Debug, Clone)]
pub struct EntryForm<E, T> {
    /// Parent payload
    pub entry: E,
    /// Parent edited since the last save
    pub entry_dirty: bool,
    /// Child figures
    pub figures: FigureCollection<T>,
    /// Errors on the parent itself
    pub errors: Option<FieldErrors>,
}

impl<E: ParentPayload, T: ChildPayload> EntryForm<E, T> {
    /// New form around a parent
    pub fn new(entry: E) -> Self {
        let entry_dirty = entry.server_id().is_none();
        Self {
            entry,
            entry_dirty,
            figures: FigureCollection::new(),
            errors: None,
        }
    }

    /// With loaded figures
    #[must_use]
    pub fn with_figures(mut self, figures: FigureCollection<T>) -> Self {
        self.figures = figures;
        self
    }

    /// Edit the parent payload
    pub fn edit_entry<F>(&mut self, f: F)
    where
        F: FnOnce(&mut E),
    {
        f(&mut self.entry);
        self.entry_dirty = true;
    }

    /// True when the parent or any figure awaits submission
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.entry_dirty || self.figures.is_dirty()
    }
}
