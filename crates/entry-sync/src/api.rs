//! Backend seams
//!
//! The coordinator talks to two endpoints: the single parent save, and the
//! paginated bulk figure mutation. Both are black boxes reached through
//! these traits.

use crate::error::TransportError;
use async_trait::async_trait;
use entry_model::{
    BulkRequest, BulkResponse, ChildPayload, EntrySaveResponse, ParentPayload, ServerId,
};

/// Single-entity save of the parent record
#[async_trait]
pub trait EntryApi<E: ParentPayload>: Send + Sync {
    /// Create or update the parent
    async fn save_entry(&self, entry: E) -> Result<EntrySaveResponse<E>, TransportError>;
}

/// Paginated bulk create/update/delete of figures
#[async_trait]
pub trait FigureBulkApi<T: ChildPayload>: Send + Sync {
    /// Send one page of saves and deletes for a parent
    async fn bulk_save(
        &self,
        entry: &ServerId,
        request: BulkRequest<T>,
    ) -> Result<BulkResponse<T>, TransportError>;
}
