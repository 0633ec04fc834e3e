//! Entry Model - figures, entries and the bulk mutation wire format
//!
//! Provides:
//! - Correlation keys and server ids
//! - Child records that keep client bookkeeping apart from server payloads
//! - The figure collection and its submission planning
//! - Request/response types of the paginated bulk figure mutation
//! - Structured field errors
//!
//! # Example
//!
//! ```rust
//! use entry_model::{Figure, FigureCollection};
//!
//! let mut figures = FigureCollection::new();
//! let key = figures.add(Figure::new("NPL").with_reported(120));
//!
//! let batch = figures.plan_round();
//! assert_eq!(batch.save_requests.len(), 1);
//! assert_eq!(batch.save_requests[0].key, key);
//! ```

#![warn(unreachable_pub)]

pub mod collection;
pub mod error;
pub mod field_errors;
pub mod figure;
pub mod ids;
pub mod record;
pub mod wire;

pub use collection::{
    DeleteRequest, EntryForm, FigureCollection, Removal, RequestBatch, SaveRequest,
};
pub use error::ModelError;
pub use field_errors::{FieldError, FieldErrors};
pub use figure::{Entry, Figure, FigureRole, FigureUnit, LinkedEntity, Quantifier};
pub use ids::{CorrelationKey, ServerId};
pub use record::{ChildPayload, ChildRecord, ClientMeta, LinkedOption, OptionKind, ParentPayload};
pub use wire::{
    BulkRequest, BulkResponse, DeletedItem, EntrySaveResponse, ErrorPayload, ItemErrors,
    SaveItem, SavedItem,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
