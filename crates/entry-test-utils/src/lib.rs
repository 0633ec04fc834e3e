//! Testing utilities for the entry sync workspace
//!
//! Shared fixtures and scripted backends.

#![allow(missing_docs)]

use async_trait::async_trait;
use entry_model::{
    BulkRequest, BulkResponse, ChildPayload, Entry, EntryForm, EntrySaveResponse, ErrorPayload,
    Figure, FigureCollection, ParentPayload, SavedItem, ServerId,
};
use entry_sync::{EntryApi, FigureBulkApi, TransportError};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

pub fn figure(reported: u64) -> Figure {
    Figure::new("NPL").with_reported(reported)
}

pub fn persisted_figure(id: impl Into<ServerId>, reported: u64) -> Figure {
    figure(reported).with_id(id)
}

pub fn entry(title: &str) -> Entry {
    Entry::new(title)
}

pub fn saved_entry(id: impl Into<ServerId>) -> Entry {
    Entry::new("Floods in the Terai").with_id(id)
}

/// Saved entry with loaded figures
pub fn loaded_form(
    entry_id: impl Into<ServerId>,
    figures: Vec<Figure>,
) -> EntryForm<Entry, Figure> {
    EntryForm::new(saved_entry(entry_id)).with_figures(FigureCollection::from_loaded(figures))
}

pub fn saved(value: Figure) -> Option<SavedItem<Figure>> {
    Some(SavedItem::new(value))
}

pub fn field_error(field: &str, message: &str) -> Option<Vec<ErrorPayload>> {
    Some(vec![ErrorPayload::field(field, message)])
}

/// Bulk endpoint answering from a script, one entry per call
///
/// Panics if two calls overlap. Once the script runs out every call fails
/// with a malformed-response error.
#[derive(Debug)]
pub struct ScriptedBulkApi<T> {
    script: Mutex<VecDeque<Result<BulkResponse<T>, TransportError>>>,
    requests: Mutex<Vec<(ServerId, BulkRequest<T>)>>,
    in_flight: AtomicBool,
    calls: AtomicUsize,
}

impl<T: ChildPayload> ScriptedBulkApi<T> {
    pub fn new(script: impl IntoIterator<Item = Result<BulkResponse<T>, TransportError>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
            in_flight: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    /// Answer every call with an empty response
    pub fn empty(calls: usize) -> Self {
        Self::new((0..calls).map(|_| Ok(BulkResponse::new())))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Requests received, in call order
    pub fn requests(&self) -> Vec<(ServerId, BulkRequest<T>)> {
        self.requests.lock().clone()
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().len()
    }
}

#[async_trait]
impl<T: ChildPayload> FigureBulkApi<T> for ScriptedBulkApi<T> {
    async fn bulk_save(
        &self,
        entry: &ServerId,
        request: BulkRequest<T>,
    ) -> Result<BulkResponse<T>, TransportError> {
        assert!(
            !self.in_flight.swap(true, Ordering::SeqCst),
            "bulk call issued while another was in flight"
        );
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push((entry.clone(), request));

        tokio::task::yield_now().await;

        let answer = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Malformed("script exhausted".into())));
        self.in_flight.store(false, Ordering::SeqCst);
        answer
    }
}

/// Entry endpoint giving the same answer to every call
#[derive(Debug)]
pub struct StaticEntryApi<E> {
    answer: Result<EntrySaveResponse<E>, TransportError>,
    calls: AtomicUsize,
}

impl<E: ParentPayload> StaticEntryApi<E> {
    pub fn new(answer: Result<EntrySaveResponse<E>, TransportError>) -> Self {
        Self {
            answer,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn saving(entry: E) -> Self {
        Self::new(Ok(EntrySaveResponse::ok(entry)))
    }

    pub fn rejecting(errors: Vec<ErrorPayload>) -> Self {
        Self::new(Ok(EntrySaveResponse::rejected(errors)))
    }

    pub fn failing(error: TransportError) -> Self {
        Self::new(Err(error))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<E: ParentPayload> EntryApi<E> for StaticEntryApi<E> {
    async fn save_entry(&self, _entry: E) -> Result<EntrySaveResponse<E>, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answer.clone()
    }
}
