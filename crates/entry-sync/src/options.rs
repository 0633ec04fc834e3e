//! Client-side option caches
//!
//! Dropdowns for organizations, tags, contexts of violence and events read
//! from these caches. Saved figures feed the entities they reference back in,
//! so the dropdowns stay populated without another fetch.
//!
//! Caches only grow: merging deduplicates by id and keeps the first-seen
//! entry and its position.

use entry_model::{LinkedOption, OptionKind, ServerId};
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// Deduplicated options of one kind
#[derive(Debug, Clone, Default)]
pub struct OptionCache {
    items: IndexMap<ServerId, LinkedOption>,
}

impl OptionCache {
    /// Empty cache
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add options not seen before; returns how many were new
    pub fn merge(&mut self, items: impl IntoIterator<Item = LinkedOption>) -> usize {
        let before = self.items.len();
        for item in items {
            self.items.entry(item.id.clone()).or_insert(item);
        }
        self.items.len() - before
    }

    /// Look up an option
    #[inline]
    #[must_use]
    pub fn get(&self, id: &ServerId) -> Option<&LinkedOption> {
        self.items.get(id)
    }

    /// Options in first-seen order
    pub fn iter(&self) -> impl Iterator<Item = &LinkedOption> {
        self.items.values()
    }

    /// Number of options
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Option caches of every kind, shared by the widgets of a form
#[derive(Debug, Default)]
pub struct OptionStore {
    caches: RwLock<BTreeMap<OptionKind, OptionCache>>,
}

impl OptionStore {
    /// Empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge options of any kinds; returns how many were new
    pub fn merge(&self, items: impl IntoIterator<Item = LinkedOption>) -> usize {
        let mut caches = self.caches.write();
        let mut added = 0;
        for item in items {
            added += caches.entry(item.kind).or_default().merge(std::iter::once(item));
        }
        if added > 0 {
            tracing::debug!(added, "option caches updated");
        }
        added
    }

    /// Snapshot of one kind's options
    #[must_use]
    pub fn options(&self, kind: OptionKind) -> Vec<LinkedOption> {
        self.caches
            .read()
            .get(&kind)
            .map(|c| c.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of options of one kind
    #[must_use]
    pub fn len(&self, kind: OptionKind) -> usize {
        self.caches.read().get(&kind).map_or(0, OptionCache::len)
    }

    /// True when an option is cached
    #[must_use]
    pub fn contains(&self, kind: OptionKind, id: &ServerId) -> bool {
        self.caches
            .read()
            .get(&kind)
            .is_some_and(|c| c.get(id).is_some())
    }

    /// True when nothing is cached
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.caches.read().values().all(OptionCache::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn org(id: &str, name: &str) -> LinkedOption {
        LinkedOption::new(OptionKind::Organization, id, name)
    }

    #[test]
    fn cache_dedups_by_id() {
        let mut cache = OptionCache::new();
        assert_eq!(cache.merge(vec![org("1", "OCHA"), org("2", "IOM")]), 2);
        assert_eq!(cache.merge(vec![org("1", "OCHA (renamed)"), org("3", "UNHCR")]), 1);

        assert_eq!(cache.len(), 3);
        assert_eq!(
            cache.get(&ServerId::from("1")).map(|o| o.name.as_str()),
            Some("OCHA")
        );
    }

    #[test]
    fn cache_keeps_first_seen_order() {
        let mut cache = OptionCache::new();
        cache.merge(vec![org("5", "b"), org("1", "a"), org("5", "b")]);
        let ids: Vec<_> = cache.iter().map(|o| o.id.as_str().to_string()).collect();
        assert_eq!(ids, vec!["5", "1"]);
    }

    #[test]
    fn store_routes_by_kind() {
        let store = OptionStore::new();
        let added = store.merge(vec![
            org("1", "OCHA"),
            LinkedOption::new(OptionKind::Tag, "1", "urban"),
            LinkedOption::new(OptionKind::Event, "4", "Floods"),
        ]);

        assert_eq!(added, 3);
        assert_eq!(store.len(OptionKind::Organization), 1);
        assert_eq!(store.len(OptionKind::Tag), 1);
        assert_eq!(store.len(OptionKind::ContextOfViolence), 0);
        assert!(store.contains(OptionKind::Event, &ServerId::from("4")));
        assert!(!store.contains(OptionKind::Event, &ServerId::from("1")));
    }

    #[test]
    fn empty_store() {
        let store = OptionStore::new();
        assert!(store.is_empty());
        assert!(store.options(OptionKind::Tag).is_empty());
        store.merge(vec![org("1", "OCHA")]);
        assert!(!store.is_empty());
    }
}
