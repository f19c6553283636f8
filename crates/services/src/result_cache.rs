//! Bounded, recency-ordered cache of finished study results.
//!
//! Entries are kept most-recent first and written through to the
//! [`KvStore`] as a single JSON document.

use serde::{Deserialize, Serialize};
use shared::result::StudyResult;
use std::sync::Arc;

use crate::kv_store::KvStore;

const STORE_KEY: &str = "study_cache";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    key: String,
    value: StudyResult,
}

pub struct ResultCache {
    entries: Vec<CacheEntry>,
    capacity: usize,
    store: Arc<dyn KvStore>,
}

impl ResultCache {
    /// Load the persisted cache, starting empty if it is missing or unreadable.
    pub fn load(store: Arc<dyn KvStore>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut entries = match store.get(STORE_KEY) {
            Ok(Some(bytes)) => match serde_json::from_slice::<Vec<CacheEntry>>(&bytes) {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!(error = %e, "discarding unreadable result cache");
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!(error = %e, "failed to read result cache");
                Vec::new()
            }
        };
        entries.truncate(capacity);

        Self {
            entries,
            capacity,
            store,
        }
    }

    /// Look up a result. Reading does not change recency.
    pub fn get(&self, key: &str) -> Option<&StudyResult> {
        self.entries
            .iter()
            .find(|entry| entry.key == key)
            .map(|entry| &entry.value)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Insert or refresh `key` as most recent, evicting the oldest entry past capacity.
    pub fn set(&mut self, key: &str, value: StudyResult) {
        self.entries.retain(|entry| entry.key != key);
        self.entries.insert(
            0,
            CacheEntry {
                key: key.to_string(),
                value,
            },
        );
        if self.entries.len() > self.capacity {
            if let Some(evicted) = self.entries.pop() {
                tracing::debug!(key = %evicted.key, "evicted cached result");
            }
        }
        self.persist();
    }

    pub fn remove(&mut self, key: &str) -> Option<StudyResult> {
        let index = self.entries.iter().position(|entry| entry.key == key)?;
        let removed = self.entries.remove(index);
        self.persist();
        Some(removed.value)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.persist();
    }

    /// Keys, most recent first
    pub fn keys(&self) -> Vec<&str> {
        self.entries.iter().map(|entry| entry.key.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn persist(&self) {
        let result = serde_json::to_vec(&self.entries)
            .map_err(anyhow::Error::from)
            .and_then(|bytes| self.store.set(STORE_KEY, &bytes));
        if let Err(e) = result {
            tracing::warn!(error = %e, "failed to persist result cache");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv_store::MemoryKvStore;
    use shared::result::{SectionChunk, SectionedResult};

    fn sample(text: &str) -> StudyResult {
        let mut result = SectionedResult::default();
        result.merge(SectionChunk::new("overview", serde_json::json!(text)));
        result.complete = true;
        StudyResult::Sections(result)
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
        let mut cache = ResultCache::load(store, 50);
        for i in 0..51 {
            cache.set(&format!("en-topic-{}", i), sample("x"));
        }
        assert_eq!(cache.len(), 50);
        assert!(cache.get("en-topic-0").is_none());
        for i in 1..51 {
            assert!(cache.contains(&format!("en-topic-{}", i)));
        }
    }

    #[test]
    fn test_set_refreshes_recency() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
        let mut cache = ResultCache::load(store, 2);
        cache.set("a", sample("a"));
        cache.set("b", sample("b"));
        cache.set("a", sample("a2"));
        cache.set("c", sample("c"));

        assert_eq!(cache.keys(), vec!["c", "a"]);
        assert_eq!(cache.get("a"), Some(&sample("a2")));
    }

    #[test]
    fn test_get_does_not_refresh() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
        let mut cache = ResultCache::load(store, 2);
        cache.set("a", sample("a"));
        cache.set("b", sample("b"));
        assert!(cache.get("a").is_some());
        cache.set("c", sample("c"));
        assert!(!cache.contains("a"));
    }

    #[test]
    fn test_write_through_and_reload() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
        {
            let mut cache = ResultCache::load(store.clone(), 10);
            cache.set("en-topic-grace", sample("grace"));
            cache.set("es-topic-grace", sample("gracia"));
            cache.remove("en-topic-grace");
        }
        let cache = ResultCache::load(store, 10);
        assert_eq!(cache.keys(), vec!["es-topic-grace"]);
    }

    #[test]
    fn test_corrupt_document_starts_empty() {
        let store = Arc::new(MemoryKvStore::new());
        store.set(STORE_KEY, b"not json").unwrap();
        let cache = ResultCache::load(store, 10);
        assert!(cache.is_empty());
    }
}
