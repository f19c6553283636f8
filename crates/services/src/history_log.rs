use shared::study::StudyItem;
use std::sync::Arc;

use crate::kv_store::KvStore;

const STORE_KEY: &str = "study_history";

/// Bounded log of requested studies, most recent first.
///
/// Deduplicates by structural equality of the item, not by key: re-adding an
/// item moves it to the front.
pub struct HistoryLog {
    items: Vec<StudyItem>,
    capacity: usize,
    store: Arc<dyn KvStore>,
}

impl HistoryLog {
    pub fn load(store: Arc<dyn KvStore>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut items = match store.get(STORE_KEY) {
            Ok(Some(bytes)) => serde_json::from_slice::<Vec<StudyItem>>(&bytes).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "discarding unreadable study history");
                Vec::new()
            }),
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!(error = %e, "failed to read study history");
                Vec::new()
            }
        };
        items.truncate(capacity);

        Self {
            items,
            capacity,
            store,
        }
    }

    pub fn add(&mut self, item: StudyItem) {
        // Drop the old occurrence so the item moves to the front
        self.items.retain(|existing| existing != &item);
        self.items.insert(0, item);
        self.items.truncate(self.capacity);
        self.persist();
    }

    pub fn remove(&mut self, item: &StudyItem) -> bool {
        let before = self.items.len();
        self.items.retain(|existing| existing != item);
        let removed = self.items.len() != before;
        if removed {
            self.persist();
        }
        removed
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.persist();
    }

    pub fn contains(&self, item: &StudyItem) -> bool {
        self.items.iter().any(|existing| existing == item)
    }

    pub fn items(&self) -> &[StudyItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn persist(&self) {
        let result = serde_json::to_vec(&self.items)
            .map_err(anyhow::Error::from)
            .and_then(|bytes| self.store.set(STORE_KEY, &bytes));
        if let Err(e) = result {
            tracing::warn!(error = %e, "failed to persist study history");
        }
    }
}
