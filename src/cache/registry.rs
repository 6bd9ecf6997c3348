//! Key → entry registry owned by one engine.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::entry::RequestEntry;

/// Maps derived keys to their [`RequestEntry`].
///
/// Entries are created lazily and never evicted, so the registry grows for as
/// long as its engine lives. Callers that need bounded memory should rotate
/// engine instances.
pub struct Registry<I, O> {
    entries: Mutex<HashMap<String, Arc<RequestEntry<I, O>>>>,
    listener_capacity: usize,
}

impl<I, O> Registry<I, O>
where
    I: Clone,
    O: Clone,
{
    /// Creates an empty registry whose entries buffer `listener_capacity` results.
    pub fn new(listener_capacity: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            listener_capacity,
        }
    }

    /// Returns the entry for `key`, creating a stale, empty one if none exists.
    ///
    /// Lookup and insertion happen under one lock, so concurrent callers with
    /// the same key always share a single entry.
    pub fn fetch_entry(&self, key: &str) -> Arc<RequestEntry<I, O>> {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get(key) {
            return Arc::clone(entry);
        }
        let entry = Arc::new(RequestEntry::new(key.to_owned(), self.listener_capacity));
        entries.insert(key.to_owned(), Arc::clone(&entry));
        entry
    }

    /// Returns the entry for `key` without creating one.
    pub fn get(&self, key: &str) -> Option<Arc<RequestEntry<I, O>>> {
        self.entries.lock().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Snapshot of every key currently registered, in no particular order.
    pub fn keys(&self) -> Vec<String> {
        self.entries.lock().keys().cloned().collect()
    }
}
