use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::models::{ApplicationPage, QueryKey};

#[derive(Clone, Debug)]
struct CacheEntry {
    page: Arc<ApplicationPage>,
    stored_at: Instant,
}

/// Time-bounded map from query key to result page.
///
/// Entries expire `ttl` after they were stored and are dropped lazily on the
/// next lookup. The store never holds more than `capacity` entries; when full,
/// the entry inserted first is evicted (FIFO, overwrites keep their slot).
#[derive(Debug)]
pub struct SearchCacheStore {
    ttl: Duration,
    capacity: usize,
    entries: HashMap<QueryKey, CacheEntry>,
    insertion_order: VecDeque<QueryKey>,
}

impl SearchCacheStore {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity: capacity.max(1),
            entries: HashMap::new(),
            insertion_order: VecDeque::new(),
        }
    }

    pub fn get(&mut self, key: &QueryKey) -> Option<Arc<ApplicationPage>> {
        let entry = self.entries.get(key)?;
        if entry.stored_at.elapsed() > self.ttl {
            self.remove(key);
            return None;
        }
        Some(entry.page.clone())
    }

    pub fn put(&mut self, key: QueryKey, page: Arc<ApplicationPage>) {
        let entry = CacheEntry {
            page,
            stored_at: Instant::now(),
        };
        if self.entries.insert(key.clone(), entry).is_none() {
            self.insertion_order.push_back(key);
        }

        while self.entries.len() > self.capacity {
            let Some(oldest) = self.insertion_order.pop_front() else {
                break;
            };
            self.entries.remove(&oldest);
            tracing::debug!(query = %oldest, "evicted oldest cached search");
        }
    }

    /// Remove the given keys; unknown keys are ignored.
    pub fn clear<'a>(&mut self, keys: impl IntoIterator<Item = &'a QueryKey>) {
        for key in keys {
            self.remove(key);
        }
    }

    pub fn clear_all(&mut self) {
        self.entries.clear();
        self.insertion_order.clear();
    }

    /// Remove every entry whose key matches `predicate`.
    pub fn clear_matching(&mut self, predicate: impl Fn(&QueryKey) -> bool) {
        self.entries.retain(|key, _| !predicate(key));
        self.insertion_order.retain(|key| !predicate(key));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &QueryKey) -> bool {
        self.entries.contains_key(key)
    }

    fn remove(&mut self, key: &QueryKey) {
        if self.entries.remove(key).is_some() {
            self.insertion_order.retain(|candidate| candidate != key);
        }
    }
}
