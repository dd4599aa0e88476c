//! Generic object cache.
//!
//! Holds computed values for the lifetime of the process. Every purge flushes it
//! unconditionally before any backend runs.

use dashmap::DashMap;
use serde_json::Value;

pub trait ObjectCache: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;

    fn insert(&self, key: &str, value: Value);

    /// Drop every entry.
    fn flush(&self);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Default)]
pub struct MemoryObjectCache {
    entries: DashMap<String, Value>,
}

impl MemoryObjectCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ObjectCache for MemoryObjectCache {
    fn get(&self, key: &str) -> Option<Value> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    fn insert(&self, key: &str, value: Value) {
        self.entries.insert(key.to_string(), value);
    }

    fn flush(&self) {
        self.entries.clear();
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}
