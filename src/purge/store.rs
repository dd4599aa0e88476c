//! Keyed store with per-entry expiry.
//!
//! Backs the debounce flag and the cached release lookup. Entries are JSON
//! values; an entry whose expiry has passed reads as absent and is evicted on
//! access.

use std::time::Duration;

use dashmap::DashMap;
use serde_json::Value;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq)]
pub struct StoredEntry {
    pub value: Value,
    pub expires_at: Instant,
}

pub trait KeyedStore: Send + Sync {
    /// Read a live entry.
    fn get(&self, key: &str) -> Option<StoredEntry>;

    /// Insert or replace an entry that lives for `ttl` from now.
    fn set(&self, key: &str, value: Value, ttl: Duration);

    /// Remove an entry, returning whether a live one was present.
    fn delete(&self, key: &str) -> bool;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, StoredEntry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KeyedStore for MemoryStore {
    fn get(&self, key: &str) -> Option<StoredEntry> {
        let now = Instant::now();
        let entry = self.entries.get(key)?.value().clone();
        if entry.expires_at <= now {
            self.entries
                .remove_if(key, |_, current| current.expires_at <= now);
            return None;
        }
        Some(entry)
    }

    fn set(&self, key: &str, value: Value, ttl: Duration) {
        let entry = StoredEntry {
            value,
            expires_at: Instant::now() + ttl,
        };
        self.entries.insert(key.to_string(), entry);
    }

    fn delete(&self, key: &str) -> bool {
        let now = Instant::now();
        self.entries
            .remove(key)
            .is_some_and(|(_, entry)| entry.expires_at > now)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn entry_is_visible_until_expiry() {
        let store = MemoryStore::new();
        store.set("flag", json!(true), Duration::from_secs(3));

        tokio::time::advance(Duration::from_millis(2_999)).await;
        assert!(store.get("flag").is_some());

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(store.get("flag").is_none());
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn set_replaces_value_and_expiry() {
        let store = MemoryStore::new();
        store.set("flag", json!(1), Duration::from_secs(3));
        tokio::time::advance(Duration::from_secs(2)).await;
        store.set("flag", json!(2), Duration::from_secs(3));

        let entry = store.get("flag").expect("entry should be live");
        assert_eq!(entry.value, json!(2));
        assert_eq!(entry.expires_at, Instant::now() + Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn delete_reports_live_entries_only() {
        let store = MemoryStore::new();
        assert!(!store.delete("missing"));

        store.set("live", json!(true), Duration::from_secs(1));
        assert!(store.delete("live"));
        assert!(store.get("live").is_none());

        store.set("stale", json!(true), Duration::from_secs(1));
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(!store.delete("stale"));
    }
}
