//! In-process tier holding decoded entries
//!
//! Owned by one [`crate::ReportCache`] instance, never persisted. It only
//! saves repeated reads and decodes of the same key; an entry is served only
//! while its backing file still carries the same modification time.

use crate::disk::is_expired;
use serde_json::Value;
use std::collections::HashMap;
use std::time::SystemTime;
use tokio::sync::RwLock;

/// A decoded entry and the time its backing file was written
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryEntry {
    pub data: Value,
    pub stored_at: SystemTime,
}

#[derive(Default)]
pub struct MemoryTier {
    entries: RwLock<HashMap<String, MemoryEntry>>,
}

impl MemoryTier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, key: &str) -> Option<MemoryEntry> {
        let entries = self.entries.read().await;
        entries.get(key).cloned()
    }

    /// Insert or replace the entry for `key`
    pub async fn put(&self, key: String, data: Value, stored_at: SystemTime) {
        let mut entries = self.entries.write().await;
        entries.insert(key, MemoryEntry { data, stored_at });
    }

    /// Drop the entry for `key`. Returns `true` if there was one.
    pub async fn remove(&self, key: &str) -> bool {
        self.entries.write().await.remove(key).is_some()
    }

    /// Drop the entry if it is older than `ttl_secs`. Returns `true` if evicted.
    pub async fn evict_if_stale(&self, key: &str, ttl_secs: u64, now: SystemTime) -> bool {
        let mut entries = self.entries.write().await;
        match entries.get(key) {
            Some(entry) if is_expired(entry.stored_at, ttl_secs, now) => {
                entries.remove(key);
                true
            }
            _ => false,
        }
    }

    /// Drop every entry whose key starts with `prefix`
    pub async fn evict_prefix(&self, prefix: &str) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        before - entries.len()
    }

    /// Drop stale entries among keys starting with `prefix`
    pub async fn evict_stale_with_prefix(
        &self,
        prefix: &str,
        ttl_secs: u64,
        now: SystemTime,
    ) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, entry| {
            !(key.starts_with(prefix) && is_expired(entry.stored_at, ttl_secs, now))
        });
        before - entries.len()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test]
    async fn test_put_and_get() {
        let memory = MemoryTier::new();
        let now = SystemTime::now();
        memory.put("tdb_filters:abc".to_string(), json!({"rows": [1]}), now).await;

        let entry = memory.get("tdb_filters:abc").await.unwrap();
        assert_eq!(entry.data, json!({"rows": [1]}));
        assert_eq!(entry.stored_at, now);
        assert!(memory.get("tdb_filters:other").await.is_none());
    }

    #[tokio::test]
    async fn test_put_replaces_existing_entry() {
        let memory = MemoryTier::new();
        let now = SystemTime::now();
        memory.put("k".to_string(), json!(1), now - Duration::from_secs(10)).await;
        memory.put("k".to_string(), json!(2), now).await;

        let entry = memory.get("k").await.unwrap();
        assert_eq!(entry.data, json!(2));
        assert_eq!(entry.stored_at, now);
        assert_eq!(memory.len().await, 1);
    }

    #[tokio::test]
    async fn test_evict_if_stale() {
        let memory = MemoryTier::new();
        let now = SystemTime::now();
        memory.put("old".to_string(), json!(1), now - Duration::from_secs(120)).await;
        memory.put("new".to_string(), json!(2), now - Duration::from_secs(30)).await;

        assert!(memory.evict_if_stale("old", 60, now).await);
        assert!(!memory.evict_if_stale("new", 60, now).await);
        assert!(!memory.evict_if_stale("missing", 60, now).await);
        assert!(memory.get("old").await.is_none());
        assert!(memory.get("new").await.is_some());
    }

    #[tokio::test]
    async fn test_evict_prefix_is_category_scoped() {
        let memory = MemoryTier::new();
        let now = SystemTime::now();
        memory.put("tdb_age_touristes:1".to_string(), json!(1), now).await;
        memory.put("tdb_age_touristes:2".to_string(), json!(2), now).await;
        memory.put("tdb_age_excursionnistes:1".to_string(), json!(3), now).await;

        assert_eq!(memory.evict_prefix("tdb_age_touristes:").await, 2);
        assert_eq!(memory.len().await, 1);
        assert!(memory.get("tdb_age_excursionnistes:1").await.is_some());
    }

    #[tokio::test]
    async fn test_evict_stale_with_prefix() {
        let memory = MemoryTier::new();
        let now = SystemTime::now();
        let old = now - Duration::from_secs(7200);
        memory.put("tdb_comparison:old".to_string(), json!(1), old).await;
        memory.put("tdb_comparison:new".to_string(), json!(2), now).await;
        memory.put("tdb_filters:old".to_string(), json!(3), old).await;

        assert_eq!(
            memory.evict_stale_with_prefix("tdb_comparison:", 1800, now).await,
            1
        );
        assert!(memory.get("tdb_comparison:new").await.is_some());
        assert!(memory.get("tdb_filters:old").await.is_some());
    }

    #[tokio::test]
    async fn test_remove() {
        let memory = MemoryTier::new();
        memory.put("a".to_string(), json!(1), SystemTime::now()).await;
        assert!(memory.remove("a").await);
        assert!(!memory.remove("a").await);
        assert!(memory.is_empty().await);
    }

    #[tokio::test]
    async fn test_clear() {
        let memory = MemoryTier::new();
        memory.put("a".to_string(), json!(1), SystemTime::now()).await;
        memory.clear().await;
        assert!(memory.is_empty().await);
    }
}
