//! Request-Level Store
//!
//! In-process map scoped to one unit of work. No tag index and no
//! cross-request concurrency by construction: the whole store is torn down
//! at the unit-of-work boundary, so entries written with a zero TTL need
//! no numeric expiry at all.

use crate::entry::StoredEntry;
use crate::error::Result;
use crate::level::CacheLevel;
use crate::store::{compile_pattern, TierStore};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Unit-of-work scoped store for the request level
#[derive(Debug, Default)]
pub struct RequestStore {
    entries: DashMap<String, StoredEntry>,
    size_bytes: AtomicU64,
}

impl RequestStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn forget_size(&self, entry: &StoredEntry) {
        self.size_bytes
            .fetch_sub(entry.size_bytes, Ordering::Relaxed);
    }
}

#[async_trait]
impl TierStore for RequestStore {
    fn level(&self) -> CacheLevel {
        CacheLevel::Request
    }

    async fn get(&self, hash: &str) -> Result<Option<StoredEntry>> {
        Ok(self.entries.get(hash).map(|r| r.value().clone()))
    }

    async fn set(&self, hash: &str, entry: StoredEntry) -> Result<()> {
        self.size_bytes
            .fetch_add(entry.size_bytes, Ordering::Relaxed);
        if let Some(old) = self.entries.insert(hash.to_string(), entry) {
            self.forget_size(&old);
        }
        Ok(())
    }

    async fn delete(&self, hash: &str) -> Result<Option<StoredEntry>> {
        if let Some((_, entry)) = self.entries.remove(hash) {
            self.forget_size(&entry);
            Ok(Some(entry))
        } else {
            Ok(None)
        }
    }

    async fn delete_by_pattern(&self, pattern: &str) -> Result<u64> {
        let matcher = compile_pattern(pattern)?;
        let matching: Vec<String> = self
            .entries
            .iter()
            .filter(|r| matcher.matches(&r.value().key))
            .map(|r| r.key().clone())
            .collect();

        let mut removed = 0;
        for hash in matching {
            if let Some((_, entry)) = self.entries.remove(&hash) {
                self.forget_size(&entry);
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn sweep_expired(&self) -> Result<u64> {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|r| r.value().is_expired())
            .map(|r| r.key().clone())
            .collect();

        let mut removed = 0;
        for hash in expired {
            if let Some((_, entry)) = self.entries.remove(&hash) {
                self.forget_size(&entry);
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn clear(&self) -> Result<u64> {
        let removed = self.entries.len() as u64;
        self.entries.clear();
        self.size_bytes.store(0, Ordering::Relaxed);
        Ok(removed)
    }

    fn entry_count(&self) -> u64 {
        self.entries.len() as u64
    }

    fn size_bytes(&self) -> u64 {
        self.size_bytes.load(Ordering::Relaxed)
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::entry;
    use std::time::Duration;

    #[tokio::test]
    async fn test_basic_operations() {
        let store = RequestStore::new();

        store
            .set("h1", entry("ip:1.2.3.4", b"payload", Duration::ZERO, &[]))
            .await
            .unwrap();
        assert_eq!(store.entry_count(), 1);
        assert_eq!(store.size_bytes(), 7);

        let fetched = store.get("h1").await.unwrap().unwrap();
        assert_eq!(fetched.key, "ip:1.2.3.4");

        let deleted = store.delete("h1").await.unwrap();
        assert!(deleted.is_some());
        assert_eq!(store.entry_count(), 0);
        assert_eq!(store.size_bytes(), 0);
    }

    #[tokio::test]
    async fn test_replace_adjusts_size() {
        let store = RequestStore::new();

        store
            .set("h1", entry("k", b"short", Duration::ZERO, &[]))
            .await
            .unwrap();
        store
            .set("h1", entry("k", b"considerably longer", Duration::ZERO, &[]))
            .await
            .unwrap();

        assert_eq!(store.entry_count(), 1);
        assert_eq!(store.size_bytes(), 19);
    }

    #[tokio::test]
    async fn test_pattern_delete_targets_logical_keys() {
        let store = RequestStore::new();
        store
            .set("h1", entry("ip:1.2.3.4", b"a", Duration::ZERO, &[]))
            .await
            .unwrap();
        store
            .set("h2", entry("ip:5.6.7.8", b"b", Duration::ZERO, &[]))
            .await
            .unwrap();
        store
            .set("h3", entry("email:a@b.c", b"c", Duration::ZERO, &[]))
            .await
            .unwrap();

        let removed = store.delete_by_pattern("ip:*").await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.entry_count(), 1);
        assert!(store.get("h3").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_clear() {
        let store = RequestStore::new();
        store
            .set("h1", entry("a", b"1", Duration::ZERO, &[]))
            .await
            .unwrap();
        store
            .set("h2", entry("b", b"2", Duration::ZERO, &[]))
            .await
            .unwrap();

        assert_eq!(store.clear().await.unwrap(), 2);
        assert_eq!(store.entry_count(), 0);
    }

    #[tokio::test]
    async fn test_zero_ttl_entries_survive_sweep() {
        let store = RequestStore::new();
        store
            .set("h1", entry("a", b"1", Duration::ZERO, &[]))
            .await
            .unwrap();

        // No numeric expiry: only the unit-of-work teardown removes them
        assert_eq!(store.sweep_expired().await.unwrap(), 0);
        assert_eq!(store.entry_count(), 1);
    }
}
