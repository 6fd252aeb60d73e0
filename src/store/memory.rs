//! Memory-Level Store
//!
//! In-process stand-in for the distributed memory transport. Maintains the
//! tag -> hash index consulted by tag invalidation and supports
//! pattern-scoped deletion, matching the capability table for the memory
//! level. A production deployment replaces this with a network client
//! implementing the same `TierStore` contract.

use crate::entry::StoredEntry;
use crate::error::Result;
use crate::level::CacheLevel;
use crate::store::{compile_pattern, TierStore};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

/// Distributed-memory stand-in with a tag index
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, StoredEntry>,
    /// Tag -> hashes carrying that tag
    tag_index: DashMap<String, HashSet<String>>,
    size_bytes: AtomicU64,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn index_tags(&self, hash: &str, entry: &StoredEntry) {
        for tag in &entry.tags {
            self.tag_index
                .entry(tag.clone())
                .or_default()
                .insert(hash.to_string());
        }
    }

    fn unindex_tags(&self, hash: &str, entry: &StoredEntry) {
        for tag in &entry.tags {
            if let Some(mut hashes) = self.tag_index.get_mut(tag) {
                hashes.remove(hash);
            }
        }
    }

    fn remove_entry(&self, hash: &str) -> Option<StoredEntry> {
        let (_, entry) = self.entries.remove(hash)?;
        self.size_bytes
            .fetch_sub(entry.size_bytes, Ordering::Relaxed);
        self.unindex_tags(hash, &entry);
        Some(entry)
    }
}

#[async_trait]
impl TierStore for MemoryStore {
    fn level(&self) -> CacheLevel {
        CacheLevel::Memory
    }

    async fn get(&self, hash: &str) -> Result<Option<StoredEntry>> {
        Ok(self.entries.get(hash).map(|r| r.value().clone()))
    }

    async fn set(&self, hash: &str, entry: StoredEntry) -> Result<()> {
        if let Some(old) = self.remove_entry(hash) {
            debug_assert_eq!(old.key, entry.key);
        }
        self.size_bytes
            .fetch_add(entry.size_bytes, Ordering::Relaxed);
        self.index_tags(hash, &entry);
        self.entries.insert(hash.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, hash: &str) -> Result<Option<StoredEntry>> {
        Ok(self.remove_entry(hash))
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
            if self.remove_entry(&hash).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn hashes_for_tag(&self, tag: &str) -> Result<Vec<String>> {
        Ok(self
            .tag_index
            .get(tag)
            .map(|hashes| hashes.iter().cloned().collect())
            .unwrap_or_default())
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
            if self.remove_entry(&hash).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn clear(&self) -> Result<u64> {
        let removed = self.entries.len() as u64;
        self.entries.clear();
        self.tag_index.clear();
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
