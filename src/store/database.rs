//! Database-Level Store
//!
//! In-process stand-in for the relational transport: a table keyed by the
//! 64-character hex hash with columns for the serialized value, expiry,
//! and tag list. Tag resolution scans the tag column rather than keeping a
//! separate index, matching the persisted layout. No pattern support; the
//! capability table steers pattern-scoped flushes away from this level.

use crate::entry::StoredEntry;
use crate::error::Result;
use crate::level::CacheLevel;
use crate::store::TierStore;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Durable-row stand-in for the database level
#[derive(Debug, Default)]
pub struct DatabaseStore {
    rows: DashMap<String, StoredEntry>,
    size_bytes: AtomicU64,
}

impl DatabaseStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn remove_row(&self, hash: &str) -> Option<StoredEntry> {
        let (_, entry) = self.rows.remove(hash)?;
        self.size_bytes
            .fetch_sub(entry.size_bytes, Ordering::Relaxed);
        Some(entry)
    }
}

#[async_trait]
impl TierStore for DatabaseStore {
    fn level(&self) -> CacheLevel {
        CacheLevel::Database
    }

    async fn get(&self, hash: &str) -> Result<Option<StoredEntry>> {
        Ok(self.rows.get(hash).map(|r| r.value().clone()))
    }

    async fn set(&self, hash: &str, entry: StoredEntry) -> Result<()> {
        self.size_bytes
            .fetch_add(entry.size_bytes, Ordering::Relaxed);
        if let Some(old) = self.rows.insert(hash.to_string(), entry) {
            self.size_bytes.fetch_sub(old.size_bytes, Ordering::Relaxed);
        }
        Ok(())
    }

    async fn delete(&self, hash: &str) -> Result<Option<StoredEntry>> {
        Ok(self.remove_row(hash))
    }

    async fn hashes_for_tag(&self, tag: &str) -> Result<Vec<String>> {
        // Tag-column scan; the relational transport does this with an
        // indexed query.
        Ok(self
            .rows
            .iter()
            .filter(|r| r.value().has_tag(tag))
            .map(|r| r.key().clone())
            .collect())
    }

    async fn sweep_expired(&self) -> Result<u64> {
        let expired: Vec<String> = self
            .rows
            .iter()
            .filter(|r| r.value().is_expired())
            .map(|r| r.key().clone())
            .collect();

        let mut removed = 0;
        for hash in expired {
            if self.remove_row(&hash).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn evict_to_size(&self, max_bytes: u64) -> Result<u64> {
        if self.size_bytes() <= max_bytes {
            return Ok(0);
        }

        // Oldest rows first until the bound holds
        let mut rows: Vec<(String, chrono::DateTime<chrono::Utc>, u64)> = self
            .rows
            .iter()
            .map(|r| (r.key().clone(), r.value().created_at, r.value().size_bytes))
            .collect();
        rows.sort_by_key(|(_, created_at, _)| *created_at);

        let mut removed = 0;
        for (hash, _, _) in rows {
            if self.size_bytes() <= max_bytes {
                break;
            }
            if self.remove_row(&hash).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn clear(&self) -> Result<u64> {
        let removed = self.rows.len() as u64;
        self.rows.clear();
        self.size_bytes.store(0, Ordering::Relaxed);
        Ok(removed)
    }

    fn entry_count(&self) -> u64 {
        self.rows.len() as u64
    }

    fn size_bytes(&self) -> u64 {
        self.size_bytes.load(Ordering::Relaxed)
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}
