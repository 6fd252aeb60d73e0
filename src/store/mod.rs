//! Tier Stores
//!
//! The transport contract each cache level is served by, plus in-process
//! reference implementations. Production deployments satisfy the same
//! trait with network clients for the distributed memory store and the
//! relational store; the engine never depends on anything beyond this
//! contract.

mod database;
mod memory;
mod request;

pub use database::DatabaseStore;
pub use memory::MemoryStore;
pub use request::RequestStore;

use crate::entry::StoredEntry;
use crate::error::{Error, Result};
use crate::level::CacheLevel;
use async_trait::async_trait;
use std::sync::Arc;

// =============================================================================
// TierStore Trait
// =============================================================================

/// Transport contract for one cache level
///
/// Entries are addressed by the key's 64-character hex hash; the logical
/// key travels inside the entry for pattern matching and diagnostics.
/// Pattern- and tag-scoped operations have defaults matching a minimal
/// transport; levels whose capability table advertises the feature
/// override them.
#[async_trait]
pub trait TierStore: Send + Sync {
    /// The level this store serves
    fn level(&self) -> CacheLevel;

    /// Fetch an entry by hash
    async fn get(&self, hash: &str) -> Result<Option<StoredEntry>>;

    /// Store an entry under a hash, replacing any existing one
    async fn set(&self, hash: &str, entry: StoredEntry) -> Result<()>;

    /// Delete an entry by hash, returning it if it existed
    async fn delete(&self, hash: &str) -> Result<Option<StoredEntry>>;

    /// Delete all entries whose logical key matches a glob pattern
    async fn delete_by_pattern(&self, _pattern: &str) -> Result<u64> {
        Err(Error::TierUnsupported {
            level: self.level(),
            operation: "delete_by_pattern",
        })
    }

    /// Hashes of all entries carrying a tag
    ///
    /// Levels without a tag index return nothing; tag invalidation skips
    /// them by consulting the capability table first.
    async fn hashes_for_tag(&self, _tag: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    /// Remove entries past their expiry, returning the count removed
    async fn sweep_expired(&self) -> Result<u64>;

    /// Shrink to at most `max_bytes`, oldest entries first
    ///
    /// Self-expiring levels need no size bound and keep the no-op default.
    async fn evict_to_size(&self, _max_bytes: u64) -> Result<u64> {
        Ok(0)
    }

    /// Remove all entries, returning the count removed
    async fn clear(&self) -> Result<u64>;

    /// Current entry count
    fn entry_count(&self) -> u64;

    /// Current stored size in bytes
    fn size_bytes(&self) -> u64;

    /// Check if the transport is reachable
    async fn health_check(&self) -> Result<bool>;
}

/// Type alias for a shared tier store
pub type TierStoreRef = Arc<dyn TierStore>;

/// Compile a glob pattern, mapping failures to an input error
pub(crate) fn compile_pattern(pattern: &str) -> Result<glob::Pattern> {
    glob::Pattern::new(pattern)
        .map_err(|e| Error::InvalidKeyFormat(format!("invalid pattern '{pattern}': {e}")))
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use bytes::Bytes;
    use std::time::Duration;

    /// Build a stored entry for tests
    pub fn entry(key: &str, payload: &[u8], ttl: Duration, tags: &[&str]) -> StoredEntry {
        StoredEntry::new(
            key,
            Bytes::copy_from_slice(payload),
            ttl,
            tags.iter().map(|t| t.to_string()).collect(),
        )
    }

    /// A store whose transport always fails, for fail-open tests
    pub struct FailingStore {
        level: CacheLevel,
    }

    impl FailingStore {
        pub fn new(level: CacheLevel) -> Self {
            Self { level }
        }

        fn unavailable(&self) -> Error {
            Error::TierUnavailable {
                level: self.level,
                reason: "transport down".into(),
            }
        }
    }

    #[async_trait]
    impl TierStore for FailingStore {
        fn level(&self) -> CacheLevel {
            self.level
        }

        async fn get(&self, _hash: &str) -> Result<Option<StoredEntry>> {
            Err(self.unavailable())
        }

        async fn set(&self, _hash: &str, _entry: StoredEntry) -> Result<()> {
            Err(self.unavailable())
        }

        async fn delete(&self, _hash: &str) -> Result<Option<StoredEntry>> {
            Err(self.unavailable())
        }

        async fn hashes_for_tag(&self, _tag: &str) -> Result<Vec<String>> {
            Err(self.unavailable())
        }

        async fn sweep_expired(&self) -> Result<u64> {
            Err(self.unavailable())
        }

        async fn clear(&self) -> Result<u64> {
            Err(self.unavailable())
        }

        fn entry_count(&self) -> u64 {
            0
        }

        fn size_bytes(&self) -> u64 {
            0
        }

        async fn health_check(&self) -> Result<bool> {
            Ok(false)
        }
    }
}
