//! Operation Service
//!
//! The tiered read/write algorithm behind the public contract: probe levels
//! in priority order, promote hits into faster levels, clamp TTLs per
//! level, and guard recomputation with a per-key stampede lock. Tier
//! failures are fail-open: logged, counted as misses, never surfaced.

use crate::entry::StoredEntry;
use crate::error::{Error, Result};
use crate::events::CacheEvent;
use crate::key::CacheKey;
use crate::level::{CacheLevel, Capability};
use crate::security::SecurityService;
use crate::settings::CacheSettings;
use crate::stats::CacheStats;
use crate::store::{compile_pattern, TierStoreRef};
use dashmap::DashMap;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, warn};

/// Tiered cache operations
pub struct OperationService {
    stores: [TierStoreRef; 3],
    settings: CacheSettings,
    security: SecurityService,
    stats: Arc<CacheStats>,
    /// Per-key stampede locks, keyed by the storage hash
    locks: DashMap<String, Arc<Mutex<()>>>,
    event_tx: broadcast::Sender<CacheEvent>,
}

impl OperationService {
    /// Create the service over the given level stores
    ///
    /// `stores` must be ordered Request, Memory, Database.
    pub fn new(
        settings: CacheSettings,
        stores: [TierStoreRef; 3],
        stats: Arc<CacheStats>,
        event_tx: broadcast::Sender<CacheEvent>,
    ) -> Self {
        let security = SecurityService::new(&settings);
        Self {
            stores,
            settings,
            security,
            stats,
            locks: DashMap::new(),
            event_tx,
        }
    }

    /// Store serving a level
    pub fn store(&self, level: CacheLevel) -> &TierStoreRef {
        match level {
            CacheLevel::Request => &self.stores[0],
            CacheLevel::Memory => &self.stores[1],
            CacheLevel::Database => &self.stores[2],
        }
    }

    /// Levels this key is probed/written at, fastest first
    fn probe_levels(&self, key: &CacheKey) -> Vec<CacheLevel> {
        key.levels()
            .into_iter()
            .filter(|level| self.settings.is_enabled(*level))
            .collect()
    }

    fn emit(&self, event: CacheEvent) {
        let _ = self.event_tx.send(event);
    }

    // =========================================================================
    // get
    // =========================================================================

    /// Probe levels in priority order; first hit wins
    pub async fn get(&self, key: &CacheKey) -> Result<Option<Value>> {
        let hash = key.hash();

        for level in self.probe_levels(key) {
            let store = self.store(level);
            let started = Instant::now();

            match store.get(&hash).await {
                Ok(Some(entry)) => {
                    self.stats.level(level).record_latency(started.elapsed());

                    if entry.is_expired() {
                        let _ = store.delete(&hash).await;
                        self.stats.level(level).record_miss();
                        continue;
                    }

                    match self.security.deserialize_value(&entry.value) {
                        Ok(value) => {
                            self.stats.level(level).record_hit();
                            let promoted = self.promote(key, &entry, level).await;
                            self.emit(CacheEvent::hit(key, level, promoted));
                            return Ok(Some(value));
                        }
                        Err(e) => {
                            // Poisoned entry: drop it and keep probing
                            warn!(key = %key, level = %level, error = %e, "Dropping undeserializable cache entry");
                            let _ = store.delete(&hash).await;
                            self.stats.level(level).record_miss();
                            continue;
                        }
                    }
                }
                Ok(None) => {
                    self.stats.level(level).record_latency(started.elapsed());
                    self.stats.level(level).record_miss();
                }
                Err(e) => {
                    warn!(key = %key, level = %level, error = %e, "Tier lookup failed; treating as miss");
                    self.emit(CacheEvent::LevelFailed {
                        level,
                        reason: e.to_string(),
                    });
                    self.stats.level(level).record_miss();
                }
            }
        }

        self.stats.record_full_miss();
        self.emit(CacheEvent::miss(key));
        Ok(None)
    }

    /// Probe one level only
    pub async fn get_from_level(&self, key: &CacheKey, level: CacheLevel) -> Result<Option<Value>> {
        if !self.settings.is_enabled(level) {
            return Ok(None);
        }

        let hash = key.hash();
        match self.store(level).get(&hash).await {
            Ok(Some(entry)) if !entry.is_expired() => {
                self.stats.level(level).record_hit();
                Ok(Some(self.security.deserialize_value(&entry.value)?))
            }
            Ok(_) => {
                self.stats.level(level).record_miss();
                Ok(None)
            }
            Err(e) => {
                warn!(key = %key, level = %level, error = %e, "Tier lookup failed; treating as miss");
                self.stats.level(level).record_miss();
                Ok(None)
            }
        }
    }

    /// Copy a hit found at `hit_level` into every faster probed level
    ///
    /// The copy carries the entry's remaining lifetime, clamped per level.
    async fn promote(&self, key: &CacheKey, entry: &StoredEntry, hit_level: CacheLevel) -> bool {
        if !self.settings.auto_promote {
            return false;
        }

        let mut promoted = false;
        for level in self.probe_levels(key) {
            if !level.is_faster_than(&hit_level) {
                continue;
            }
            if !level.is_suitable_for_size(entry.size_bytes) {
                continue;
            }

            let ttl = level.clamp_ttl(entry.remaining_ttl().or(key.ttl));
            let copy = StoredEntry::new(
                entry.key.clone(),
                entry.value.clone(),
                ttl,
                entry.tags.clone(),
            );

            match self.store(level).set(&key.hash(), copy).await {
                Ok(()) => {
                    self.stats.level(level).record_put();
                    self.emit(CacheEvent::promote(key, hit_level, level));
                    debug!(key = %key, from = %hit_level, to = %level, "Promoted cache entry");
                    promoted = true;
                }
                Err(e) => {
                    warn!(key = %key, level = %level, error = %e, "Promotion write failed");
                }
            }
        }
        promoted
    }

    // =========================================================================
    // put
    // =========================================================================

    /// Write a value to every enabled level the key allows
    ///
    /// Each level clamps the TTL to its own policy and may reject the value
    /// on size alone; a failed write on one level never aborts the others.
    /// Returns true when at least one level accepted the write.
    pub async fn put(&self, key: &CacheKey, value: &Value, ttl: Option<Duration>) -> Result<bool> {
        let bytes = self.security.sanitize_value(value)?;
        let levels = self.probe_levels(key);
        Ok(self.write_levels(key, &bytes, ttl, &levels).await)
    }

    /// Write a value to a single level
    pub async fn put_to_level(
        &self,
        key: &CacheKey,
        value: &Value,
        ttl: Option<Duration>,
        level: CacheLevel,
    ) -> Result<bool> {
        let bytes = self.security.sanitize_value(value)?;
        if !self.settings.is_enabled(level) {
            return Ok(false);
        }
        Ok(self.write_levels(key, &bytes, ttl, &[level]).await)
    }

    async fn write_levels(
        &self,
        key: &CacheKey,
        bytes: &bytes::Bytes,
        ttl: Option<Duration>,
        levels: &[CacheLevel],
    ) -> bool {
        let hash = key.hash();
        let size = bytes.len() as u64;
        let mut any_written = false;

        for level in levels {
            if !level.is_suitable_for_size(size) {
                debug!(key = %key, level = %level, size, "Value exceeds level size ceiling; skipping");
                continue;
            }

            let clamped = level.clamp_ttl(ttl.or(key.ttl));
            let entry = StoredEntry::new(key.key.clone(), bytes.clone(), clamped, key.tag_list());

            match self.store(*level).set(&hash, entry).await {
                Ok(()) => {
                    self.stats.level(*level).record_put();
                    self.emit(CacheEvent::put(key, *level, size));
                    any_written = true;
                }
                Err(e) => {
                    warn!(key = %key, level = %level, error = %e, "Tier write failed; continuing");
                    self.emit(CacheEvent::LevelFailed {
                        level: *level,
                        reason: e.to_string(),
                    });
                }
            }
        }

        any_written
    }

    // =========================================================================
    // remember
    // =========================================================================

    /// Get, or compute-once-and-cache under a per-key stampede lock
    ///
    /// The lock holder computes and writes to all levels; waiters re-read
    /// the now-cached value after the holder finishes. A waiter whose
    /// bounded wait times out computes independently rather than blocking,
    /// trading a bounded amount of duplicate work for availability.
    pub async fn remember<F, Fut>(
        &self,
        key: &CacheKey,
        ttl: Option<Duration>,
        compute: F,
    ) -> Result<Value>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<Value>>,
    {
        if let Some(value) = self.get(key).await? {
            return Ok(value);
        }

        let hash = key.hash();
        let lock = self
            .locks
            .entry(hash.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let result = match tokio::time::timeout(self.settings.lock_wait_timeout, lock.lock()).await
        {
            Ok(_guard) => {
                // The previous holder may have populated the cache while we
                // waited; re-read before computing.
                match self.get(key).await? {
                    Some(value) => Ok(value),
                    None => {
                        let value = compute().await?;
                        self.put(key, &value, ttl).await?;
                        Ok(value)
                    }
                }
            }
            Err(_) => {
                let timeout = Error::LockTimeout {
                    key_hash: key.short_hash(),
                    waited: self.settings.lock_wait_timeout,
                };
                debug!(key = %key, error = %timeout, "Proceeding with fallback computation");
                self.stats.record_lock_timeout();
                self.stats.record_fallback_compute();
                self.emit(CacheEvent::LockTimedOut { key: key.to_path() });

                let value = compute().await?;
                self.put(key, &value, ttl).await?;
                Ok(value)
            }
        };

        // Drop the registry entry once no other caller holds the lock; a
        // racing arrival simply creates a fresh one.
        if Arc::strong_count(&lock) <= 2 {
            self.locks.remove(&hash);
        }

        result
    }

    // =========================================================================
    // forget / flush
    // =========================================================================

    /// Delete a key from every level unconditionally
    pub async fn forget(&self, key: &CacheKey) -> Result<bool> {
        let hash = key.hash();
        let mut deleted = false;

        for level in CacheLevel::by_priority() {
            match self.store(*level).delete(&hash).await {
                Ok(Some(_)) => {
                    self.stats.level(*level).record_delete();
                    self.emit(CacheEvent::delete(key, *level));
                    deleted = true;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(key = %key, level = %level, error = %e, "Tier delete failed; continuing");
                }
            }
        }

        self.locks.remove(&hash);
        Ok(deleted)
    }

    /// Delete everything, or everything matching a glob pattern
    ///
    /// A pattern-scoped flush only touches levels that support pattern
    /// matching; the rest must be cleared by full flush or tag
    /// invalidation. Returns the number of entries removed.
    pub async fn flush(&self, pattern: Option<&str>) -> Result<u64> {
        let mut removed = 0;

        match pattern {
            None => {
                for level in CacheLevel::by_priority() {
                    if !self.settings.is_enabled(*level) {
                        continue;
                    }
                    match self.store(*level).clear().await {
                        Ok(count) => {
                            removed += count;
                            self.emit(CacheEvent::LevelCleared {
                                level: *level,
                                removed: count,
                            });
                        }
                        Err(e) => {
                            warn!(level = %level, error = %e, "Tier clear failed; continuing");
                        }
                    }
                }
            }
            Some(pattern) => {
                // Validate before any tier I/O
                compile_pattern(pattern)?;

                for level in CacheLevel::supporting(Capability::PatternMatching) {
                    if !self.settings.is_enabled(level) {
                        continue;
                    }
                    match self.store(level).delete_by_pattern(pattern).await {
                        Ok(count) => removed += count,
                        Err(e) => {
                            warn!(level = %level, pattern, error = %e, "Pattern flush failed; continuing");
                        }
                    }
                }
            }
        }

        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::FailingStore;
    use crate::store::{DatabaseStore, MemoryStore, RequestStore};
    use serde_json::json;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn service_with(settings: CacheSettings) -> OperationService {
        let (event_tx, _) = broadcast::channel(64);
        OperationService::new(
            settings,
            [
                Arc::new(RequestStore::new()),
                Arc::new(MemoryStore::new()),
                Arc::new(DatabaseStore::new()),
            ],
            Arc::new(CacheStats::new()),
            event_tx,
        )
    }

    fn service() -> OperationService {
        service_with(CacheSettings::default())
    }

    #[tokio::test]
    async fn test_put_get_round_trip() {
        let ops = service();
        let key = CacheKey::for_ip_reputation("203.0.113.5");
        let value = json!({"score": 92});

        assert!(ops.put(&key, &value, Some(Duration::from_secs(3600))).await.unwrap());
        assert_eq!(ops.get(&key).await.unwrap(), Some(value));

        // All three levels were written
        for level in CacheLevel::by_priority() {
            assert_eq!(ops.store(*level).entry_count(), 1);
        }
    }

    #[tokio::test]
    async fn test_get_is_idempotent() {
        let ops = service();
        let key = CacheKey::new("item");
        ops.put(&key, &json!(41), None).await.unwrap();

        for _ in 0..5 {
            assert_eq!(ops.get(&key).await.unwrap(), Some(json!(41)));
        }
    }

    #[tokio::test]
    async fn test_miss_records_stats() {
        let ops = service();
        let key = CacheKey::new("absent");

        assert_eq!(ops.get(&key).await.unwrap(), None);
        let snap = ops.stats.snapshot();
        assert_eq!(snap.total_misses, 1);
        assert_eq!(snap.level(CacheLevel::Database).misses, 1);
    }

    #[tokio::test]
    async fn test_promotion_after_low_level_hit() {
        let ops = service();
        let key = CacheKey::new("slow").with_levels(vec![CacheLevel::Database]);
        ops.put(&key, &json!("cold"), None).await.unwrap();

        // Re-open the key to all levels: the hit comes from the database
        // level and gets copied upward.
        let open = CacheKey::new("slow");
        assert_eq!(ops.get(&open).await.unwrap(), Some(json!("cold")));

        assert_eq!(ops.store(CacheLevel::Request).entry_count(), 1);
        assert_eq!(ops.store(CacheLevel::Memory).entry_count(), 1);

        // Next lookup is served by the request level
        ops.get(&open).await.unwrap();
        assert_eq!(ops.stats.level(CacheLevel::Request).snapshot().hits, 1);
    }

    #[tokio::test]
    async fn test_expired_entry_is_a_miss() {
        let ops = service();
        let key = CacheKey::new("stale").with_levels(vec![CacheLevel::Memory]);
        ops.put(&key, &json!(1), Some(Duration::from_secs(60))).await.unwrap();

        // Force expiry behind the engine's back
        let hash = key.hash();
        let entry = ops.store(CacheLevel::Memory).get(&hash).await.unwrap().unwrap();
        let mut expired = entry.clone();
        expired.expires_at = Some(chrono::Utc::now() - chrono::Duration::seconds(1));
        ops.store(CacheLevel::Memory).set(&hash, expired).await.unwrap();

        assert_eq!(ops.get(&key).await.unwrap(), None);
        // The expired entry was dropped on read
        assert_eq!(ops.store(CacheLevel::Memory).entry_count(), 0);
    }

    #[tokio::test]
    async fn test_partial_tier_failure_isolation() {
        let (event_tx, _) = broadcast::channel(64);
        let ops = OperationService::new(
            CacheSettings::default(),
            [
                Arc::new(RequestStore::new()),
                Arc::new(FailingStore::new(CacheLevel::Memory)),
                Arc::new(DatabaseStore::new()),
            ],
            Arc::new(CacheStats::new()),
            event_tx,
        );

        let key = CacheKey::new("resilient");
        // Memory write fails, but the put still succeeds overall
        assert!(ops.put(&key, &json!(7), None).await.unwrap());
        assert_eq!(ops.store(CacheLevel::Database).entry_count(), 1);

        // Reads skip the failing tier
        assert_eq!(ops.get(&key).await.unwrap(), Some(json!(7)));
    }

    #[tokio::test]
    async fn test_remember_computes_once_when_uncontended() {
        let ops = Arc::new(service());
        let key = CacheKey::new("computed");
        let calls = Arc::new(AtomicU64::new(0));

        for _ in 0..3 {
            let calls = calls.clone();
            let value = ops
                .remember(&key, None, move || {
                    let calls = calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok(json!(42))
                    }
                })
                .await
                .unwrap();
            assert_eq!(value, json!(42));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_remember_single_computation_under_contention() {
        let ops = Arc::new(service());
        let key = CacheKey::new("contended");
        let calls = Arc::new(AtomicU64::new(0));

        let mut handles = Vec::new();
        for _ in 0..50 {
            let ops = ops.clone();
            let key = key.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                ops.remember(&key, None, move || {
                    let calls = calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok(json!(42))
                    }
                })
                .await
                .unwrap()
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), json!(42));
        }

        // One primary computation; the bounded-timeout fallback permits at
        // most one more under this 5s default wait.
        assert!(calls.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_remember_falls_back_after_lock_timeout() {
        let settings = CacheSettings {
            lock_wait_timeout: Duration::from_millis(20),
            ..Default::default()
        };
        let ops = Arc::new(service_with(settings));
        let key = CacheKey::new("blocked");

        let holder = {
            let ops = ops.clone();
            let key = key.clone();
            tokio::spawn(async move {
                ops.remember(&key, None, || async {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    Ok(json!("slow"))
                })
                .await
                .unwrap()
            })
        };

        // Give the holder time to take the lock
        tokio::time::sleep(Duration::from_millis(50)).await;

        // This waiter times out and computes on its own
        let value = ops
            .remember(&key, None, || async { Ok(json!("fallback")) })
            .await
            .unwrap();
        assert_eq!(value, json!("fallback"));
        assert_eq!(ops.stats.snapshot().fallback_computes, 1);

        assert_eq!(holder.await.unwrap(), json!("slow"));
    }

    #[tokio::test]
    async fn test_forget_removes_everywhere() {
        let ops = service();
        let key = CacheKey::new("ephemeral");
        ops.put(&key, &json!(true), None).await.unwrap();

        assert!(ops.forget(&key).await.unwrap());
        assert_eq!(ops.get(&key).await.unwrap(), None);
        assert!(!ops.forget(&key).await.unwrap());
    }

    #[tokio::test]
    async fn test_pattern_flush_skips_unsupporting_levels() {
        let ops = service();
        let matching = CacheKey::new("ip:1.2.3.4");
        let other = CacheKey::new("email:a@b.c");
        ops.put(&matching, &json!(1), None).await.unwrap();
        ops.put(&other, &json!(2), None).await.unwrap();

        // Request + memory levels drop the matching key; the database
        // level has no pattern support and keeps both rows.
        let removed = ops.flush(Some("ip:*")).await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(ops.store(CacheLevel::Database).entry_count(), 2);
        assert_eq!(ops.store(CacheLevel::Memory).entry_count(), 1);

        // The database copy still serves the key
        assert_eq!(ops.get(&matching).await.unwrap(), Some(json!(1)));
    }

    #[tokio::test]
    async fn test_full_flush_clears_all_levels() {
        let ops = service();
        ops.put(&CacheKey::new("a"), &json!(1), None).await.unwrap();
        ops.put(&CacheKey::new("b"), &json!(2), None).await.unwrap();

        let removed = ops.flush(None).await.unwrap();
        assert_eq!(removed, 6); // two keys at three levels each

        for level in CacheLevel::by_priority() {
            assert_eq!(ops.store(*level).entry_count(), 0);
        }
    }

    #[tokio::test]
    async fn test_flush_rejects_invalid_pattern() {
        let ops = service();
        assert!(matches!(
            ops.flush(Some("ip:[")).await,
            Err(Error::InvalidKeyFormat(_))
        ));
    }

    #[tokio::test]
    async fn test_oversized_value_skips_small_levels() {
        let settings = CacheSettings {
            max_value_bytes: 8 * 1024 * 1024,
            ..Default::default()
        };
        let ops = service_with(settings);
        let key = CacheKey::new("bulky");
        // Larger than the fast-level ceiling, within the database ceiling
        let value = json!("x".repeat(2 * 1024 * 1024));

        assert!(ops.put(&key, &value, None).await.unwrap());
        assert_eq!(ops.store(CacheLevel::Request).entry_count(), 0);
        assert_eq!(ops.store(CacheLevel::Memory).entry_count(), 0);
        assert_eq!(ops.store(CacheLevel::Database).entry_count(), 1);
    }

    #[tokio::test]
    async fn test_ttl_clamped_per_level() {
        let ops = service();
        let key = CacheKey::new("clamped");
        // Far beyond the memory-level 24h ceiling
        ops.put(&key, &json!(1), Some(Duration::from_secs(30 * 86_400)))
            .await
            .unwrap();

        let memory_entry = ops
            .store(CacheLevel::Memory)
            .get(&key.hash())
            .await
            .unwrap()
            .unwrap();
        let remaining = memory_entry.remaining_ttl().unwrap();
        assert!(remaining <= Duration::from_secs(86_400));

        let database_entry = ops
            .store(CacheLevel::Database)
            .get(&key.hash())
            .await
            .unwrap()
            .unwrap();
        assert!(database_entry.remaining_ttl().unwrap() <= Duration::from_secs(7 * 86_400));
    }
}
