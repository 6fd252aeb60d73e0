//! Cache Manager
//!
//! The public facade assembling the engine: key validation ahead of every
//! tier touch, the tiered operation service, invalidation, warming, and
//! maintenance, plus the event broadcast and statistics surfaces. One
//! manager instance is shared across the process; all state lives behind
//! `Arc`s so clones are cheap handles.

use crate::error::Result;
use crate::events::CacheEvent;
use crate::invalidation::{InvalidationOutcome, InvalidationService};
use crate::key::CacheKey;
use crate::key_manager::KeyManager;
use crate::level::CacheLevel;
use crate::maintenance::{MaintenanceReport, MaintenanceService};
use crate::ops::OperationService;
use crate::settings::CacheSettings;
use crate::stats::{CacheStats, StatsSnapshot};
use crate::store::{DatabaseStore, MemoryStore, RequestStore, TierStoreRef};
use crate::warming::{WarmReport, WarmingService};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Multi-level cache engine facade
pub struct CacheManager {
    settings: CacheSettings,
    keys: KeyManager,
    ops: Arc<OperationService>,
    invalidation: InvalidationService,
    warming: WarmingService,
    maintenance: Arc<MaintenanceService>,
    stats: Arc<CacheStats>,
    event_tx: broadcast::Sender<CacheEvent>,
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl CacheManager {
    /// Create a manager with the in-process reference stores
    pub fn new(settings: CacheSettings) -> Result<Self> {
        let stores: [TierStoreRef; 3] = [
            Arc::new(RequestStore::new()),
            Arc::new(MemoryStore::new()),
            Arc::new(DatabaseStore::new()),
        ];
        Self::with_stores(settings, stores)
    }

    /// Create a manager over caller-supplied level stores
    ///
    /// `stores` must be ordered Request, Memory, Database. This is the
    /// seam production deployments use to plug in network transports.
    pub fn with_stores(settings: CacheSettings, stores: [TierStoreRef; 3]) -> Result<Self> {
        settings.validate()?;

        let (event_tx, _) = broadcast::channel(settings.event_channel_capacity);
        let stats = Arc::new(CacheStats::new());
        let keys = KeyManager::new(&settings);
        let ops = Arc::new(OperationService::new(
            settings.clone(),
            stores,
            stats.clone(),
            event_tx.clone(),
        ));
        let invalidation =
            InvalidationService::new(ops.clone(), settings.clone(), event_tx.clone());
        let warming = WarmingService::new(ops.clone());
        let maintenance = Arc::new(MaintenanceService::new(
            ops.clone(),
            settings.clone(),
            event_tx.clone(),
        ));

        info!(
            levels = settings.enabled_levels.len(),
            auto_promote = settings.auto_promote,
            "Cache manager initialized"
        );

        Ok(Self {
            settings,
            keys,
            ops,
            invalidation,
            warming,
            maintenance,
            stats,
            event_tx,
        })
    }

    /// Engine settings in effect
    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    /// Key construction and validation helper
    pub fn keys(&self) -> &KeyManager {
        &self.keys
    }

    // =========================================================================
    // Core operations
    // =========================================================================

    /// Look a key up across its levels, fastest first
    pub async fn get(&self, key: &CacheKey) -> Result<Option<Value>> {
        self.keys.validate(key)?;
        self.ops.get(key).await
    }

    /// Look a key up at one level only
    pub async fn get_from_level(
        &self,
        key: &CacheKey,
        level: CacheLevel,
    ) -> Result<Option<Value>> {
        self.keys.validate(key)?;
        self.ops.get_from_level(key, level).await
    }

    /// Write a value to every eligible level
    pub async fn put(&self, key: &CacheKey, value: &Value, ttl: Option<Duration>) -> Result<bool> {
        self.keys.validate(key)?;
        let written = self.ops.put(key, value, ttl).await?;
        if written {
            self.maybe_sweep();
        }
        Ok(written)
    }

    /// Write a value to one level only
    pub async fn put_to_level(
        &self,
        key: &CacheKey,
        value: &Value,
        ttl: Option<Duration>,
        level: CacheLevel,
    ) -> Result<bool> {
        self.keys.validate(key)?;
        self.ops.put_to_level(key, value, ttl, level).await
    }

    /// Get, or compute once under the per-key stampede lock and cache
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
        self.keys.validate(key)?;
        let value = self.ops.remember(key, ttl, compute).await?;
        self.maybe_sweep();
        Ok(value)
    }

    /// Delete a key from every level
    pub async fn forget(&self, key: &CacheKey) -> Result<bool> {
        self.keys.validate(key)?;
        self.ops.forget(key).await
    }

    /// Clear everything, or everything matching a glob pattern
    pub async fn flush(&self, pattern: Option<&str>) -> Result<u64> {
        self.ops.flush(pattern).await
    }

    // =========================================================================
    // Invalidation and warming
    // =========================================================================

    /// Remove every entry carrying a tag from tagging-capable levels
    pub async fn invalidate_tag(&self, tag: &str) -> Result<InvalidationOutcome> {
        self.invalidation.invalidate_tag(tag).await
    }

    /// Clear one level wholesale
    pub async fn invalidate_level(&self, level: CacheLevel) -> Result<u64> {
        self.invalidation.invalidate_level(level).await
    }

    /// Pre-populate a batch of keys, skipping those already shared-resident
    pub async fn warm<F, Fut>(
        &self,
        keys: &[CacheKey],
        ttl: Option<Duration>,
        compute: F,
    ) -> Result<WarmReport>
    where
        F: Fn(CacheKey) -> Fut,
        Fut: Future<Output = Result<Value>>,
    {
        for key in keys {
            self.keys.validate(key)?;
        }
        Ok(self.warming.warm(keys, ttl, compute).await)
    }

    // =========================================================================
    // Maintenance and lifecycle
    // =========================================================================

    /// Sweep expired entries from every enabled level
    pub async fn sweep_expired(&self) -> Result<u64> {
        self.maintenance.sweep_expired().await
    }

    /// One full maintenance pass: sweep, then enforce the size bound
    pub async fn run_maintenance(&self) -> Result<MaintenanceReport> {
        self.maintenance.run_scheduled().await
    }

    /// Tear down the request level at the unit-of-work boundary
    pub async fn end_request(&self) -> Result<u64> {
        self.ops.store(CacheLevel::Request).clear().await
    }

    /// Probe every level's transport
    pub async fn health_check(&self) -> Vec<(CacheLevel, bool)> {
        let mut report = Vec::with_capacity(3);
        for level in CacheLevel::by_priority() {
            let healthy = self
                .ops
                .store(*level)
                .health_check()
                .await
                .unwrap_or(false);
            report.push((*level, healthy));
        }
        report
    }

    // =========================================================================
    // Observability
    // =========================================================================

    /// Subscribe to engine events
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.event_tx.subscribe()
    }

    /// Point-in-time statistics snapshot
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Hit ratio for one level, or the overall ratio when `level` is None
    pub fn hit_ratio(&self, level: Option<CacheLevel>) -> f64 {
        self.stats.hit_ratio(level)
    }

    /// Roll the sweep probability and run maintenance off the hot path
    fn maybe_sweep(&self) {
        if self.settings.sweep_probability <= 0.0 {
            return;
        }
        if rand::random::<f64>() >= self.settings.sweep_probability {
            return;
        }

        let maintenance = self.maintenance.clone();
        tokio::spawn(async move {
            if let Err(e) = maintenance.run_scheduled().await {
                warn!(error = %e, "Background maintenance pass failed");
            }
        });
    }
}
