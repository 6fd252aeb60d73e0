//! Maintenance Service
//!
//! Housekeeping that keeps the levels inside their contracts: sweeping
//! entries past expiry and holding the database level under its size
//! bound. The manager triggers sweeps probabilistically after writes;
//! deployments with a scheduler call `run_scheduled` directly.

use crate::error::Result;
use crate::events::CacheEvent;
use crate::level::CacheLevel;
use crate::ops::OperationService;
use crate::settings::CacheSettings;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Result of one full maintenance pass
#[derive(Debug, Clone, Default)]
pub struct MaintenanceReport {
    /// Expired entries removed across levels
    pub swept: u64,
    /// Entries evicted to hold the database size bound
    pub evicted: u64,
}

/// Expiry sweeps and size-bound enforcement
pub struct MaintenanceService {
    ops: Arc<OperationService>,
    settings: CacheSettings,
    event_tx: broadcast::Sender<CacheEvent>,
}

impl MaintenanceService {
    /// Create the service over the shared operation service
    pub fn new(
        ops: Arc<OperationService>,
        settings: CacheSettings,
        event_tx: broadcast::Sender<CacheEvent>,
    ) -> Self {
        Self {
            ops,
            settings,
            event_tx,
        }
    }

    /// Sweep expired entries from every enabled level
    pub async fn sweep_expired(&self) -> Result<u64> {
        let mut total = 0;

        for level in CacheLevel::by_priority() {
            if !self.settings.is_enabled(*level) {
                continue;
            }
            match self.ops.store(*level).sweep_expired().await {
                Ok(removed) => {
                    if removed > 0 {
                        debug!(level = %level, removed, "Swept expired entries");
                        let _ = self.event_tx.send(CacheEvent::Swept {
                            level: *level,
                            removed,
                        });
                    }
                    total += removed;
                }
                Err(e) => {
                    warn!(level = %level, error = %e, "Sweep failed; continuing");
                }
            }
        }

        Ok(total)
    }

    /// Evict oldest database rows until the configured size bound holds
    pub async fn enforce_size_bound(&self) -> Result<u64> {
        if !self.settings.is_enabled(CacheLevel::Database) {
            return Ok(0);
        }

        let store = self.ops.store(CacheLevel::Database);
        let evicted = store.evict_to_size(self.settings.database_max_bytes).await?;
        if evicted > 0 {
            debug!(evicted, max_bytes = self.settings.database_max_bytes, "Enforced database size bound");
        }
        Ok(evicted)
    }

    /// One full pass: sweep everywhere, then enforce the size bound
    pub async fn run_scheduled(&self) -> Result<MaintenanceReport> {
        let swept = self.sweep_expired().await?;
        let evicted = self.enforce_size_bound().await?;
        Ok(MaintenanceReport { swept, evicted })
    }
}
