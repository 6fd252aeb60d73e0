//! Invalidation Service
//!
//! Tag-scoped, key-scoped, and level-scoped removal. Tag invalidation only
//! consults levels whose capability table advertises tagging; a level that
//! fails mid-invalidation is recorded in the outcome rather than aborting
//! the remaining levels.

use crate::error::Result;
use crate::events::CacheEvent;
use crate::key::CacheKey;
use crate::level::{CacheLevel, Capability};
use crate::ops::OperationService;
use crate::settings::CacheSettings;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Result of a bulk invalidation
#[derive(Debug, Clone, Default)]
pub struct InvalidationOutcome {
    /// Entries removed across all levels
    pub removed: u64,
    /// Levels that failed, with the transport's reason
    pub failures: Vec<(CacheLevel, String)>,
}

impl InvalidationOutcome {
    /// Check whether every consulted level completed
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Tag, key, and level scoped removal
pub struct InvalidationService {
    ops: Arc<OperationService>,
    settings: CacheSettings,
    event_tx: broadcast::Sender<CacheEvent>,
}

impl InvalidationService {
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

    /// Remove every entry carrying a tag from all tagging-capable levels
    pub async fn invalidate_tag(&self, tag: &str) -> Result<InvalidationOutcome> {
        let mut outcome = InvalidationOutcome::default();

        for level in CacheLevel::supporting(Capability::Tagging) {
            if !self.settings.is_enabled(level) {
                continue;
            }

            let store = self.ops.store(level);
            let hashes = match store.hashes_for_tag(tag).await {
                Ok(hashes) => hashes,
                Err(e) => {
                    warn!(tag, level = %level, error = %e, "Tag resolution failed");
                    outcome.failures.push((level, e.to_string()));
                    continue;
                }
            };

            for hash in hashes {
                match store.delete(&hash).await {
                    Ok(Some(_)) => outcome.removed += 1,
                    Ok(None) => {}
                    Err(e) => {
                        warn!(tag, level = %level, error = %e, "Tagged delete failed");
                        outcome.failures.push((level, e.to_string()));
                        break;
                    }
                }
            }
        }

        debug!(tag, removed = outcome.removed, "Tag invalidation finished");
        let _ = self.event_tx.send(CacheEvent::TagInvalidated {
            tag: tag.to_string(),
            removed: outcome.removed,
        });
        Ok(outcome)
    }

    /// Remove one key from every level
    pub async fn invalidate_key(&self, key: &CacheKey) -> Result<bool> {
        self.ops.forget(key).await
    }

    /// Clear one level wholesale, returning the count removed
    pub async fn invalidate_level(&self, level: CacheLevel) -> Result<u64> {
        let removed = self.ops.store(level).clear().await?;
        let _ = self
            .event_tx
            .send(CacheEvent::LevelCleared { level, removed });
        Ok(removed)
    }
}
