//! Warming Service
//!
//! Pre-populates the cache ahead of traffic. Keys already resident in a
//! shared level are skipped; the rest run through the stampede-locked
//! compute path so concurrent warmers never duplicate work.

use crate::error::Result;
use crate::key::CacheKey;
use crate::level::CacheLevel;
use crate::ops::OperationService;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Result of a warming pass
#[derive(Debug, Clone, Default)]
pub struct WarmReport {
    /// Keys computed and written
    pub warmed: u64,
    /// Keys skipped because a shared level already held them
    pub already_cached: u64,
    /// Keys whose computation failed
    pub failed: u64,
}

/// Cache pre-population
pub struct WarmingService {
    ops: Arc<OperationService>,
}

impl WarmingService {
    /// Create the service over the shared operation service
    pub fn new(ops: Arc<OperationService>) -> Self {
        Self { ops }
    }

    /// Warm a batch of keys with a per-key compute function
    ///
    /// Only the shared levels count as "already cached": a copy that exists
    /// solely in the request level would vanish with the unit of work, so
    /// it does not exempt the key from warming.
    pub async fn warm<F, Fut>(
        &self,
        keys: &[CacheKey],
        ttl: Option<Duration>,
        compute: F,
    ) -> WarmReport
    where
        F: Fn(CacheKey) -> Fut,
        Fut: Future<Output = Result<Value>>,
    {
        let mut report = WarmReport::default();

        for key in keys {
            if self.is_shared_resident(key).await {
                report.already_cached += 1;
                continue;
            }

            let result = self
                .ops
                .remember(key, ttl, || compute(key.clone()))
                .await;
            match result {
                Ok(_) => report.warmed += 1,
                Err(e) => {
                    warn!(key = %key, error = %e, "Warming computation failed");
                    report.failed += 1;
                }
            }
        }

        debug!(
            warmed = report.warmed,
            already_cached = report.already_cached,
            failed = report.failed,
            "Warming pass finished"
        );
        report
    }

    async fn is_shared_resident(&self, key: &CacheKey) -> bool {
        for level in [CacheLevel::Memory, CacheLevel::Database] {
            if let Ok(Some(_)) = self.ops.get_from_level(key, level).await {
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::settings::CacheSettings;
    use crate::stats::CacheStats;
    use crate::store::{DatabaseStore, MemoryStore, RequestStore};
    use serde_json::json;
    use std::sync::atomic::{AtomicU64, Ordering};
    use tokio::sync::broadcast;

    fn build() -> (Arc<OperationService>, WarmingService) {
        let (event_tx, _) = broadcast::channel(64);
        let ops = Arc::new(OperationService::new(
            CacheSettings::default(),
            [
                Arc::new(RequestStore::new()),
                Arc::new(MemoryStore::new()),
                Arc::new(DatabaseStore::new()),
            ],
            Arc::new(CacheStats::new()),
            event_tx,
        ));
        let warming = WarmingService::new(ops.clone());
        (ops, warming)
    }

    #[tokio::test]
    async fn test_warms_missing_keys() {
        let (ops, warming) = build();
        let keys = vec![
            CacheKey::for_ip_reputation("1.2.3.4"),
            CacheKey::for_ip_reputation("5.6.7.8"),
        ];
        let calls = Arc::new(AtomicU64::new(0));

        let report = {
            let calls = calls.clone();
            warming
                .warm(&keys, Some(Duration::from_secs(3600)), move |key| {
                    let calls = calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok(json!({"for": key.key}))
                    }
                })
                .await
        };

        assert_eq!(report.warmed, 2);
        assert_eq!(report.already_cached, 0);
        assert_eq!(report.failed, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        for key in &keys {
            assert!(ops.get(key).await.unwrap().is_some());
        }
    }

    #[tokio::test]
    async fn test_skips_keys_already_in_shared_levels() {
        let (ops, warming) = build();
        let cached = CacheKey::new("resident");
        let missing = CacheKey::new("absent");
        ops.put(&cached, &json!(1), None).await.unwrap();

        let report = warming
            .warm(&[cached, missing], None, |_| async { Ok(json!(2)) })
            .await;

        assert_eq!(report.already_cached, 1);
        assert_eq!(report.warmed, 1);
    }

    #[tokio::test]
    async fn test_request_only_residency_does_not_exempt() {
        let (ops, warming) = build();
        let key = CacheKey::new("fleeting").with_levels(vec![CacheLevel::Request]);
        ops.put(&key, &json!(1), None).await.unwrap();

        let open = CacheKey::new("fleeting");
        let report = warming
            .warm(&[open], None, |_| async { Ok(json!(2)) })
            .await;
        assert_eq!(report.warmed, 1);
        assert_eq!(report.already_cached, 0);
    }

    #[tokio::test]
    async fn test_failed_computation_is_counted_not_fatal() {
        let (_, warming) = build();
        let keys = vec![CacheKey::new("bad"), CacheKey::new("good")];

        let report = warming
            .warm(&keys, None, |key| async move {
                if key.key == "bad" {
                    Err(Error::Configuration("upstream down".into()))
                } else {
                    Ok(json!("ok"))
                }
            })
            .await;

        assert_eq!(report.failed, 1);
        assert_eq!(report.warmed, 1);
    }
}
