//! Cache Statistics
//!
//! Cache-line aligned per-level counters for concurrent access. Recording
//! is purely additive and never blocks or fails the primary path.

use crate::level::CacheLevel;
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Cache line size for alignment (64 bytes on most modern CPUs)
pub const CACHE_LINE_SIZE: usize = 64;

// =============================================================================
// Per-Level Counters (Cache-Line Aligned)
// =============================================================================

/// Counters for a single cache level, aligned to prevent false sharing
#[repr(C, align(64))]
#[derive(Debug, Default)]
pub struct LevelCounters {
    /// Number of hits served by this level
    pub hits: AtomicU64,
    /// Number of probes that missed this level
    pub misses: AtomicU64,
    /// Number of writes accepted by this level
    pub puts: AtomicU64,
    /// Number of deletions at this level
    pub deletes: AtomicU64,
    /// Cumulative probe latency in microseconds
    pub latency_us_total: AtomicU64,
    /// Number of latency samples recorded
    pub latency_samples: AtomicU64,
    /// Last update timestamp (Unix millis)
    pub last_update_ms: AtomicU64,
    /// Padding to fill the cache line
    _padding: [u8; 8],
}

const _: () = assert!(std::mem::size_of::<LevelCounters>() <= CACHE_LINE_SIZE);

impl LevelCounters {
    /// Record a hit at this level
    #[inline]
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        self.touch();
    }

    /// Record a miss at this level
    #[inline]
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        self.touch();
    }

    /// Record an accepted write
    #[inline]
    pub fn record_put(&self) {
        self.puts.fetch_add(1, Ordering::Relaxed);
        self.touch();
    }

    /// Record a deletion
    #[inline]
    pub fn record_delete(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
        self.touch();
    }

    /// Record a probe latency sample
    #[inline]
    pub fn record_latency(&self, elapsed: Duration) {
        self.latency_us_total
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
        self.latency_samples.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    fn touch(&self) {
        self.last_update_ms
            .store(Utc::now().timestamp_millis() as u64, Ordering::Release);
    }

    /// Hits plus misses
    #[inline]
    pub fn total_requests(&self) -> u64 {
        self.hits.load(Ordering::Relaxed) + self.misses.load(Ordering::Relaxed)
    }

    /// Hit ratio in [0, 1]
    pub fn hit_ratio(&self) -> f64 {
        let total = self.total_requests();
        if total == 0 {
            0.0
        } else {
            self.hits.load(Ordering::Relaxed) as f64 / total as f64
        }
    }

    /// Point-in-time snapshot
    pub fn snapshot(&self) -> LevelStatsSnapshot {
        LevelStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            puts: self.puts.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            latency_us_total: self.latency_us_total.load(Ordering::Relaxed),
            latency_samples: self.latency_samples.load(Ordering::Relaxed),
        }
    }
}

// =============================================================================
// Snapshots
// =============================================================================

/// Point-in-time snapshot of one level's counters
#[derive(Debug, Clone, Default)]
pub struct LevelStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub puts: u64,
    pub deletes: u64,
    pub latency_us_total: u64,
    pub latency_samples: u64,
}

impl LevelStatsSnapshot {
    /// Hit ratio in [0, 1]
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Mean probe latency, if any samples were recorded
    pub fn avg_latency(&self) -> Option<Duration> {
        if self.latency_samples == 0 {
            None
        } else {
            Some(Duration::from_micros(
                self.latency_us_total / self.latency_samples,
            ))
        }
    }
}

/// Aggregate snapshot across all levels
#[derive(Debug, Clone, Default)]
pub struct StatsSnapshot {
    /// Per-level snapshots in priority order
    pub levels: [(CacheLevel, LevelStatsSnapshot); 3],
    /// Hits summed across levels
    pub total_hits: u64,
    /// Full misses (missed every probed level)
    pub total_misses: u64,
    /// Stampede-lock waits that timed out
    pub lock_timeouts: u64,
    /// Computations run by timed-out waiters
    pub fallback_computes: u64,
}

impl StatsSnapshot {
    /// Overall hit ratio: hits at any level over all lookups
    pub fn hit_ratio(&self) -> f64 {
        let total = self.total_hits + self.total_misses;
        if total == 0 {
            0.0
        } else {
            self.total_hits as f64 / total as f64
        }
    }

    /// Snapshot for a specific level
    pub fn level(&self, level: CacheLevel) -> &LevelStatsSnapshot {
        match level {
            CacheLevel::Request => &self.levels[0].1,
            CacheLevel::Memory => &self.levels[1].1,
            CacheLevel::Database => &self.levels[2].1,
        }
    }
}

// =============================================================================
// Statistics Service
// =============================================================================

/// Statistics container shared across services
#[derive(Debug, Default)]
pub struct CacheStats {
    /// Request-level counters
    pub request: LevelCounters,
    /// Memory-level counters
    pub memory: LevelCounters,
    /// Database-level counters
    pub database: LevelCounters,
    /// Lookups that missed every probed level
    pub full_misses: AtomicU64,
    /// Stampede-lock waits that timed out
    pub lock_timeouts: AtomicU64,
    /// Computations run by timed-out waiters
    pub fallback_computes: AtomicU64,
}

impl CacheStats {
    /// Create zeroed statistics
    pub fn new() -> Self {
        Self::default()
    }

    /// Counters for a specific level
    pub fn level(&self, level: CacheLevel) -> &LevelCounters {
        match level {
            CacheLevel::Request => &self.request,
            CacheLevel::Memory => &self.memory,
            CacheLevel::Database => &self.database,
        }
    }

    /// Record a lookup that missed every probed level
    pub fn record_full_miss(&self) {
        self.full_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a stampede-lock wait timeout
    pub fn record_lock_timeout(&self) {
        self.lock_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a fallback computation by a timed-out waiter
    pub fn record_fallback_compute(&self) {
        self.fallback_computes.fetch_add(1, Ordering::Relaxed);
    }

    /// Hit ratio for one level, or the overall ratio when `level` is None
    pub fn hit_ratio(&self, level: Option<CacheLevel>) -> f64 {
        match level {
            Some(level) => self.level(level).hit_ratio(),
            None => self.snapshot().hit_ratio(),
        }
    }

    /// Snapshot of all counters
    pub fn snapshot(&self) -> StatsSnapshot {
        let request = self.request.snapshot();
        let memory = self.memory.snapshot();
        let database = self.database.snapshot();
        let total_hits = request.hits + memory.hits + database.hits;

        StatsSnapshot {
            levels: [
                (CacheLevel::Request, request),
                (CacheLevel::Memory, memory),
                (CacheLevel::Database, database),
            ],
            total_hits,
            total_misses: self.full_misses.load(Ordering::Relaxed),
            lock_timeouts: self.lock_timeouts.load(Ordering::Relaxed),
            fallback_computes: self.fallback_computes.load(Ordering::Relaxed),
        }
    }
}
