//! Cache Level Definitions
//!
//! Defines the three-level cache hierarchy as a closed enum with a static
//! capability table. Every algorithm in the engine consults this table for
//! tier ordering and feature support; no other module hard-codes either.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

// =============================================================================
// Size Ceilings
// =============================================================================

/// Maximum serialized value size for the request and memory levels: 1 MB
pub const FAST_LEVEL_MAX_VALUE_BYTES: u64 = 1024 * 1024;

/// Maximum serialized value size for the database level: 4 MB
pub const DATABASE_MAX_VALUE_BYTES: u64 = 4 * 1024 * 1024;

// =============================================================================
// Cache Level
// =============================================================================

/// Cache level representing the storage hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheLevel {
    /// In-process store scoped to one unit of work (fastest, ephemeral)
    #[default]
    Request,
    /// Distributed memory store shared across instances (fast, volatile)
    Memory,
    /// Relational store (slowest, durable)
    Database,
}

/// Expected latency band for a level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LatencyBand {
    /// Sub-microsecond, in-process
    Instant,
    /// Sub-millisecond, one network round trip
    Fast,
    /// Milliseconds, disk-backed query
    Slow,
}

/// Named capability a level may support
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Tag -> key index maintained for bulk invalidation
    Tagging,
    /// Visible to other processes/instances
    Distribution,
    /// Glob-pattern scoped deletion
    PatternMatching,
}

/// Static capability data for one level
#[derive(Debug, Clone, Copy)]
pub struct LevelCaps {
    /// Default TTL when the caller supplies none (zero = unit of work)
    pub default_ttl: Duration,
    /// Hard TTL ceiling; caller TTLs are clamped to this
    pub max_ttl: Duration,
    /// Expected latency band
    pub latency: LatencyBand,
    /// Whether a tag index is maintained
    pub supports_tagging: bool,
    /// Whether entries are visible across instances
    pub supports_distribution: bool,
    /// Whether pattern-scoped deletion is supported
    pub supports_pattern_matching: bool,
    /// Lookup priority (1 = checked first)
    pub priority: u8,
    /// Maximum serialized value size accepted by this level
    pub max_value_bytes: u64,
}

const REQUEST_CAPS: LevelCaps = LevelCaps {
    default_ttl: Duration::ZERO,
    max_ttl: Duration::ZERO,
    latency: LatencyBand::Instant,
    supports_tagging: false,
    supports_distribution: false,
    supports_pattern_matching: true,
    priority: 1,
    max_value_bytes: FAST_LEVEL_MAX_VALUE_BYTES,
};

const MEMORY_CAPS: LevelCaps = LevelCaps {
    default_ttl: Duration::from_secs(3600),
    max_ttl: Duration::from_secs(86_400),
    latency: LatencyBand::Fast,
    supports_tagging: true,
    supports_distribution: true,
    supports_pattern_matching: true,
    priority: 2,
    max_value_bytes: FAST_LEVEL_MAX_VALUE_BYTES,
};

const DATABASE_CAPS: LevelCaps = LevelCaps {
    default_ttl: Duration::from_secs(86_400),
    max_ttl: Duration::from_secs(7 * 86_400),
    latency: LatencyBand::Slow,
    supports_tagging: true,
    supports_distribution: true,
    supports_pattern_matching: false,
    priority: 3,
    max_value_bytes: DATABASE_MAX_VALUE_BYTES,
};

impl CacheLevel {
    /// Get the static capability data for this level
    pub fn caps(&self) -> &'static LevelCaps {
        match self {
            CacheLevel::Request => &REQUEST_CAPS,
            CacheLevel::Memory => &MEMORY_CAPS,
            CacheLevel::Database => &DATABASE_CAPS,
        }
    }

    /// All levels in priority order (Request -> Memory -> Database)
    pub fn by_priority() -> &'static [CacheLevel] {
        &[CacheLevel::Request, CacheLevel::Memory, CacheLevel::Database]
    }

    /// Levels supporting a named capability, in priority order
    pub fn supporting(capability: Capability) -> Vec<CacheLevel> {
        Self::by_priority()
            .iter()
            .copied()
            .filter(|level| level.supports(capability))
            .collect()
    }

    /// Check whether this level supports a named capability
    pub fn supports(&self, capability: Capability) -> bool {
        let caps = self.caps();
        match capability {
            Capability::Tagging => caps.supports_tagging,
            Capability::Distribution => caps.supports_distribution,
            Capability::PatternMatching => caps.supports_pattern_matching,
        }
    }

    /// Lookup priority (1 = checked first)
    pub fn priority(&self) -> u8 {
        self.caps().priority
    }

    /// Check if this level is probed before another
    pub fn is_faster_than(&self, other: &CacheLevel) -> bool {
        self.priority() < other.priority()
    }

    /// Clamp a requested TTL to this level's policy
    ///
    /// `None` uses the level default; any request is capped at the level
    /// maximum. A zero result on the request level means "lives for the
    /// current unit of work" rather than a numeric expiry.
    pub fn clamp_ttl(&self, requested: Option<Duration>) -> Duration {
        let caps = self.caps();
        requested.unwrap_or(caps.default_ttl).min(caps.max_ttl)
    }

    /// Check whether a serialized value of the given size fits this level
    pub fn is_suitable_for_size(&self, size_bytes: u64) -> bool {
        size_bytes <= self.caps().max_value_bytes
    }
}

impl fmt::Display for CacheLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheLevel::Request => write!(f, "request"),
            CacheLevel::Memory => write!(f, "memory"),
            CacheLevel::Database => write!(f, "database"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_order() {
        let order = CacheLevel::by_priority();
        assert_eq!(
            order,
            &[CacheLevel::Request, CacheLevel::Memory, CacheLevel::Database]
        );

        // Priorities are strictly ascending
        for pair in order.windows(2) {
            assert!(pair[0].priority() < pair[1].priority());
            assert!(pair[0].is_faster_than(&pair[1]));
        }
    }

    #[test]
    fn test_capability_table() {
        assert!(!CacheLevel::Request.supports(Capability::Tagging));
        assert!(CacheLevel::Memory.supports(Capability::Tagging));
        assert!(CacheLevel::Database.supports(Capability::Tagging));

        assert!(CacheLevel::Memory.supports(Capability::PatternMatching));
        assert!(!CacheLevel::Database.supports(Capability::PatternMatching));

        let tagging = CacheLevel::supporting(Capability::Tagging);
        assert_eq!(tagging, vec![CacheLevel::Memory, CacheLevel::Database]);
    }

    #[test]
    fn test_ttl_clamp() {
        // None -> level default
        assert_eq!(
            CacheLevel::Memory.clamp_ttl(None),
            Duration::from_secs(3600)
        );

        // Within bounds -> unchanged
        assert_eq!(
            CacheLevel::Memory.clamp_ttl(Some(Duration::from_secs(60))),
            Duration::from_secs(60)
        );

        // Above max -> clamped
        assert_eq!(
            CacheLevel::Memory.clamp_ttl(Some(Duration::from_secs(1_000_000))),
            Duration::from_secs(86_400)
        );

        // Request level lives for the unit of work regardless of the request
        assert_eq!(
            CacheLevel::Request.clamp_ttl(Some(Duration::from_secs(3600))),
            Duration::ZERO
        );
    }

    #[test]
    fn test_size_suitability() {
        assert!(CacheLevel::Memory.is_suitable_for_size(1024));
        assert!(!CacheLevel::Memory.is_suitable_for_size(FAST_LEVEL_MAX_VALUE_BYTES + 1));
        assert!(CacheLevel::Database.is_suitable_for_size(FAST_LEVEL_MAX_VALUE_BYTES + 1));
        assert!(!CacheLevel::Database.is_suitable_for_size(DATABASE_MAX_VALUE_BYTES + 1));
    }

    #[test]
    fn test_display() {
        assert_eq!(CacheLevel::Request.to_string(), "request");
        assert_eq!(CacheLevel::Memory.to_string(), "memory");
        assert_eq!(CacheLevel::Database.to_string(), "database");
    }
}
