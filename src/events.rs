//! Cache Events
//!
//! Events broadcast by the engine for monitoring and observability.

use crate::key::CacheKey;
use crate::level::CacheLevel;
use serde::{Deserialize, Serialize};

/// Events emitted by the cache engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CacheEvent {
    /// Entry was written to a level
    Put {
        key: String,
        level: CacheLevel,
        size_bytes: u64,
    },

    /// Lookup hit
    Hit {
        key: String,
        level: CacheLevel,
        promoted: bool,
    },

    /// Lookup missed every probed level
    Miss { key: String },

    /// Entry was deleted from a level
    Delete { key: String, level: CacheLevel },

    /// Entry found at a slow level was copied into faster ones
    Promote {
        key: String,
        from_level: CacheLevel,
        to_level: CacheLevel,
    },

    /// Tag invalidation completed
    TagInvalidated { tag: String, removed: u64 },

    /// Expired entries were swept from a level
    Swept { level: CacheLevel, removed: u64 },

    /// A level was cleared wholesale
    LevelCleared { level: CacheLevel, removed: u64 },

    /// A stampede-lock wait timed out; the waiter computed independently
    LockTimedOut { key: String },

    /// A level transport failed and was treated as a miss
    LevelFailed { level: CacheLevel, reason: String },
}

impl CacheEvent {
    /// Create a Put event
    pub fn put(key: &CacheKey, level: CacheLevel, size_bytes: u64) -> Self {
        CacheEvent::Put {
            key: key.to_path(),
            level,
            size_bytes,
        }
    }

    /// Create a Hit event
    pub fn hit(key: &CacheKey, level: CacheLevel, promoted: bool) -> Self {
        CacheEvent::Hit {
            key: key.to_path(),
            level,
            promoted,
        }
    }

    /// Create a Miss event
    pub fn miss(key: &CacheKey) -> Self {
        CacheEvent::Miss { key: key.to_path() }
    }

    /// Create a Delete event
    pub fn delete(key: &CacheKey, level: CacheLevel) -> Self {
        CacheEvent::Delete {
            key: key.to_path(),
            level,
        }
    }

    /// Create a Promote event
    pub fn promote(key: &CacheKey, from_level: CacheLevel, to_level: CacheLevel) -> Self {
        CacheEvent::Promote {
            key: key.to_path(),
            from_level,
            to_level,
        }
    }

    /// Get the key associated with this event (if any)
    pub fn key(&self) -> Option<&str> {
        match self {
            CacheEvent::Put { key, .. } => Some(key),
            CacheEvent::Hit { key, .. } => Some(key),
            CacheEvent::Miss { key } => Some(key),
            CacheEvent::Delete { key, .. } => Some(key),
            CacheEvent::Promote { key, .. } => Some(key),
            CacheEvent::LockTimedOut { key } => Some(key),
            _ => None,
        }
    }

    /// Get the level associated with this event (if any)
    pub fn level(&self) -> Option<CacheLevel> {
        match self {
            CacheEvent::Put { level, .. } => Some(*level),
            CacheEvent::Hit { level, .. } => Some(*level),
            CacheEvent::Delete { level, .. } => Some(*level),
            CacheEvent::Swept { level, .. } => Some(*level),
            CacheEvent::LevelCleared { level, .. } => Some(*level),
            CacheEvent::LevelFailed { level, .. } => Some(*level),
            _ => None,
        }
    }

    /// Check if this event reports degraded behavior
    pub fn is_degraded(&self) -> bool {
        matches!(
            self,
            CacheEvent::LevelFailed { .. } | CacheEvent::LockTimedOut { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_accessors() {
        let key = CacheKey::for_ip_reputation("203.0.113.5");

        let hit = CacheEvent::hit(&key, CacheLevel::Memory, true);
        assert_eq!(hit.key(), Some("form_security:reputation:ip:203.0.113.5"));
        assert_eq!(hit.level(), Some(CacheLevel::Memory));
        assert!(!hit.is_degraded());

        let failed = CacheEvent::LevelFailed {
            level: CacheLevel::Memory,
            reason: "connection refused".into(),
        };
        assert!(failed.is_degraded());
        assert_eq!(failed.key(), None);
    }
}
