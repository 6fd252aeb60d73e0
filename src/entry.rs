//! Stored Entry
//!
//! The tier-internal record persisted alongside a value: serialized bytes,
//! expiry, tag list, and bookkeeping timestamps. Each tier owns its own
//! entries; the engine only ever sees them through the transport contract.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A stored cache record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredEntry {
    /// Logical key this entry was stored under (pattern-match target)
    pub key: String,
    /// Serialized value bytes
    pub value: Bytes,
    /// Absolute expiry (None = bounded by the tier's own lifetime)
    pub expires_at: Option<DateTime<Utc>>,
    /// Tags for bulk invalidation
    pub tags: Vec<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Serialized size in bytes
    pub size_bytes: u64,
}

impl StoredEntry {
    /// Create an entry expiring after `ttl`
    ///
    /// A zero TTL produces no numeric expiry: the entry lives until its
    /// tier is torn down (the request-level unit-of-work contract).
    pub fn new(key: impl Into<String>, value: Bytes, ttl: Duration, tags: Vec<String>) -> Self {
        let now = Utc::now();
        let expires_at = if ttl.is_zero() {
            None
        } else {
            now.checked_add_signed(
                chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX),
            )
        };
        let size_bytes = value.len() as u64;

        Self {
            key: key.into(),
            value,
            expires_at,
            tags,
            created_at: now,
            size_bytes,
        }
    }

    /// Check if the entry has passed its expiry
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => Utc::now() > expires_at,
            None => false,
        }
    }

    /// Remaining lifetime, if the entry carries a numeric expiry
    pub fn remaining_ttl(&self) -> Option<Duration> {
        let expires_at = self.expires_at?;
        let remaining = expires_at.signed_duration_since(Utc::now());
        remaining.to_std().ok()
    }

    /// Check if the entry carries a given tag
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Age since creation
    pub fn age(&self) -> Duration {
        Utc::now()
            .signed_duration_since(self.created_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }
}
