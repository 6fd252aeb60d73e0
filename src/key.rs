//! Cache Key Model
//!
//! Immutable key identity with namespace, tags, free-form context, and
//! per-key TTL/level preferences. Two keys with the same
//! `(prefix, namespace, key)` triple are interchangeable: tags and context
//! widen invalidation reach but never change identity. All "mutation" is
//! copy-on-write via `with_*` builders.

use crate::error::{Error, Result};
use crate::level::CacheLevel;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::time::Duration;

/// Fixed path segment identifying this engine's keyspace
pub const BASE_PREFIX: &str = "form_security";

/// Length of the short storage identifier
pub const SHORT_HASH_LEN: usize = 16;

/// Context entry naming the parent of a hierarchical key
const CONTEXT_PARENT: &str = "parent";

/// Context entry naming the child segment of a hierarchical key
const CONTEXT_CHILD: &str = "child";

// =============================================================================
// Cache Key
// =============================================================================

/// Identity and metadata for a cacheable unit
#[derive(Debug, Clone)]
pub struct CacheKey {
    /// Caller-supplied logical identifier (e.g. "ip:203.0.113.5")
    pub key: String,
    /// Namespace grouping related keys
    pub namespace: String,
    /// Tags used for bulk invalidation (order irrelevant)
    pub tags: BTreeSet<String>,
    /// Free-form metadata (hierarchy, versioning, time-bucketing)
    pub context: BTreeMap<String, Value>,
    /// Optional path prefix ahead of the base prefix
    pub prefix: Option<String>,
    /// Per-key TTL override (None = level default)
    pub ttl: Option<Duration>,
    /// Levels this key may occupy, fastest first (None = all)
    pub preferred_levels: Option<Vec<CacheLevel>>,
}

impl CacheKey {
    /// Create a key in the default namespace
    pub fn new(key: impl Into<String>) -> Self {
        Self::in_namespace("default", key)
    }

    /// Create a key in an explicit namespace
    pub fn in_namespace(namespace: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            namespace: namespace.into(),
            tags: BTreeSet::new(),
            context: BTreeMap::new(),
            prefix: None,
            ttl: None,
            preferred_levels: None,
        }
    }

    /// Key for an IP reputation score
    pub fn for_ip_reputation(ip: impl fmt::Display) -> Self {
        Self::in_namespace("reputation", format!("ip:{ip}"))
            .with_tags(["ip", "reputation", "security"])
    }

    /// Key for a geolocation lookup
    pub fn for_geo_location(ip: impl fmt::Display) -> Self {
        Self::in_namespace("geo", format!("ip:{ip}")).with_tags(["ip", "geo"])
    }

    /// Key for a compiled detection pattern
    pub fn for_detection_pattern(pattern_id: impl fmt::Display) -> Self {
        Self::in_namespace("patterns", format!("pattern:{pattern_id}"))
            .with_tags(["patterns", "security"])
    }

    // =========================================================================
    // Copy-on-write builders
    // =========================================================================

    /// Copy with the given tags added
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Copy with one tag added
    pub fn with_tag(self, tag: impl Into<String>) -> Self {
        self.with_tags([tag])
    }

    /// Copy with a TTL override
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Copy in a different namespace
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Copy with a path prefix
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Copy restricted to the given levels, fastest first
    pub fn with_levels(mut self, levels: impl Into<Vec<CacheLevel>>) -> Self {
        self.preferred_levels = Some(levels.into());
        self
    }

    /// Copy with one context entry set
    pub fn with_context(mut self, name: impl Into<String>, value: Value) -> Self {
        self.context.insert(name.into(), value);
        self
    }

    // =========================================================================
    // Hierarchy
    // =========================================================================

    /// Derive a child key under this one
    ///
    /// The child inherits namespace, prefix, tags, TTL, and level
    /// preferences; its context records the parent identity so siblings can
    /// be derived from it later.
    pub fn create_child(&self, segment: impl Into<String>) -> Self {
        let segment = segment.into();
        let mut child = self.clone();
        child.key = format!("{}:{}", self.key, segment);
        child
            .context
            .insert(CONTEXT_PARENT.into(), Value::String(self.key.clone()));
        child
            .context
            .insert(CONTEXT_CHILD.into(), Value::String(segment));
        child
    }

    /// Derive a sibling of a hierarchical key
    ///
    /// Fails with `InvalidKeyStructure` when called on a key that was not
    /// produced by `create_child`.
    pub fn create_sibling(&self, segment: impl Into<String>) -> Result<Self> {
        let parent = match self.context.get(CONTEXT_PARENT) {
            Some(Value::String(parent)) => parent.clone(),
            _ => {
                return Err(Error::InvalidKeyStructure(format!(
                    "key '{}' has no parent context; siblings require a hierarchical key",
                    self.key
                )))
            }
        };

        let segment = segment.into();
        let mut sibling = self.clone();
        sibling.key = format!("{parent}:{segment}");
        sibling
            .context
            .insert(CONTEXT_CHILD.into(), Value::String(segment));
        Ok(sibling)
    }

    /// Check whether this key was derived via `create_child`
    pub fn is_hierarchical(&self) -> bool {
        matches!(self.context.get(CONTEXT_PARENT), Some(Value::String(_)))
    }

    // =========================================================================
    // Identity
    // =========================================================================

    /// Externally visible identity: a colon-joined path
    ///
    /// `prefix:form_security:namespace:key`, with the prefix segment omitted
    /// when unset. Deterministic and collision-resistant for distinct
    /// `(prefix, namespace, key)` triples.
    pub fn to_path(&self) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}:{BASE_PREFIX}:{}:{}", self.namespace, self.key),
            None => format!("{BASE_PREFIX}:{}:{}", self.namespace, self.key),
        }
    }

    /// Canonical tier-storage identifier: SHA-256 of the path, hex-encoded
    pub fn hash(&self) -> String {
        let digest = Sha256::digest(self.to_path().as_bytes());
        hex::encode(digest)
    }

    /// Truncated storage identifier for log lines and compact indexes
    pub fn short_hash(&self) -> String {
        let mut hash = self.hash();
        hash.truncate(SHORT_HASH_LEN);
        hash
    }

    /// Tags as a plain vector, for persistence alongside the value
    pub fn tag_list(&self) -> Vec<String> {
        self.tags.iter().cloned().collect()
    }

    /// Levels this key may occupy, in probe order
    pub fn levels(&self) -> Vec<CacheLevel> {
        match &self.preferred_levels {
            Some(levels) => {
                let mut levels = levels.clone();
                levels.sort_by_key(|level| level.priority());
                levels
            }
            None => CacheLevel::by_priority().to_vec(),
        }
    }
}

impl PartialEq for CacheKey {
    fn eq(&self, other: &Self) -> bool {
        self.prefix == other.prefix && self.namespace == other.namespace && self.key == other.key
    }
}

impl Eq for CacheKey {}

impl Hash for CacheKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.prefix.hash(state);
        self.namespace.hash(state);
        self.key.hash(state);
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_path_layout() {
        let key = CacheKey::new("ip:203.0.113.5");
        assert_eq!(key.to_path(), "form_security:default:ip:203.0.113.5");

        let prefixed = key.clone().with_prefix("edge").with_namespace("reputation");
        assert_eq!(
            prefixed.to_path(),
            "edge:form_security:reputation:ip:203.0.113.5"
        );
    }

    #[test]
    fn test_hash_is_stable_and_hex() {
        let a = CacheKey::new("ip:203.0.113.5");
        let b = CacheKey::new("ip:203.0.113.5");
        assert_eq!(a.hash(), b.hash());
        assert_eq!(a.hash().len(), 64);
        assert!(a.hash().chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(a.short_hash().len(), SHORT_HASH_LEN);

        let other = CacheKey::new("ip:203.0.113.6");
        assert_ne!(a.hash(), other.hash());
    }

    #[test]
    fn test_identity_ignores_tags_and_context() {
        let plain = CacheKey::new("ip:203.0.113.5");
        let tagged = CacheKey::new("ip:203.0.113.5")
            .with_tag("security")
            .with_context("bucket", Value::from(7));

        assert_eq!(plain, tagged);
        assert_eq!(plain.hash(), tagged.hash());
    }

    #[test]
    fn test_builders_do_not_mutate() {
        let base = CacheKey::new("item");
        let derived = base.clone().with_ttl(Duration::from_secs(60)).with_tag("t");

        assert_eq!(base.ttl, None);
        assert!(base.tags.is_empty());
        assert_eq!(derived.ttl, Some(Duration::from_secs(60)));
        assert!(derived.tags.contains("t"));
    }

    #[test]
    fn test_child_and_sibling() {
        let parent = CacheKey::in_namespace("reputation", "ip:203.0.113.5");
        let child = parent.create_child("score");
        assert_eq!(child.key, "ip:203.0.113.5:score");
        assert!(child.is_hierarchical());
        assert_eq!(child.namespace, "reputation");

        let sibling = child.create_sibling("country").unwrap();
        assert_eq!(sibling.key, "ip:203.0.113.5:country");

        // Non-hierarchical keys cannot produce siblings
        assert_matches!(
            parent.create_sibling("country"),
            Err(Error::InvalidKeyStructure(_))
        );
    }

    #[test]
    fn test_domain_constructors() {
        let rep = CacheKey::for_ip_reputation("203.0.113.5");
        assert_eq!(rep.namespace, "reputation");
        assert_eq!(rep.key, "ip:203.0.113.5");
        assert!(rep.tags.contains("security"));

        let geo = CacheKey::for_geo_location("203.0.113.5");
        assert_eq!(geo.namespace, "geo");

        let pattern = CacheKey::for_detection_pattern(42);
        assert_eq!(pattern.key, "pattern:42");
    }

    #[test]
    fn test_levels_sorted_by_priority() {
        let key =
            CacheKey::new("item").with_levels(vec![CacheLevel::Database, CacheLevel::Request]);
        assert_eq!(
            key.levels(),
            vec![CacheLevel::Request, CacheLevel::Database]
        );

        let unrestricted = CacheKey::new("item");
        assert_eq!(unrestricted.levels().len(), 3);
    }
}
