//! Cache Settings
//!
//! Immutable configuration produced once at construction time and injected
//! into the manager. The optional `SettingsSource` trait models the external
//! settings collaborator (read-only key -> value lookups, consumed once).

use crate::error::{Error, Result};
use crate::level::CacheLevel;
use std::collections::HashSet;
use std::time::Duration;

/// Default probability that a successful put triggers an expired-entry sweep
pub const DEFAULT_SWEEP_PROBABILITY: f64 = 0.02;

/// Default bounded wait on the per-key stampede lock
pub const DEFAULT_LOCK_WAIT: Duration = Duration::from_secs(5);

/// Default maximum raw key length accepted by the key manager
pub const DEFAULT_MAX_KEY_LENGTH: usize = 250;

/// Default maximum serialized value size accepted before tier placement
pub const DEFAULT_MAX_VALUE_BYTES: u64 = 4 * 1024 * 1024;

/// Default database-tier size bound enforced by maintenance
pub const DEFAULT_DATABASE_MAX_BYTES: u64 = 256 * 1024 * 1024;

// =============================================================================
// Settings
// =============================================================================

/// Immutable engine configuration
#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// Levels enabled for reads and writes
    pub enabled_levels: HashSet<CacheLevel>,
    /// Bounded wait on the per-key stampede lock
    pub lock_wait_timeout: Duration,
    /// Whether hits found in slower levels are copied into faster ones
    pub auto_promote: bool,
    /// Probability in [0, 1] that a put triggers `sweep_expired`
    pub sweep_probability: f64,
    /// Size bound the maintenance service enforces on the database level
    pub database_max_bytes: u64,
    /// Maximum raw key length
    pub max_key_length: usize,
    /// Maximum serialized value size
    pub max_value_bytes: u64,
    /// Accepted namespaces (None = any)
    pub namespace_allowlist: Option<HashSet<String>>,
    /// Capacity of the event broadcast channel
    pub event_channel_capacity: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled_levels: CacheLevel::by_priority().iter().copied().collect(),
            lock_wait_timeout: DEFAULT_LOCK_WAIT,
            auto_promote: true,
            sweep_probability: DEFAULT_SWEEP_PROBABILITY,
            database_max_bytes: DEFAULT_DATABASE_MAX_BYTES,
            max_key_length: DEFAULT_MAX_KEY_LENGTH,
            max_value_bytes: DEFAULT_MAX_VALUE_BYTES,
            namespace_allowlist: None,
            event_channel_capacity: 1024,
        }
    }
}

impl CacheSettings {
    /// Check whether a level participates in reads and writes
    pub fn is_enabled(&self, level: CacheLevel) -> bool {
        self.enabled_levels.contains(&level)
    }

    /// Check whether a namespace is accepted
    pub fn allows_namespace(&self, namespace: &str) -> bool {
        match &self.namespace_allowlist {
            Some(allowed) => allowed.contains(namespace),
            None => true,
        }
    }

    /// Validate internal consistency
    pub fn validate(&self) -> Result<()> {
        if self.enabled_levels.is_empty() {
            return Err(Error::Configuration(
                "at least one cache level must be enabled".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.sweep_probability) {
            return Err(Error::Configuration(format!(
                "sweep_probability must be within [0, 1], got {}",
                self.sweep_probability
            )));
        }
        if self.max_key_length == 0 {
            return Err(Error::Configuration("max_key_length must be non-zero".into()));
        }
        if self.max_value_bytes == 0 {
            return Err(Error::Configuration("max_value_bytes must be non-zero".into()));
        }
        Ok(())
    }

    /// Build settings from an external settings source
    ///
    /// Unknown or absent keys keep their defaults; malformed values are a
    /// configuration error rather than a silent fallback.
    pub fn from_source(source: &dyn SettingsSource) -> Result<Self> {
        let mut settings = Self::default();

        if let Some(raw) = source.get("cache.lock_wait_ms") {
            settings.lock_wait_timeout = Duration::from_millis(parse(&raw, "cache.lock_wait_ms")?);
        }
        if let Some(raw) = source.get("cache.auto_promote") {
            settings.auto_promote = parse(&raw, "cache.auto_promote")?;
        }
        if let Some(raw) = source.get("cache.sweep_probability") {
            settings.sweep_probability = parse(&raw, "cache.sweep_probability")?;
        }
        if let Some(raw) = source.get("cache.database_max_bytes") {
            settings.database_max_bytes = parse(&raw, "cache.database_max_bytes")?;
        }
        if let Some(raw) = source.get("cache.max_key_length") {
            settings.max_key_length = parse(&raw, "cache.max_key_length")?;
        }
        if let Some(raw) = source.get("cache.max_value_bytes") {
            settings.max_value_bytes = parse(&raw, "cache.max_value_bytes")?;
        }
        if let Some(raw) = source.get("cache.namespaces") {
            let allowed: HashSet<String> = raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
            settings.namespace_allowlist = Some(allowed);
        }
        for level in CacheLevel::by_priority() {
            if let Some(raw) = source.get(&format!("cache.levels.{level}.enabled")) {
                let enabled: bool = parse(&raw, "cache.levels.*.enabled")?;
                if enabled {
                    settings.enabled_levels.insert(*level);
                } else {
                    settings.enabled_levels.remove(level);
                }
            }
        }

        settings.validate()?;
        Ok(settings)
    }
}

fn parse<T: std::str::FromStr>(raw: &str, name: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| Error::Configuration(format!("invalid value '{raw}' for {name}")))
}

// =============================================================================
// Settings Source
// =============================================================================

/// Read-only key -> value lookup supplied by the configuration subsystem
pub trait SettingsSource: Send + Sync {
    /// Fetch a raw setting value by dotted key
    fn get(&self, key: &str) -> Option<String>;
}

impl SettingsSource for std::collections::HashMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        std::collections::HashMap::get(self, key).cloned()
    }
}
