//! Key Manager
//!
//! Builds and validates cache keys from raw caller input. Enforces the
//! length ceiling, character rules, and namespace allowlist; malformed
//! input fails with `InvalidKeyFormat` instead of being silently fixed up.

use crate::error::{Error, Result};
use crate::key::CacheKey;
use crate::security::SecurityService;
use crate::settings::CacheSettings;

/// Key construction and validation
#[derive(Debug, Clone)]
pub struct KeyManager {
    security: SecurityService,
    settings: CacheSettings,
}

impl KeyManager {
    /// Build from engine settings
    pub fn new(settings: &CacheSettings) -> Self {
        Self {
            security: SecurityService::new(settings),
            settings: settings.clone(),
        }
    }

    /// Normalize a raw key into the default namespace
    pub fn normalize(&self, raw: &str) -> Result<CacheKey> {
        self.normalize_in("default", raw)
    }

    /// Normalize a raw key into an explicit namespace
    pub fn normalize_in(&self, namespace: &str, raw: &str) -> Result<CacheKey> {
        self.validate_segment("key", raw)?;
        self.validate_segment("namespace", namespace)?;

        if !self.settings.allows_namespace(namespace) {
            return Err(Error::InvalidKeyFormat(format!(
                "namespace '{namespace}' is not in the allowlist"
            )));
        }

        Ok(CacheKey::in_namespace(namespace, raw))
    }

    /// Validate an already-built key before it reaches tier I/O
    pub fn validate(&self, key: &CacheKey) -> Result<()> {
        self.validate_segment("key", &key.key)?;
        self.validate_segment("namespace", &key.namespace)?;
        if let Some(prefix) = &key.prefix {
            self.validate_segment("prefix", prefix)?;
        }
        if !self.settings.allows_namespace(&key.namespace) {
            return Err(Error::InvalidKeyFormat(format!(
                "namespace '{}' is not in the allowlist",
                key.namespace
            )));
        }
        Ok(())
    }

    fn validate_segment(&self, what: &str, raw: &str) -> Result<()> {
        if raw.is_empty() {
            return Err(Error::InvalidKeyFormat(format!("{what} must be non-empty")));
        }
        if raw.len() > self.settings.max_key_length {
            return Err(Error::InvalidKeyFormat(format!(
                "{what} length {} exceeds ceiling {}",
                raw.len(),
                self.settings.max_key_length
            )));
        }
        if let Some(c) = self.security.find_forbidden_char(raw) {
            return Err(Error::InvalidKeyFormat(format!(
                "{what} contains forbidden character {c:?}"
            )));
        }
        Ok(())
    }
}
