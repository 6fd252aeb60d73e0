//! Security Service
//!
//! Key and value sanitization performed before any tier I/O. Rejects
//! rather than coerces: oversized or unserializable payloads never reach a
//! tier, which closes the cache-poisoning path for malformed input.

use crate::error::{Error, Result};
use crate::settings::CacheSettings;
use bytes::Bytes;
use serde_json::Value;

/// Key/value sanitization and size enforcement
#[derive(Debug, Clone)]
pub struct SecurityService {
    max_key_length: usize,
    max_value_bytes: u64,
}

impl SecurityService {
    /// Build from engine settings
    pub fn new(settings: &CacheSettings) -> Self {
        Self {
            max_key_length: settings.max_key_length,
            max_value_bytes: settings.max_value_bytes,
        }
    }

    /// Sanitize a raw key: strip control characters, enforce the length ceiling
    ///
    /// Fails with `UnsafeCacheInput` when nothing usable remains or the key
    /// exceeds the ceiling. Length is never silently truncated.
    pub fn sanitize_key(&self, raw: &str) -> Result<String> {
        let cleaned: String = raw.chars().filter(|c| !c.is_control()).collect();

        if cleaned.is_empty() {
            return Err(Error::UnsafeCacheInput(
                "key is empty after removing control characters".into(),
            ));
        }
        if cleaned.len() > self.max_key_length {
            return Err(Error::UnsafeCacheInput(format!(
                "key length {} exceeds ceiling {}",
                cleaned.len(),
                self.max_key_length
            )));
        }
        Ok(cleaned)
    }

    /// Check a key for characters the key manager rejects outright
    ///
    /// Control characters and whitespace are malformed input rather than
    /// something to clean up, so `KeyManager::normalize` refuses them.
    pub fn find_forbidden_char(&self, raw: &str) -> Option<char> {
        raw.chars().find(|c| c.is_control() || c.is_whitespace())
    }

    /// Serialize and size-check a value before tier placement
    ///
    /// Fails with `SerializationFailure` for unserializable payloads and
    /// `UnsafeCacheInput` for oversized ones.
    pub fn sanitize_value(&self, value: &Value) -> Result<Bytes> {
        let bytes = serde_json::to_vec(value)?;
        if bytes.len() as u64 > self.max_value_bytes {
            return Err(Error::UnsafeCacheInput(format!(
                "serialized value size {} exceeds ceiling {}",
                bytes.len(),
                self.max_value_bytes
            )));
        }
        Ok(Bytes::from(bytes))
    }

    /// Deserialize stored bytes back into a value
    pub fn deserialize_value(&self, bytes: &[u8]) -> Result<Value> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Maximum accepted raw key length
    pub fn max_key_length(&self) -> usize {
        self.max_key_length
    }
}
