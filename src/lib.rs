//! formsec-cache - Multi-Tier Cache Orchestration Engine
//!
//! A cache engine for form-security detection pipelines, coordinating three
//! storage levels behind one contract: a request-scoped in-process map, a
//! distributed memory store, and a durable relational store.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                          Cache Manager                              │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │  ┌───────────────┐  ┌────────────────┐  ┌───────────────────────┐   │
//! │  │  Key Manager  │  │   Operations   │  │  Invalidation /       │   │
//! │  │  (validation) │  │  (get/put/     │  │  Warming /            │   │
//! │  │               │  │   remember)    │  │  Maintenance          │   │
//! │  └───────┬───────┘  └───────┬────────┘  └──────────┬────────────┘   │
//! │          │                  │                      │                │
//! │          └──────────────────┼──────────────────────┘                │
//! │                             │                                       │
//! │                  ┌──────────┴──────────┐                            │
//! │                  │   TierStore trait   │                            │
//! │                  └─────────────────────┘                            │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │                          Cache Levels                               │
//! │  ┌───────────────┐  ┌────────────────┐  ┌───────────────────────┐   │
//! │  │    Request    │  │     Memory     │  │       Database        │   │
//! │  │ (unit of work)│  │  (distributed) │  │      (durable)        │   │
//! │  └───────────────┘  └────────────────┘  └───────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Lookups probe levels fastest-first and promote hits upward; writes fan
//! out to every eligible level with per-level TTL clamping. Tier failures
//! never surface to callers: a failed level is a miss, and the remaining
//! levels carry the operation. Recomputation is guarded by per-key
//! stampede locks with a bounded wait.
//!
//! # Modules
//!
//! - [`manager`]: Public engine facade
//! - [`ops`]: Tiered get/put/remember/forget/flush algorithms
//! - [`invalidation`]: Tag, key, and level scoped removal
//! - [`warming`]: Batch pre-population
//! - [`maintenance`]: Expiry sweeps and size-bound enforcement
//! - [`key`] / [`key_manager`]: Key identity, hierarchy, and validation
//! - [`level`]: The closed level hierarchy and its capability table
//! - [`store`]: The `TierStore` transport contract and reference stores
//! - [`security`]: Input sanitization ahead of tier I/O
//! - [`stats`] / [`events`]: Observability surfaces
//!
//! # Example
//!
//! ```no_run
//! use formsec_cache::{CacheKey, CacheManager, CacheSettings};
//! use serde_json::json;
//! use std::time::Duration;
//!
//! # async fn example() -> formsec_cache::Result<()> {
//! let cache = CacheManager::new(CacheSettings::default())?;
//! let key = CacheKey::for_ip_reputation("203.0.113.5");
//!
//! let score = cache
//!     .remember(&key, Some(Duration::from_secs(3600)), || async {
//!         Ok(json!({"score": 92}))
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod entry;
pub mod error;
pub mod events;
pub mod invalidation;
pub mod key;
pub mod key_manager;
pub mod level;
pub mod maintenance;
pub mod manager;
pub mod ops;
pub mod security;
pub mod settings;
pub mod stats;
pub mod store;
pub mod warming;

// Re-export the types most callers need
pub use entry::StoredEntry;
pub use error::{Error, Result};
pub use events::CacheEvent;
pub use invalidation::InvalidationOutcome;
pub use key::CacheKey;
pub use key_manager::KeyManager;
pub use level::{CacheLevel, Capability, LatencyBand, LevelCaps};
pub use maintenance::MaintenanceReport;
pub use manager::CacheManager;
pub use settings::{CacheSettings, SettingsSource};
pub use stats::{CacheStats, LevelStatsSnapshot, StatsSnapshot};
pub use store::{DatabaseStore, MemoryStore, RequestStore, TierStore, TierStoreRef};
pub use warming::WarmReport;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
