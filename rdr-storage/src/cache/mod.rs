//! Expiring singleton registry and whole-table entity caches.
//!
//! Reference tables are small and read far more often than they change, so
//! each one is cached as a single snapshot: one full scan builds a primary
//! index plus any declared secondary indexes, and the snapshot lives in a
//! [`CacheRegistry`] slot until its TTL runs out or a write invalidates it.
//!
//! # Example
//!
//! ```ignore
//! let registry = Arc::new(CacheRegistry::with_system_clock(SlotId::RESERVED));
//! let sites = CachedTable::new(
//!     registry,
//!     SlotId::SITE,
//!     CacheSettings::new(Some(Duration::from_secs(600)))
//!         .with_index(IndexSpec::single("google_group", |s: &Site| s.google_group.as_str().into())),
//!     store,
//! )?;
//!
//! let site = sites.get_by("google_group", "hpo-site-main")?;
//! ```

pub mod config;
pub mod entity_cache;
pub mod index;
pub mod registry;
pub mod traits;

pub use config::{CacheConfig, DEFAULT_CACHE_TTL_SECS};
pub use entity_cache::{CacheSettings, CachedTable, CollisionPolicy, EntityCache};
pub use index::{FieldExtractor, FieldValue, IndexKey, IndexSpec, IntoIndexKey};
pub use registry::{CacheRegistry, SlotId};
pub use traits::{CacheStats, ReferenceEntity};
