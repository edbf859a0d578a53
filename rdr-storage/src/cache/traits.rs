//! Cacheable reference entity trait and cache statistics.

use std::fmt;
use std::hash::Hash;

use rdr_core::{Hpo, HpoId, Organization, OrganizationId, ReferenceTable, Site, SiteId};

/// Marker trait for rows of a cached reference table.
///
/// # Implementation Requirements
///
/// - `table()` must return the same table for every instance
/// - `primary_key()` must be unique within the table
/// - `version()` / `set_version()` expose the optimistic-concurrency counter
///   maintained by the DAO write path
pub trait ReferenceEntity: Clone + fmt::Debug + Send + Sync + 'static {
    /// Primary key type.
    type Key: Eq + Hash + Clone + fmt::Debug + fmt::Display + Send + Sync + 'static;

    /// Table this entity is stored in.
    fn table() -> ReferenceTable;

    /// Primary key of this row.
    fn primary_key(&self) -> Self::Key;

    /// Current row version.
    fn version(&self) -> i64;

    /// Overwrite the row version.
    fn set_version(&mut self, version: i64);
}

/// Statistics about registry usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups served from a live slot.
    pub hits: u64,
    /// Lookups that had to construct a value.
    pub misses: u64,
    /// Successful constructions.
    pub builds: u64,
    /// Constructions whose constructor returned an error.
    pub build_failures: u64,
    /// Explicit evictions of a populated slot.
    pub invalidations: u64,
    /// Slots currently holding an unexpired value.
    pub entry_count: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

// ============================================================================
// IMPLEMENTATIONS FOR REFERENCE ENTITIES
// ============================================================================

impl ReferenceEntity for Hpo {
    type Key = HpoId;

    fn table() -> ReferenceTable {
        ReferenceTable::Hpo
    }

    fn primary_key(&self) -> HpoId {
        self.hpo_id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn set_version(&mut self, version: i64) {
        self.version = version;
    }
}

impl ReferenceEntity for Organization {
    type Key = OrganizationId;

    fn table() -> ReferenceTable {
        ReferenceTable::Organization
    }

    fn primary_key(&self) -> OrganizationId {
        self.organization_id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn set_version(&mut self, version: i64) {
        self.version = version;
    }
}

impl ReferenceEntity for Site {
    type Key = SiteId;

    fn table() -> ReferenceTable {
        ReferenceTable::Site
    }

    fn primary_key(&self) -> SiteId {
        self.site_id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn set_version(&mut self, version: i64) {
        self.version = version;
    }
}
