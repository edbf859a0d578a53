//! RDR Storage - Reference Table Cache and Store Contracts
//!
//! Defines the table store abstraction the caches load from, an in-memory
//! store for tests, the expiring singleton registry with its whole-table
//! entity caches, and the cached DAOs for the awardee hierarchy.

pub mod cache;
pub mod dao;

pub use cache::{
    CacheConfig, CacheRegistry, CacheSettings, CacheStats, CachedTable, CollisionPolicy,
    EntityCache, FieldExtractor, FieldValue, IndexKey, IndexSpec, IntoIndexKey, ReferenceEntity,
    SlotId,
};
pub use dao::{
    hpo_dao, organization_dao, site_dao, CachedDao, HpoDao, OrganizationDao, SiteDao,
    VersionPolicy,
};

use rdr_core::{Hpo, Organization, RdrResult, Site, StorageError, ValidationError};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

// ============================================================================
// STORE CONTRACTS
// ============================================================================

/// Full-scan access to one reference table.
pub trait TableSource<E>: Send + Sync {
    /// Load every row of the table, in the store's scan order.
    fn load_all(&self) -> RdrResult<Vec<E>>;
}

/// Keyed read and write access to one reference table.
pub trait TableStore<E: ReferenceEntity>: TableSource<E> {
    /// Get a row by primary key.
    fn find(&self, key: &E::Key) -> RdrResult<Option<E>>;

    /// Insert a new row. Fails if the primary key is taken.
    fn insert(&self, entity: &E) -> RdrResult<()>;

    /// Replace the row with the same primary key. Fails if there is none.
    fn update(&self, entity: &E) -> RdrResult<()>;

    /// Replace the row with the same primary key only while its stored
    /// version is still `expected`.
    ///
    /// The version check and the write must be one atomic step: of two
    /// callers expecting the same version, at most one succeeds. The loser
    /// gets `ValidationError::VersionMismatch` carrying the stored version.
    fn update_if_version(&self, entity: &E, expected: i64) -> RdrResult<()>;
}

// ============================================================================
// IN-MEMORY TABLE
// ============================================================================

/// In-memory reference table for testing.
///
/// Rows are kept in insertion order, which is also the scan order seen by
/// `load_all`.
#[derive(Debug)]
pub struct InMemoryTable<E> {
    rows: RwLock<Vec<E>>,
    scans: AtomicU64,
    failing_loads: AtomicUsize,
    failing_writes: AtomicUsize,
}

impl<E> Default for InMemoryTable<E> {
    fn default() -> Self {
        Self {
            rows: RwLock::new(Vec::new()),
            scans: AtomicU64::new(0),
            failing_loads: AtomicUsize::new(0),
            failing_writes: AtomicUsize::new(0),
        }
    }
}

impl<E: ReferenceEntity> InMemoryTable<E> {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a table holding `rows` in the given order.
    ///
    /// Rows are taken as-is, duplicate primary keys included, so tests can
    /// set up data the keyed write path would refuse.
    pub fn from_rows(rows: Vec<E>) -> Self {
        Self {
            rows: RwLock::new(rows),
            ..Self::default()
        }
    }

    /// Number of full scans served so far, failed ones included.
    pub fn scan_count(&self) -> u64 {
        self.scans.load(Ordering::SeqCst)
    }

    /// Make the next `n` calls to `load_all` fail with `LoadFailed`.
    pub fn fail_next_loads(&self, n: usize) {
        self.failing_loads.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` inserts or updates fail without touching the rows.
    pub fn fail_next_writes(&self, n: usize) {
        self.failing_writes.store(n, Ordering::SeqCst);
    }

    /// Number of stored rows.
    pub fn row_count(&self) -> RdrResult<usize> {
        Ok(self.rows.read().map_err(|_| StorageError::LockPoisoned)?.len())
    }

    /// Remove all rows.
    pub fn clear(&self) -> RdrResult<()> {
        self.rows.write().map_err(|_| StorageError::LockPoisoned)?.clear();
        Ok(())
    }

    fn take_injected_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn check_write(&self, key: &E::Key) -> RdrResult<()> {
        if Self::take_injected_failure(&self.failing_writes) {
            return Err(StorageError::UpdateFailed {
                table: E::table(),
                key: key.to_string(),
                reason: "injected write failure".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

impl<E: ReferenceEntity> TableSource<E> for InMemoryTable<E> {
    fn load_all(&self) -> RdrResult<Vec<E>> {
        self.scans.fetch_add(1, Ordering::SeqCst);
        if Self::take_injected_failure(&self.failing_loads) {
            return Err(StorageError::LoadFailed {
                table: E::table(),
                reason: "injected scan failure".to_string(),
            }
            .into());
        }
        let rows = self.rows.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(rows.clone())
    }
}

impl<E: ReferenceEntity> TableStore<E> for InMemoryTable<E> {
    fn find(&self, key: &E::Key) -> RdrResult<Option<E>> {
        let rows = self.rows.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(rows.iter().find(|row| row.primary_key() == *key).cloned())
    }

    fn insert(&self, entity: &E) -> RdrResult<()> {
        let mut rows = self.rows.write().map_err(|_| StorageError::LockPoisoned)?;
        let key = entity.primary_key();
        if Self::take_injected_failure(&self.failing_writes) {
            return Err(StorageError::InsertFailed {
                table: E::table(),
                reason: "injected write failure".to_string(),
            }
            .into());
        }
        if rows.iter().any(|row| row.primary_key() == key) {
            return Err(StorageError::InsertFailed {
                table: E::table(),
                reason: format!("primary key {} already exists", key),
            }
            .into());
        }
        rows.push(entity.clone());
        Ok(())
    }

    fn update(&self, entity: &E) -> RdrResult<()> {
        let mut rows = self.rows.write().map_err(|_| StorageError::LockPoisoned)?;
        let key = entity.primary_key();
        self.check_write(&key)?;
        let row = rows
            .iter_mut()
            .find(|row| row.primary_key() == key)
            .ok_or_else(|| StorageError::NotFound {
                table: E::table(),
                key: key.to_string(),
            })?;
        *row = entity.clone();
        Ok(())
    }

    fn update_if_version(&self, entity: &E, expected: i64) -> RdrResult<()> {
        let mut rows = self.rows.write().map_err(|_| StorageError::LockPoisoned)?;
        let key = entity.primary_key();
        self.check_write(&key)?;
        let row = rows
            .iter_mut()
            .find(|row| row.primary_key() == key)
            .ok_or_else(|| StorageError::NotFound {
                table: E::table(),
                key: key.to_string(),
            })?;
        if row.version() != expected {
            return Err(ValidationError::VersionMismatch {
                table: E::table(),
                key: key.to_string(),
                expected,
                actual: row.version(),
            }
            .into());
        }
        *row = entity.clone();
        Ok(())
    }
}

// ============================================================================
// MOCK STORAGE
// ============================================================================

/// In-memory mock storage for the three reference tables.
#[derive(Debug, Default, Clone)]
pub struct MockStorage {
    pub hpos: Arc<InMemoryTable<Hpo>>,
    pub organizations: Arc<InMemoryTable<Organization>>,
    pub sites: Arc<InMemoryTable<Site>>,
}

impl MockStorage {
    /// Create a new mock storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all stored data.
    pub fn clear(&self) -> RdrResult<()> {
        self.hpos.clear()?;
        self.organizations.clear()?;
        self.sites.clear()
    }
}

// ============================================================================
// TESTS
// ============================================================================


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;
    use rdr_core::{RecordId, SiteId};

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// A full scan returns rows in insertion order.
        #[test]
        fn prop_load_all_preserves_insertion_order(
            ids in proptest::collection::hash_set(1i64..10_000, 0..40)
        ) {
            let table = InMemoryTable::new();
            let ids: Vec<i64> = ids.into_iter().collect();
            for id in &ids {
                table.insert(&Site::new(SiteId::new(*id), format!("site-{id}"), format!("g-{id}"))).unwrap();
            }

            let scanned: Vec<i64> = table
                .load_all()
                .unwrap()
                .iter()
                .map(|s| s.site_id.as_i64())
                .collect();
            prop_assert_eq!(scanned, ids);
        }

        /// Looking up a key that was never inserted returns Ok(None).
        #[test]
        fn prop_find_missing_returns_none(id in any::<i64>()) {
            let table = InMemoryTable::<Site>::new();
            prop_assert!(table.find(&SiteId::new(id)).unwrap().is_none());
        }
    }
}
