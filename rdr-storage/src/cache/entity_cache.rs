//! Whole-table entity cache.
//!
//! [`EntityCache`] is an immutable snapshot of every row of one reference
//! table, indexed by primary key and by any declared secondary indexes.
//! [`CachedTable`] stores that snapshot in a [`CacheRegistry`] slot and
//! rebuilds it from a full table scan whenever the slot is empty or expired.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rdr_core::{CacheError, RdrResult, StorageError, Timestamp};

use super::index::{IndexKey, IndexSpec, IntoIndexKey};
use super::registry::{CacheRegistry, SlotId};
use super::traits::ReferenceEntity;
use crate::TableSource;

/// What to do when two rows share a secondary-index key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CollisionPolicy {
    /// The row scanned last owns the key; earlier rows become unreachable
    /// through that index. A warning is logged for every collision.
    #[default]
    LastWins,
    /// Fail the build with [`CacheError::IndexCollision`].
    Reject,
}

struct SecondaryIndex<E> {
    arity: usize,
    entries: HashMap<IndexKey, Arc<E>>,
}

/// Snapshot of a reference table built from one full scan.
pub struct EntityCache<E: ReferenceEntity> {
    primary: HashMap<E::Key, Arc<E>>,
    secondary: HashMap<&'static str, SecondaryIndex<E>>,
    rows: Vec<Arc<E>>,
    loaded_at: Timestamp,
    collisions: usize,
}

impl<E: ReferenceEntity> EntityCache<E> {
    /// Index `rows` (in scan order) under the primary key and every spec.
    pub fn build(
        rows: Vec<E>,
        indexes: &[IndexSpec<E>],
        policy: CollisionPolicy,
        loaded_at: Timestamp,
    ) -> RdrResult<Self> {
        let rows: Vec<Arc<E>> = rows.into_iter().map(Arc::new).collect();
        let mut primary = HashMap::with_capacity(rows.len());
        for row in &rows {
            primary.insert(row.primary_key(), row.clone());
        }

        let mut secondary = HashMap::with_capacity(indexes.len());
        let mut collisions = 0;
        for spec in indexes {
            let mut entries: HashMap<IndexKey, Arc<E>> = HashMap::with_capacity(rows.len());
            for row in &rows {
                let key = spec.key_for(row);
                if let Some(previous) = entries.get(&key) {
                    if policy == CollisionPolicy::Reject {
                        return Err(CacheError::IndexCollision {
                            table: E::table(),
                            index_name: spec.name().to_string(),
                            key: key.to_string(),
                        }
                        .into());
                    }
                    collisions += 1;
                    tracing::warn!(
                        table = %E::table(),
                        index = spec.name(),
                        key = %key,
                        replaced = %previous.primary_key(),
                        by = %row.primary_key(),
                        "duplicate secondary index key, last row wins"
                    );
                }
                entries.insert(key, row.clone());
            }
            secondary.insert(
                spec.name(),
                SecondaryIndex {
                    arity: spec.arity(),
                    entries,
                },
            );
        }

        Ok(Self {
            primary,
            secondary,
            rows,
            loaded_at,
            collisions,
        })
    }

    /// Row with primary key `key`.
    pub fn get(&self, key: &E::Key) -> Option<Arc<E>> {
        self.primary.get(key).cloned()
    }

    /// Row whose `index_name` key equals `key`.
    pub fn get_by(&self, index_name: &str, key: &IndexKey) -> RdrResult<Option<Arc<E>>> {
        let index = self.secondary.get(index_name).ok_or_else(|| StorageError::IndexError {
            index_name: index_name.to_string(),
            reason: format!("no such index on {}", E::table()),
        })?;
        if key.arity() != index.arity {
            return Err(StorageError::IndexError {
                index_name: index_name.to_string(),
                reason: format!("expected {} key fields, got {}", index.arity, key.arity()),
            }
            .into());
        }
        Ok(index.entries.get(key).cloned())
    }

    /// All rows in scan order.
    pub fn rows(&self) -> &[Arc<E>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// When the scan behind this snapshot ran.
    pub fn loaded_at(&self) -> Timestamp {
        self.loaded_at
    }

    /// Secondary-index collisions resolved by last-wins during the build.
    pub fn collisions(&self) -> usize {
        self.collisions
    }
}

impl<E: ReferenceEntity> fmt::Debug for EntityCache<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityCache")
            .field("table", &E::table())
            .field("rows", &self.rows.len())
            .field("indexes", &self.secondary.keys().collect::<Vec<_>>())
            .field("loaded_at", &self.loaded_at)
            .field("collisions", &self.collisions)
            .finish()
    }
}

/// How a table is cached: TTL, secondary indexes, collision handling.
#[derive(Debug, Clone)]
pub struct CacheSettings<E> {
    /// `None` keeps the snapshot until it is invalidated.
    pub ttl: Option<Duration>,
    pub indexes: Vec<IndexSpec<E>>,
    pub collision_policy: CollisionPolicy,
}

impl<E> CacheSettings<E> {
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            ttl,
            indexes: Vec::new(),
            collision_policy: CollisionPolicy::default(),
        }
    }

    /// Add a secondary index.
    pub fn with_index(mut self, spec: IndexSpec<E>) -> Self {
        self.indexes.push(spec);
        self
    }

    /// Set the collision policy.
    pub fn with_collision_policy(mut self, policy: CollisionPolicy) -> Self {
        self.collision_policy = policy;
        self
    }
}

/// Cache handle for one reference table.
///
/// Every read resolves the current snapshot through the registry, so an
/// expired or invalidated slot triggers a full rescan of `source` on the
/// calling thread.
pub struct CachedTable<E: ReferenceEntity, S: TableSource<E>> {
    registry: Arc<CacheRegistry>,
    slot: SlotId,
    settings: CacheSettings<E>,
    source: Arc<S>,
}

impl<E: ReferenceEntity, S: TableSource<E>> CachedTable<E, S> {
    /// Create the handle. Index names must be unique and every index needs
    /// at least one field.
    pub fn new(
        registry: Arc<CacheRegistry>,
        slot: SlotId,
        settings: CacheSettings<E>,
        source: Arc<S>,
    ) -> RdrResult<Self> {
        let mut seen = HashSet::new();
        for spec in &settings.indexes {
            if spec.arity() == 0 {
                return Err(StorageError::IndexError {
                    index_name: spec.name().to_string(),
                    reason: "index has no fields".to_string(),
                }
                .into());
            }
            if !seen.insert(spec.name()) {
                return Err(StorageError::IndexError {
                    index_name: spec.name().to_string(),
                    reason: format!("declared twice on {}", E::table()),
                }
                .into());
            }
        }
        if slot.index() >= registry.capacity() {
            return Err(CacheError::SlotOutOfRange {
                slot: slot.index(),
                capacity: registry.capacity(),
            }
            .into());
        }

        Ok(Self {
            registry,
            slot,
            settings,
            source,
        })
    }

    pub fn slot(&self) -> SlotId {
        self.slot
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.settings.ttl
    }

    pub fn index_names(&self) -> Vec<&'static str> {
        self.settings.indexes.iter().map(|spec| spec.name()).collect()
    }

    /// Current snapshot, rebuilt from a full scan if missing or expired.
    pub fn snapshot(&self) -> RdrResult<Arc<EntityCache<E>>> {
        self.registry
            .get(self.slot, || self.load(), self.settings.ttl)
    }

    /// Row by primary key.
    pub fn get(&self, key: &E::Key) -> RdrResult<Option<Arc<E>>> {
        Ok(self.snapshot()?.get(key))
    }

    /// Row by secondary index.
    pub fn get_by(&self, index_name: &str, key: impl IntoIndexKey) -> RdrResult<Option<Arc<E>>> {
        self.snapshot()?.get_by(index_name, &key.into_index_key())
    }

    /// Every row, in the order of the last scan.
    pub fn get_all(&self) -> RdrResult<Vec<Arc<E>>> {
        Ok(self.snapshot()?.rows().to_vec())
    }

    /// One result per requested key, in request order; `None` where a key
    /// has no row.
    pub fn get_many(&self, keys: &[E::Key]) -> RdrResult<Vec<Option<Arc<E>>>> {
        let snapshot = self.snapshot()?;
        Ok(keys.iter().map(|key| snapshot.get(key)).collect())
    }

    /// Number of cached rows.
    pub fn len(&self) -> RdrResult<usize> {
        Ok(self.snapshot()?.len())
    }

    pub fn is_empty(&self) -> RdrResult<bool> {
        Ok(self.snapshot()?.is_empty())
    }

    /// Evict the snapshot from this process's registry.
    pub fn invalidate(&self) {
        self.registry.invalidate(self.slot);
    }

    fn load(&self) -> RdrResult<EntityCache<E>> {
        let rows = self.source.load_all()?;
        let row_count = rows.len();
        let cache = EntityCache::build(
            rows,
            &self.settings.indexes,
            self.settings.collision_policy,
            self.registry.clock().now(),
        )?;
        tracing::debug!(
            table = %E::table(),
            rows = row_count,
            indexes = self.settings.indexes.len(),
            collisions = cache.collisions(),
            ttl = ?self.settings.ttl,
            "loaded reference table into cache"
        );
        Ok(cache)
    }
}

impl<E: ReferenceEntity, S: TableSource<E>> fmt::Debug for CachedTable<E, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedTable")
            .field("table", &E::table())
            .field("slot", &self.slot)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
