//! Expiring singleton registry.
//!
//! A fixed table of slots, each holding at most one memoized value with an
//! optional expiration instant. Reads are lock-free; construction of a
//! missing or expired value happens under a single registry-wide build lock,
//! so concurrent misses on a slot collapse into one constructor call.
//!
//! The registry is an explicit object: create one per process (or per test)
//! and hand an `Arc<CacheRegistry>` to every DAO that caches through it.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use rdr_core::{CacheError, Clock, RdrResult, ReferenceTable, SystemClock, Timestamp};

use super::config::CacheConfig;
use super::traits::CacheStats;

/// Index of a registry slot.
///
/// Slot ids are assigned where a cached value is defined, one per distinct
/// value, and stay fixed for the life of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(usize);

impl SlotId {
    pub const HPO: SlotId = SlotId(0);
    pub const ORGANIZATION: SlotId = SlotId(1);
    pub const SITE: SlotId = SlotId(2);

    /// Number of slots reserved for the reference tables. Other cached
    /// values should use ids at or above this.
    pub const RESERVED: usize = 3;

    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    pub const fn index(self) -> usize {
        self.0
    }

    /// Slot assigned to a reference table's entity cache.
    pub fn for_table(table: ReferenceTable) -> Self {
        match table {
            ReferenceTable::Hpo => Self::HPO,
            ReferenceTable::Organization => Self::ORGANIZATION,
            ReferenceTable::Site => Self::SITE,
        }
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct SlotEntry {
    value: Arc<dyn Any + Send + Sync>,
    expiration: Option<Timestamp>,
}

impl SlotEntry {
    fn is_live(&self, now: Timestamp) -> bool {
        self.expiration.map_or(true, |expiration| now < expiration)
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    builds: AtomicU64,
    build_failures: AtomicU64,
    invalidations: AtomicU64,
}

static NEXT_REGISTRY_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    /// `(registry id, slot)` pairs whose constructor is running on this thread.
    static BUILDING: RefCell<Vec<(u64, usize)>> = const { RefCell::new(Vec::new()) };
}

/// Marks a slot as under construction on the current thread until dropped.
struct BuildMarker {
    registry: u64,
    slot: usize,
}

impl BuildMarker {
    fn enter(registry: u64, slot: usize) -> Self {
        BUILDING.with(|building| building.borrow_mut().push((registry, slot)));
        Self { registry, slot }
    }

    fn is_building(registry: u64, slot: usize) -> bool {
        BUILDING.with(|building| building.borrow().contains(&(registry, slot)))
    }

    fn holds_registry(registry: u64) -> bool {
        BUILDING.with(|building| building.borrow().iter().any(|(id, _)| *id == registry))
    }
}

impl Drop for BuildMarker {
    fn drop(&mut self) {
        BUILDING.with(|building| {
            let mut building = building.borrow_mut();
            if let Some(pos) = building
                .iter()
                .rposition(|entry| *entry == (self.registry, self.slot))
            {
                building.remove(pos);
            }
        });
    }
}

/// Process-wide table of expiring memoized values.
pub struct CacheRegistry {
    id: u64,
    slots: Box<[ArcSwapOption<SlotEntry>]>,
    build_lock: Mutex<()>,
    clock: Arc<dyn Clock>,
    counters: Counters,
}

impl CacheRegistry {
    /// Create a registry with `capacity` slots reading time from `clock`.
    pub fn new(capacity: usize, clock: Arc<dyn Clock>) -> Self {
        let slots = (0..capacity)
            .map(|_| ArcSwapOption::empty())
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            id: NEXT_REGISTRY_ID.fetch_add(1, Ordering::Relaxed),
            slots,
            build_lock: Mutex::new(()),
            clock,
            counters: Counters::default(),
        }
    }

    /// Create a registry with the slot capacity from `config`.
    pub fn from_config(config: &CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self::new(config.slot_capacity, clock)
    }

    /// Create a registry on wall-clock time.
    pub fn with_system_clock(capacity: usize) -> Self {
        Self::new(capacity, Arc::new(SystemClock))
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// The time source used for expiry.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Get the value cached in `slot`, constructing it if absent or expired.
    ///
    /// With `ttl` set, the value expires `ttl` after construction finishes;
    /// without it the value lives until [`invalidate`](Self::invalidate).
    /// A zero `ttl` expires the value as it is stored, so every read runs
    /// the constructor again. A `ttl` that overflows the calendar saturates
    /// at the latest representable instant.
    ///
    /// A constructor error is returned as-is and nothing is cached, so the
    /// next call retries.
    ///
    /// A constructor that asks for its own slot fails with
    /// [`CacheError::RecursiveBuild`]. Asking for other slots from inside a
    /// constructor is allowed.
    pub fn get<T, F>(&self, slot: SlotId, constructor: F, ttl: Option<Duration>) -> RdrResult<Arc<T>>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> RdrResult<T>,
    {
        let cell = self.cell(slot)?;

        if let Some(value) = self.load_live::<T>(slot, cell)? {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(slot = slot.index(), "cache slot hit");
            return Ok(value);
        }

        if BuildMarker::is_building(self.id, slot.index()) {
            tracing::warn!(slot = slot.index(), "recursive cache build detected");
            return Err(CacheError::RecursiveBuild { slot: slot.index() }.into());
        }

        let _guard = self.lock_for_build();

        // Another thread may have built the value while we waited.
        if let Some(value) = self.load_live::<T>(slot, cell)? {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(value);
        }
        self.counters.misses.fetch_add(1, Ordering::Relaxed);

        let _marker = BuildMarker::enter(self.id, slot.index());
        let value = match constructor() {
            Ok(value) => Arc::new(value),
            Err(err) => {
                self.counters.build_failures.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(slot = slot.index(), error = %err, "cache slot construction failed");
                return Err(err);
            }
        };

        let now = self.clock.now();
        let expiration = ttl.map(|ttl| expiration_after(now, ttl));
        cell.store(Some(Arc::new(SlotEntry {
            value: value.clone(),
            expiration,
        })));
        self.counters.builds.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(slot = slot.index(), ?expiration, "cache slot constructed");

        Ok(value)
    }

    /// Drop whatever `slot` holds. Empty or unknown slots are a no-op.
    ///
    /// Waits for an in-flight construction to finish first, so a value built
    /// from data read before a write cannot land after the eviction.
    pub fn invalidate(&self, slot: SlotId) {
        let Some(cell) = self.slots.get(slot.index()) else {
            return;
        };
        let _guard = self.lock_for_build();
        if cell.swap(None).is_some() {
            self.counters.invalidations.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(slot = slot.index(), "cache slot invalidated");
        }
    }

    /// Clear every slot. Meant for test isolation.
    pub fn reset_all(&self) {
        let _guard = self.lock_for_build();
        for cell in self.slots.iter() {
            cell.store(None);
        }
        tracing::debug!(capacity = self.slots.len(), "cache registry reset");
    }

    /// Whether `slot` currently holds an unexpired value.
    pub fn is_cached(&self, slot: SlotId) -> bool {
        let Some(cell) = self.slots.get(slot.index()) else {
            return false;
        };
        let now = self.clock.now();
        let guard = cell.load();
        matches!(&*guard, Some(entry) if entry.is_live(now))
    }

    /// Expiration of the value in `slot`.
    ///
    /// `None` if the slot is empty, `Some(None)` if the value never expires.
    pub fn expiration(&self, slot: SlotId) -> Option<Option<Timestamp>> {
        let cell = self.slots.get(slot.index())?;
        let guard = cell.load();
        guard.as_deref().map(|entry| entry.expiration)
    }

    /// Snapshot of the registry counters.
    pub fn stats(&self) -> CacheStats {
        let now = self.clock.now();
        let entry_count = self
            .slots
            .iter()
            .filter(|cell| matches!(&*cell.load(), Some(entry) if entry.is_live(now)))
            .count() as u64;
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            builds: self.counters.builds.load(Ordering::Relaxed),
            build_failures: self.counters.build_failures.load(Ordering::Relaxed),
            invalidations: self.counters.invalidations.load(Ordering::Relaxed),
            entry_count,
        }
    }

    fn cell(&self, slot: SlotId) -> RdrResult<&ArcSwapOption<SlotEntry>> {
        self.slots.get(slot.index()).ok_or_else(|| {
            CacheError::SlotOutOfRange {
                slot: slot.index(),
                capacity: self.slots.len(),
            }
            .into()
        })
    }

    fn load_live<T>(&self, slot: SlotId, cell: &ArcSwapOption<SlotEntry>) -> RdrResult<Option<Arc<T>>>
    where
        T: Send + Sync + 'static,
    {
        let guard = cell.load();
        match &*guard {
            Some(entry) if entry.is_live(self.clock.now()) => entry
                .value
                .clone()
                .downcast::<T>()
                .map(Some)
                .map_err(|_| CacheError::SlotTypeMismatch { slot: slot.index() }.into()),
            _ => Ok(None),
        }
    }

    /// Take the build lock unless this thread already holds it for an
    /// enclosing construction.
    fn lock_for_build(&self) -> Option<MutexGuard<'_, ()>> {
        if BuildMarker::holds_registry(self.id) {
            return None;
        }
        // The lock guards no data, so a poisoned lock is still usable.
        Some(self.build_lock.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

fn expiration_after(now: Timestamp, ttl: Duration) -> Timestamp {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
        .unwrap_or(chrono::DateTime::<chrono::Utc>::MAX_UTC)
}

impl fmt::Debug for CacheRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheRegistry")
            .field("id", &self.id)
            .field("capacity", &self.slots.len())
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}
