//! Integration Tests for the Cached Reference DAOs
//!
//! **Property 7: Write Invalidation Locality**
//! A write through a DAO evicts that table's slot in the DAO's registry and
//! nothing else: other tables stay cached, other registries stay stale.
//!
//! Also covered: concurrent misses collapse into one scan, version policy
//! enforcement under racing writers, eviction ordering against an in-flight
//! build, and the cache configuration.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use proptest::prelude::*;
use rdr_storage::{
    hpo_dao, organization_dao, site_dao, CacheConfig, CacheRegistry, CollisionPolicy,
    InMemoryTable, MockStorage, SlotId, TableSource, TableStore, VersionPolicy,
};
use rdr_test_utils::{
    assertions, fixtures, generators, init_test_tracing, CacheError, HpoId, ManualClock, RdrError,
    RdrResult, RecordId, ReferenceTable, Site, SiteId, INITIAL_VERSION,
};

// ============================================================================
// HELPERS
// ============================================================================

fn seeded_storage() -> MockStorage {
    let storage = MockStorage::new();
    let (hpos, organizations, sites) = fixtures::awardee_hierarchy();
    for hpo in &hpos {
        storage.hpos.insert(hpo).unwrap();
    }
    for organization in &organizations {
        storage.organizations.insert(organization).unwrap();
    }
    for site in &sites {
        storage.sites.insert(site).unwrap();
    }
    storage
}

fn registry() -> Arc<CacheRegistry> {
    Arc::new(CacheRegistry::from_config(
        &CacheConfig::default(),
        Arc::new(fixtures::clock_at_2016()),
    ))
}

/// Site store that parks callers at barriers before handing off to an
/// in-memory table.
struct GatedSites {
    inner: Arc<InMemoryTable<Site>>,
    /// Waited on once, after the first full scan has read its rows.
    scan_gate: Option<Arc<Barrier>>,
    scan_gate_armed: AtomicBool,
    /// Waited on by every versioned write before it reaches the table.
    write_gate: Option<Arc<Barrier>>,
}

impl GatedSites {
    fn new(inner: Arc<InMemoryTable<Site>>) -> Self {
        Self {
            inner,
            scan_gate: None,
            scan_gate_armed: AtomicBool::new(true),
            write_gate: None,
        }
    }

    fn with_scan_gate(mut self, barrier: Arc<Barrier>) -> Self {
        self.scan_gate = Some(barrier);
        self
    }

    fn with_write_gate(mut self, barrier: Arc<Barrier>) -> Self {
        self.write_gate = Some(barrier);
        self
    }
}

impl TableSource<Site> for GatedSites {
    fn load_all(&self) -> RdrResult<Vec<Site>> {
        let rows = self.inner.load_all()?;
        if let Some(barrier) = &self.scan_gate {
            if self.scan_gate_armed.swap(false, Ordering::SeqCst) {
                barrier.wait();
                // Give the writer time to land its row and block on eviction.
                thread::sleep(Duration::from_millis(50));
            }
        }
        Ok(rows)
    }
}

impl TableStore<Site> for GatedSites {
    fn find(&self, key: &SiteId) -> RdrResult<Option<Site>> {
        self.inner.find(key)
    }

    fn insert(&self, entity: &Site) -> RdrResult<()> {
        self.inner.insert(entity)
    }

    fn update(&self, entity: &Site) -> RdrResult<()> {
        self.inner.update(entity)
    }

    fn update_if_version(&self, entity: &Site, expected: i64) -> RdrResult<()> {
        if let Some(barrier) = &self.write_gate {
            barrier.wait();
        }
        self.inner.update_if_version(entity, expected)
    }
}

// ============================================================================
// WRITE INVALIDATION
// ============================================================================

#[test]
fn test_write_invalidates_only_its_own_table() {
    init_test_tracing();
    let storage = seeded_storage();
    let registry = registry();
    let config = CacheConfig::default();
    let hpos = hpo_dao(registry.clone(), &config, storage.hpos.clone()).unwrap();
    let sites = site_dao(registry.clone(), &config, storage.sites.clone()).unwrap();

    hpos.get_all().unwrap();
    sites.get_all().unwrap();
    assert!(registry.is_cached(SlotId::HPO));
    assert!(registry.is_cached(SlotId::SITE));

    let new_site = Site::new(SiteId::new(300), "Oakland", "hpo-site-oakland");
    sites.insert(new_site).unwrap();

    assert!(registry.is_cached(SlotId::HPO));
    assert!(!registry.is_cached(SlotId::SITE));
    assert!(sites.get_by_google_group("hpo-site-oakland").unwrap().is_some());
    assert_eq!(storage.hpos.scan_count(), 1);
    assert_eq!(storage.sites.scan_count(), 2);
}

#[test]
fn test_write_does_not_reach_other_registries() {
    let storage = seeded_storage();
    let config = CacheConfig::default();
    let writer = organization_dao(registry(), &config, storage.organizations.clone()).unwrap();
    let other_process = organization_dao(registry(), &config, storage.organizations.clone()).unwrap();

    let before = other_process.get_by_external_id("PITT_UPMC").unwrap().unwrap();

    let mut renamed = (*before).clone();
    renamed.display_name = "UPMC Renamed".to_string();
    writer.update(renamed, None).unwrap();

    // The second registry keeps serving its snapshot until it expires.
    let stale = other_process.get_by_external_id("PITT_UPMC").unwrap().unwrap();
    assert_eq!(stale.display_name, "UPMC");
    let fresh = writer.get_by_external_id("PITT_UPMC").unwrap().unwrap();
    assert_eq!(fresh.display_name, "UPMC Renamed");
}

#[test]
fn test_cached_copies_are_detached_from_the_store() {
    let storage = seeded_storage();
    let dao = hpo_dao(registry(), &CacheConfig::default(), storage.hpos.clone()).unwrap();

    let cached = dao.get(&HpoId::new(1)).unwrap().unwrap();
    let mut edited = (*cached).clone();
    edited.display_name = "Edited locally".to_string();
    assert_ne!(edited.display_name, cached.display_name);

    assert_eq!(dao.get_by_name("PITT").unwrap().unwrap().display_name, "Pittsburgh");
    assert_eq!(
        storage.hpos.find(&HpoId::new(1)).unwrap().unwrap().display_name,
        "Pittsburgh"
    );
}

// ============================================================================
// VERSION POLICY
// ============================================================================

#[test]
fn test_enforced_versions_round_trip() {
    let storage = seeded_storage();
    let dao = site_dao(registry(), &CacheConfig::default(), storage.sites.clone())
        .unwrap()
        .with_version_policy(VersionPolicy::Enforce);

    let site = (*dao.get(&SiteId::new(100)).unwrap().unwrap()).clone();

    assertions::assert_required_field_missing(&dao.update(site.clone(), None), "If-Match");
    assertions::assert_version_mismatch(&dao.update(site.clone(), Some(7)), 7, 1);

    let updated = dao.update(site.clone(), Some(1)).unwrap();
    assert_eq!(updated.version, 2);
    assertions::assert_version_mismatch(&dao.update(site, Some(1)), 1, 2);

    assert_eq!(dao.get(&SiteId::new(100)).unwrap().unwrap().version, 2);
}

#[test]
fn test_racing_updates_with_same_version_only_one_lands() {
    init_test_tracing();
    let storage = seeded_storage();
    let barrier = Arc::new(Barrier::new(2));
    let store = Arc::new(GatedSites::new(storage.sites.clone()).with_write_gate(barrier));
    let dao = Arc::new(
        site_dao(registry(), &CacheConfig::default(), store)
            .unwrap()
            .with_version_policy(VersionPolicy::Enforce),
    );
    let site = (*dao.get(&SiteId::new(100)).unwrap().unwrap()).clone();
    assert_eq!(site.version, INITIAL_VERSION);

    // Both writers hold If-Match: 1 and pass the gate together.
    let handles: Vec<_> = ["Monroeville East", "Monroeville West"]
        .into_iter()
        .map(|name| {
            let dao = dao.clone();
            let mut edited = site.clone();
            edited.site_name = name.to_string();
            thread::spawn(move || dao.update(edited, Some(INITIAL_VERSION)))
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let (won, lost): (Vec<_>, Vec<_>) = results.iter().partition(|r| r.is_ok());
    assert_eq!(won.len(), 1);
    assert_eq!(lost.len(), 1);
    assertions::assert_ok(won[0]);
    assertions::assert_version_mismatch(lost[0], 1, 2);

    let winner = won[0].as_ref().unwrap();
    let stored = storage.sites.find(&SiteId::new(100)).unwrap().unwrap();
    assert_eq!(stored.version, 2);
    assert_eq!(stored.site_name, winner.site_name);
    assert_eq!(dao.get(&SiteId::new(100)).unwrap().unwrap().site_name, winner.site_name);
}

#[test]
fn test_update_of_unknown_row() {
    let storage = seeded_storage();
    let dao = hpo_dao(registry(), &CacheConfig::default(), storage.hpos.clone()).unwrap();
    let mut ghost = fixtures::pitt_hpo();
    ghost.hpo_id = HpoId::new(99);
    assertions::assert_not_found(&dao.update(ghost, None), ReferenceTable::Hpo);
}

// ============================================================================
// CONFIGURATION
// ============================================================================

#[test]
fn test_reject_policy_from_config() {
    let storage = MockStorage::new();
    let config = CacheConfig::new().with_collision_policy(CollisionPolicy::Reject);
    let dao = site_dao(registry(), &config, storage.sites.clone()).unwrap();

    dao.insert(Site::new(SiteId::new(1), "A", "hpo-site-shared")).unwrap();
    dao.insert(Site::new(SiteId::new(2), "B", "hpo-site-shared")).unwrap();

    let result = dao.get(&SiteId::new(1));
    assertions::assert_cache_error(&result);
    assert!(matches!(
        result,
        Err(RdrError::Cache(CacheError::IndexCollision { .. }))
    ));
}

#[test]
fn test_table_ttl_override() {
    let storage = seeded_storage();
    let clock = Arc::new(ManualClock::new(fixtures::jan_1_2016()));
    let config = CacheConfig::new()
        .with_default_ttl(Duration::from_secs(600))
        .with_table_ttl(ReferenceTable::Hpo, Duration::from_secs(10));
    let registry = Arc::new(CacheRegistry::from_config(&config, clock.clone()));
    let hpos = hpo_dao(registry.clone(), &config, storage.hpos.clone()).unwrap();
    let sites = site_dao(registry.clone(), &config, storage.sites.clone()).unwrap();

    hpos.get_all().unwrap();
    sites.get_all().unwrap();
    clock.advance(Duration::from_secs(10));

    assert!(!registry.is_cached(SlotId::HPO));
    assert!(registry.is_cached(SlotId::SITE));
}

#[test]
fn test_zero_ttl_from_environment_is_refused() {
    let lookup = |key: &str| (key == "RDR_CACHE_TTL_SITE_SECS").then(|| "0".to_string());
    assertions::assert_config_error(&CacheConfig::try_from_lookup(lookup));
    assert_eq!(
        CacheConfig::from_lookup(lookup).ttl_for(ReferenceTable::Site),
        Duration::from_secs(600)
    );
}

#[test]
fn test_unknown_index_name() {
    let storage = seeded_storage();
    let dao = hpo_dao(registry(), &CacheConfig::default(), storage.hpos.clone()).unwrap();
    assertions::assert_index_error(&dao.get_by("display_name", "Pittsburgh"));
    assertions::assert_ok(&dao.get_by("name", "PITT"));
}

#[test]
fn test_registry_sized_from_config() {
    let config = CacheConfig::new().with_slot_capacity(SlotId::RESERVED + 1);
    let registry = CacheRegistry::from_config(&config, Arc::new(fixtures::clock_at_2016()));
    let extra = SlotId::new(SlotId::RESERVED);

    assert_eq!(registry.capacity(), SlotId::RESERVED + 1);
    assertions::assert_ok(&registry.get(extra, || Ok("derived"), None));
    assert!(registry.is_cached(extra));
}

// ============================================================================
// CONCURRENCY
// ============================================================================

#[test]
fn test_invalidate_waits_for_in_flight_build() {
    init_test_tracing();
    let storage = seeded_storage();
    let scanned = Arc::new(Barrier::new(2));
    let store = Arc::new(GatedSites::new(storage.sites.clone()).with_scan_gate(scanned.clone()));
    let dao = Arc::new(site_dao(registry(), &CacheConfig::default(), store).unwrap());

    let reader = {
        let dao = dao.clone();
        thread::spawn(move || dao.get_by_google_group("hpo-site-oakland").unwrap().is_some())
    };

    // The reader has scanned the old rows and is still building its snapshot.
    scanned.wait();
    dao.insert(Site::new(SiteId::new(300), "Oakland", "hpo-site-oakland"))
        .unwrap();

    assert!(!reader.join().unwrap(), "reader built from pre-insert rows");
    assert!(dao.get_by_google_group("hpo-site-oakland").unwrap().is_some());
    assert_eq!(storage.sites.scan_count(), 2);
}

#[test]
fn test_concurrent_cold_reads_scan_once() {
    let storage = seeded_storage();
    let dao = Arc::new(site_dao(registry(), &CacheConfig::default(), storage.sites.clone()).unwrap());
    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let dao = dao.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                dao.get_by_google_group("hpo-site-monroeville")
                    .unwrap()
                    .map(|site| site.site_id.as_i64())
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), Some(100));
    }
    assert_eq!(storage.sites.scan_count(), 1);
}

#[test]
fn test_concurrent_writers_and_readers_converge() {
    let storage = seeded_storage();
    let dao = Arc::new(hpo_dao(registry(), &CacheConfig::default(), storage.hpos.clone()).unwrap());
    let barrier = Arc::new(Barrier::new(4));

    let writers: Vec<_> = (0..2)
        .map(|i| {
            let dao = dao.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                for j in 0..10 {
                    let id = 1_000 + i * 100 + j;
                    let hpo = rdr_test_utils::Hpo::new(
                        HpoId::new(id),
                        format!("HPO_{id}"),
                        rdr_test_utils::OrganizationType::Va,
                    );
                    dao.insert(hpo).unwrap();
                }
            })
        })
        .collect();
    let readers: Vec<_> = (0..2)
        .map(|_| {
            let dao = dao.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..20 {
                    assert!(dao.get_by_name("PITT").unwrap().is_some());
                }
            })
        })
        .collect();

    for handle in writers.into_iter().chain(readers) {
        handle.join().unwrap();
    }

    // Every write evicted the slot after landing, so a fresh read sees all rows.
    assert_eq!(dao.get_all().unwrap().len(), 2 + 20);
    assert!(dao.get_by_name("HPO_1109").unwrap().is_some());
}

// ============================================================================
// PROPERTY TESTS
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// An inserted row is visible by name on the next read, at the initial version.
    #[test]
    fn prop_inserted_hpo_visible_by_name(hpo in generators::arb_hpo()) {
        let storage = MockStorage::new();
        let dao = hpo_dao(registry(), &CacheConfig::default(), storage.hpos.clone()).unwrap();
        prop_assert!(dao.get_by_name(&hpo.name).unwrap().is_none());

        dao.insert(hpo.clone()).unwrap();

        let cached = dao.get_by_name(&hpo.name).unwrap().unwrap();
        prop_assert_eq!(cached.hpo_id, hpo.hpo_id);
        prop_assert_eq!(cached.version, INITIAL_VERSION);
        prop_assert_eq!(storage.hpos.scan_count(), 2);
    }
}
