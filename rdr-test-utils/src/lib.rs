//! RDR Test Utilities
//!
//! Shared test infrastructure for the RDR workspace:
//! - Proptest generators for reference entities
//! - Fixtures for a small awardee hierarchy and fixed clock instants
//! - Assertions for RDR error variants
//! - Tracing setup for tests

pub use rdr_core::{
    CacheError, Clock, ConfigError, EnrollingStatus, Hpo, HpoId, ManualClock, Organization,
    OrganizationId, OrganizationType, RdrError, RdrResult, RecordId, ReferenceTable, Site, SiteId,
    SiteStatus, StorageError, Timestamp, ValidationError, INITIAL_VERSION,
};

use chrono::Utc;
use std::sync::Once;

// ============================================================================
// TRACING
// ============================================================================

static TRACING: Once = Once::new();

/// Install a fmt subscriber that writes through the test harness.
///
/// Safe to call from every test; only the first call installs anything.
/// Filtering follows `RUST_LOG`, defaulting to `rdr_storage=debug`.
pub fn init_test_tracing() {
    TRACING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("rdr_storage=debug"));
        // Another harness may already have set a global subscriber.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for reference entities.

    use super::*;
    use proptest::prelude::*;

    // === Identity Generators ===

    pub fn arb_hpo_id() -> impl Strategy<Value = HpoId> {
        (1i64..1_000_000).prop_map(HpoId::new)
    }

    pub fn arb_organization_id() -> impl Strategy<Value = OrganizationId> {
        (1i64..1_000_000).prop_map(OrganizationId::new)
    }

    pub fn arb_site_id() -> impl Strategy<Value = SiteId> {
        (1i64..1_000_000).prop_map(SiteId::new)
    }

    /// Generate a Timestamp between 2015 and 2030.
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        (1420070400i64..1893456000i64).prop_map(|secs| {
            chrono::DateTime::from_timestamp(secs, 0).unwrap_or_else(Utc::now)
        })
    }

    // === Enum Generators ===

    pub fn arb_organization_type() -> impl Strategy<Value = OrganizationType> {
        prop_oneof![
            Just(OrganizationType::Unset),
            Just(OrganizationType::HpoTypeHpo),
            Just(OrganizationType::Fqhc),
            Just(OrganizationType::Va),
            Just(OrganizationType::Dv),
        ]
    }

    pub fn arb_enrolling_status() -> impl Strategy<Value = EnrollingStatus> {
        prop_oneof![
            Just(EnrollingStatus::Unset),
            Just(EnrollingStatus::Active),
            Just(EnrollingStatus::Inactive),
        ]
    }

    pub fn arb_site_status() -> impl Strategy<Value = SiteStatus> {
        prop_oneof![
            Just(SiteStatus::Unset),
            Just(SiteStatus::Active),
            Just(SiteStatus::Inactive),
        ]
    }

    // === Field Generators ===

    /// Google group drawn from a small pool so tables often share one.
    pub fn arb_google_group() -> impl Strategy<Value = String> {
        "hpo-site-[a-e]".prop_map(|s| s)
    }

    pub fn arb_site_name() -> impl Strategy<Value = String> {
        "[A-Z][a-z]{2,12}".prop_map(|s| s)
    }

    // === Entity Generators ===

    pub fn arb_hpo() -> impl Strategy<Value = Hpo> {
        (arb_hpo_id(), "[A-Z_]{2,12}", arb_organization_type(), any::<bool>()).prop_map(
            |(hpo_id, name, organization_type, is_obsolete)| {
                let mut hpo = Hpo::new(hpo_id, name, organization_type);
                hpo.is_obsolete = is_obsolete;
                hpo
            },
        )
    }

    pub fn arb_organization(hpo_id: HpoId) -> impl Strategy<Value = Organization> {
        (arb_organization_id(), "[A-Z_]{2,16}", any::<bool>()).prop_map(
            move |(organization_id, external_id, is_obsolete)| {
                let mut organization = Organization::new(organization_id, external_id, hpo_id);
                organization.is_obsolete = is_obsolete;
                organization
            },
        )
    }

    pub fn arb_site() -> impl Strategy<Value = Site> {
        (
            arb_site_id(),
            arb_site_name(),
            arb_google_group(),
            prop::option::of(arb_organization_id()),
            prop::option::of(1i64..10_000_000),
            arb_enrolling_status(),
            arb_site_status(),
        )
            .prop_map(
                |(
                    site_id,
                    site_name,
                    google_group,
                    organization_id,
                    mayolink_client_number,
                    enrolling_status,
                    site_status,
                )| {
                    let mut site = Site::new(site_id, site_name, google_group);
                    site.organization_id = organization_id;
                    site.mayolink_client_number = mayolink_client_number;
                    site.enrolling_status = enrolling_status;
                    site.site_status = site_status;
                    site
                },
            )
    }

    /// Generate up to `max_rows` sites with distinct primary keys, in
    /// shuffled scan order. Google groups repeat freely.
    pub fn arb_site_table(max_rows: usize) -> impl Strategy<Value = Vec<Site>> {
        prop::collection::btree_set(1i64..100_000, 0..max_rows)
            .prop_flat_map(|ids| {
                let len = ids.len();
                (
                    Just(ids),
                    prop::collection::vec((arb_site_name(), arb_google_group()), len),
                )
            })
            .prop_map(|(ids, fields)| {
                ids.into_iter()
                    .zip(fields)
                    .map(|(id, (name, group))| Site::new(SiteId::new(id), name, group))
                    .collect::<Vec<_>>()
            })
            .prop_shuffle()
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built test fixtures for common testing scenarios.

    use super::*;

    /// 2016-01-01T00:00:00Z.
    pub fn jan_1_2016() -> Timestamp {
        chrono::DateTime::from_timestamp(1_451_606_400, 0).unwrap_or_default()
    }

    /// A manual clock frozen at 2016-01-01T00:00:00Z.
    pub fn clock_at_2016() -> ManualClock {
        ManualClock::new(jan_1_2016())
    }

    pub fn pitt_hpo() -> Hpo {
        let mut hpo = Hpo::new(HpoId::new(1), "PITT", OrganizationType::HpoTypeHpo);
        hpo.display_name = "Pittsburgh".to_string();
        hpo
    }

    pub fn az_hpo() -> Hpo {
        let mut hpo = Hpo::new(HpoId::new(2), "AZ_TUCSON", OrganizationType::HpoTypeHpo);
        hpo.display_name = "Arizona".to_string();
        hpo
    }

    pub fn pitt_organization() -> Organization {
        let mut organization = Organization::new(OrganizationId::new(10), "PITT_UPMC", HpoId::new(1));
        organization.display_name = "UPMC".to_string();
        organization
    }

    pub fn az_organization() -> Organization {
        Organization::new(OrganizationId::new(20), "AZ_TUCSON_BANNER_HEALTH", HpoId::new(2))
    }

    /// Active site under [`pitt_organization`].
    pub fn monroeville_site() -> Site {
        let mut site = Site::new(SiteId::new(100), "Monroeville", "hpo-site-monroeville")
            .with_organization(&pitt_organization());
        site.mayolink_client_number = Some(7_035_769);
        site.enrolling_status = EnrollingStatus::Active;
        site.site_status = SiteStatus::Active;
        site
    }

    /// Inactive site under [`pitt_organization`].
    pub fn phoenix_site() -> Site {
        let mut site = Site::new(SiteId::new(101), "Phoenix", "hpo-site-phoenix")
            .with_organization(&pitt_organization());
        site.enrolling_status = EnrollingStatus::Inactive;
        site.site_status = SiteStatus::Inactive;
        site
    }

    /// Site under [`az_organization`].
    pub fn banner_site() -> Site {
        Site::new(SiteId::new(200), "Banner", "hpo-site-bannerphoenix")
            .with_organization(&az_organization())
    }

    /// Two HPOs, two organizations and three sites.
    pub fn awardee_hierarchy() -> (Vec<Hpo>, Vec<Organization>, Vec<Site>) {
        (
            vec![pitt_hpo(), az_hpo()],
            vec![pitt_organization(), az_organization()],
            vec![monroeville_site(), phoenix_site(), banner_site()],
        )
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for RDR error variants.

    use super::*;

    /// Assert that an RdrResult is Ok.
    #[track_caller]
    pub fn assert_ok<T: std::fmt::Debug>(result: &RdrResult<T>) {
        assert!(result.is_ok(), "Expected Ok, got Err: {:?}", result);
    }

    /// Assert that an RdrResult is Err.
    #[track_caller]
    pub fn assert_err<T: std::fmt::Debug>(result: &RdrResult<T>) {
        assert!(result.is_err(), "Expected Err, got Ok: {:?}", result);
    }

    #[track_caller]
    pub fn assert_not_found<T: std::fmt::Debug>(result: &RdrResult<T>, table: ReferenceTable) {
        match result {
            Err(RdrError::Storage(StorageError::NotFound { table: t, .. })) => {
                assert_eq!(*t, table, "Wrong table in NotFound error");
            }
            other => panic!("Expected NotFound error for {}, got: {:?}", table, other),
        }
    }

    #[track_caller]
    pub fn assert_index_error<T: std::fmt::Debug>(result: &RdrResult<T>) {
        match result {
            Err(RdrError::Storage(StorageError::IndexError { .. })) => {}
            other => panic!("Expected IndexError, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_cache_error<T: std::fmt::Debug>(result: &RdrResult<T>) {
        match result {
            Err(RdrError::Cache(_)) => {}
            other => panic!("Expected Cache error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_config_error<T: std::fmt::Debug>(result: &RdrResult<T>) {
        match result {
            Err(RdrError::Config(_)) => {}
            other => panic!("Expected Config error, got: {:?}", other),
        }
    }

    /// Assert a version conflict with the given expected and stored versions.
    #[track_caller]
    pub fn assert_version_mismatch<T: std::fmt::Debug>(
        result: &RdrResult<T>,
        expected: i64,
        actual: i64,
    ) {
        match result {
            Err(RdrError::Validation(ValidationError::VersionMismatch {
                expected: e,
                actual: a,
                ..
            })) => {
                assert_eq!((*e, *a), (expected, actual), "Wrong versions in VersionMismatch");
            }
            other => panic!("Expected VersionMismatch, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_required_field_missing<T: std::fmt::Debug>(result: &RdrResult<T>, field: &str) {
        match result {
            Err(RdrError::Validation(ValidationError::RequiredFieldMissing { field: f })) => {
                assert_eq!(f, field);
            }
            other => panic!("Expected RequiredFieldMissing for {}, got: {:?}", field, other),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
