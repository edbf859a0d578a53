//! Cached DAOs for the awardee hierarchy.
//!
//! Reads go through a [`CachedTable`]; writes go to the backing
//! [`TableStore`] and then evict the table's cache slot so the next read
//! rescans. Eviction is local to the registry the DAO was built with.

use std::fmt;
use std::sync::Arc;

use rdr_core::{Hpo, Organization, RdrResult, Site, StorageError, ValidationError, INITIAL_VERSION};

use crate::cache::{
    CacheConfig, CacheRegistry, CacheSettings, CachedTable, FieldExtractor, IndexSpec,
    IntoIndexKey, ReferenceEntity, SlotId,
};
use crate::TableStore;

/// Index of HPOs by name.
pub const HPO_NAME_INDEX: &str = "name";
/// Index of organizations by external id.
pub const ORGANIZATION_EXTERNAL_ID_INDEX: &str = "external_id";
/// Index of sites by Google group.
pub const SITE_GOOGLE_GROUP_INDEX: &str = "google_group";
/// Index of sites by `(organization_id, site_name)`.
pub const SITE_ORGANIZATION_NAME_INDEX: &str = "organization_site_name";

/// Optimistic-concurrency policy for updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VersionPolicy {
    /// Updates must name the version they expect to replace.
    Enforce,
    /// Updates overwrite whatever version is stored.
    #[default]
    Skip,
}

/// DAO over one cached reference table.
pub struct CachedDao<E: ReferenceEntity, S: TableStore<E>> {
    table: CachedTable<E, S>,
    store: Arc<S>,
    version_policy: VersionPolicy,
}

impl<E: ReferenceEntity, S: TableStore<E>> CachedDao<E, S> {
    pub fn new(
        registry: Arc<CacheRegistry>,
        slot: SlotId,
        store: Arc<S>,
        settings: CacheSettings<E>,
    ) -> RdrResult<Self> {
        let table = CachedTable::new(registry, slot, settings, store.clone())?;
        Ok(Self {
            table,
            store,
            version_policy: VersionPolicy::default(),
        })
    }

    /// Set the version policy.
    pub fn with_version_policy(mut self, policy: VersionPolicy) -> Self {
        self.version_policy = policy;
        self
    }

    pub fn version_policy(&self) -> VersionPolicy {
        self.version_policy
    }

    /// The cache handle behind this DAO.
    pub fn table(&self) -> &CachedTable<E, S> {
        &self.table
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn get(&self, key: &E::Key) -> RdrResult<Option<Arc<E>>> {
        self.table.get(key)
    }

    pub fn get_by(&self, index_name: &str, key: impl IntoIndexKey) -> RdrResult<Option<Arc<E>>> {
        self.table.get_by(index_name, key)
    }

    pub fn get_all(&self) -> RdrResult<Vec<Arc<E>>> {
        self.table.get_all()
    }

    pub fn get_many(&self, keys: &[E::Key]) -> RdrResult<Vec<Option<Arc<E>>>> {
        self.table.get_many(keys)
    }

    /// Insert a new row at the initial version.
    ///
    /// The cache slot is evicted only once the store accepted the row.
    pub fn insert(&self, mut entity: E) -> RdrResult<E> {
        entity.set_version(INITIAL_VERSION);
        self.store.insert(&entity)?;
        self.table.invalidate();
        tracing::debug!(
            table = %E::table(),
            key = %entity.primary_key(),
            "inserted reference row, cache invalidated"
        );
        Ok(entity)
    }

    /// Replace an existing row and bump its version.
    ///
    /// Under [`VersionPolicy::Enforce`] `expected_version` is required and
    /// must equal the stored version at the moment of the write; the store
    /// checks and writes in one step, so of two updates naming the same
    /// version only one lands. Under [`VersionPolicy::Skip`] the row is
    /// overwritten at the stored version plus one.
    pub fn update(&self, mut entity: E, expected_version: Option<i64>) -> RdrResult<E> {
        let key = entity.primary_key();

        match self.version_policy {
            VersionPolicy::Enforce => {
                let expected =
                    expected_version.ok_or_else(|| ValidationError::RequiredFieldMissing {
                        field: "If-Match".to_string(),
                    })?;
                entity.set_version(expected + 1);
                self.store.update_if_version(&entity, expected)?;
            }
            VersionPolicy::Skip => {
                let stored = self.store.find(&key)?.ok_or_else(|| StorageError::NotFound {
                    table: E::table(),
                    key: key.to_string(),
                })?;
                entity.set_version(stored.version() + 1);
                self.store.update(&entity)?;
            }
        }

        self.table.invalidate();
        tracing::debug!(
            table = %E::table(),
            key = %key,
            version = entity.version(),
            "updated reference row, cache invalidated"
        );
        Ok(entity)
    }
}

impl<E: ReferenceEntity, S: TableStore<E>> fmt::Debug for CachedDao<E, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedDao")
            .field("table", &self.table)
            .field("version_policy", &self.version_policy)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// REFERENCE TABLE DAOS
// ============================================================================

pub type HpoDao<S> = CachedDao<Hpo, S>;
pub type OrganizationDao<S> = CachedDao<Organization, S>;
pub type SiteDao<S> = CachedDao<Site, S>;

/// HPO DAO, indexed by name.
pub fn hpo_dao<S: TableStore<Hpo>>(
    registry: Arc<CacheRegistry>,
    config: &CacheConfig,
    store: Arc<S>,
) -> RdrResult<HpoDao<S>> {
    let settings = settings_for::<Hpo>(config).with_index(IndexSpec::single(
        HPO_NAME_INDEX,
        |h: &Hpo| h.name.as_str().into(),
    ));
    CachedDao::new(registry, SlotId::HPO, store, settings)
}

/// Organization DAO, indexed by external id.
pub fn organization_dao<S: TableStore<Organization>>(
    registry: Arc<CacheRegistry>,
    config: &CacheConfig,
    store: Arc<S>,
) -> RdrResult<OrganizationDao<S>> {
    let settings = settings_for::<Organization>(config).with_index(IndexSpec::single(
        ORGANIZATION_EXTERNAL_ID_INDEX,
        |o: &Organization| o.external_id.as_str().into(),
    ));
    CachedDao::new(registry, SlotId::ORGANIZATION, store, settings)
}

/// Site DAO, indexed by Google group and by organization plus site name.
pub fn site_dao<S: TableStore<Site>>(
    registry: Arc<CacheRegistry>,
    config: &CacheConfig,
    store: Arc<S>,
) -> RdrResult<SiteDao<S>> {
    let settings = settings_for::<Site>(config)
        .with_index(IndexSpec::single(SITE_GOOGLE_GROUP_INDEX, |s: &Site| {
            s.google_group.as_str().into()
        }))
        .with_index(IndexSpec::composite(
            SITE_ORGANIZATION_NAME_INDEX,
            vec![
                FieldExtractor::new("organization_id", |s: &Site| s.organization_id.into()),
                FieldExtractor::new("site_name", |s: &Site| s.site_name.as_str().into()),
            ],
        ));
    CachedDao::new(registry, SlotId::SITE, store, settings)
}

fn settings_for<E: ReferenceEntity>(config: &CacheConfig) -> CacheSettings<E> {
    CacheSettings::new(Some(config.ttl_for(E::table())))
        .with_collision_policy(config.collision_policy)
}

impl<S: TableStore<Hpo>> CachedDao<Hpo, S> {
    pub fn get_by_name(&self, name: &str) -> RdrResult<Option<Arc<Hpo>>> {
        self.get_by(HPO_NAME_INDEX, name)
    }
}

impl<S: TableStore<Organization>> CachedDao<Organization, S> {
    pub fn get_by_external_id(&self, external_id: &str) -> RdrResult<Option<Arc<Organization>>> {
        self.get_by(ORGANIZATION_EXTERNAL_ID_INDEX, external_id)
    }
}

impl<S: TableStore<Site>> CachedDao<Site, S> {
    pub fn get_by_google_group(&self, google_group: &str) -> RdrResult<Option<Arc<Site>>> {
        self.get_by(SITE_GOOGLE_GROUP_INDEX, google_group)
    }

    /// Site named `site_name` under `organization`.
    pub fn get_by_organization_and_name(
        &self,
        organization: rdr_core::OrganizationId,
        site_name: &str,
    ) -> RdrResult<Option<Arc<Site>>> {
        self.get_by(SITE_ORGANIZATION_NAME_INDEX, (organization, site_name))
    }
}
