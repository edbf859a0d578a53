//! Reference entity structures
//!
//! The awardee hierarchy: an HPO owns organizations, an organization owns
//! sites. Rows are small and change rarely, so they are served from the
//! in-process cache rather than queried per request.

use crate::{EnrollingStatus, HpoId, OrganizationId, OrganizationType, SiteId, SiteStatus};
use serde::{Deserialize, Serialize};

/// Version assigned to a row on first insert.
pub const INITIAL_VERSION: i64 = 1;

/// HPO (health provider organization / awardee).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct Hpo {
    #[cfg_attr(feature = "openapi", schema(value_type = i64))]
    pub hpo_id: HpoId,
    /// Short unique awardee name, e.g. `PITT`.
    pub name: String,
    pub display_name: String,
    pub organization_type: OrganizationType,
    pub is_obsolete: bool,
    pub version: i64,
}

/// Organization belonging to an HPO.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    #[cfg_attr(feature = "openapi", schema(value_type = i64))]
    pub organization_id: OrganizationId,
    /// Externally visible identifier, e.g. `PITT_UPMC`.
    pub external_id: String,
    pub display_name: String,
    #[cfg_attr(feature = "openapi", schema(value_type = i64))]
    pub hpo_id: HpoId,
    pub is_obsolete: bool,
    pub version: i64,
}

/// Physical site where participants enroll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct Site {
    #[cfg_attr(feature = "openapi", schema(value_type = i64))]
    pub site_id: SiteId,
    pub site_name: String,
    /// Google group the site's staff belong to; the site's external key.
    pub google_group: String,
    pub mayolink_client_number: Option<i64>,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<i64>))]
    pub organization_id: Option<OrganizationId>,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<i64>))]
    pub hpo_id: Option<HpoId>,
    pub enrolling_status: EnrollingStatus,
    pub site_status: SiteStatus,
    pub version: i64,
}

impl Hpo {
    /// Create an HPO row at the initial version.
    pub fn new(hpo_id: HpoId, name: impl Into<String>, organization_type: OrganizationType) -> Self {
        let name = name.into();
        Self {
            hpo_id,
            display_name: name.clone(),
            name,
            organization_type,
            is_obsolete: false,
            version: INITIAL_VERSION,
        }
    }
}

impl Organization {
    /// Create an organization row at the initial version.
    pub fn new(
        organization_id: OrganizationId,
        external_id: impl Into<String>,
        hpo_id: HpoId,
    ) -> Self {
        let external_id = external_id.into();
        Self {
            organization_id,
            display_name: external_id.clone(),
            external_id,
            hpo_id,
            is_obsolete: false,
            version: INITIAL_VERSION,
        }
    }
}

impl Site {
    /// Create a site row at the initial version.
    pub fn new(site_id: SiteId, site_name: impl Into<String>, google_group: impl Into<String>) -> Self {
        Self {
            site_id,
            site_name: site_name.into(),
            google_group: google_group.into(),
            mayolink_client_number: None,
            organization_id: None,
            hpo_id: None,
            enrolling_status: EnrollingStatus::Unset,
            site_status: SiteStatus::Unset,
            version: INITIAL_VERSION,
        }
    }

    /// Attach the site to an organization and its HPO.
    pub fn with_organization(mut self, organization: &Organization) -> Self {
        self.organization_id = Some(organization.organization_id);
        self.hpo_id = Some(organization.hpo_id);
        self
    }
}
