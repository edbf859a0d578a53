//! Enum types for reference entities

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// REFERENCE TABLES
// ============================================================================

/// Reference table discriminator.
///
/// Each variant names one small, read-mostly administrative table whose rows
/// are served from the in-process cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum ReferenceTable {
    Hpo,
    Organization,
    Site,
}

impl ReferenceTable {
    /// All reference tables, in hierarchy order.
    pub const ALL: [ReferenceTable; 3] = [
        ReferenceTable::Hpo,
        ReferenceTable::Organization,
        ReferenceTable::Site,
    ];

    /// Database table name.
    pub fn table_name(&self) -> &'static str {
        match self {
            ReferenceTable::Hpo => "hpo",
            ReferenceTable::Organization => "organization",
            ReferenceTable::Site => "site",
        }
    }
}

impl fmt::Display for ReferenceTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.table_name())
    }
}

impl FromStr for ReferenceTable {
    type Err = EnumParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hpo" => Ok(ReferenceTable::Hpo),
            "organization" => Ok(ReferenceTable::Organization),
            "site" => Ok(ReferenceTable::Site),
            _ => Err(EnumParseError {
                kind: "reference table",
                value: s.to_string(),
            }),
        }
    }
}

// ============================================================================
// ENTITY ENUMS
// ============================================================================

/// Kind of awardee an HPO represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrganizationType {
    #[default]
    Unset,
    /// Health provider organization
    #[serde(rename = "HPO")]
    HpoTypeHpo,
    /// Federally qualified health center
    Fqhc,
    /// Veterans Affairs
    Va,
    /// Direct volunteer
    Dv,
}

impl OrganizationType {
    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            OrganizationType::Unset => "UNSET",
            OrganizationType::HpoTypeHpo => "HPO",
            OrganizationType::Fqhc => "FQHC",
            OrganizationType::Va => "VA",
            OrganizationType::Dv => "DV",
        }
    }
}

impl FromStr for OrganizationType {
    type Err = EnumParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "UNSET" => Ok(OrganizationType::Unset),
            "HPO" => Ok(OrganizationType::HpoTypeHpo),
            "FQHC" => Ok(OrganizationType::Fqhc),
            "VA" => Ok(OrganizationType::Va),
            "DV" => Ok(OrganizationType::Dv),
            _ => Err(EnumParseError {
                kind: "organization type",
                value: s.to_string(),
            }),
        }
    }
}

/// Whether a site is currently enrolling participants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EnrollingStatus {
    #[default]
    Unset,
    Active,
    Inactive,
}

/// Operational status of a site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SiteStatus {
    #[default]
    Unset,
    Active,
    Inactive,
}

/// Error when parsing an invalid enum string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumParseError {
    pub kind: &'static str,
    pub value: String,
}

impl fmt::Display for EnumParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid {}: {}", self.kind, self.value)
    }
}

impl std::error::Error for EnumParseError {}
