//! Identity types for reference entities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hash;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Common behaviour of the integer primary keys used by reference tables.
///
/// Reference tables are keyed by database-assigned integers rather than
/// UUIDs; the newtypes keep an HPO id from being passed where a site id is
/// expected.
pub trait RecordId: Copy + Eq + Hash + Ord + fmt::Debug + fmt::Display + Send + Sync {
    /// Wrap a raw database id.
    fn new(raw: i64) -> Self;

    /// The raw database id.
    fn as_i64(&self) -> i64;
}

macro_rules! define_record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
        #[serde(transparent)]
        pub struct $name(i64);

        impl RecordId for $name {
            fn new(raw: i64) -> Self {
                Self(raw)
            }

            fn as_i64(&self) -> i64 {
                self.0
            }
        }

        impl $name {
            /// Wrap a raw database id.
            pub const fn from_raw(raw: i64) -> Self {
                Self(raw)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(raw: i64) -> Self {
                Self(raw)
            }
        }
    };
}

define_record_id!(
    /// Primary key of the `hpo` (awardee) table.
    HpoId
);
define_record_id!(
    /// Primary key of the `organization` table.
    OrganizationId
);
define_record_id!(
    /// Primary key of the `site` table.
    SiteId
);
