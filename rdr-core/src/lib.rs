//! RDR Core - Reference Entity Types
//!
//! Pure data structures shared by the reference-data cache crates:
//! the awardee hierarchy entities, their id newtypes and enums, the error
//! hierarchy, and the clock abstraction used for cache expiry.
//! This crate contains no caching or storage logic.

pub mod clock;
pub mod entities;
pub mod enums;
pub mod error;
pub mod identity;

pub use clock::{Clock, ManualClock, SystemClock};
pub use entities::{Hpo, Organization, Site, INITIAL_VERSION};
pub use enums::{EnrollingStatus, EnumParseError, OrganizationType, ReferenceTable, SiteStatus};
pub use error::{CacheError, ConfigError, RdrError, RdrResult, StorageError, ValidationError};
pub use identity::{HpoId, OrganizationId, RecordId, SiteId, Timestamp};
