//! Cache configuration.

use std::collections::HashMap;
use std::time::Duration;

use rdr_core::{ConfigError, RdrResult, ReferenceTable};

use super::entity_cache::CollisionPolicy;
use super::registry::SlotId;

/// Default lifetime of a cached reference table.
pub const DEFAULT_CACHE_TTL_SECS: u64 = 600;

const ENV_TTL: &str = "RDR_CACHE_TTL_SECS";
const ENV_REJECT_COLLISIONS: &str = "RDR_CACHE_REJECT_INDEX_COLLISIONS";

/// Configuration for the reference-table caches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// TTL applied to every table without an override.
    pub default_ttl: Duration,
    /// Per-table TTL overrides.
    pub table_ttls: HashMap<ReferenceTable, Duration>,
    /// How secondary-index collisions are handled during a build.
    pub collision_policy: CollisionPolicy,
    /// Number of registry slots to allocate.
    pub slot_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            table_ttls: HashMap::new(),
            collision_policy: CollisionPolicy::LastWins,
            slot_capacity: SlotId::RESERVED,
        }
    }
}

impl CacheConfig {
    /// Create a new cache config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the TTL used by tables without an override.
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Override the TTL of one table.
    pub fn with_table_ttl(mut self, table: ReferenceTable, ttl: Duration) -> Self {
        self.table_ttls.insert(table, ttl);
        self
    }

    /// Set the collision policy.
    pub fn with_collision_policy(mut self, policy: CollisionPolicy) -> Self {
        self.collision_policy = policy;
        self
    }

    /// Set the registry slot capacity. Never below the reserved slots.
    pub fn with_slot_capacity(mut self, capacity: usize) -> Self {
        self.slot_capacity = capacity.max(SlotId::RESERVED);
        self
    }

    /// Effective TTL of `table`.
    pub fn ttl_for(&self, table: ReferenceTable) -> Duration {
        self.table_ttls
            .get(&table)
            .copied()
            .unwrap_or(self.default_ttl)
    }

    /// Load configuration from environment variables.
    ///
    /// Unset or unparsable values fall back to the defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from environment variables, rejecting values that
    /// do not parse.
    pub fn try_from_env() -> RdrResult<Self> {
        Self::try_from_lookup(|key| std::env::var(key).ok())
    }

    /// Lenient load from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(ttl) = lookup(ENV_TTL).and_then(|s| parse_secs(&s).ok()) {
            config.default_ttl = ttl;
        }
        for table in ReferenceTable::ALL {
            if let Some(ttl) = lookup(&table_ttl_var(table)).and_then(|s| parse_secs(&s).ok()) {
                config.table_ttls.insert(table, ttl);
            }
        }
        if let Some(reject) = lookup(ENV_REJECT_COLLISIONS).and_then(|s| parse_flag(&s).ok()) {
            config.collision_policy = policy_for(reject);
        }

        config
    }

    /// Strict load from an arbitrary key lookup.
    pub fn try_from_lookup(lookup: impl Fn(&str) -> Option<String>) -> RdrResult<Self> {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_TTL) {
            config.default_ttl = parse_secs(&raw).map_err(|reason| invalid(ENV_TTL, &raw, reason))?;
        }
        for table in ReferenceTable::ALL {
            let var = table_ttl_var(table);
            if let Some(raw) = lookup(&var) {
                let ttl = parse_secs(&raw).map_err(|reason| invalid(&var, &raw, reason))?;
                config.table_ttls.insert(table, ttl);
            }
        }
        if let Some(raw) = lookup(ENV_REJECT_COLLISIONS) {
            let reject =
                parse_flag(&raw).map_err(|reason| invalid(ENV_REJECT_COLLISIONS, &raw, reason))?;
            config.collision_policy = policy_for(reject);
        }

        Ok(config)
    }
}

fn table_ttl_var(table: ReferenceTable) -> String {
    format!("RDR_CACHE_TTL_{}_SECS", table.table_name().to_uppercase())
}

/// Zero is refused: a zero TTL would rescan the table on every read.
fn parse_secs(raw: &str) -> Result<Duration, &'static str> {
    match raw.trim().parse::<u64>() {
        Ok(0) => Err("must be at least one second"),
        Ok(secs) => Ok(Duration::from_secs(secs)),
        Err(_) => Err("must be a whole number of seconds"),
    }
}

fn parse_flag(raw: &str) -> Result<bool, &'static str> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err("must be true or false"),
    }
}

fn policy_for(reject: bool) -> CollisionPolicy {
    if reject {
        CollisionPolicy::Reject
    } else {
        CollisionPolicy::LastWins
    }
}

fn invalid(field: &str, value: &str, reason: &str) -> rdr_core::RdrError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdr_core::RdrError;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.default_ttl, Duration::from_secs(600));
        assert_eq!(config.collision_policy, CollisionPolicy::LastWins);
        assert_eq!(config.slot_capacity, SlotId::RESERVED);
        for table in ReferenceTable::ALL {
            assert_eq!(config.ttl_for(table), Duration::from_secs(600));
        }
    }

    #[test]
    fn test_builder() {
        let config = CacheConfig::new()
            .with_default_ttl(Duration::from_secs(30))
            .with_table_ttl(ReferenceTable::Site, Duration::from_secs(5))
            .with_collision_policy(CollisionPolicy::Reject)
            .with_slot_capacity(8);

        assert_eq!(config.ttl_for(ReferenceTable::Hpo), Duration::from_secs(30));
        assert_eq!(config.ttl_for(ReferenceTable::Site), Duration::from_secs(5));
        assert_eq!(config.collision_policy, CollisionPolicy::Reject);
        assert_eq!(config.slot_capacity, 8);
    }

    #[test]
    fn test_slot_capacity_never_below_reserved() {
        let config = CacheConfig::new().with_slot_capacity(1);
        assert_eq!(config.slot_capacity, SlotId::RESERVED);
    }

    #[test]
    fn test_lookup_reads_all_keys() {
        let config = CacheConfig::from_lookup(lookup_from(&[
            ("RDR_CACHE_TTL_SECS", "120"),
            ("RDR_CACHE_TTL_ORGANIZATION_SECS", "45"),
            ("RDR_CACHE_REJECT_INDEX_COLLISIONS", "true"),
        ]));

        assert_eq!(config.ttl_for(ReferenceTable::Hpo), Duration::from_secs(120));
        assert_eq!(config.ttl_for(ReferenceTable::Organization), Duration::from_secs(45));
        assert_eq!(config.collision_policy, CollisionPolicy::Reject);
    }

    #[test]
    fn test_lenient_lookup_ignores_garbage() {
        let config = CacheConfig::from_lookup(lookup_from(&[
            ("RDR_CACHE_TTL_SECS", "ten minutes"),
            ("RDR_CACHE_REJECT_INDEX_COLLISIONS", "maybe"),
        ]));
        assert_eq!(config, CacheConfig::default());
    }

    #[test]
    fn test_strict_lookup_reports_field() {
        let err = CacheConfig::try_from_lookup(lookup_from(&[("RDR_CACHE_TTL_SITE_SECS", "-1")]))
            .unwrap_err();
        match err {
            RdrError::Config(ConfigError::InvalidValue { field, value, .. }) => {
                assert_eq!(field, "RDR_CACHE_TTL_SITE_SECS");
                assert_eq!(value, "-1");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_zero_ttl_is_refused() {
        let err = CacheConfig::try_from_lookup(lookup_from(&[("RDR_CACHE_TTL_SECS", "0")]))
            .unwrap_err();
        match err {
            RdrError::Config(ConfigError::InvalidValue { field, reason, .. }) => {
                assert_eq!(field, "RDR_CACHE_TTL_SECS");
                assert_eq!(reason, "must be at least one second");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let lenient = CacheConfig::from_lookup(lookup_from(&[
            ("RDR_CACHE_TTL_SECS", "0"),
            ("RDR_CACHE_TTL_HPO_SECS", "0"),
        ]));
        assert_eq!(lenient, CacheConfig::default());
    }

    #[test]
    fn test_strict_lookup_accepts_valid_values() {
        let config = CacheConfig::try_from_lookup(lookup_from(&[
            ("RDR_CACHE_TTL_SECS", " 60 "),
            ("RDR_CACHE_REJECT_INDEX_COLLISIONS", "off"),
        ]))
        .unwrap();
        assert_eq!(config.default_ttl, Duration::from_secs(60));
        assert_eq!(config.collision_policy, CollisionPolicy::LastWins);
    }
}
