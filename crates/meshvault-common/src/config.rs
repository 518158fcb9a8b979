//! Engine configuration
//!
//! All tunables are explicit fields on structs handed to the engine at
//! construction time; nothing is read from ambient process state.

use std::time::Duration;

/// Which query execution strategy the planner uses
///
/// The two strategies are mutually exclusive per deployment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum QueryBackend {
    /// Cached set intersections over secondary indices
    #[default]
    Derived,
    /// Delegation to an external schema-aware search engine
    Search,
}

/// TTLs for the derived-intersection caching layer
#[derive(Clone, Debug)]
pub struct CacheConfig {
    /// Lifetime of a materialized intersection key
    pub derived_ttl: Duration,
    /// Lifetime of a materialized time-range set
    pub range_set_ttl: Duration,
    /// Lifetime of a cached filtered-sorted result
    pub result_ttl: Duration,
    /// Minimum remaining TTL below which a cached key is recomputed
    pub min_reuse_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            derived_ttl: Duration::from_secs(600),
            range_set_ttl: Duration::from_secs(300),
            result_ttl: Duration::from_secs(30),
            min_reuse_ttl: Duration::from_secs(30),
        }
    }
}

/// Query shape limits
#[derive(Clone, Debug)]
pub struct QueryConfig {
    /// Maximum span of a bounded time-range query
    pub max_time_window: Duration,
    /// Page size applied when the caller does not supply one
    pub default_per_page: u32,
    /// Upper bound on caller-supplied page sizes
    pub max_per_page: u32,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            max_time_window: Duration::from_secs(30 * 24 * 3600),
            default_per_page: 24,
            max_per_page: 100,
        }
    }
}

/// Distributed lock policy
#[derive(Clone, Debug)]
pub struct LockConfig {
    /// Lifetime of an acquired lock before it must be extended
    pub ttl: Duration,
    /// How long acquisition waits for a contended lock before giving up
    pub acquire_timeout: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(10),
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

/// Root configuration for the metadata engine
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Active query execution strategy
    pub backend: QueryBackend,
    /// Derived-intersection cache tuning
    pub cache: CacheConfig,
    /// Query shape limits
    pub query: QueryConfig,
    /// Lock acquisition policy
    pub lock: LockConfig,
    /// Bound on concurrent per-id fetches within one batch
    pub fetch_concurrency: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backend: QueryBackend::default(),
            cache: CacheConfig::default(),
            query: QueryConfig::default(),
            lock: LockConfig::default(),
            fetch_concurrency: 8,
        }
    }
}
