//! Metadata store contract
//!
//! The key-value store consumed by the engine: hash records, sets,
//! sorted sets, atomic pipelined batches, and the server-side procedures
//! for combined fetch/filter/sort and for cache-invalidation touches.

use crate::command::Command;
use crate::query::{SortPage, SortPageRequest};
use async_trait::async_trait;
use meshvault_common::{FieldFilter, RecordHash, Result};
use std::time::Duration;

/// Key-value metadata store consumed by the engine
///
/// Implementations guarantee per-command execution of a pipeline but no
/// cross-command rollback; a failed sub-command surfaces as one
/// aggregated `Internal` error and the caller retries the whole batch.
#[async_trait]
pub trait MetaStore: Send + Sync {
    /// Full hash at `key`, `None` if the key is absent
    async fn record_hash(&self, key: &str) -> Result<Option<RecordHash>>;

    /// Combined fetch + field-filter procedure, one round trip
    async fn fetch_fields(&self, key: &str, filter: &FieldFilter) -> Result<Option<RecordHash>>;

    /// One hash field, `None` if key or field is absent
    async fn hash_field(&self, key: &str, field: &str) -> Result<Option<String>>;

    /// Dispatch an atomic pipelined batch
    async fn pipeline(&self, commands: Vec<Command>) -> Result<()>;

    /// Members of a set
    async fn set_members(&self, key: &str) -> Result<Vec<String>>;

    /// Cardinality of a set
    async fn set_card(&self, key: &str) -> Result<u64>;

    /// Whether a key exists (and has not expired)
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Remaining time to live, `None` for absent or non-expiring keys
    async fn key_ttl(&self, key: &str) -> Result<Option<Duration>>;

    /// Creation timestamp recorded for a derived key, unix millis
    async fn created_at(&self, key: &str) -> Result<Option<i64>>;

    /// Intersect `inputs` into `dest` with a TTL, recording `now_ms` as
    /// the creation time; returns the resulting cardinality
    async fn intersect_store(
        &self,
        dest: &str,
        inputs: &[String],
        ttl: Duration,
        now_ms: i64,
    ) -> Result<u64>;

    /// Materialize the members of sorted set `zset` with scores in
    /// `[min, max]` into plain set `dest` with a TTL; returns cardinality
    async fn range_to_set(
        &self,
        dest: &str,
        zset: &str,
        min: i64,
        max: i64,
        ttl: Duration,
        now_ms: i64,
    ) -> Result<u64>;

    /// Advance the liveness marker of an index key to `now_ms`
    async fn touch(&self, key: &str, now_ms: i64) -> Result<()>;

    /// Current liveness marker of an index key, unix millis
    async fn touched_at(&self, key: &str) -> Result<Option<i64>>;

    /// Combined filter+sort+paginate procedure over the candidate set at
    /// `candidates`, with a short-lived result cache
    async fn filter_sort_page(&self, candidates: &str, req: &SortPageRequest)
        -> Result<SortPage>;
}
