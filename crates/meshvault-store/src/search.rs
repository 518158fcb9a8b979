//! Search engine contract
//!
//! Optional query backend: a schema-aware search engine that answers
//! filtered, sorted, paginated queries natively in one round trip.

use crate::query::{FieldPredicate, SortSpec};
use async_trait::async_trait;
use meshvault_common::{OwnerId, Record, RecordId, Result, Tag};

/// Structured query submitted to the search backend
#[derive(Clone, Debug, Default)]
pub struct SearchQuery {
    /// Restrict to one owner
    pub owner: Option<OwnerId>,
    /// Restrict to publicly listed records
    pub public_only: bool,
    /// Every tag must be present
    pub tags: Vec<Tag>,
    /// Inclusive bounds on `uploaded_at`, unix millis
    pub uploaded_between: Option<(i64, i64)>,
    /// Free-text match against alias and tags
    pub text: Option<String>,
    /// Additional field predicates
    pub predicates: Vec<FieldPredicate>,
    /// Restrict to the temporary universe instead of listed records
    pub temporary: bool,
    /// Include unlisted records (excluded by default)
    pub include_unlisted: bool,
    /// Sort directive
    pub sort: SortSpec,
    /// First result index
    pub offset: u64,
    /// Maximum results returned
    pub limit: u64,
}

/// Result page: ids only, no content payload
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchPage {
    pub ids: Vec<RecordId>,
    pub total: u64,
}

/// Schema-aware search engine consumed by the native search path
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Answer a structured query in one round trip
    async fn search(&self, query: &SearchQuery) -> Result<SearchPage>;

    /// Index or reindex a record
    async fn upsert(&self, record: &Record) -> Result<()>;

    /// Drop a record from the index
    async fn remove(&self, id: RecordId) -> Result<()>;
}
