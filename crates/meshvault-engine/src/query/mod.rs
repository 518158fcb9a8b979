//! Query Planner & Executor
//!
//! Turns a list filter plus sort and pagination into a page of candidate
//! ids and a total count, through one of two mutually exclusive
//! execution strategies: cached set intersections over the secondary
//! indices, or delegation to a schema-aware search engine. The planner
//! never fetches record content; candidates are materialized by the
//! batch fetcher afterwards.

mod derived;
mod search;

use derived::DerivedExecutor;
use meshvault_common::{
    EngineConfig, Error, IssueReason, OwnerId, QueryBackend, QueryConfig, RecordId, Result, Tag,
};
use meshvault_store::{FieldPredicate, MetaStore, SearchBackend, SortSpec};
use std::sync::Arc;
use tracing::debug;

/// Inclusive bounds on `uploaded_at`, unix millis
///
/// The lower bound is mandatory and must lie in the past; the upper
/// bound defaults to the query time. The span between the bounds is
/// capped so range scans have bounded cardinality.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TimeRange {
    pub gte: Option<i64>,
    pub lte: Option<i64>,
}

impl TimeRange {
    /// Validate the bounds and resolve them to concrete millis
    pub fn resolve(self, now_ms: i64, max_window_ms: i64) -> Result<(i64, i64)> {
        let invalid = || Error::validation("uploaded_at", IssueReason::InvalidTimeRange);
        let Some(gte) = self.gte else {
            // Unbounded below: covers the fully unbounded case too
            return Err(invalid());
        };
        if gte >= now_ms {
            return Err(invalid());
        }
        let lte = self.lte.unwrap_or(now_ms);
        if lte < gte || lte - gte > max_window_ms {
            return Err(invalid());
        }
        Ok((gte, lte))
    }

    /// Canonical descriptor used in cache-key names
    ///
    /// Built from the raw bounds so an open upper bound keys one cache
    /// entry instead of one per query timestamp.
    #[must_use]
    pub fn descriptor(self) -> String {
        let bound = |b: Option<i64>| b.map_or_else(|| "now".into(), |v| v.to_string());
        format!("{}..{}", bound(self.gte), bound(self.lte))
    }
}

/// Filter half of a list query
#[derive(Clone, Debug, Default)]
pub struct ListFilter {
    /// Restrict to one owner
    pub owner: Option<OwnerId>,
    /// Restrict to publicly listed records
    pub public_only: bool,
    /// Query the temporary universe instead of listed records
    pub temporary: bool,
    /// Include unlisted records; supported on the search backend only
    pub include_unlisted: bool,
    /// Every tag must be present
    pub tags: Vec<Tag>,
    /// Bounds on upload time
    pub uploaded: Option<TimeRange>,
    /// Free-text match; supported on the search backend only
    pub text: Option<String>,
    /// Field predicates applied after candidate resolution
    pub predicates: Vec<FieldPredicate>,
}

/// A page of candidate ids plus the filtered total
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryPage {
    pub ids: Vec<RecordId>,
    pub total: u64,
}

/// Outcome of planning and executing one list query
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QueryOutcome {
    /// Candidates resolved; the page may still be empty past the end
    Page(QueryPage),
    /// The candidate intersection itself is empty
    NoCandidates,
}

/// Selects and drives the active query execution strategy
pub struct QueryPlanner {
    backend: QueryBackend,
    derived: DerivedExecutor,
    search: Option<Arc<dyn SearchBackend>>,
    query: QueryConfig,
}

impl QueryPlanner {
    /// Create a planner over the configured backend
    pub fn new(
        store: Arc<dyn MetaStore>,
        search: Option<Arc<dyn SearchBackend>>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            backend: config.backend,
            derived: DerivedExecutor::new(store, config.cache.clone(), config.query.clone()),
            search,
            query: config.query.clone(),
        }
    }

    /// Resolve a page of candidate ids for `filter`
    pub async fn plan(
        &self,
        filter: &ListFilter,
        sort: SortSpec,
        offset: u64,
        limit: u64,
    ) -> Result<QueryOutcome> {
        let limit = limit.min(u64::from(self.query.max_per_page));
        debug!(backend = ?self.backend, offset, limit, "planning list query");
        match self.backend {
            QueryBackend::Derived => self.derived.execute(filter, sort, offset, limit).await,
            QueryBackend::Search => {
                let Some(backend) = &self.search else {
                    return Err(Error::internal(
                        "search backend selected but no search handle configured",
                    ));
                };
                search::execute(backend.as_ref(), &self.query, filter, sort, offset, limit).await
            }
        }
    }
}
