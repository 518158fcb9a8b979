//! Native-search execution path
//!
//! Compiles the list filter straight into a structured query for the
//! schema-aware search backend, which answers filtered+sorted+paginated
//! queries natively in one round trip. No interstore caching layer;
//! temporary and unlisted records are excluded unless explicitly
//! requested.

use super::{ListFilter, QueryOutcome, QueryPage};
use crate::clock;
use meshvault_common::{QueryConfig, Result};
use meshvault_store::{SearchBackend, SearchQuery, SortSpec};

pub(super) async fn execute(
    backend: &dyn SearchBackend,
    config: &QueryConfig,
    filter: &ListFilter,
    sort: SortSpec,
    offset: u64,
    limit: u64,
) -> Result<QueryOutcome> {
    let now_ms = clock::now_ms();
    let uploaded_between = match filter.uploaded {
        Some(range) => {
            let max_window_ms = i64::try_from(config.max_time_window.as_millis()).unwrap_or(i64::MAX);
            Some(range.resolve(now_ms, max_window_ms)?)
        }
        None => None,
    };

    let query = SearchQuery {
        owner: filter.owner.clone(),
        public_only: filter.public_only,
        tags: filter.tags.clone(),
        uploaded_between,
        text: filter.text.clone(),
        predicates: filter.predicates.clone(),
        temporary: filter.temporary,
        include_unlisted: filter.include_unlisted,
        sort,
        offset,
        limit,
    };
    let page = backend.search(&query).await?;
    if page.total == 0 {
        return Ok(QueryOutcome::NoCandidates);
    }
    Ok(QueryOutcome::Page(QueryPage {
        ids: page.ids,
        total: page.total,
    }))
}
