//! List operation
//!
//! Glues the query planner to the batch fetcher: plan candidates, fetch
//! their records, assemble pagination metadata. The planner's
//! no-candidates sentinel is converted here into a well-formed empty
//! page, since no results is a valid outcome rather than a failure.

use crate::fetch::EntityFetcher;
use crate::query::{ListFilter, QueryOutcome, QueryPlanner};
use meshvault_common::{FieldFilter, QueryConfig, RecordHash, Result};
use meshvault_store::SortSpec;

/// Requested page, 1-based
#[derive(Clone, Copy, Debug)]
pub struct PageRequest {
    pub page: u32,
    /// Falls back to the configured default when absent
    pub per_page: Option<u32>,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: None,
        }
    }
}

impl PageRequest {
    /// First page with the default size
    #[must_use]
    pub fn first() -> Self {
        Self::default()
    }
}

/// One page of a list response
#[derive(Clone, Debug, Default)]
pub struct ListPage {
    /// Fetched records, projected through the field filter
    pub files: Vec<RecordHash>,
    /// Offset of the next page, `None` on the last page
    pub cursor: Option<u64>,
    /// The page this response covers, 1-based
    pub page: u32,
    /// Total number of pages at the requested page size
    pub pages: u32,
    /// Total matching records
    pub total: u64,
}

/// Drives list queries end to end
pub struct Lister {
    planner: QueryPlanner,
    fetcher: EntityFetcher,
    query: QueryConfig,
}

impl Lister {
    pub fn new(planner: QueryPlanner, fetcher: EntityFetcher, query: QueryConfig) -> Self {
        Self {
            planner,
            fetcher,
            query,
        }
    }

    /// Resolve one page of records matching `filter`
    pub async fn list(
        &self,
        filter: &ListFilter,
        sort: SortSpec,
        page: PageRequest,
        fields: &FieldFilter,
    ) -> Result<ListPage> {
        let per_page = page
            .per_page
            .unwrap_or(self.query.default_per_page)
            .clamp(1, self.query.max_per_page);
        let number = page.page.max(1);
        let offset = u64::from(number - 1) * u64::from(per_page);

        let outcome = self
            .planner
            .plan(filter, sort, offset, u64::from(per_page))
            .await?;
        let query_page = match outcome {
            QueryOutcome::Page(p) => p,
            QueryOutcome::NoCandidates => {
                return Ok(ListPage {
                    page: number,
                    ..ListPage::default()
                });
            }
        };

        let files = self.fetcher.fetch_many(&query_page.ids, fields).await?;
        let total = query_page.total;
        let pages = u32::try_from(total.div_ceil(u64::from(per_page))).unwrap_or(u32::MAX);
        let next = offset + u64::from(per_page);
        Ok(ListPage {
            files,
            cursor: (next < total).then_some(next),
            page: number,
            pages,
            total,
        })
    }
}
