//! Restartable page iteration
//!
//! Walks a listing one page at a time through an explicit loop, for
//! callers that reprocess whole listings (sync jobs, bulk exports).

use crate::list::{ListPage, Lister, PageRequest};
use crate::query::ListFilter;
use meshvault_common::{FieldFilter, Result};
use meshvault_store::SortSpec;

/// Iterator over the pages of one listing
///
/// `next_page` yields pages until the listing is exhausted; `restart`
/// rewinds to the first page, picking up records changed since the
/// previous pass.
pub struct PageIter<'a> {
    lister: &'a Lister,
    filter: ListFilter,
    sort: SortSpec,
    fields: FieldFilter,
    per_page: Option<u32>,
    next: Option<u32>,
}

impl<'a> PageIter<'a> {
    pub(crate) fn new(
        lister: &'a Lister,
        filter: ListFilter,
        sort: SortSpec,
        fields: FieldFilter,
        per_page: Option<u32>,
    ) -> Self {
        Self {
            lister,
            filter,
            sort,
            fields,
            per_page,
            next: Some(1),
        }
    }

    /// Fetch the next page, `None` once the listing is exhausted
    pub async fn next_page(&mut self) -> Result<Option<ListPage>> {
        let Some(number) = self.next else {
            return Ok(None);
        };
        let page = self
            .lister
            .list(
                &self.filter,
                self.sort,
                PageRequest {
                    page: number,
                    per_page: self.per_page,
                },
                &self.fields,
            )
            .await?;
        if page.files.is_empty() {
            self.next = None;
            return Ok(None);
        }
        self.next = (number < page.pages).then(|| number + 1);
        Ok(Some(page))
    }

    /// Rewind to the first page
    pub fn restart(&mut self) {
        self.next = Some(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::EntityFetcher;
    use crate::index;
    use crate::keys;
    use crate::query::QueryPlanner;
    use meshvault_common::{EngineConfig, OwnerId, Record, RecordId};
    use meshvault_store::backends::memory::MemoryStore;
    use meshvault_store::{MetaStore, Pipeline};
    use std::sync::Arc;

    async fn lister_with(count: usize) -> Lister {
        let store = Arc::new(MemoryStore::new());
        let mut p = Pipeline::new();
        for i in 0..count {
            let mut r = Record::new(
                RecordId::new(),
                OwnerId::new("alice"),
                Vec::new(),
                1000 + i as i64,
            );
            r.uploaded_at = 1000 + i as i64;
            p.hash_set_all(keys::record(r.id), r.to_hash());
            let delta = index::membership_delta(None, Some(&r));
            index::apply_delta(&mut p, &r, &delta);
        }
        store.pipeline(p.into_commands()).await.unwrap();
        let meta: Arc<dyn MetaStore> = store;
        let config = EngineConfig::default();
        Lister::new(
            QueryPlanner::new(Arc::clone(&meta), None, &config),
            EntityFetcher::new(meta, config.fetch_concurrency),
            config.query,
        )
    }

    fn filter() -> ListFilter {
        ListFilter {
            owner: Some(OwnerId::new("alice")),
            ..ListFilter::default()
        }
    }

    #[tokio::test]
    async fn test_walks_every_page_once() {
        let lister = lister_with(5).await;
        let mut iter = PageIter::new(
            &lister,
            filter(),
            SortSpec::default(),
            FieldFilter::default(),
            Some(2),
        );

        let mut seen = 0;
        let mut pages = 0;
        while let Some(page) = iter.next_page().await.unwrap() {
            seen += page.files.len();
            pages += 1;
        }
        assert_eq!(seen, 5);
        assert_eq!(pages, 3);
        // Exhausted until restarted
        assert!(iter.next_page().await.unwrap().is_none());

        iter.restart();
        assert_eq!(iter.next_page().await.unwrap().unwrap().page, 1);
    }

    #[tokio::test]
    async fn test_empty_listing_yields_nothing() {
        let lister = lister_with(0).await;
        let mut iter = PageIter::new(
            &lister,
            filter(),
            SortSpec::default(),
            FieldFilter::default(),
            None,
        );
        assert!(iter.next_page().await.unwrap().is_none());
    }
}
