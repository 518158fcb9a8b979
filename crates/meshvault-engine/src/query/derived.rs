//! Derived-intersection execution path
//!
//! Answers a list query by intersecting the secondary indices the filter
//! names into an ephemeral, TTL-bearing cache key, then running the
//! store's combined filter+sort+paginate procedure over it. Time ranges
//! are materialized range-into-set first under their own cache key,
//! since range extraction is the expensive step worth caching
//! independently of tag combinations. Recomputation of any cache key
//! happens under a single-flight barrier.

use super::{ListFilter, QueryOutcome, QueryPage, TimeRange};
use crate::clock;
use crate::index::IndexKey;
use crate::keys;
use crate::singleflight::SingleFlight;
use meshvault_common::{CacheConfig, Error, QueryConfig, RecordId, Result};
use meshvault_store::{
    FieldPredicate, FilterField, MetaStore, PostFilter, SortPageRequest, SortSpec,
};
use std::sync::Arc;
use tracing::debug;

pub(super) struct DerivedExecutor {
    store: Arc<dyn MetaStore>,
    cache: CacheConfig,
    query: QueryConfig,
    flights: SingleFlight,
}

impl DerivedExecutor {
    pub(super) fn new(store: Arc<dyn MetaStore>, cache: CacheConfig, query: QueryConfig) -> Self {
        Self {
            store,
            cache,
            query,
            flights: SingleFlight::new(),
        }
    }

    pub(super) async fn execute(
        &self,
        filter: &ListFilter,
        sort: SortSpec,
        offset: u64,
        limit: u64,
    ) -> Result<QueryOutcome> {
        if filter.text.is_some() {
            return Err(Error::not_implemented(
                "free-text search on the derived-intersection backend",
            ));
        }
        if filter.include_unlisted {
            return Err(Error::not_implemented(
                "listing unlisted records on the derived-intersection backend",
            ));
        }

        let now_ms = clock::now_ms();
        let base = base_index(filter);
        let range = match filter.uploaded {
            Some(range) => Some(self.prepare_range(filter, range, now_ms).await?),
            None => None,
        };

        let candidates = match self.resolve_candidates(filter, &base, range, now_ms).await? {
            Some(key) => key,
            None => return Ok(QueryOutcome::NoCandidates),
        };

        // Owner narrowing on the temporary index has no dedicated set, so
        // it rides the post-filter instead.
        let mut predicates = filter.predicates.clone();
        if filter.temporary
            && let Some(owner) = &filter.owner
        {
            predicates.push(FieldPredicate::Eq {
                field: FilterField::Owner,
                value: owner.to_string(),
            });
        }
        let post = PostFilter::new(predicates);

        if !post.is_identity() {
            // Two-phase split: compute the unfiltered ordering first so it
            // stays cached independent of filter variation.
            let warm = SortPageRequest {
                key_prefix: keys::RECORD_PREFIX.into(),
                sort,
                filter: PostFilter::identity(),
                now_ms,
                offset: 0,
                limit: 0,
                result_ttl: self.cache.result_ttl,
            };
            self.store.filter_sort_page(&candidates, &warm).await?;
        }
        let req = SortPageRequest {
            key_prefix: keys::RECORD_PREFIX.into(),
            sort,
            filter: post,
            now_ms,
            offset,
            limit,
            result_ttl: self.cache.result_ttl,
        };
        let page = self.store.filter_sort_page(&candidates, &req).await?;

        let ids = page
            .ids
            .iter()
            .map(|id| {
                RecordId::parse(id)
                    .map_err(|e| Error::internal(format!("bad candidate id '{id}': {e}")))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(QueryOutcome::Page(QueryPage {
            ids,
            total: page.total,
        }))
    }

    /// Validate the time range and name its materialized-set cache key
    async fn prepare_range(
        &self,
        filter: &ListFilter,
        range: TimeRange,
        now_ms: i64,
    ) -> Result<RangePlan> {
        if filter.temporary {
            return Err(Error::not_implemented(
                "time-range filter over the temporary index",
            ));
        }
        let max_window_ms =
            i64::try_from(self.query.max_time_window.as_millis()).unwrap_or(i64::MAX);
        let (min, max) = range.resolve(now_ms, max_window_ms)?;
        let zset = time_index(filter).key();
        let descriptor = format!("{zset}:{}", range.descriptor());
        let dest = format!("cache:range:{descriptor}");
        Ok(RangePlan {
            zset,
            dest,
            descriptor,
            min,
            max,
        })
    }

    /// Resolve the final candidate set key, or `None` when it is empty
    ///
    /// A single-component query reads its base index directly; anything
    /// else lands in a derived cache key that is reused while fresh and
    /// recomputed under the single-flight barrier otherwise.
    async fn resolve_candidates(
        &self,
        filter: &ListFilter,
        base: &IndexKey,
        range: Option<RangePlan>,
        now_ms: i64,
    ) -> Result<Option<String>> {
        let base_key = base.key();
        let mut tag_keys: Vec<String> = filter
            .tags
            .iter()
            .map(|t| IndexKey::Tag(t.clone()).key())
            .collect();
        tag_keys.sort();
        tag_keys.dedup();

        if tag_keys.is_empty() && range.is_none() {
            if self.store.set_card(&base_key).await? == 0 {
                return Ok(None);
            }
            return Ok(Some(base_key));
        }

        let range_descriptor = range
            .as_ref()
            .map_or_else(|| "-".into(), |r| r.descriptor.clone());
        let derived = format!(
            "cache:derived:{base_key}|tags={}|range={range_descriptor}",
            tag_keys.join("+"),
        );

        // Liveness is tracked on the underlying index keys, including the
        // sorted source of a materialized range.
        let mut liveness: Vec<String> = Vec::with_capacity(tag_keys.len() + 2);
        liveness.push(base_key.clone());
        liveness.extend(tag_keys.iter().cloned());
        if let Some(r) = &range {
            liveness.push(r.zset.clone());
        }

        if self.fresh(&derived, &liveness).await? {
            return Ok(Some(derived));
        }

        let _guard = self.flights.acquire(&derived).await;
        // A waiter may find the key freshly computed by the holder it
        // queued behind.
        if self.fresh(&derived, &liveness).await? {
            return Ok(Some(derived));
        }
        debug!(key = %derived, "computing derived intersection");

        let mut inputs = vec![base_key];
        inputs.extend(tag_keys);
        if let Some(r) = &range {
            if !self.fresh(&r.dest, std::slice::from_ref(&r.zset)).await? {
                let card = self
                    .store
                    .range_to_set(&r.dest, &r.zset, r.min, r.max, self.cache.range_set_ttl, now_ms)
                    .await?;
                if card == 0 {
                    return Ok(None);
                }
            }
            inputs.push(r.dest.clone());
        }

        let card = self
            .store
            .intersect_store(&derived, &inputs, self.cache.derived_ttl, now_ms)
            .await?;
        if card == 0 {
            return Ok(None);
        }
        Ok(Some(derived))
    }

    /// Whether a cached derived key may be reused as-is
    ///
    /// Fresh means the key's remaining TTL clears the reuse floor and it
    /// was created strictly after every input's liveness marker.
    async fn fresh(&self, key: &str, liveness_inputs: &[String]) -> Result<bool> {
        let Some(ttl) = self.store.key_ttl(key).await? else {
            return Ok(false);
        };
        if ttl < self.cache.min_reuse_ttl {
            return Ok(false);
        }
        let Some(created) = self.store.created_at(key).await? else {
            return Ok(false);
        };
        for input in liveness_inputs {
            if let Some(touched) = self.store.touched_at(input).await? {
                if touched >= created {
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }
}

struct RangePlan {
    zset: String,
    dest: String,
    descriptor: String,
    min: i64,
    max: i64,
}

/// Base plain-set index a filter starts from
fn base_index(filter: &ListFilter) -> IndexKey {
    if filter.temporary {
        return IndexKey::Temporary;
    }
    match (&filter.owner, filter.public_only) {
        (Some(owner), true) => IndexKey::PublicOwner(owner.clone()),
        (Some(owner), false) => IndexKey::Owner(owner.clone()),
        (None, true) => IndexKey::Public,
        (None, false) => IndexKey::Global,
    }
}

/// Sorted index a time range is extracted from
fn time_index(filter: &ListFilter) -> IndexKey {
    match (&filter.owner, filter.public_only) {
        (Some(owner), true) => IndexKey::TimePublicOwner(owner.clone()),
        (Some(owner), false) => IndexKey::TimeOwner(owner.clone()),
        (None, true) => IndexKey::TimePublic,
        (None, false) => IndexKey::TimeGlobal,
    }
}
