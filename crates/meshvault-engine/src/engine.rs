//! Engine facade
//!
//! The single construction point and invocation surface of the metadata
//! engine. Callers hand in configuration plus handles for the external
//! collaborators and get back plain structured data; no storage or
//! transport types leak through this boundary.

use crate::fetch::EntityFetcher;
use crate::invalidate::CacheInvalidator;
use crate::list::{ListPage, Lister, PageRequest};
use crate::locks::{LockCoordinator, LockSet};
use crate::mutate::{CreateRequest, Mutation, MutationEngine};
use crate::pages::PageIter;
use crate::query::{ListFilter, QueryPlanner};
use crate::refs;
use meshvault_common::{
    EngineConfig, Error, FieldFilter, QueryBackend, Record, RecordHash, RecordId, Result,
};
use meshvault_store::{LockManager, MetaStore, SearchBackend, SortSpec, StorageProvider};
use std::collections::BTreeSet;
use std::sync::Arc;

/// The metadata indexing, query and consistency engine
pub struct Engine {
    locks: LockCoordinator,
    invalidator: CacheInvalidator,
    fetcher: EntityFetcher,
    lister: Lister,
    mutator: MutationEngine,
}

impl Engine {
    /// Wire up the engine over its external collaborators
    ///
    /// Fails when the configuration selects the search backend without a
    /// search handle to drive it.
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn MetaStore>,
        lock_manager: Arc<dyn LockManager>,
        provider: Arc<dyn StorageProvider>,
        search: Option<Arc<dyn SearchBackend>>,
    ) -> Result<Self> {
        if config.backend == QueryBackend::Search && search.is_none() {
            return Err(Error::internal(
                "search backend selected but no search handle provided",
            ));
        }
        let locks = LockCoordinator::new(lock_manager, config.lock.clone());
        let fetcher = EntityFetcher::new(Arc::clone(&store), config.fetch_concurrency);
        let planner = QueryPlanner::new(Arc::clone(&store), search.clone(), &config);
        let lister = Lister::new(planner, fetcher.clone(), config.query.clone());
        let mutator = MutationEngine::new(
            Arc::clone(&store),
            provider,
            search,
            locks.clone(),
            fetcher.clone(),
        );
        Ok(Self {
            locks,
            invalidator: CacheInvalidator::new(store),
            fetcher,
            lister,
            mutator,
        })
    }

    /// One page of records matching `filter`
    pub async fn list(
        &self,
        filter: &ListFilter,
        sort: SortSpec,
        page: PageRequest,
        fields: &FieldFilter,
    ) -> Result<ListPage> {
        self.lister.list(filter, sort, page, fields).await
    }

    /// Restartable iterator over every page of a listing
    #[must_use]
    pub fn pages(
        &self,
        filter: ListFilter,
        sort: SortSpec,
        fields: FieldFilter,
        per_page: Option<u32>,
    ) -> PageIter<'_> {
        PageIter::new(&self.lister, filter, sort, fields, per_page)
    }

    /// Create a fresh `Pending` record
    pub async fn create(&self, req: CreateRequest) -> Result<Record> {
        self.mutator.create(req).await
    }

    /// Clone a record's content under a fresh id
    pub async fn clone_record(&self, id: RecordId) -> Result<Record> {
        self.mutator.clone_record(id).await
    }

    /// Apply one mutation; `false` means the change was already in place
    pub async fn apply_mutation(&self, id: RecordId, mutation: Mutation) -> Result<bool> {
        self.mutator.apply_mutation(id, mutation).await
    }

    /// One record's fields, failing loudly when it is missing
    pub async fn fetch_record(&self, id: RecordId, fields: &FieldFilter) -> Result<RecordHash> {
        self.fetcher.fetch_one(id, fields).await
    }

    /// Many records' fields; missing ids are logged and skipped
    pub async fn fetch_batch(
        &self,
        ids: &[RecordId],
        fields: &FieldFilter,
    ) -> Result<Vec<RecordHash>> {
        self.fetcher.fetch_many(ids, fields).await
    }

    /// Advance the liveness markers of every index `record` touches
    pub async fn bust_cache(
        &self,
        record: &Record,
        visibility_changed: bool,
        synchronous: bool,
    ) -> Result<()> {
        self.invalidator
            .bust(record, visibility_changed, synchronous)
            .await
    }

    /// Acquire the mutation locks for a set of records, all-or-nothing
    pub async fn acquire_lock(&self, ids: &[RecordId]) -> Result<LockSet> {
        self.locks.acquire_records(ids).await
    }

    /// Check `new_refs` as the record's next reference list
    ///
    /// Validation only; nothing is written.
    pub async fn verify_references(
        &self,
        id: RecordId,
        new_refs: &[RecordId],
        admin_override: bool,
    ) -> Result<()> {
        let record = self.fetcher.fetch_record(id).await?;
        let involved: BTreeSet<RecordId> = new_refs.iter().copied().collect();
        let targets = self.mutator.reference_targets(&involved).await?;
        refs::verify(&record, &targets, new_refs, admin_override)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshvault_common::{OwnerId, Part};
    use meshvault_store::backends::memory::{
        MemoryLocks, MemoryProvider, MemorySearch, MemoryStore,
    };

    fn engine_with(config: EngineConfig) -> Engine {
        Engine::new(
            config,
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryLocks::new()),
            Arc::new(MemoryProvider::new()),
            Some(Arc::new(MemorySearch::new())),
        )
        .unwrap()
    }

    #[test]
    fn test_search_backend_requires_handle() {
        let config = EngineConfig {
            backend: QueryBackend::Search,
            ..EngineConfig::default()
        };
        let result = Engine::new(
            config,
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryLocks::new()),
            Arc::new(MemoryProvider::new()),
            None,
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_create_then_fetch() {
        let engine = engine_with(EngineConfig::default());
        let record = engine
            .create(CreateRequest {
                owner: OwnerId::new("alice"),
                parts: vec![Part {
                    name: "scene.bin".into(),
                    size: 64,
                    content_type: None,
                }],
                temporary: false,
                unlisted: false,
            })
            .await
            .unwrap();

        let hash = engine
            .fetch_record(record.id, &FieldFilter::default())
            .await
            .unwrap();
        assert_eq!(hash["owner"], "alice");

        let missing = engine
            .fetch_record(RecordId::new(), &FieldFilter::default())
            .await;
        assert!(missing.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_verify_references_reports_offenders() {
        let engine = engine_with(EngineConfig::default());
        let holder = engine
            .create(CreateRequest {
                owner: OwnerId::new("alice"),
                parts: Vec::new(),
                temporary: false,
                unlisted: false,
            })
            .await
            .unwrap();

        let ghost = RecordId::new();
        let err = engine
            .verify_references(holder.id, &[ghost], false)
            .await
            .unwrap_err();
        assert_eq!(err.issues().len(), 1);
        assert_eq!(err.issues()[0].subject, ghost.to_string());
    }
}
