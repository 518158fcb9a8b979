//! Mutation engine
//!
//! Every record mutation runs the same shape: acquire the record lock,
//! read the current snapshot, validate, apply one atomic pipeline that
//! carries the primary-record write together with every index and
//! back-index change, bust the affected caches, release. Validation
//! completes before anything is dispatched, so a rejected mutation has
//! no partial side effects. `apply_mutation` returns `false` when the
//! requested change is already in place.

use crate::clock;
use crate::fetch::EntityFetcher;
use crate::index;
use crate::invalidate::CacheInvalidator;
use crate::keys;
use crate::locks::{LockCoordinator, LockSet};
use crate::refs::{self, RefTarget};
use meshvault_common::{Error, OwnerId, Part, Record, RecordId, Result, Status, Tag};
use meshvault_store::{MetaStore, Pipeline, SearchBackend, StorageProvider};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{info, warn};

/// Parameters for creating a record
#[derive(Clone, Debug)]
pub struct CreateRequest {
    pub owner: OwnerId,
    pub parts: Vec<Part>,
    pub temporary: bool,
    pub unlisted: bool,
}

/// One record mutation
#[derive(Clone, Debug)]
pub enum Mutation {
    /// Upload completed; verifies every part exists in object storage
    FinishUpload,
    /// Advance the processing state machine
    SetStatus(Status),
    /// Metadata edits; once immutable, only ownership transfer remains
    UpdateFields {
        owner: Option<OwnerId>,
        uploaded_at: Option<i64>,
    },
    /// Visibility flag changes, applied to stored objects as well
    SetAccess {
        public: Option<bool>,
        direct_only: Option<bool>,
        unlisted: Option<bool>,
    },
    /// Replace the tag set
    SetTags(BTreeSet<Tag>),
    /// Assign or clear the per-owner alias
    SetAlias(Option<String>),
    /// Replace the reference list
    SetReferences {
        references: Vec<RecordId>,
        admin_override: bool,
    },
    /// Latch the record immutable; there is no way back
    SetImmutable,
    /// Remove the record; soft removal detaches it but keeps the hash
    Remove { soft: bool },
}

/// Runs validated mutations under per-record locks
pub struct MutationEngine {
    store: Arc<dyn MetaStore>,
    provider: Arc<dyn StorageProvider>,
    search: Option<Arc<dyn SearchBackend>>,
    locks: LockCoordinator,
    invalidator: CacheInvalidator,
    fetcher: EntityFetcher,
}

impl MutationEngine {
    pub fn new(
        store: Arc<dyn MetaStore>,
        provider: Arc<dyn StorageProvider>,
        search: Option<Arc<dyn SearchBackend>>,
        locks: LockCoordinator,
        fetcher: EntityFetcher,
    ) -> Self {
        Self {
            invalidator: CacheInvalidator::new(Arc::clone(&store)),
            store,
            provider,
            search,
            locks,
            fetcher,
        }
    }

    /// Create a fresh `Pending` record
    pub async fn create(&self, req: CreateRequest) -> Result<Record> {
        let mut record = Record::new(RecordId::new(), req.owner, req.parts, clock::now_ms());
        record.temporary = req.temporary;
        record.unlisted = req.unlisted;
        info!(record = %record.id, owner = %record.owner, "creating record");
        self.commit(None, Some(&record), Pipeline::new(), false)
            .await?;
        Ok(record)
    }

    /// Clone a record's content under a fresh id and fresh timestamps
    pub async fn clone_record(&self, id: RecordId) -> Result<Record> {
        let lock = self.locks.acquire(id).await?;
        let result = self.clone_locked(id).await;
        Self::finish(lock, result).await
    }

    /// Apply one mutation; `false` means the change was already in place
    pub async fn apply_mutation(&self, id: RecordId, mutation: Mutation) -> Result<bool> {
        let lock = self.locks.acquire(id).await?;
        let result = self.mutate_locked(&lock, id, mutation).await;
        Self::finish(lock, result).await
    }

    async fn finish<T>(lock: LockSet, result: Result<T>) -> Result<T> {
        match result {
            Ok(value) => {
                lock.release().await?;
                Ok(value)
            }
            Err(e) => {
                if let Err(release_err) = lock.release().await {
                    warn!(error = %release_err, "lock release failed after mutation error");
                }
                Err(e)
            }
        }
    }

    async fn clone_locked(&self, id: RecordId) -> Result<Record> {
        let source = self.fetcher.fetch_record(id).await?;
        let mut copy = Record::new(
            RecordId::new(),
            source.owner.clone(),
            source.parts.clone(),
            clock::now_ms(),
        );
        copy.status = source.status;
        copy.public = source.public;
        copy.direct_only = source.direct_only;
        copy.unlisted = source.unlisted;
        copy.temporary = source.temporary;
        copy.tags = source.tags.clone();
        info!(source = %id, copy = %copy.id, "cloning record");
        self.commit(None, Some(&copy), Pipeline::new(), false)
            .await?;
        Ok(copy)
    }

    async fn mutate_locked(
        &self,
        lock: &LockSet,
        id: RecordId,
        mutation: Mutation,
    ) -> Result<bool> {
        let old = self.fetcher.fetch_record(id).await?;
        match mutation {
            Mutation::FinishUpload => self.finish_upload(lock, old).await,
            Mutation::SetStatus(next) => self.set_status(old, next).await,
            Mutation::UpdateFields { owner, uploaded_at } => {
                self.update_fields(old, owner, uploaded_at).await
            }
            Mutation::SetAccess {
                public,
                direct_only,
                unlisted,
            } => self.set_access(lock, old, public, direct_only, unlisted).await,
            Mutation::SetTags(tags) => self.set_tags(old, tags).await,
            Mutation::SetAlias(alias) => self.set_alias(old, alias).await,
            Mutation::SetReferences {
                references,
                admin_override,
            } => self.set_references(old, references, admin_override).await,
            Mutation::SetImmutable => self.set_immutable(old).await,
            Mutation::Remove { soft } => self.remove(lock, old, soft).await,
        }
    }

    async fn finish_upload(&self, lock: &LockSet, old: Record) -> Result<bool> {
        if old.status != Status::Pending {
            return Err(Error::conflict(format!(
                "upload of record {} already finished",
                old.id
            )));
        }
        // The provider round trips can outlive the default lock TTL
        lock.extend().await?;
        for part in &old.parts {
            let object = keys::part_object(&old.owner, old.id, &part.name);
            if !self.provider.exists(&object).await? {
                return Err(Error::precondition(format!(
                    "part '{}' has no uploaded object",
                    part.name
                )));
            }
        }
        let mut new = old.clone();
        new.status = Status::Uploaded;
        new.uploaded_at = clock::now_ms();
        self.commit(Some(&old), Some(&new), Pipeline::new(), false)
            .await?;
        Ok(true)
    }

    async fn set_status(&self, old: Record, next: Status) -> Result<bool> {
        if old.status == next {
            return Ok(false);
        }
        if !old.status.can_advance_to(next) {
            return Err(Error::precondition(format!(
                "cannot advance record {} from {} to {}",
                old.id,
                old.status.as_str(),
                next.as_str()
            )));
        }
        let mut new = old.clone();
        new.status = next;
        if next == Status::Processed {
            // Content changed; derived artifacts must be regenerated
            new.version += 1;
        }
        self.commit(Some(&old), Some(&new), Pipeline::new(), false)
            .await?;
        Ok(true)
    }

    async fn update_fields(
        &self,
        old: Record,
        owner: Option<OwnerId>,
        uploaded_at: Option<i64>,
    ) -> Result<bool> {
        if old.immutable && uploaded_at.is_some() {
            // Ownership-transfer bookkeeping is the only edit that
            // survives the immutability latch
            return Err(Error::precondition(format!(
                "record {} is immutable",
                old.id
            )));
        }
        let mut new = old.clone();
        let mut pipeline = Pipeline::new();
        if let Some(owner) = owner {
            if owner != new.owner {
                if let Some(alias) = &new.alias {
                    // The alias pointer moves between owner tables; the
                    // destination owner may already hold the name
                    let table = keys::alias_table(&owner);
                    let current = self.store.hash_field(&table, alias).await?;
                    if current.is_some_and(|id| id != new.id.to_string()) {
                        return Err(Error::conflict(format!(
                            "alias '{alias}' already taken for owner {owner}"
                        )));
                    }
                    pipeline.hash_del(keys::alias_table(&new.owner), alias.clone());
                    pipeline.hash_set(table, alias.clone(), new.id.to_string());
                }
                new.owner = owner;
            }
        }
        if let Some(uploaded_at) = uploaded_at {
            new.uploaded_at = uploaded_at;
        }
        if new == old {
            return Ok(false);
        }
        self.commit(Some(&old), Some(&new), pipeline, false).await?;
        Ok(true)
    }

    async fn set_access(
        &self,
        lock: &LockSet,
        old: Record,
        public: Option<bool>,
        direct_only: Option<bool>,
        unlisted: Option<bool>,
    ) -> Result<bool> {
        let mut new = old.clone();
        if let Some(public) = public {
            new.public = public;
        }
        if let Some(direct_only) = direct_only {
            new.direct_only = direct_only;
        }
        if let Some(unlisted) = unlisted {
            new.unlisted = unlisted;
        }
        if new == old {
            return Ok(false);
        }
        if new.public != old.public {
            lock.extend().await?;
            for part in &new.parts {
                let object = keys::part_object(&new.owner, new.id, &part.name);
                if new.public {
                    self.provider.make_public(&object).await?;
                } else {
                    self.provider.make_private(&object).await?;
                }
            }
        }
        self.commit(Some(&old), Some(&new), Pipeline::new(), true)
            .await?;
        Ok(true)
    }

    async fn set_tags(&self, old: Record, tags: BTreeSet<Tag>) -> Result<bool> {
        if old.immutable {
            return Err(Error::precondition(format!(
                "record {} is immutable",
                old.id
            )));
        }
        if tags == old.tags {
            return Ok(false);
        }
        let mut new = old.clone();
        new.tags = tags;
        self.commit(Some(&old), Some(&new), Pipeline::new(), false)
            .await?;
        Ok(true)
    }

    async fn set_alias(&self, old: Record, alias: Option<String>) -> Result<bool> {
        if alias == old.alias {
            return Ok(false);
        }
        let mut pipeline = Pipeline::new();
        let table = keys::alias_table(&old.owner);
        if let Some(alias) = &alias {
            let current = self.store.hash_field(&table, alias).await?;
            if current.is_some_and(|id| id != old.id.to_string()) {
                return Err(Error::conflict(format!(
                    "alias '{alias}' already taken for owner {}",
                    old.owner
                )));
            }
        }
        // Clear-then-set keeps the pointer table one-to-one
        if let Some(prior) = &old.alias {
            pipeline.hash_del(table.clone(), prior.clone());
        }
        if let Some(alias) = &alias {
            pipeline.hash_set(table, alias.clone(), old.id.to_string());
        }
        let mut new = old.clone();
        new.alias = alias;
        self.commit(Some(&old), Some(&new), pipeline, false).await?;
        Ok(true)
    }

    async fn set_references(
        &self,
        old: Record,
        references: Vec<RecordId>,
        admin_override: bool,
    ) -> Result<bool> {
        if references == old.references {
            return Ok(false);
        }
        if old.immutable && !admin_override {
            return Err(Error::precondition(format!(
                "record {} is immutable",
                old.id
            )));
        }
        if old.is_referenced && !references.is_empty() {
            // Single-level chains only
            return Err(Error::precondition(format!(
                "record {} is referenced and cannot hold references",
                old.id
            )));
        }
        let mut involved: BTreeSet<RecordId> = references.iter().copied().collect();
        involved.extend(old.references.iter().copied());
        let targets = self.reference_targets(&involved).await?;
        refs::verify(&old, &targets, &references, admin_override)?;

        let mut new = old.clone();
        new.references = references;
        new.has_references = !new.references.is_empty();
        let mut pipeline = Pipeline::new();
        refs::apply(&new, Some(&old), &targets, &mut pipeline);
        self.commit(Some(&old), Some(&new), pipeline, false).await?;
        Ok(true)
    }

    async fn set_immutable(&self, old: Record) -> Result<bool> {
        if old.immutable {
            return Ok(false);
        }
        let mut new = old.clone();
        new.immutable = true;
        self.commit(Some(&old), Some(&new), Pipeline::new(), false)
            .await?;
        Ok(true)
    }

    async fn remove(&self, lock: &LockSet, old: Record, soft: bool) -> Result<bool> {
        if soft {
            let mut new = old.clone();
            new.unlisted = true;
            let mut pipeline = Pipeline::new();
            if let Some(alias) = new.alias.take() {
                pipeline.hash_del(keys::alias_table(&new.owner), alias);
            }
            info!(record = %old.id, "soft-removing record");
            self.commit(Some(&old), Some(&new), pipeline, true).await?;
            return Ok(true);
        }

        if old.is_referenced {
            return Err(Error::conflict(format!(
                "record {} is referenced and cannot be removed",
                old.id
            )));
        }
        let mut pipeline = Pipeline::new();
        if let Some(alias) = &old.alias {
            pipeline.hash_del(keys::alias_table(&old.owner), alias.clone());
        }
        if !old.references.is_empty() {
            // Detach from every target, clearing their is_referenced flags
            let involved: BTreeSet<RecordId> = old.references.iter().copied().collect();
            let targets = self.reference_targets(&involved).await?;
            let mut detached = old.clone();
            detached.references.clear();
            detached.has_references = false;
            refs::apply(&detached, Some(&old), &targets, &mut pipeline);
        }
        pipeline.del(keys::record(old.id));
        pipeline.del(keys::backrefs(old.id));

        lock.extend().await?;
        for part in &old.parts {
            self.provider
                .remove(&keys::part_object(&old.owner, old.id, &part.name))
                .await?;
        }
        info!(record = %old.id, "removing record");
        self.commit(Some(&old), None, pipeline, true).await?;
        Ok(true)
    }

    /// Fetch reference targets plus their back-indices
    pub(crate) async fn reference_targets(
        &self,
        ids: &BTreeSet<RecordId>,
    ) -> Result<HashMap<RecordId, RefTarget>> {
        let mut targets = HashMap::with_capacity(ids.len());
        for id in ids {
            let Some(hash) = self.store.record_hash(&keys::record(*id)).await? else {
                // Missing targets are reported by verification
                continue;
            };
            let record = Record::from_hash(&hash)?;
            let mut referenced_by = BTreeSet::new();
            for member in self.store.set_members(&keys::backrefs(*id)).await? {
                let referrer = RecordId::parse(&member)
                    .map_err(|e| Error::internal(format!("bad back-reference '{member}': {e}")))?;
                referenced_by.insert(referrer);
            }
            targets.insert(*id, RefTarget::from_record(&record, referenced_by));
        }
        Ok(targets)
    }

    /// Write the snapshot, apply the index delta, dispatch, bust, mirror
    async fn commit(
        &self,
        old: Option<&Record>,
        new: Option<&Record>,
        mut pipeline: Pipeline,
        visibility_changed: bool,
    ) -> Result<()> {
        if let Some(new) = new {
            pipeline.hash_set_all(keys::record(new.id), new.to_hash());
        }
        let subject = new.or(old).ok_or_else(|| {
            Error::internal("commit called without a record snapshot")
        })?;
        let delta = index::membership_delta(old, new);
        index::apply_delta(&mut pipeline, subject, &delta);
        self.store.pipeline(pipeline.into_commands()).await?;
        // The union of both snapshots' keys, so the indices the record
        // just left are busted alongside the ones it joined.
        let touched: BTreeSet<String> = old
            .into_iter()
            .chain(new)
            .flat_map(|r| CacheInvalidator::touched_keys(r, visibility_changed))
            .collect();
        // Synchronous so a read within the same request observes the bust
        self.invalidator
            .bust_keys(touched.into_iter().collect(), true)
            .await?;
        if let Some(search) = &self.search {
            match new {
                Some(new) => search.upsert(new).await?,
                None => search.remove(subject.id).await?,
            }
        }
        Ok(())
    }
}
