//! Batch Entity Fetch
//!
//! Resolves a page of candidate ids into records with bounded
//! concurrency. A missing record within a batch is logged and skipped;
//! any other failure aborts the whole batch. The single-record form
//! always fails loudly on a missing record.

use crate::keys;
use futures::StreamExt;
use meshvault_common::{Error, FieldFilter, Record, RecordHash, RecordId, Result};
use meshvault_store::MetaStore;
use std::sync::Arc;
use tracing::warn;

/// Outcome of fetching one id within a batch
enum Fetched {
    Found(RecordHash),
    Missing(RecordId),
}

/// Fetches records through the store's combined fetch+filter procedure
#[derive(Clone)]
pub struct EntityFetcher {
    store: Arc<dyn MetaStore>,
    concurrency: usize,
}

impl EntityFetcher {
    /// Create a fetcher with a concurrency bound for batches
    pub fn new(store: Arc<dyn MetaStore>, concurrency: usize) -> Self {
        Self {
            store,
            concurrency: concurrency.max(1),
        }
    }

    /// Fetch one record's fields, failing loudly when it is missing
    pub async fn fetch_one(&self, id: RecordId, filter: &FieldFilter) -> Result<RecordHash> {
        self.store
            .fetch_fields(&keys::record(id), filter)
            .await?
            .ok_or_else(|| Error::not_found(format!("record {id}")))
    }

    /// Fetch one full, decoded record
    pub async fn fetch_record(&self, id: RecordId) -> Result<Record> {
        let hash = self.fetch_one(id, &FieldFilter::default()).await?;
        Ok(Record::from_hash(&hash)?)
    }

    /// Fetch many records' fields, skipping ids whose record is missing
    ///
    /// Input order is preserved for the ids that resolve. Store failures
    /// other than a missing record abort the batch.
    pub async fn fetch_many(
        &self,
        ids: &[RecordId],
        filter: &FieldFilter,
    ) -> Result<Vec<RecordHash>> {
        let results: Vec<Result<Fetched>> = futures::stream::iter(ids.iter().copied())
            .map(|id| {
                let store = Arc::clone(&self.store);
                let filter = filter.clone();
                async move {
                    match store.fetch_fields(&keys::record(id), &filter).await? {
                        Some(hash) => Ok(Fetched::Found(hash)),
                        None => Ok(Fetched::Missing(id)),
                    }
                }
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut records = Vec::with_capacity(ids.len());
        for result in results {
            match result? {
                Fetched::Found(hash) => records.push(hash),
                Fetched::Missing(id) => {
                    warn!(record = %id, "record missing during batch fetch, skipped");
                }
            }
        }
        Ok(records)
    }

    /// Fetch many full, decoded records, skipping missing ids
    pub async fn fetch_many_records(&self, ids: &[RecordId]) -> Result<Vec<Record>> {
        self.fetch_many(ids, &FieldFilter::default())
            .await?
            .iter()
            .map(|hash| Record::from_hash(hash).map_err(Into::into))
            .collect()
    }
}
