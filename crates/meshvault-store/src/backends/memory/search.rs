//! In-memory search backend
//!
//! Scan-based implementation of the search contract, good enough for
//! tests and small single-node deployments.

use crate::query::{Direction, SortField};
use crate::search::{SearchBackend, SearchPage, SearchQuery};
use async_trait::async_trait;
use dashmap::DashMap;
use meshvault_common::{Record, RecordId, Result};

/// In-memory [`SearchBackend`] implementation
#[derive(Default)]
pub struct MemorySearch {
    docs: DashMap<RecordId, Record>,
}

impl MemorySearch {
    /// Create an empty index
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of indexed records
    #[must_use]
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    /// Whether the index is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

fn matches(record: &Record, query: &SearchQuery) -> bool {
    // Temporary records form a separate listing universe; unlisted
    // records are excluded unless asked for
    if record.temporary != query.temporary {
        return false;
    }
    if record.unlisted && !query.include_unlisted {
        return false;
    }
    if let Some(owner) = &query.owner
        && record.owner != *owner
    {
        return false;
    }
    if query.public_only && !(record.public && !record.direct_only) {
        return false;
    }
    if !query.tags.iter().all(|t| record.tags.contains(t)) {
        return false;
    }
    if let Some((min, max)) = query.uploaded_between
        && (record.uploaded_at < min || record.uploaded_at > max)
    {
        return false;
    }
    if let Some(text) = &query.text {
        let needle = text.to_lowercase();
        let alias_hit = record
            .alias
            .as_deref()
            .is_some_and(|a| a.to_lowercase().contains(&needle));
        let tag_hit = record.tags.iter().any(|t| t.as_str().contains(&needle));
        if !alias_hit && !tag_hit {
            return false;
        }
    }
    if !query.predicates.is_empty() {
        let hash = record.to_hash();
        if !query.predicates.iter().all(|p| p.matches(&hash)) {
            return false;
        }
    }
    true
}

const fn sort_value(record: &Record, field: SortField) -> i64 {
    match field {
        SortField::UploadedAt => record.uploaded_at,
        SortField::StartedAt => record.started_at,
        SortField::ContentLength => record.content_length as i64,
        SortField::Version => record.version as i64,
    }
}

#[async_trait]
impl SearchBackend for MemorySearch {
    async fn search(&self, query: &SearchQuery) -> Result<SearchPage> {
        let mut hits: Vec<(i64, RecordId)> = self
            .docs
            .iter()
            .filter(|entry| matches(entry.value(), query))
            .map(|entry| (sort_value(entry.value(), query.sort.by), *entry.key()))
            .collect();
        hits.sort();
        if query.sort.dir == Direction::Desc {
            hits.reverse();
        }
        let total = hits.len() as u64;
        let ids = hits
            .into_iter()
            .skip(usize::try_from(query.offset).unwrap_or(usize::MAX))
            .take(usize::try_from(query.limit).unwrap_or(usize::MAX))
            .map(|(_, id)| id)
            .collect();
        Ok(SearchPage { ids, total })
    }

    async fn upsert(&self, record: &Record) -> Result<()> {
        self.docs.insert(record.id, record.clone());
        Ok(())
    }

    async fn remove(&self, id: RecordId) -> Result<()> {
        self.docs.remove(&id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::SortSpec;
    use meshvault_common::{OwnerId, Tag};

    fn record(owner: &str, public: bool, uploaded_at: i64) -> Record {
        let mut r = Record::new(RecordId::new(), OwnerId::new(owner), Vec::new(), uploaded_at);
        r.public = public;
        r.uploaded_at = uploaded_at;
        r
    }

    fn query() -> SearchQuery {
        SearchQuery {
            limit: 100,
            sort: SortSpec::default(),
            ..SearchQuery::default()
        }
    }

    #[tokio::test]
    async fn test_owner_and_public_clauses() {
        let search = MemorySearch::new();
        let a = record("alice", true, 10);
        let b = record("alice", false, 20);
        let c = record("bob", true, 30);
        for r in [&a, &b, &c] {
            search.upsert(r).await.unwrap();
        }

        let mut q = query();
        q.owner = Some(OwnerId::new("alice"));
        let page = search.search(&q).await.unwrap();
        assert_eq!(page.total, 2);

        q.public_only = true;
        let page = search.search(&q).await.unwrap();
        assert_eq!(page.ids, vec![a.id]);
    }

    #[tokio::test]
    async fn test_special_types_excluded_by_default() {
        let search = MemorySearch::new();
        let mut tmp = record("alice", true, 10);
        tmp.temporary = true;
        let mut hidden = record("alice", true, 20);
        hidden.unlisted = true;
        search.upsert(&tmp).await.unwrap();
        search.upsert(&hidden).await.unwrap();

        assert_eq!(search.search(&query()).await.unwrap().total, 0);

        let mut q = query();
        q.temporary = true;
        assert_eq!(search.search(&q).await.unwrap().ids, vec![tmp.id]);
    }

    #[tokio::test]
    async fn test_text_matches_alias_and_tags() {
        let search = MemorySearch::new();
        let mut r = record("alice", true, 10);
        r.alias = Some("Space-Robot".into());
        r.tags.insert(Tag::new("mech").unwrap());
        search.upsert(&r).await.unwrap();

        let mut q = query();
        q.text = Some("robot".into());
        assert_eq!(search.search(&q).await.unwrap().total, 1);
        q.text = Some("mech".into());
        assert_eq!(search.search(&q).await.unwrap().total, 1);
        q.text = Some("dragon".into());
        assert_eq!(search.search(&q).await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn test_sort_and_pagination() {
        let search = MemorySearch::new();
        let ids: Vec<RecordId> = {
            let mut out = Vec::new();
            for at in [10, 20, 30] {
                let r = record("alice", true, at);
                search.upsert(&r).await.unwrap();
                out.push(r.id);
            }
            out
        };

        let mut q = query();
        q.offset = 1;
        q.limit = 1;
        let page = search.search(&q).await.unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.ids, vec![ids[1]]); // desc: 30, [20], 10
    }

    #[tokio::test]
    async fn test_remove() {
        let search = MemorySearch::new();
        let r = record("alice", true, 10);
        search.upsert(&r).await.unwrap();
        search.remove(r.id).await.unwrap();
        assert!(search.is_empty());
    }
}
