//! In-memory metadata store
//!
//! Hashes, sets and sorted sets with lazy TTL expiry, atomic batch
//! application, liveness markers, and the combined filter+sort+paginate
//! procedure with its own short-lived result cache. Counters expose how
//! often the expensive procedures actually ran, so tests can observe
//! caching and single-flight behavior.

use crate::command::Command;
use crate::query::{Direction, SortPage, SortPageRequest};
use crate::store::MetaStore;
use async_trait::async_trait;
use dashmap::DashMap;
use meshvault_common::{Error, FieldFilter, RecordHash, Result};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

#[derive(Clone, Debug)]
enum Value {
    Hash(RecordHash),
    Set(BTreeSet<String>),
    Sorted(BTreeMap<String, i64>),
}

impl Value {
    const fn type_name(&self) -> &'static str {
        match self {
            Self::Hash(_) => "hash",
            Self::Set(_) => "set",
            Self::Sorted(_) => "zset",
        }
    }
}

#[derive(Clone, Debug)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
    created_ms: Option<i64>,
}

impl Entry {
    fn plain(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
            created_ms: None,
        }
    }

    fn expired(&self) -> bool {
        self.expires_at.is_some_and(|t| t <= Instant::now())
    }
}

struct CachedSort {
    ids: Vec<String>,
    expires_at: Instant,
    created_ms: i64,
}

/// Snapshot of procedure counters
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Atomic batches dispatched
    pub pipelines: u64,
    /// Set intersections actually computed
    pub intersections_computed: u64,
    /// Time-range sets actually materialized
    pub range_sets_computed: u64,
    /// Filter+sort results actually computed (cache misses)
    pub sorts_computed: u64,
}

/// In-memory [`MetaStore`] implementation
#[derive(Default)]
pub struct MemoryStore {
    entries: DashMap<String, Entry>,
    markers: DashMap<String, i64>,
    results: DashMap<String, CachedSort>,
    // Serializes batch application so a pipeline is observed atomically
    batch: Mutex<()>,
    pipelines: AtomicU64,
    intersections: AtomicU64,
    range_sets: AtomicU64,
    sorts: AtomicU64,
}

impl MemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot the procedure counters
    #[must_use]
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            pipelines: self.pipelines.load(Ordering::Relaxed),
            intersections_computed: self.intersections.load(Ordering::Relaxed),
            range_sets_computed: self.range_sets.load(Ordering::Relaxed),
            sorts_computed: self.sorts.load(Ordering::Relaxed),
        }
    }

    fn purge(&self, key: &str) {
        let expired = self.entries.get(key).is_some_and(|e| e.expired());
        if expired {
            self.entries.remove(key);
        }
    }

    fn live_set(&self, key: &str) -> Result<Option<BTreeSet<String>>> {
        self.purge(key);
        match self.entries.get(key) {
            None => Ok(None),
            Some(e) => match &e.value {
                Value::Set(s) => Ok(Some(s.clone())),
                other => Err(Error::internal(format!(
                    "wrong type at '{key}': expected set, found {}",
                    other.type_name()
                ))),
            },
        }
    }

    fn apply_command(&self, cmd: &Command) -> std::result::Result<(), String> {
        match cmd {
            Command::HashSetAll { key, fields } => {
                self.entries
                    .insert(key.clone(), Entry::plain(Value::Hash(fields.clone())));
                Ok(())
            }
            Command::HashSet { key, field, value } => {
                let mut e = self
                    .entries
                    .entry(key.clone())
                    .or_insert_with(|| Entry::plain(Value::Hash(RecordHash::new())));
                match &mut e.value {
                    Value::Hash(h) => {
                        h.insert(field.clone(), value.clone());
                        Ok(())
                    }
                    other => Err(format!("wrong type at '{key}': {}", other.type_name())),
                }
            }
            Command::HashDel { key, field } => {
                if let Some(mut e) = self.entries.get_mut(key) {
                    match &mut e.value {
                        Value::Hash(h) => {
                            h.remove(field);
                        }
                        other => {
                            return Err(format!("wrong type at '{key}': {}", other.type_name()));
                        }
                    }
                }
                Ok(())
            }
            Command::Del { key } => {
                self.entries.remove(key);
                Ok(())
            }
            Command::SetAdd { key, member } => {
                let mut e = self
                    .entries
                    .entry(key.clone())
                    .or_insert_with(|| Entry::plain(Value::Set(BTreeSet::new())));
                match &mut e.value {
                    Value::Set(s) => {
                        s.insert(member.clone());
                        Ok(())
                    }
                    other => Err(format!("wrong type at '{key}': {}", other.type_name())),
                }
            }
            Command::SetRem { key, member } => {
                if let Some(mut e) = self.entries.get_mut(key) {
                    match &mut e.value {
                        Value::Set(s) => {
                            s.remove(member);
                        }
                        other => {
                            return Err(format!("wrong type at '{key}': {}", other.type_name()));
                        }
                    }
                }
                Ok(())
            }
            Command::SortedAdd { key, score, member } => {
                let mut e = self
                    .entries
                    .entry(key.clone())
                    .or_insert_with(|| Entry::plain(Value::Sorted(BTreeMap::new())));
                match &mut e.value {
                    Value::Sorted(z) => {
                        z.insert(member.clone(), *score);
                        Ok(())
                    }
                    other => Err(format!("wrong type at '{key}': {}", other.type_name())),
                }
            }
            Command::SortedRem { key, member } => {
                if let Some(mut e) = self.entries.get_mut(key) {
                    match &mut e.value {
                        Value::Sorted(z) => {
                            z.remove(member);
                        }
                        other => {
                            return Err(format!("wrong type at '{key}': {}", other.type_name()));
                        }
                    }
                }
                Ok(())
            }
        }
    }
}

#[async_trait]
impl MetaStore for MemoryStore {
    async fn record_hash(&self, key: &str) -> Result<Option<RecordHash>> {
        self.purge(key);
        match self.entries.get(key) {
            None => Ok(None),
            Some(e) => match &e.value {
                Value::Hash(h) => Ok(Some(h.clone())),
                other => Err(Error::internal(format!(
                    "wrong type at '{key}': expected hash, found {}",
                    other.type_name()
                ))),
            },
        }
    }

    async fn fetch_fields(&self, key: &str, filter: &FieldFilter) -> Result<Option<RecordHash>> {
        Ok(self.record_hash(key).await?.map(|h| filter.apply(h)))
    }

    async fn hash_field(&self, key: &str, field: &str) -> Result<Option<String>> {
        Ok(self
            .record_hash(key)
            .await?
            .and_then(|h| h.get(field).cloned()))
    }

    async fn pipeline(&self, commands: Vec<Command>) -> Result<()> {
        let _guard = self.batch.lock();
        self.pipelines.fetch_add(1, Ordering::Relaxed);
        let mut failures = Vec::new();
        for (i, cmd) in commands.iter().enumerate() {
            if let Err(msg) = self.apply_command(cmd) {
                failures.push(format!("command {i}: {msg}"));
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::internal(format!(
                "pipeline failed: {}",
                failures.join("; ")
            )))
        }
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>> {
        Ok(self
            .live_set(key)?
            .map(|s| s.into_iter().collect())
            .unwrap_or_default())
    }

    async fn set_card(&self, key: &str) -> Result<u64> {
        Ok(self.live_set(key)?.map_or(0, |s| s.len() as u64))
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        self.purge(key);
        Ok(self.entries.contains_key(key))
    }

    async fn key_ttl(&self, key: &str) -> Result<Option<Duration>> {
        self.purge(key);
        Ok(self.entries.get(key).and_then(|e| {
            e.expires_at
                .map(|t| t.saturating_duration_since(Instant::now()))
        }))
    }

    async fn created_at(&self, key: &str) -> Result<Option<i64>> {
        self.purge(key);
        Ok(self.entries.get(key).and_then(|e| e.created_ms))
    }

    async fn intersect_store(
        &self,
        dest: &str,
        inputs: &[String],
        ttl: Duration,
        now_ms: i64,
    ) -> Result<u64> {
        self.intersections.fetch_add(1, Ordering::Relaxed);
        let mut result: Option<BTreeSet<String>> = None;
        for input in inputs {
            let members = self.live_set(input)?.unwrap_or_default();
            result = Some(match result {
                None => members,
                Some(acc) => acc.intersection(&members).cloned().collect(),
            });
            if result.as_ref().is_some_and(BTreeSet::is_empty) {
                break;
            }
        }
        let result = result.unwrap_or_default();
        let card = result.len() as u64;
        // The rewritten destination invalidates any ordering cached on it
        let prefix = format!("{dest}|");
        self.results.retain(|k, _| !k.starts_with(&prefix));
        if result.is_empty() {
            // Empty intersections are not stored (matches SINTERSTORE)
            self.entries.remove(dest);
        } else {
            self.entries.insert(
                dest.to_string(),
                Entry {
                    value: Value::Set(result),
                    expires_at: Some(Instant::now() + ttl),
                    created_ms: Some(now_ms),
                },
            );
        }
        Ok(card)
    }

    async fn range_to_set(
        &self,
        dest: &str,
        zset: &str,
        min: i64,
        max: i64,
        ttl: Duration,
        now_ms: i64,
    ) -> Result<u64> {
        self.range_sets.fetch_add(1, Ordering::Relaxed);
        self.purge(zset);
        let members: BTreeSet<String> = match self.entries.get(zset) {
            None => BTreeSet::new(),
            Some(e) => match &e.value {
                Value::Sorted(z) => z
                    .iter()
                    .filter(|(_, score)| **score >= min && **score <= max)
                    .map(|(m, _)| m.clone())
                    .collect(),
                other => {
                    return Err(Error::internal(format!(
                        "wrong type at '{zset}': expected zset, found {}",
                        other.type_name()
                    )));
                }
            },
        };
        let card = members.len() as u64;
        let prefix = format!("{dest}|");
        self.results.retain(|k, _| !k.starts_with(&prefix));
        if members.is_empty() {
            self.entries.remove(dest);
        } else {
            self.entries.insert(
                dest.to_string(),
                Entry {
                    value: Value::Set(members),
                    expires_at: Some(Instant::now() + ttl),
                    created_ms: Some(now_ms),
                },
            );
        }
        Ok(card)
    }

    async fn touch(&self, key: &str, now_ms: i64) -> Result<()> {
        // Markers only advance
        self.markers
            .entry(key.to_string())
            .and_modify(|t| *t = (*t).max(now_ms))
            .or_insert(now_ms);
        Ok(())
    }

    async fn touched_at(&self, key: &str) -> Result<Option<i64>> {
        Ok(self.markers.get(key).map(|t| *t))
    }

    async fn filter_sort_page(
        &self,
        candidates: &str,
        req: &SortPageRequest,
    ) -> Result<SortPage> {
        let cache_key = format!(
            "{candidates}|{}|{}",
            req.sort.descriptor(),
            req.filter.descriptor()
        );
        // A cached ordering is honored only while it post-dates the
        // candidates key's liveness marker
        let marker = self.markers.get(candidates).map(|t| *t);
        let cached: Option<Vec<String>> = self.results.get(&cache_key).and_then(|c| {
            let live = c.expires_at > Instant::now()
                && marker.is_none_or(|touched| touched < c.created_ms);
            live.then(|| c.ids.clone())
        });
        let ids = if let Some(ids) = cached {
            ids
        } else {
            self.results.remove(&cache_key);
            self.sorts.fetch_add(1, Ordering::Relaxed);
            let members = self.live_set(candidates)?.unwrap_or_default();
            let mut scored: Vec<(i64, String)> = Vec::with_capacity(members.len());
            for id in members {
                let record_key = format!("{}{id}", req.key_prefix);
                let Some(hash) = self.record_hash(&record_key).await? else {
                    continue;
                };
                if !req.filter.matches(&hash) {
                    continue;
                }
                let value = hash
                    .get(req.sort.by.hash_field())
                    .and_then(|v| v.parse::<i64>().ok())
                    .unwrap_or_default();
                scored.push((value, id));
            }
            scored.sort();
            if req.sort.dir == Direction::Desc {
                scored.reverse();
            }
            let ids: Vec<String> = scored.into_iter().map(|(_, id)| id).collect();
            self.results.insert(
                cache_key,
                CachedSort {
                    ids: ids.clone(),
                    expires_at: Instant::now() + req.result_ttl,
                    created_ms: req.now_ms,
                },
            );
            ids
        };
        let total = ids.len() as u64;
        let page = ids
            .into_iter()
            .skip(usize::try_from(req.offset).unwrap_or(usize::MAX))
            .take(usize::try_from(req.limit).unwrap_or(usize::MAX))
            .collect();
        Ok(SortPage { ids: page, total })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{PostFilter, SortSpec};

    fn hash_for(id: &str, uploaded_at: i64) -> RecordHash {
        let mut h = RecordHash::new();
        h.insert("id".into(), id.into());
        h.insert("uploaded_at".into(), uploaded_at.to_string());
        h
    }

    fn sort_req(offset: u64, limit: u64) -> SortPageRequest {
        SortPageRequest {
            key_prefix: "record:".into(),
            sort: SortSpec::default(),
            filter: PostFilter::identity(),
            now_ms: 0,
            offset,
            limit,
            result_ttl: Duration::from_secs(30),
        }
    }

    #[tokio::test]
    async fn test_pipeline_atomic_and_idempotent() {
        let store = MemoryStore::new();
        let mut p = crate::Pipeline::new();
        p.hash_set_all("record:a", hash_for("a", 10));
        p.set_add("idx:global", "a");
        p.set_add("idx:global", "a"); // re-applying a delta is a no-op
        store.pipeline(p.into_commands()).await.unwrap();

        assert_eq!(store.set_members("idx:global").await.unwrap(), vec!["a"]);
        assert!(store.record_hash("record:a").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_pipeline_aggregates_subcommand_failures() {
        let store = MemoryStore::new();
        let mut p = crate::Pipeline::new();
        p.set_add("k", "a");
        store.pipeline(p.into_commands()).await.unwrap();

        // Hash write against a set key fails, and the error names it
        let mut p = crate::Pipeline::new();
        p.hash_set("k", "f", "v");
        let err = store.pipeline(p.into_commands()).await.unwrap_err();
        assert_eq!(err.http_status_code(), 500);
        assert!(err.to_string().contains("command 0"));
    }

    #[tokio::test]
    async fn test_intersect_store_and_ttl() {
        let store = MemoryStore::new();
        let mut p = crate::Pipeline::new();
        for m in ["a", "b", "c"] {
            p.set_add("s1", m);
        }
        for m in ["b", "c", "d"] {
            p.set_add("s2", m);
        }
        store.pipeline(p.into_commands()).await.unwrap();

        let card = store
            .intersect_store("dest", &["s1".into(), "s2".into()], Duration::from_secs(60), 123)
            .await
            .unwrap();
        assert_eq!(card, 2);
        assert_eq!(store.set_members("dest").await.unwrap(), vec!["b", "c"]);
        assert_eq!(store.created_at("dest").await.unwrap(), Some(123));
        assert!(store.key_ttl("dest").await.unwrap().is_some());
        assert_eq!(store.stats().intersections_computed, 1);
    }

    #[tokio::test]
    async fn test_empty_intersection_not_stored() {
        let store = MemoryStore::new();
        let mut p = crate::Pipeline::new();
        p.set_add("s1", "a");
        p.set_add("s2", "b");
        store.pipeline(p.into_commands()).await.unwrap();

        let card = store
            .intersect_store("dest", &["s1".into(), "s2".into()], Duration::from_secs(60), 1)
            .await
            .unwrap();
        assert_eq!(card, 0);
        assert!(!store.exists("dest").await.unwrap());
    }

    #[tokio::test]
    async fn test_range_to_set() {
        let store = MemoryStore::new();
        let mut p = crate::Pipeline::new();
        p.sorted_add("z", 10, "a");
        p.sorted_add("z", 20, "b");
        p.sorted_add("z", 30, "c");
        store.pipeline(p.into_commands()).await.unwrap();

        let card = store
            .range_to_set("dest", "z", 15, 30, Duration::from_secs(60), 1)
            .await
            .unwrap();
        assert_eq!(card, 2);
        assert_eq!(store.set_members("dest").await.unwrap(), vec!["b", "c"]);
    }

    #[tokio::test]
    async fn test_touch_only_advances() {
        let store = MemoryStore::new();
        store.touch("idx:global", 100).await.unwrap();
        store.touch("idx:global", 50).await.unwrap();
        assert_eq!(store.touched_at("idx:global").await.unwrap(), Some(100));
    }

    #[tokio::test]
    async fn test_filter_sort_page_orders_and_caches() {
        let store = MemoryStore::new();
        let mut p = crate::Pipeline::new();
        for (id, at) in [("a", 30), ("b", 10), ("c", 20)] {
            p.hash_set_all(format!("record:{id}"), hash_for(id, at));
            p.set_add("candidates", id);
        }
        store.pipeline(p.into_commands()).await.unwrap();

        let page = store
            .filter_sort_page("candidates", &sort_req(0, 10))
            .await
            .unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.ids, vec!["a", "c", "b"]); // uploaded_at desc

        // Second identical call hits the result cache
        let page2 = store
            .filter_sort_page("candidates", &sort_req(1, 1))
            .await
            .unwrap();
        assert_eq!(page2.ids, vec!["c"]);
        assert_eq!(store.stats().sorts_computed, 1);
    }

    #[tokio::test]
    async fn test_touch_invalidates_cached_sort() {
        let store = MemoryStore::new();
        let mut p = crate::Pipeline::new();
        p.hash_set_all("record:a", hash_for("a", 1));
        p.set_add("candidates", "a");
        store.pipeline(p.into_commands()).await.unwrap();

        let mut req = sort_req(0, 10);
        req.now_ms = 100;
        store.filter_sort_page("candidates", &req).await.unwrap();
        store.touch("candidates", 100).await.unwrap();

        // The marker caught up with the cached ordering, forcing a recompute
        req.now_ms = 101;
        store.filter_sort_page("candidates", &req).await.unwrap();
        assert_eq!(store.stats().sorts_computed, 2);
    }

    #[tokio::test]
    async fn test_filter_sort_page_skips_missing_records() {
        let store = MemoryStore::new();
        let mut p = crate::Pipeline::new();
        p.hash_set_all("record:a", hash_for("a", 1));
        p.set_add("candidates", "a");
        p.set_add("candidates", "ghost");
        store.pipeline(p.into_commands()).await.unwrap();

        let page = store
            .filter_sort_page("candidates", &sort_req(0, 10))
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.ids, vec!["a"]);
    }

    #[tokio::test]
    async fn test_field_filter_procedure() {
        let store = MemoryStore::new();
        let mut p = crate::Pipeline::new();
        p.hash_set_all("record:a", hash_for("a", 1));
        store.pipeline(p.into_commands()).await.unwrap();

        let picked = store
            .fetch_fields("record:a", &FieldFilter::pick(["id"]))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(picked.len(), 1);
        assert!(picked.contains_key("id"));
    }
}
