//! Distributed Lock Coordinator
//!
//! Scoped acquisition of one or more named locks ahead of a mutation.
//! Multi-key acquisition is all-or-nothing and always proceeds in
//! lexicographic key order so two acquisitions sharing keys cannot
//! deadlock. Release happens on every exit path: explicitly via
//! [`LockSet::release`], or as a spawned fallback on drop.

use meshvault_common::{LockConfig, RecordId, Result};
use meshvault_store::{LockHandle, LockManager};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::keys;

/// Acquires and tracks per-resource locks for mutations
#[derive(Clone)]
pub struct LockCoordinator {
    manager: Arc<dyn LockManager>,
    config: LockConfig,
}

impl LockCoordinator {
    /// Create a coordinator over a lock manager
    pub fn new(manager: Arc<dyn LockManager>, config: LockConfig) -> Self {
        Self { manager, config }
    }

    /// Acquire the lock for one record
    pub async fn acquire(&self, id: RecordId) -> Result<LockSet> {
        self.acquire_names(vec![keys::record_lock(id)]).await
    }

    /// Acquire the locks for several records, all-or-nothing
    pub async fn acquire_records(&self, ids: &[RecordId]) -> Result<LockSet> {
        self.acquire_names(ids.iter().map(|id| keys::record_lock(*id)).collect())
            .await
    }

    /// Acquire a set of named locks in canonical order, all-or-nothing
    pub async fn acquire_names(&self, mut names: Vec<String>) -> Result<LockSet> {
        names.sort();
        names.dedup();
        let mut handles: Vec<Box<dyn LockHandle>> = Vec::with_capacity(names.len());
        for name in &names {
            match self
                .manager
                .try_acquire(name, self.config.ttl, self.config.acquire_timeout)
                .await
            {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    debug!(name, "lock acquisition failed, backing out");
                    for held in handles.iter().rev() {
                        if let Err(release_err) = held.release().await {
                            warn!(
                                name = held.name(),
                                error = %release_err,
                                "failed to release lock while backing out"
                            );
                        }
                    }
                    return Err(e);
                }
            }
        }
        Ok(LockSet {
            handles,
            default_ttl: self.config.ttl,
            released: false,
        })
    }
}

/// A held set of locks
///
/// Must be released before the critical section's result is returned;
/// dropping an unreleased set spawns a best-effort release.
pub struct LockSet {
    handles: Vec<Box<dyn LockHandle>>,
    default_ttl: Duration,
    released: bool,
}

impl LockSet {
    /// Number of held locks
    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Whether no locks are held
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Push every lock's expiry out by the default TTL
    ///
    /// Call before any long-running step inside the critical section,
    /// such as an object-storage round trip.
    pub async fn extend(&self) -> Result<()> {
        self.extend_by(self.default_ttl).await
    }

    /// Push every lock's expiry out by `ttl`
    pub async fn extend_by(&self, ttl: Duration) -> Result<()> {
        for handle in &self.handles {
            handle.extend(ttl).await?;
        }
        Ok(())
    }

    /// Release every held lock
    pub async fn release(mut self) -> Result<()> {
        self.released = true;
        for handle in self.handles.drain(..).rev() {
            handle.release().await?;
        }
        Ok(())
    }
}

impl Drop for LockSet {
    fn drop(&mut self) {
        if self.released || self.handles.is_empty() {
            return;
        }
        warn!(count = self.handles.len(), "lock set dropped unreleased");
        let handles = std::mem::take(&mut self.handles);
        if let Ok(rt) = tokio::runtime::Handle::try_current() {
            rt.spawn(async move {
                for handle in handles.into_iter().rev() {
                    let _ = handle.release().await;
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshvault_store::backends::memory::MemoryLocks;

    fn coordinator() -> LockCoordinator {
        LockCoordinator::new(
            Arc::new(MemoryLocks::new()),
            LockConfig {
                ttl: Duration::from_secs(5),
                acquire_timeout: Duration::from_millis(50),
            },
        )
    }

    #[tokio::test]
    async fn test_multi_key_all_or_nothing() {
        let coord = coordinator();
        let a = RecordId::new();
        let b = RecordId::new();

        let held_b = coord.acquire(b).await.unwrap();
        // Acquiring {a, b} must fail and must not leave a held
        assert!(coord.acquire_records(&[a, b]).await.is_err());
        let reacquire_a = coord.acquire(a).await.unwrap();
        reacquire_a.release().await.unwrap();
        held_b.release().await.unwrap();
    }

    #[tokio::test]
    async fn test_duplicate_ids_collapse() {
        let coord = coordinator();
        let a = RecordId::new();
        let set = coord.acquire_records(&[a, a]).await.unwrap();
        assert_eq!(set.len(), 1);
        set.release().await.unwrap();
    }

    #[tokio::test]
    async fn test_release_allows_reacquire() {
        let coord = coordinator();
        let a = RecordId::new();
        coord.acquire(a).await.unwrap().release().await.unwrap();
        coord.acquire(a).await.unwrap().release().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_drop_fallback_releases() {
        let coord = coordinator();
        let a = RecordId::new();
        drop(coord.acquire(a).await.unwrap());
        // The spawned release runs shortly after drop
        tokio::time::sleep(Duration::from_millis(30)).await;
        coord.acquire(a).await.unwrap().release().await.unwrap();
    }
}
