//! In-memory distributed lock manager
//!
//! Token-fenced locks with TTL expiry. An expired lock can be stolen by
//! the next acquirer; extend and release are no-ops once the token no
//! longer matches.

use crate::lock::{LockHandle, LockManager};
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use meshvault_common::{Error, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Clone, Copy, Debug)]
struct HeldLock {
    token: u64,
    expires_at: Instant,
}

/// In-memory [`LockManager`] implementation
#[derive(Default)]
pub struct MemoryLocks {
    held: Arc<DashMap<String, HeldLock>>,
    next_token: AtomicU64,
}

const ACQUIRE_POLL: Duration = Duration::from_millis(5);

impl MemoryLocks {
    /// Create an empty lock manager
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn try_claim(&self, name: &str, ttl: Duration) -> Option<u64> {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed) + 1;
        let claim = HeldLock {
            token,
            expires_at: Instant::now() + ttl,
        };
        match self.held.entry(name.to_string()) {
            Entry::Vacant(v) => {
                v.insert(claim);
                Some(token)
            }
            Entry::Occupied(mut o) => {
                if o.get().expires_at <= Instant::now() {
                    debug!(name, "stealing expired lock");
                    o.insert(claim);
                    Some(token)
                } else {
                    None
                }
            }
        }
    }
}

#[async_trait]
impl LockManager for MemoryLocks {
    async fn try_acquire(
        &self,
        name: &str,
        ttl: Duration,
        acquire_timeout: Duration,
    ) -> Result<Box<dyn LockHandle>> {
        let deadline = Instant::now() + acquire_timeout;
        loop {
            if let Some(token) = self.try_claim(name, ttl) {
                return Ok(Box::new(MemoryLockHandle {
                    name: name.to_string(),
                    token,
                    held: Arc::clone(&self.held),
                }));
            }
            if Instant::now() >= deadline {
                return Err(Error::conflict(format!(
                    "lock '{name}' contended past acquire timeout"
                )));
            }
            tokio::time::sleep(ACQUIRE_POLL).await;
        }
    }
}

#[derive(Debug)]
struct MemoryLockHandle {
    name: String,
    token: u64,
    held: Arc<DashMap<String, HeldLock>>,
}

#[async_trait]
impl LockHandle for MemoryLockHandle {
    fn name(&self) -> &str {
        &self.name
    }

    async fn extend(&self, ttl: Duration) -> Result<()> {
        match self.held.get_mut(&self.name) {
            Some(mut held) if held.token == self.token => {
                held.expires_at = Instant::now() + ttl;
                Ok(())
            }
            _ => Err(Error::conflict(format!(
                "lock '{}' no longer held",
                self.name
            ))),
        }
    }

    async fn release(&self) -> Result<()> {
        self.held
            .remove_if(&self.name, |_, held| held.token == self.token);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_acquire_release_reacquire() {
        let locks = MemoryLocks::new();
        let lock = locks
            .try_acquire("r1", TTL, Duration::from_millis(50))
            .await
            .unwrap();
        lock.release().await.unwrap();
        locks
            .try_acquire("r1", TTL, Duration::from_millis(50))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_contended_acquire_times_out() {
        let locks = MemoryLocks::new();
        let _held = locks
            .try_acquire("r1", TTL, Duration::from_millis(50))
            .await
            .unwrap();
        let err = locks
            .try_acquire("r1", TTL, Duration::from_millis(30))
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_expired_lock_is_stolen() {
        let locks = MemoryLocks::new();
        let stale = locks
            .try_acquire("r1", Duration::from_millis(10), Duration::from_millis(50))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let fresh = locks
            .try_acquire("r1", TTL, Duration::from_millis(100))
            .await
            .unwrap();
        // The stale handle lost the lock; extend fails, release is a no-op
        assert!(stale.extend(TTL).await.is_err());
        stale.release().await.unwrap();
        fresh.extend(TTL).await.unwrap();
    }

    #[tokio::test]
    async fn test_extend_keeps_lock_alive() {
        let locks = MemoryLocks::new();
        let lock = locks
            .try_acquire("r1", Duration::from_millis(30), Duration::from_millis(50))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        lock.extend(Duration::from_millis(60)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(25)).await;
        // Still held past the original TTL
        assert!(
            locks
                .try_acquire("r1", TTL, Duration::from_millis(10))
                .await
                .is_err()
        );
    }
}
