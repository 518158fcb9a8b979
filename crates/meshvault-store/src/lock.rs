//! Distributed lock manager contract
//!
//! Named, renewable, timeout-bound locks. Acquisition is bounded and
//! never retried automatically; callers decide whether to retry whole
//! mutations.

use async_trait::async_trait;
use meshvault_common::Result;
use std::time::Duration;

/// Handle to one held lock
#[async_trait]
pub trait LockHandle: Send + Sync + std::fmt::Debug {
    /// Name the lock was acquired under
    fn name(&self) -> &str;

    /// Push the expiry out by `ttl` from now
    ///
    /// Must be called before any step inside the critical section that
    /// can outlive the original TTL.
    async fn extend(&self, ttl: Duration) -> Result<()>;

    /// Release the lock
    ///
    /// Releasing an already-expired or stolen lock is a no-op.
    async fn release(&self) -> Result<()>;
}

/// Distributed lock manager consumed by the lock coordinator
#[async_trait]
pub trait LockManager: Send + Sync {
    /// Acquire the named lock, waiting at most `acquire_timeout`
    ///
    /// Fails with `Conflict` when the lock stays contended past the
    /// timeout.
    async fn try_acquire(
        &self,
        name: &str,
        ttl: Duration,
        acquire_timeout: Duration,
    ) -> Result<Box<dyn LockHandle>>;
}
