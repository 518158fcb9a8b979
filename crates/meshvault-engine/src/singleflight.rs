//! Single-flight barrier
//!
//! At most one in-flight computation per cache key. Callers acquire the
//! key's guard, re-check whether the cached key became fresh while they
//! waited, and only then compute. Concurrent requesters for the same key
//! serialize behind the guard and find the first caller's result.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Per-key mutual exclusion for cache computations
#[derive(Default)]
pub struct SingleFlight {
    inflight: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl SingleFlight {
    /// Create an empty barrier
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the guard for `key`, waiting behind any in-flight holder
    pub async fn acquire(&self, key: &str) -> FlightGuard {
        let slot = self
            .inflight
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = slot.lock_owned().await;
        FlightGuard {
            guard: Some(guard),
            key: key.to_string(),
            inflight: Arc::clone(&self.inflight),
        }
    }

    /// Number of keys currently tracked
    #[must_use]
    pub fn tracked(&self) -> usize {
        self.inflight.len()
    }
}

/// Held single-flight guard; dropping it admits the next waiter
pub struct FlightGuard {
    guard: Option<OwnedMutexGuard<()>>,
    key: String,
    inflight: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.guard.take();
        // Drop the slot once nobody is waiting on it
        self.inflight
            .remove_if(&self.key, |_, slot| Arc::strong_count(slot) == 1);
    }
}
