//! Cache Invalidator
//!
//! After a mutation changes index membership, every affected index key's
//! liveness marker advances to the current time. Derived-intersection
//! cache keys created before that marker are treated as stale the next
//! time their own expiry is checked, which bounds staleness to the TTL
//! of the consuming cache key.

use crate::clock;
use crate::index;
use meshvault_common::{Record, Result};
use meshvault_store::MetaStore;
use std::sync::Arc;
use tracing::{debug, warn};

/// Advances liveness markers on index keys touched by a record
#[derive(Clone)]
pub struct CacheInvalidator {
    store: Arc<dyn MetaStore>,
}

impl CacheInvalidator {
    /// Create an invalidator over a store
    pub fn new(store: Arc<dyn MetaStore>) -> Self {
        Self { store }
    }

    /// Index keys a bust for `record` touches
    ///
    /// Honors the unlisted/temporary/public branching: normally the
    /// record's current memberships; when visibility changed, the full
    /// universe of indices the record could have been in, so the views
    /// it just left are invalidated too.
    #[must_use]
    pub fn touched_keys(record: &Record, visibility_changed: bool) -> Vec<String> {
        let keys = if visibility_changed {
            index::removal_universe(record)
        } else {
            index::membership(record)
        };
        keys.iter().map(index::IndexKey::key).collect()
    }

    /// Bust every index touched by `record`
    ///
    /// With `synchronous`, the call returns once every marker has
    /// advanced; otherwise the touches are fired without the caller
    /// waiting.
    pub async fn bust(
        &self,
        record: &Record,
        visibility_changed: bool,
        synchronous: bool,
    ) -> Result<()> {
        self.bust_keys(Self::touched_keys(record, visibility_changed), synchronous)
            .await
    }

    /// Advance the liveness marker of each named index key
    ///
    /// Callers that change a record across index universes (ownership
    /// transfer, removal) pass the union of old and new memberships so
    /// the indices the record just left are invalidated too.
    pub async fn bust_keys(&self, keys: Vec<String>, synchronous: bool) -> Result<()> {
        let now_ms = clock::now_ms();
        debug!(count = keys.len(), synchronous, "busting index caches");
        if synchronous {
            for key in &keys {
                self.store.touch(key, now_ms).await?;
            }
            return Ok(());
        }
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            for key in &keys {
                if let Err(e) = store.touch(key, now_ms).await {
                    warn!(key, error = %e, "cache bust touch failed");
                }
            }
        });
        Ok(())
    }
}
