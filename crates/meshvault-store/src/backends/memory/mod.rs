//! In-memory reference backends
//!
//! Single-process implementations of the four external contracts. They
//! back every engine test and are usable as-is for single-node
//! deployments; semantics match what the engine assumes of the real
//! collaborators (atomic batches, TTLs, liveness markers, lock expiry).

mod lock;
mod provider;
mod search;
mod store;

pub use lock::MemoryLocks;
pub use provider::MemoryProvider;
pub use search::MemorySearch;
pub use store::{MemoryStore, StoreStats};
