//! Meshvault store contracts
//!
//! Traits for the four external collaborators the metadata engine
//! consumes — the key-value metadata store, the schema-aware search
//! engine, the distributed lock manager and the object-storage provider —
//! plus the pipeline command model, the query primitives shared between
//! the engine and the store procedures, and in-memory reference backends
//! used by tests and single-node deployments.

pub mod backends;
pub mod command;
pub mod lock;
pub mod provider;
pub mod query;
pub mod search;
pub mod store;

pub use command::{Command, Pipeline};
pub use lock::{LockHandle, LockManager};
pub use provider::StorageProvider;
pub use query::{
    Direction, FieldPredicate, FilterField, PostFilter, SortField, SortPage, SortPageRequest,
    SortSpec,
};
pub use search::{SearchBackend, SearchPage, SearchQuery};
pub use store::MetaStore;
