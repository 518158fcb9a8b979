//! Meshvault metadata engine
//!
//! The metadata indexing, query and consistency core: maintains the
//! denormalized secondary indices derived from each asset record,
//! answers filtered/sorted/paginated list queries through either the
//! cached derived-intersection path or the native search path, enforces
//! cross-record invariants (aliases, references, immutability) under
//! per-resource distributed locks, and invalidates cached query results
//! when records change.

pub mod engine;
pub mod fetch;
pub mod index;
pub mod invalidate;
pub mod keys;
pub mod list;
pub mod locks;
pub mod mutate;
pub mod pages;
pub mod query;
pub mod refs;
pub mod singleflight;

mod clock;

pub use engine::Engine;
pub use fetch::EntityFetcher;
pub use index::{IndexKey, MembershipDelta};
pub use invalidate::CacheInvalidator;
pub use list::{ListPage, Lister, PageRequest};
pub use locks::{LockCoordinator, LockSet};
pub use mutate::{CreateRequest, Mutation, MutationEngine};
pub use pages::PageIter;
pub use query::{ListFilter, QueryOutcome, QueryPage, QueryPlanner, TimeRange};
pub use refs::RefTarget;
pub use singleflight::SingleFlight;
