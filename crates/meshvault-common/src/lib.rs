//! Meshvault common types and utilities
//!
//! Core type definitions shared across the metadata engine: identifiers,
//! the asset record model with its flat-hash serialization boundary,
//! field filters, the error taxonomy, and engine configuration.

pub mod config;
pub mod error;
pub mod record;
pub mod types;

pub use config::{CacheConfig, EngineConfig, LockConfig, QueryBackend, QueryConfig};
pub use error::{Error, Issue, IssueReason, Result};
pub use record::{DecodeError, FieldFilter, Record, RecordHash};
pub use types::{OwnerId, Part, RecordId, Status, Tag, TagError};
