//! Object-storage provider contract
//!
//! The engine calls this only to validate state transitions and to apply
//! visibility to stored bytes; it never manages buckets or credentials.

use async_trait::async_trait;
use meshvault_common::Result;
use std::time::Duration;

/// Object-storage provider consumed by mutation actions
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Whether the named object exists
    async fn exists(&self, name: &str) -> Result<bool>;

    /// Delete the named object
    async fn remove(&self, name: &str) -> Result<()>;

    /// Make the named object publicly readable
    async fn make_public(&self, name: &str) -> Result<()>;

    /// Make the named object private
    async fn make_private(&self, name: &str) -> Result<()>;

    /// Issue a signed read URL
    async fn signed_read_url(&self, name: &str, expiry: Duration) -> Result<String>;

    /// Issue a signed write URL
    async fn signed_write_url(&self, name: &str, expiry: Duration) -> Result<String>;
}
