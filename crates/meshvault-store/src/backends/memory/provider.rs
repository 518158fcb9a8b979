//! In-memory object-storage provider
//!
//! Tracks object names and their public flag; signed URLs are synthetic.

use crate::provider::StorageProvider;
use async_trait::async_trait;
use dashmap::DashMap;
use meshvault_common::{Error, Result};
use std::time::Duration;

/// In-memory [`StorageProvider`] implementation
#[derive(Default)]
pub struct MemoryProvider {
    // name -> public flag
    objects: DashMap<String, bool>,
}

impl MemoryProvider {
    /// Create an empty provider
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object, as if its bytes had been uploaded
    pub fn put(&self, name: impl Into<String>) {
        self.objects.insert(name.into(), false);
    }

    /// Whether the object is currently public
    #[must_use]
    pub fn is_public(&self, name: &str) -> bool {
        self.objects.get(name).is_some_and(|p| *p)
    }
}

#[async_trait]
impl StorageProvider for MemoryProvider {
    async fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.objects.contains_key(name))
    }

    async fn remove(&self, name: &str) -> Result<()> {
        self.objects.remove(name);
        Ok(())
    }

    async fn make_public(&self, name: &str) -> Result<()> {
        match self.objects.get_mut(name) {
            Some(mut public) => {
                *public = true;
                Ok(())
            }
            None => Err(Error::not_found(format!("object '{name}'"))),
        }
    }

    async fn make_private(&self, name: &str) -> Result<()> {
        match self.objects.get_mut(name) {
            Some(mut public) => {
                *public = false;
                Ok(())
            }
            None => Err(Error::not_found(format!("object '{name}'"))),
        }
    }

    async fn signed_read_url(&self, name: &str, expiry: Duration) -> Result<String> {
        if !self.objects.contains_key(name) {
            return Err(Error::not_found(format!("object '{name}'")));
        }
        Ok(format!("memory://{name}?op=read&exp={}", expiry.as_secs()))
    }

    async fn signed_write_url(&self, name: &str, expiry: Duration) -> Result<String> {
        Ok(format!("memory://{name}?op=write&exp={}", expiry.as_secs()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_exists_and_remove() {
        let provider = MemoryProvider::new();
        provider.put("alice/model.bin");
        assert!(provider.exists("alice/model.bin").await.unwrap());
        provider.remove("alice/model.bin").await.unwrap();
        assert!(!provider.exists("alice/model.bin").await.unwrap());
    }

    #[tokio::test]
    async fn test_visibility_toggle() {
        let provider = MemoryProvider::new();
        provider.put("obj");
        provider.make_public("obj").await.unwrap();
        assert!(provider.is_public("obj"));
        provider.make_private("obj").await.unwrap();
        assert!(!provider.is_public("obj"));
        assert!(provider.make_public("ghost").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_signed_urls() {
        let provider = MemoryProvider::new();
        provider.put("obj");
        let url = provider
            .signed_read_url("obj", Duration::from_secs(60))
            .await
            .unwrap();
        assert!(url.contains("op=read"));
        // Write URLs are issued before the object exists
        assert!(
            provider
                .signed_write_url("new-obj", Duration::from_secs(60))
                .await
                .is_ok()
        );
    }
}
