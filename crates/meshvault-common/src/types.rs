//! Core type definitions for Meshvault
//!
//! Identifiers, tags, upload status and part descriptors used throughout
//! the metadata engine.

use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for an asset record
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, From, Into,
)]
pub struct RecordId(Uuid);

impl RecordId {
    /// Generate a new random record ID
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from existing UUID
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Parse from the canonical string form
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }

    /// Get the underlying UUID
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordId({})", self.0)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of the account owning a record
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display)]
#[display("{_0}")]
pub struct OwnerId(String);

impl OwnerId {
    /// Create a new owner id
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the owner id as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OwnerId({})", self.0)
    }
}

/// Error validating a tag
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TagError {
    #[error("tag is empty")]
    Empty,
    #[error("tag exceeds 64 characters")]
    TooLong,
}

/// A case-normalized tag attached to a record
///
/// Tags are lowercased and trimmed at construction so that index keys
/// derived from them are stable regardless of input casing.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display)]
#[display("{_0}")]
pub struct Tag(String);

impl Tag {
    /// Create a new tag, normalizing case and surrounding whitespace
    pub fn new(tag: impl AsRef<str>) -> Result<Self, TagError> {
        let tag = tag.as_ref().trim().to_lowercase();
        if tag.is_empty() {
            return Err(TagError::Empty);
        }
        if tag.len() > 64 {
            return Err(TagError::TooLong);
        }
        Ok(Self(tag))
    }

    /// Get the tag as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tag({})", self.0)
    }
}

/// Upload/processing status of a record
///
/// Transitions are monotonic except for explicit reprocessing, which
/// re-enters `Processing` from a terminal state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Created, upload not yet completed
    Pending,
    /// Upload completed, processing not started
    Uploaded,
    /// Processing in progress
    Processing,
    /// Processing succeeded
    Processed,
    /// Processing failed
    Failed,
}

impl Status {
    /// Whether a transition from `self` to `next` is allowed
    #[must_use]
    pub fn can_advance_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Uploaded)
                | (Self::Uploaded, Self::Processing)
                | (Self::Processing, Self::Processed | Self::Failed)
                // Explicit reprocessing from a terminal state
                | (Self::Processed | Self::Failed, Self::Processing)
        )
    }

    /// Whether processing has reached a terminal state
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Processed | Self::Failed)
    }

    /// Stable string form stored in the record hash
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Uploaded => "uploaded",
            Self::Processing => "processing",
            Self::Processed => "processed",
            Self::Failed => "failed",
        }
    }

    /// Parse the stable string form
    #[must_use]
    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "uploaded" => Some(Self::Uploaded),
            "processing" => Some(Self::Processing),
            "processed" => Some(Self::Processed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Descriptor of one sub-file of an uploaded asset
///
/// The part list is fixed at record creation; individual parts never
/// change afterwards.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Part {
    /// Object name within the owner's storage prefix
    pub name: String,
    /// Size in bytes
    pub size: u64,
    /// MIME type, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_id_roundtrip() {
        let id = RecordId::new();
        let parsed = RecordId::parse(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_tag_normalization() {
        let tag = Tag::new("  SciFi ").unwrap();
        assert_eq!(tag.as_str(), "scifi");
        assert_eq!(Tag::new("SCIFI").unwrap(), tag);
        assert_eq!(Tag::new("   "), Err(TagError::Empty));
        assert_eq!(Tag::new("x".repeat(65)), Err(TagError::TooLong));
    }

    #[test]
    fn test_status_transitions() {
        assert!(Status::Pending.can_advance_to(Status::Uploaded));
        assert!(Status::Uploaded.can_advance_to(Status::Processing));
        assert!(Status::Processing.can_advance_to(Status::Processed));
        assert!(Status::Processing.can_advance_to(Status::Failed));
        // Reprocessing re-enters from terminal states only
        assert!(Status::Processed.can_advance_to(Status::Processing));
        assert!(Status::Failed.can_advance_to(Status::Processing));
        assert!(!Status::Pending.can_advance_to(Status::Processed));
        assert!(!Status::Processed.can_advance_to(Status::Uploaded));
    }

    #[test]
    fn test_status_string_roundtrip() {
        for status in [
            Status::Pending,
            Status::Uploaded,
            Status::Processing,
            Status::Processed,
            Status::Failed,
        ] {
            assert_eq!(Status::from_str_opt(status.as_str()), Some(status));
        }
        assert_eq!(Status::from_str_opt("bogus"), None);
    }
}
