//! Error types for Meshvault
//!
//! One stable, enumerable error kind per user-visible failure class.
//! Validation failures carry one structured [`Issue`] per offending field
//! or reference id so bulk corrections are diagnosable in one pass.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Common result type for Meshvault operations
pub type Result<T> = std::result::Result<T, Error>;

/// Machine-checkable reason attached to a validation [`Issue`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Error)]
#[serde(rename_all = "snake_case")]
pub enum IssueReason {
    #[error("invalid reference owner")]
    InvalidReferenceOwner,

    #[error("already has reference")]
    AlreadyHasReference,

    #[error("should not be special type")]
    SpecialType,

    #[error("should not be immutable")]
    Immutable,

    #[error("should not have child references")]
    HasChildReferences,

    #[error("missing reference target")]
    MissingTarget,

    #[error("invalid time range")]
    InvalidTimeRange,

    #[error("invalid field value")]
    InvalidFieldValue,
}

/// One offending field or reference id within a validation error
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    /// Field name or reference id the issue applies to
    pub subject: String,
    /// Why the subject was rejected
    pub reason: IssueReason,
}

impl Issue {
    /// Create a new issue
    pub fn new(subject: impl Into<String>, reason: IssueReason) -> Self {
        Self {
            subject: subject.into(),
            reason,
        }
    }
}

fn format_issues(issues: &[Issue]) -> String {
    issues
        .iter()
        .map(|i| format!("{}: {}", i.subject, i.reason))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Common error type for the metadata engine
#[derive(Debug, Error)]
pub enum Error {
    /// Record or index candidate absent
    #[error("not found: {0}")]
    NotFound(String),

    /// Ownership or visibility violation
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Alias already taken, double-processing, or lock contention
    #[error("conflict: {0}")]
    Conflict(String),

    /// State-machine or immutability violation
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// Malformed filter or reference graph; one issue per offender
    #[error("validation failed: {}", format_issues(.0))]
    Validation(Vec<Issue>),

    /// Unsupported filter combination on the active query backend
    #[error("not implemented: {0}")]
    NotImplemented(String),

    /// Store pipeline or decode failure
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a forbidden error
    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    /// Create a conflict error
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Create a precondition failed error
    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::PreconditionFailed(msg.into())
    }

    /// Create a validation error from a single issue
    pub fn validation(subject: impl Into<String>, reason: IssueReason) -> Self {
        Self::Validation(vec![Issue::new(subject, reason)])
    }

    /// Create a not implemented error
    pub fn not_implemented(feature: impl Into<String>) -> Self {
        Self::NotImplemented(feature.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Check if this is a not found error
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Check if this is a conflict error
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Issues carried by a validation error, empty otherwise
    #[must_use]
    pub fn issues(&self) -> &[Issue] {
        match self {
            Self::Validation(issues) => issues,
            _ => &[],
        }
    }

    /// Get HTTP status code for API compatibility
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::Forbidden(_) => 403,
            Self::Conflict(_) => 409,
            Self::PreconditionFailed(_) => 412,
            Self::Validation(_) => 422,
            Self::NotImplemented(_) => 501,
            Self::Internal(_) => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_not_found() {
        assert!(Error::not_found("record abc").is_not_found());
        assert!(!Error::conflict("alias taken").is_not_found());
    }

    #[test]
    fn test_error_http_status() {
        assert_eq!(Error::not_found("x").http_status_code(), 404);
        assert_eq!(Error::forbidden("x").http_status_code(), 403);
        assert_eq!(Error::conflict("x").http_status_code(), 409);
        assert_eq!(Error::precondition("x").http_status_code(), 412);
        assert_eq!(Error::internal("x").http_status_code(), 500);
    }

    #[test]
    fn test_validation_enumerates_issues() {
        let err = Error::Validation(vec![
            Issue::new("a", IssueReason::AlreadyHasReference),
            Issue::new("b", IssueReason::Immutable),
        ]);
        assert_eq!(err.issues().len(), 2);
        assert_eq!(err.http_status_code(), 422);
        let msg = err.to_string();
        assert!(msg.contains("a: already has reference"));
        assert!(msg.contains("b: should not be immutable"));
    }
}
