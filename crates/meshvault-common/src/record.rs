//! Asset record model and its flat-hash serialization boundary
//!
//! A [`Record`] is stored as a flat hash of string fields. Scalars are
//! encoded as plain strings (`1`/`0` for booleans); `tags`, `parts` and
//! `references` are JSON-encoded within their hash field. Every field is
//! addressed through this one typed boundary.

use crate::error::Error;
use crate::types::{OwnerId, Part, RecordId, Status, Tag};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Flat string-to-string hash form of a record
pub type RecordHash = BTreeMap<String, String>;

/// Error decoding a record from its hash form
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("missing field '{0}'")]
    MissingField(&'static str),
    #[error("invalid value for field '{field}': {value}")]
    InvalidValue { field: &'static str, value: String },
    #[error("json error in field '{field}': {source}")]
    Json {
        field: &'static str,
        source: serde_json::Error,
    },
}

impl From<DecodeError> for Error {
    fn from(e: DecodeError) -> Self {
        Self::internal(format!("record decode: {e}"))
    }
}

/// Metadata record for one uploaded asset
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Unique identifier
    pub id: RecordId,
    /// Owning account
    pub owner: OwnerId,
    /// Upload/processing status
    pub status: Status,
    /// Visible in public listings (subject to `direct_only`)
    pub public: bool,
    /// Reachable by direct link only; excludes the record from public indices
    pub direct_only: bool,
    /// Excluded from every listing index
    pub unlisted: bool,
    /// Short-lived record, listed only in the temporary index
    pub temporary: bool,
    /// Case-normalized tags
    pub tags: BTreeSet<Tag>,
    /// Upload completion time, unix millis
    pub uploaded_at: i64,
    /// Upload initiation time, unix millis
    pub started_at: i64,
    /// Total content size in bytes
    pub content_length: u64,
    /// Per-owner unique alias, when assigned
    pub alias: Option<String>,
    /// Ordered sub-file descriptors, fixed at creation
    pub parts: Vec<Part>,
    /// Records this record points to
    pub references: Vec<RecordId>,
    /// Derived: `references` is non-empty
    pub has_references: bool,
    /// Derived: some other record points here
    pub is_referenced: bool,
    /// One-way latch forbidding further mutation outside the allow-list
    pub immutable: bool,
    /// Bumped only on content-affecting changes
    pub version: u64,
}

impl Record {
    /// Create a fresh `Pending` record with default visibility
    #[must_use]
    pub fn new(id: RecordId, owner: OwnerId, parts: Vec<Part>, now_ms: i64) -> Self {
        let content_length = parts.iter().map(|p| p.size).sum();
        Self {
            id,
            owner,
            status: Status::Pending,
            public: false,
            direct_only: false,
            unlisted: false,
            temporary: false,
            tags: BTreeSet::new(),
            uploaded_at: now_ms,
            started_at: now_ms,
            content_length,
            alias: None,
            parts,
            references: Vec::new(),
            has_references: false,
            is_referenced: false,
            immutable: false,
            version: 0,
        }
    }

    /// Whether the record belongs to the general listing indices
    #[must_use]
    pub const fn is_listed(&self) -> bool {
        !self.unlisted && !self.temporary
    }

    /// Whether the record belongs to the public indices
    #[must_use]
    pub const fn is_publicly_listed(&self) -> bool {
        self.is_listed() && self.public && !self.direct_only
    }

    /// Encode into the flat hash form
    #[must_use]
    pub fn to_hash(&self) -> RecordHash {
        let mut h = RecordHash::new();
        h.insert("id".into(), self.id.to_string());
        h.insert("owner".into(), self.owner.to_string());
        h.insert("status".into(), self.status.as_str().into());
        h.insert("public".into(), bool_str(self.public).into());
        h.insert("direct_only".into(), bool_str(self.direct_only).into());
        h.insert("unlisted".into(), bool_str(self.unlisted).into());
        h.insert("temporary".into(), bool_str(self.temporary).into());
        // serialization of these collections cannot fail
        h.insert("tags".into(), serde_json::to_string(&self.tags).unwrap_or_default());
        h.insert("uploaded_at".into(), self.uploaded_at.to_string());
        h.insert("started_at".into(), self.started_at.to_string());
        h.insert("content_length".into(), self.content_length.to_string());
        if let Some(alias) = &self.alias {
            h.insert("alias".into(), alias.clone());
        }
        h.insert("parts".into(), serde_json::to_string(&self.parts).unwrap_or_default());
        h.insert(
            "references".into(),
            serde_json::to_string(&self.references).unwrap_or_default(),
        );
        h.insert(
            "has_references".into(),
            bool_str(self.has_references).into(),
        );
        h.insert("is_referenced".into(), bool_str(self.is_referenced).into());
        h.insert("immutable".into(), bool_str(self.immutable).into());
        h.insert("version".into(), self.version.to_string());
        h
    }

    /// Decode from the flat hash form
    pub fn from_hash(h: &RecordHash) -> Result<Self, DecodeError> {
        Ok(Self {
            id: RecordId::parse(req(h, "id")?).map_err(|_| invalid(h, "id"))?,
            owner: OwnerId::new(req(h, "owner")?),
            status: Status::from_str_opt(req(h, "status")?)
                .ok_or_else(|| invalid(h, "status"))?,
            public: parse_bool(h, "public")?,
            direct_only: parse_bool(h, "direct_only")?,
            unlisted: parse_bool(h, "unlisted")?,
            temporary: parse_bool(h, "temporary")?,
            tags: parse_json(h, "tags")?,
            uploaded_at: parse_num(h, "uploaded_at")?,
            started_at: parse_num(h, "started_at")?,
            content_length: parse_num(h, "content_length")?,
            alias: h.get("alias").cloned(),
            parts: parse_json(h, "parts")?,
            references: parse_json(h, "references")?,
            has_references: parse_bool(h, "has_references")?,
            is_referenced: parse_bool(h, "is_referenced")?,
            immutable: parse_bool(h, "immutable")?,
            version: parse_num(h, "version")?,
        })
    }
}

const fn bool_str(b: bool) -> &'static str {
    if b { "1" } else { "0" }
}

fn req<'a>(h: &'a RecordHash, field: &'static str) -> Result<&'a str, DecodeError> {
    h.get(field)
        .map(String::as_str)
        .ok_or(DecodeError::MissingField(field))
}

fn invalid(h: &RecordHash, field: &'static str) -> DecodeError {
    DecodeError::InvalidValue {
        field,
        value: h.get(field).cloned().unwrap_or_default(),
    }
}

fn parse_bool(h: &RecordHash, field: &'static str) -> Result<bool, DecodeError> {
    match req(h, field)? {
        "1" => Ok(true),
        "0" => Ok(false),
        _ => Err(invalid(h, field)),
    }
}

fn parse_num<T: std::str::FromStr>(h: &RecordHash, field: &'static str) -> Result<T, DecodeError> {
    req(h, field)?.parse().map_err(|_| invalid(h, field))
}

fn parse_json<T: serde::de::DeserializeOwned>(
    h: &RecordHash,
    field: &'static str,
) -> Result<T, DecodeError> {
    serde_json::from_str(req(h, field)?).map_err(|source| DecodeError::Json { field, source })
}

/// Field projection applied when fetching records
///
/// `pick` restricts the result to the named fields; `omit` drops the
/// named fields. When a field appears in both, `pick` wins.
#[derive(Clone, Debug, Default)]
pub struct FieldFilter {
    pick: Option<BTreeSet<String>>,
    omit: BTreeSet<String>,
}

impl FieldFilter {
    /// Keep only the named fields
    pub fn pick<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            pick: Some(fields.into_iter().map(Into::into).collect()),
            omit: BTreeSet::new(),
        }
    }

    /// Keep all but the named fields
    pub fn omit<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            pick: None,
            omit: fields.into_iter().map(Into::into).collect(),
        }
    }

    /// Add omitted fields to an existing filter
    #[must_use]
    pub fn and_omit<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.omit.extend(fields.into_iter().map(Into::into));
        self
    }

    /// Whether the filter passes every field through unchanged
    #[must_use]
    pub fn is_all(&self) -> bool {
        self.pick.is_none() && self.omit.is_empty()
    }

    /// Whether the named field survives the projection
    #[must_use]
    pub fn allows(&self, field: &str) -> bool {
        if let Some(pick) = &self.pick {
            // pick takes precedence over omit for the same field
            return pick.contains(field);
        }
        !self.omit.contains(field)
    }

    /// Project a record hash
    #[must_use]
    pub fn apply(&self, hash: RecordHash) -> RecordHash {
        if self.is_all() {
            return hash;
        }
        hash.into_iter().filter(|(k, _)| self.allows(k)).collect()
    }
}
