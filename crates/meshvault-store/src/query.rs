//! Query primitives shared between the engine and store procedures
//!
//! Sort criteria, post-filter predicates and the request/response shapes
//! of the store's combined filter+sort+paginate procedure. Fields are
//! addressed through typed enums, never loose strings.

use meshvault_common::RecordHash;
use std::fmt::Write as _;
use std::time::Duration;

/// Sortable record field
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SortField {
    /// Upload completion time
    #[default]
    UploadedAt,
    /// Upload initiation time
    StartedAt,
    /// Total content size
    ContentLength,
    /// Content version counter
    Version,
}

impl SortField {
    /// Hash field the sort value is read from
    #[must_use]
    pub const fn hash_field(self) -> &'static str {
        match self {
            Self::UploadedAt => "uploaded_at",
            Self::StartedAt => "started_at",
            Self::ContentLength => "content_length",
            Self::Version => "version",
        }
    }
}

/// Sort direction
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Direction {
    Asc,
    #[default]
    Desc,
}

impl Direction {
    /// Short form used in cache-key descriptors
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

/// Sort criterion plus direction
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct SortSpec {
    pub by: SortField,
    pub dir: Direction,
}

impl SortSpec {
    /// Canonical descriptor used in result-cache keys
    #[must_use]
    pub fn descriptor(self) -> String {
        format!("{}:{}", self.by.hash_field(), self.dir.as_str())
    }
}

/// Record field usable in a post-filter predicate
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FilterField {
    Owner,
    Status,
    ContentLength,
    Version,
    StartedAt,
}

impl FilterField {
    /// Hash field the predicate is evaluated against
    #[must_use]
    pub const fn hash_field(self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Status => "status",
            Self::ContentLength => "content_length",
            Self::Version => "version",
            Self::StartedAt => "started_at",
        }
    }
}

/// One predicate of a dynamic post-filter
///
/// Post-filters cover properties not captured by set membership, applied
/// server-side after candidate resolution.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum FieldPredicate {
    /// Exact string equality on a field
    Eq { field: FilterField, value: String },
    /// Inclusive numeric range on a field
    Range {
        field: FilterField,
        min: Option<i64>,
        max: Option<i64>,
    },
}

impl FieldPredicate {
    /// Evaluate against a record hash
    #[must_use]
    pub fn matches(&self, hash: &RecordHash) -> bool {
        match self {
            Self::Eq { field, value } => {
                hash.get(field.hash_field()).is_some_and(|v| v == value)
            }
            Self::Range { field, min, max } => {
                let Some(v) = hash.get(field.hash_field()).and_then(|v| v.parse::<i64>().ok())
                else {
                    return false;
                };
                min.is_none_or(|m| v >= m) && max.is_none_or(|m| v <= m)
            }
        }
    }

    fn write_descriptor(&self, out: &mut String) {
        match self {
            Self::Eq { field, value } => {
                let _ = write!(out, "eq:{}={value}", field.hash_field());
            }
            Self::Range { field, min, max } => {
                let _ = write!(
                    out,
                    "range:{}={}..{}",
                    field.hash_field(),
                    min.map_or_else(|| "-".into(), |v| v.to_string()),
                    max.map_or_else(|| "-".into(), |v| v.to_string()),
                );
            }
        }
    }
}

/// Conjunction of post-filter predicates
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PostFilter {
    predicates: Vec<FieldPredicate>,
}

impl PostFilter {
    /// The identity filter, matching every record
    #[must_use]
    pub const fn identity() -> Self {
        Self {
            predicates: Vec::new(),
        }
    }

    /// Build from a predicate list
    #[must_use]
    pub fn new(predicates: Vec<FieldPredicate>) -> Self {
        Self { predicates }
    }

    /// Whether the filter matches every record
    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.predicates.is_empty()
    }

    /// Borrow the predicates
    #[must_use]
    pub fn predicates(&self) -> &[FieldPredicate] {
        &self.predicates
    }

    /// Evaluate the conjunction against a record hash
    #[must_use]
    pub fn matches(&self, hash: &RecordHash) -> bool {
        self.predicates.iter().all(|p| p.matches(hash))
    }

    /// Canonical descriptor used in result-cache keys
    #[must_use]
    pub fn descriptor(&self) -> String {
        if self.is_identity() {
            return "all".into();
        }
        let mut out = String::new();
        for (i, p) in self.predicates.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            p.write_descriptor(&mut out);
        }
        out
    }
}

/// Request for the combined filter+sort+paginate store procedure
#[derive(Clone, Debug)]
pub struct SortPageRequest {
    /// Prefix prepended to a candidate id to form its record key
    pub key_prefix: String,
    /// Sort criterion and direction
    pub sort: SortSpec,
    /// Dynamic post-filter; identity means no filtering
    pub filter: PostFilter,
    /// Caller's current time, unix millis
    pub now_ms: i64,
    /// First result index
    pub offset: u64,
    /// Maximum results returned
    pub limit: u64,
    /// Ephemeral cache lifetime for the filtered-sorted result
    pub result_ttl: Duration,
}

/// Result page of the combined procedure
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SortPage {
    /// Candidate ids for the requested page, in sort order
    pub ids: Vec<String>,
    /// Total candidates after filtering
    pub total: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash_with(field: &str, value: &str) -> RecordHash {
        let mut h = RecordHash::new();
        h.insert(field.into(), value.into());
        h
    }

    #[test]
    fn test_eq_predicate() {
        let p = FieldPredicate::Eq {
            field: FilterField::Status,
            value: "processed".into(),
        };
        assert!(p.matches(&hash_with("status", "processed")));
        assert!(!p.matches(&hash_with("status", "pending")));
        assert!(!p.matches(&RecordHash::new()));
    }

    #[test]
    fn test_range_predicate() {
        let p = FieldPredicate::Range {
            field: FilterField::ContentLength,
            min: Some(100),
            max: Some(200),
        };
        assert!(p.matches(&hash_with("content_length", "150")));
        assert!(!p.matches(&hash_with("content_length", "50")));
        assert!(!p.matches(&hash_with("content_length", "not-a-number")));
    }

    #[test]
    fn test_identity_filter() {
        assert!(PostFilter::identity().is_identity());
        assert!(PostFilter::identity().matches(&RecordHash::new()));
        assert_eq!(PostFilter::identity().descriptor(), "all");
    }

    #[test]
    fn test_descriptor_is_deterministic() {
        let f = PostFilter::new(vec![
            FieldPredicate::Eq {
                field: FilterField::Status,
                value: "processed".into(),
            },
            FieldPredicate::Range {
                field: FilterField::Version,
                min: Some(1),
                max: None,
            },
        ]);
        assert_eq!(f.descriptor(), "eq:status=processed,range:version=1..-");
    }
}
