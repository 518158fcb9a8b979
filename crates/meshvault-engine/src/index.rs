//! Index Maintainer
//!
//! Computes which secondary indices a record belongs to as a pure
//! function of record state, and renders membership deltas into pipeline
//! commands. Never performs I/O; the caller applies the commands in the
//! same atomic batch as the primary-record write.

use meshvault_common::{OwnerId, Record, Tag};
use meshvault_store::Pipeline;
use std::collections::BTreeSet;

/// One secondary index
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IndexKey {
    /// All listed records
    Global,
    /// Listed records of one owner
    Owner(OwnerId),
    /// Publicly listed records
    Public,
    /// Publicly listed records of one owner
    PublicOwner(OwnerId),
    /// Temporary records
    Temporary,
    /// Listed records carrying one tag
    Tag(Tag),
    /// Listed records sorted by upload time
    TimeGlobal,
    /// Per-owner upload-time index
    TimeOwner(OwnerId),
    /// Public upload-time index
    TimePublic,
    /// Per-owner public upload-time index
    TimePublicOwner(OwnerId),
}

impl IndexKey {
    /// Store key the index lives at
    #[must_use]
    pub fn key(&self) -> String {
        match self {
            Self::Global => "idx:global".into(),
            Self::Owner(o) => format!("idx:owner:{o}"),
            Self::Public => "idx:public".into(),
            Self::PublicOwner(o) => format!("idx:public:owner:{o}"),
            Self::Temporary => "idx:temporary".into(),
            Self::Tag(t) => format!("idx:tag:{t}"),
            Self::TimeGlobal => "idx:time:global".into(),
            Self::TimeOwner(o) => format!("idx:time:owner:{o}"),
            Self::TimePublic => "idx:time:public".into(),
            Self::TimePublicOwner(o) => format!("idx:time:public:owner:{o}"),
        }
    }

    /// Whether the index is a sorted set scored by `uploaded_at`
    #[must_use]
    pub const fn is_sorted(&self) -> bool {
        matches!(
            self,
            Self::TimeGlobal | Self::TimeOwner(_) | Self::TimePublic | Self::TimePublicOwner(_)
        )
    }
}

/// Index memberships a record holds right now
///
/// A record is in at most one of {listed, temporary, none}: unlisted
/// records are in no index, temporary records only in the temporary
/// index, listed records in the general (and possibly public) indices.
#[must_use]
pub fn membership(record: &Record) -> BTreeSet<IndexKey> {
    let mut keys = BTreeSet::new();
    if record.unlisted {
        return keys;
    }
    if record.temporary {
        keys.insert(IndexKey::Temporary);
        return keys;
    }
    keys.insert(IndexKey::Global);
    keys.insert(IndexKey::Owner(record.owner.clone()));
    keys.insert(IndexKey::TimeGlobal);
    keys.insert(IndexKey::TimeOwner(record.owner.clone()));
    for tag in &record.tags {
        keys.insert(IndexKey::Tag(tag.clone()));
    }
    if record.public && !record.direct_only {
        keys.insert(IndexKey::Public);
        keys.insert(IndexKey::PublicOwner(record.owner.clone()));
        keys.insert(IndexKey::TimePublic);
        keys.insert(IndexKey::TimePublicOwner(record.owner.clone()));
    }
    keys
}

/// Every index that could contain the record, regardless of flags
///
/// Used on deletion so no orphaned entry survives.
#[must_use]
pub fn removal_universe(record: &Record) -> BTreeSet<IndexKey> {
    let mut keys = BTreeSet::from([
        IndexKey::Global,
        IndexKey::Owner(record.owner.clone()),
        IndexKey::Public,
        IndexKey::PublicOwner(record.owner.clone()),
        IndexKey::Temporary,
        IndexKey::TimeGlobal,
        IndexKey::TimeOwner(record.owner.clone()),
        IndexKey::TimePublic,
        IndexKey::TimePublicOwner(record.owner.clone()),
    ]);
    for tag in &record.tags {
        keys.insert(IndexKey::Tag(tag.clone()));
    }
    keys
}

/// Membership changes implied by one mutation
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MembershipDelta {
    pub add: Vec<IndexKey>,
    pub remove: Vec<IndexKey>,
}

impl MembershipDelta {
    /// Whether the mutation changes no memberships
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }

    /// Every index touched by the delta
    pub fn touched(&self) -> impl Iterator<Item = &IndexKey> {
        self.add.iter().chain(self.remove.iter())
    }
}

/// Delta between two snapshots of a record
///
/// `old = None` covers creation (add-only); `new = None` covers hard
/// removal (the old record's full removal universe). A changed
/// `uploaded_at` re-adds the sorted indices so their scores follow.
#[must_use]
pub fn membership_delta(old: Option<&Record>, new: Option<&Record>) -> MembershipDelta {
    match (old, new) {
        (None, None) => MembershipDelta::default(),
        (None, Some(n)) => MembershipDelta {
            add: membership(n).into_iter().collect(),
            remove: Vec::new(),
        },
        (Some(o), None) => MembershipDelta {
            add: Vec::new(),
            remove: removal_universe(o).into_iter().collect(),
        },
        (Some(o), Some(n)) => {
            let before = membership(o);
            let after = membership(n);
            let mut add: Vec<IndexKey> = after.difference(&before).cloned().collect();
            if o.uploaded_at != n.uploaded_at {
                for key in after.intersection(&before) {
                    if key.is_sorted() {
                        add.push(key.clone());
                    }
                }
            }
            MembershipDelta {
                add,
                remove: before.difference(&after).cloned().collect(),
            }
        }
    }
}

/// Render a delta into pipeline commands for `record`
pub fn apply_delta(pipeline: &mut Pipeline, record: &Record, delta: &MembershipDelta) {
    let member = record.id.to_string();
    for key in &delta.add {
        if key.is_sorted() {
            pipeline.sorted_add(key.key(), record.uploaded_at, member.clone());
        } else {
            pipeline.set_add(key.key(), member.clone());
        }
    }
    for key in &delta.remove {
        if key.is_sorted() {
            pipeline.sorted_rem(key.key(), member.clone());
        } else {
            pipeline.set_rem(key.key(), member.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshvault_common::{OwnerId, RecordId, Tag};

    fn listed_record() -> Record {
        let mut r = Record::new(RecordId::new(), OwnerId::new("alice"), Vec::new(), 1000);
        r.tags.insert(Tag::new("mech").unwrap());
        r
    }

    #[test]
    fn test_listed_membership() {
        let r = listed_record();
        let keys = membership(&r);
        assert!(keys.contains(&IndexKey::Global));
        assert!(keys.contains(&IndexKey::Owner(r.owner.clone())));
        assert!(keys.contains(&IndexKey::Tag(Tag::new("mech").unwrap())));
        assert!(keys.contains(&IndexKey::TimeGlobal));
        assert!(!keys.contains(&IndexKey::Public));
        assert!(!keys.contains(&IndexKey::Temporary));
    }

    #[test]
    fn test_public_requires_not_direct_only() {
        let mut r = listed_record();
        r.public = true;
        assert!(membership(&r).contains(&IndexKey::Public));
        r.direct_only = true;
        assert!(!membership(&r).contains(&IndexKey::Public));
    }

    #[test]
    fn test_temporary_and_unlisted_are_exclusive_universes() {
        let mut r = listed_record();
        r.temporary = true;
        assert_eq!(membership(&r), BTreeSet::from([IndexKey::Temporary]));
        r.unlisted = true;
        assert!(membership(&r).is_empty());
    }

    #[test]
    fn test_delta_on_publish() {
        let before = listed_record();
        let mut after = before.clone();
        after.public = true;
        let delta = membership_delta(Some(&before), Some(&after));
        assert!(delta.add.contains(&IndexKey::Public));
        assert!(delta.add.contains(&IndexKey::TimePublicOwner(after.owner.clone())));
        assert!(delta.remove.is_empty());
    }

    #[test]
    fn test_delta_on_removal_covers_universe() {
        let r = listed_record();
        let delta = membership_delta(Some(&r), None);
        assert!(delta.add.is_empty());
        let removed: BTreeSet<_> = delta.remove.iter().cloned().collect();
        assert_eq!(removed, removal_universe(&r));
        assert!(removed.contains(&IndexKey::Temporary));
        assert!(removed.contains(&IndexKey::Public));
    }

    #[test]
    fn test_uploaded_at_change_readds_sorted_indices() {
        let before = listed_record();
        let mut after = before.clone();
        after.uploaded_at += 500;
        let delta = membership_delta(Some(&before), Some(&after));
        assert!(delta.remove.is_empty());
        assert!(delta.add.iter().all(IndexKey::is_sorted));
        assert!(delta.add.contains(&IndexKey::TimeGlobal));
    }

    #[test]
    fn test_apply_delta_renders_commands() {
        let r = listed_record();
        let delta = membership_delta(None, Some(&r));
        let mut p = Pipeline::new();
        apply_delta(&mut p, &r, &delta);
        assert_eq!(p.len(), delta.add.len());
    }
}
