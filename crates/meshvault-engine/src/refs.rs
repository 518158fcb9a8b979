//! Reference Integrity Checker
//!
//! Validates and maintains the bidirectional reference graph between
//! records. Reference chains are single-level: a record holding
//! references cannot itself be referenced. Verification enumerates every
//! offending id; application emits the back-index and `is_referenced`
//! transitions into the caller's pipeline.

use crate::keys;
use meshvault_common::{Error, Issue, IssueReason, OwnerId, Record, RecordId, Result};
use meshvault_store::Pipeline;
use std::collections::{BTreeSet, HashMap};

/// What the checker needs to know about one reference target
#[derive(Clone, Debug)]
pub struct RefTarget {
    pub owner: OwnerId,
    pub immutable: bool,
    pub temporary: bool,
    pub unlisted: bool,
    pub has_references: bool,
    /// Current back-index of the target
    pub referenced_by: BTreeSet<RecordId>,
}

impl RefTarget {
    /// Build from a fetched record and its back-index members
    #[must_use]
    pub fn from_record(record: &Record, referenced_by: BTreeSet<RecordId>) -> Self {
        Self {
            owner: record.owner.clone(),
            immutable: record.immutable,
            temporary: record.temporary,
            unlisted: record.unlisted,
            has_references: record.has_references,
            referenced_by,
        }
    }
}

/// Validate `new_refs` as the record's next reference list
///
/// Every offending id is reported; cross-owner references pass only
/// under the administrative override, which also covers the immutability
/// allow-list.
pub fn verify(
    record: &Record,
    targets: &HashMap<RecordId, RefTarget>,
    new_refs: &[RecordId],
    admin_override: bool,
) -> Result<()> {
    let mut issues = Vec::new();
    let mut seen = BTreeSet::new();
    for id in new_refs {
        if !seen.insert(*id) || *id == record.id {
            issues.push(Issue::new(id.to_string(), IssueReason::InvalidFieldValue));
            continue;
        }
        let Some(target) = targets.get(id) else {
            issues.push(Issue::new(id.to_string(), IssueReason::MissingTarget));
            continue;
        };
        if target.owner != record.owner && !admin_override {
            issues.push(Issue::new(id.to_string(), IssueReason::InvalidReferenceOwner));
        }
        if target
            .referenced_by
            .iter()
            .any(|referrer| *referrer != record.id)
        {
            issues.push(Issue::new(id.to_string(), IssueReason::AlreadyHasReference));
        }
        if target.temporary || target.unlisted {
            issues.push(Issue::new(id.to_string(), IssueReason::SpecialType));
        }
        if target.immutable && !admin_override {
            issues.push(Issue::new(id.to_string(), IssueReason::Immutable));
        }
        if target.has_references {
            issues.push(Issue::new(id.to_string(), IssueReason::HasChildReferences));
        }
    }
    if issues.is_empty() {
        Ok(())
    } else {
        Err(Error::Validation(issues))
    }
}

/// Emit back-index and `is_referenced` transitions for a reference change
///
/// `is_referenced` is set when a target's back-index becomes non-empty
/// and cleared when the last referrer leaves. Commands land in the same
/// pipeline as the rest of the mutation.
pub fn apply(
    new: &Record,
    old: Option<&Record>,
    targets: &HashMap<RecordId, RefTarget>,
    pipeline: &mut Pipeline,
) {
    let before: BTreeSet<RecordId> = old.map(|o| o.references.iter().copied().collect()).unwrap_or_default();
    let after: BTreeSet<RecordId> = new.references.iter().copied().collect();
    let member = new.id.to_string();

    for target_id in after.difference(&before) {
        pipeline.set_add(keys::backrefs(*target_id), member.clone());
        pipeline.hash_set(keys::record(*target_id), "is_referenced", "1");
    }
    for target_id in before.difference(&after) {
        pipeline.set_rem(keys::backrefs(*target_id), member.clone());
        let becomes_empty = targets
            .get(target_id)
            .is_none_or(|t| t.referenced_by.iter().all(|r| *r == new.id));
        if becomes_empty {
            pipeline.hash_set(keys::record(*target_id), "is_referenced", "0");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshvault_common::Part;

    fn record(owner: &str) -> Record {
        Record::new(RecordId::new(), OwnerId::new(owner), Vec::<Part>::new(), 1000)
    }

    fn target_for(record: &Record) -> RefTarget {
        RefTarget::from_record(record, BTreeSet::new())
    }

    #[test]
    fn test_verify_accepts_clean_target() {
        let holder = record("alice");
        let target = record("alice");
        let targets = HashMap::from([(target.id, target_for(&target))]);
        assert!(verify(&holder, &targets, &[target.id], false).is_ok());
    }

    #[test]
    fn test_verify_rejects_cross_owner_without_override() {
        let holder = record("alice");
        let target = record("bob");
        let targets = HashMap::from([(target.id, target_for(&target))]);
        let err = verify(&holder, &targets, &[target.id], false).unwrap_err();
        assert_eq!(err.issues()[0].reason, IssueReason::InvalidReferenceOwner);
        assert!(verify(&holder, &targets, &[target.id], true).is_ok());
    }

    #[test]
    fn test_verify_rejects_already_referenced() {
        let holder = record("alice");
        let target = record("alice");
        let other = RecordId::new();
        let info = RefTarget::from_record(&target, BTreeSet::from([other]));
        let targets = HashMap::from([(target.id, info)]);
        let err = verify(&holder, &targets, &[target.id], false).unwrap_err();
        assert_eq!(err.issues()[0].reason, IssueReason::AlreadyHasReference);
    }

    #[test]
    fn test_verify_allows_re_reference_by_same_holder() {
        let holder = record("alice");
        let target = record("alice");
        let info = RefTarget::from_record(&target, BTreeSet::from([holder.id]));
        let targets = HashMap::from([(target.id, info)]);
        assert!(verify(&holder, &targets, &[target.id], false).is_ok());
    }

    #[test]
    fn test_verify_enumerates_every_offender() {
        let holder = record("alice");
        let mut immutable_target = record("alice");
        immutable_target.immutable = true;
        let mut special = record("alice");
        special.temporary = true;
        let missing = RecordId::new();
        let targets = HashMap::from([
            (immutable_target.id, target_for(&immutable_target)),
            (special.id, target_for(&special)),
        ]);
        let err = verify(
            &holder,
            &targets,
            &[immutable_target.id, special.id, missing],
            false,
        )
        .unwrap_err();
        let reasons: Vec<IssueReason> = err.issues().iter().map(|i| i.reason).collect();
        assert!(reasons.contains(&IssueReason::Immutable));
        assert!(reasons.contains(&IssueReason::SpecialType));
        assert!(reasons.contains(&IssueReason::MissingTarget));
    }

    #[test]
    fn test_verify_rejects_child_references_and_self() {
        let holder = record("alice");
        let mut parent = record("alice");
        parent.has_references = true;
        let targets = HashMap::from([(parent.id, target_for(&parent))]);
        let err = verify(&holder, &targets, &[parent.id], false).unwrap_err();
        assert_eq!(err.issues()[0].reason, IssueReason::HasChildReferences);

        let err = verify(&holder, &targets, &[holder.id], false).unwrap_err();
        assert_eq!(err.issues()[0].reason, IssueReason::InvalidFieldValue);
    }

    #[test]
    fn test_apply_sets_and_clears_backrefs() {
        let target = record("alice");
        let mut before = record("alice");
        before.references = vec![target.id];
        before.has_references = true;
        let mut after = before.clone();
        after.references.clear();

        let info = RefTarget::from_record(&target, BTreeSet::from([before.id]));
        let targets = HashMap::from([(target.id, info)]);
        let mut p = Pipeline::new();
        apply(&after, Some(&before), &targets, &mut p);

        let cmds = p.into_commands();
        // Removal of the only referrer clears is_referenced
        assert!(cmds.iter().any(|c| matches!(
            c,
            meshvault_store::Command::SetRem { key, .. } if key == &keys::backrefs(target.id)
        )));
        assert!(cmds.iter().any(|c| matches!(
            c,
            meshvault_store::Command::HashSet { field, value, .. }
                if field == "is_referenced" && value == "0"
        )));
    }
}
