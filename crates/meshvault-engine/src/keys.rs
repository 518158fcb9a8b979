//! Store key layout
//!
//! Every store key the engine reads or writes is rendered here.

use meshvault_common::{OwnerId, RecordId};

/// Prefix of primary record keys, used by store procedures to resolve a
/// candidate id into its record key
pub const RECORD_PREFIX: &str = "record:";

/// Primary record hash
#[must_use]
pub fn record(id: RecordId) -> String {
    format!("{RECORD_PREFIX}{id}")
}

/// Per-owner alias pointer table (hash: alias -> id)
#[must_use]
pub fn alias_table(owner: &OwnerId) -> String {
    format!("alias:{owner}")
}

/// Reference back-index (set of referencing ids)
#[must_use]
pub fn backrefs(id: RecordId) -> String {
    format!("backrefs:{id}")
}

/// Mutation lock covering one record
#[must_use]
pub fn record_lock(id: RecordId) -> String {
    format!("lock:record:{id}")
}

/// Object name of one part within the owner's storage prefix
#[must_use]
pub fn part_object(owner: &OwnerId, id: RecordId, part_name: &str) -> String {
    format!("{owner}/{id}/{part_name}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshvault_common::OwnerId;

    #[test]
    fn test_key_shapes() {
        let id = RecordId::new();
        assert_eq!(record(id), format!("record:{id}"));
        assert!(record(id).starts_with(RECORD_PREFIX));
        assert_eq!(alias_table(&OwnerId::new("alice")), "alias:alice");
        assert_eq!(backrefs(id), format!("backrefs:{id}"));
    }
}
