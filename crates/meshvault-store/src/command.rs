//! Pipeline command model
//!
//! One mutation's primary-record write and every index-membership delta
//! are expressed as a list of [`Command`]s dispatched to the store in a
//! single atomic batch. Commands are idempotent at the field level so a
//! partially-applied batch can be retried whole.

use meshvault_common::RecordHash;

/// One store command within a pipelined batch
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// Replace every field of a hash record
    HashSetAll { key: String, fields: RecordHash },
    /// Set one hash field
    HashSet {
        key: String,
        field: String,
        value: String,
    },
    /// Delete one hash field
    HashDel { key: String, field: String },
    /// Delete a key of any type
    Del { key: String },
    /// Add a member to a set
    SetAdd { key: String, member: String },
    /// Remove a member from a set
    SetRem { key: String, member: String },
    /// Add a scored member to a sorted set
    SortedAdd {
        key: String,
        score: i64,
        member: String,
    },
    /// Remove a member from a sorted set
    SortedRem { key: String, member: String },
}

/// Builder for one atomic command batch
#[derive(Clone, Debug, Default)]
pub struct Pipeline {
    commands: Vec<Command>,
}

impl Pipeline {
    /// Create an empty pipeline
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of queued commands
    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Whether no commands are queued
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Queue a raw command
    pub fn push(&mut self, command: Command) {
        self.commands.push(command);
    }

    /// Queue a full hash write
    pub fn hash_set_all(&mut self, key: impl Into<String>, fields: RecordHash) {
        self.commands.push(Command::HashSetAll {
            key: key.into(),
            fields,
        });
    }

    /// Queue a single hash field write
    pub fn hash_set(
        &mut self,
        key: impl Into<String>,
        field: impl Into<String>,
        value: impl Into<String>,
    ) {
        self.commands.push(Command::HashSet {
            key: key.into(),
            field: field.into(),
            value: value.into(),
        });
    }

    /// Queue a hash field deletion
    pub fn hash_del(&mut self, key: impl Into<String>, field: impl Into<String>) {
        self.commands.push(Command::HashDel {
            key: key.into(),
            field: field.into(),
        });
    }

    /// Queue a key deletion
    pub fn del(&mut self, key: impl Into<String>) {
        self.commands.push(Command::Del { key: key.into() });
    }

    /// Queue a set-member addition
    pub fn set_add(&mut self, key: impl Into<String>, member: impl Into<String>) {
        self.commands.push(Command::SetAdd {
            key: key.into(),
            member: member.into(),
        });
    }

    /// Queue a set-member removal
    pub fn set_rem(&mut self, key: impl Into<String>, member: impl Into<String>) {
        self.commands.push(Command::SetRem {
            key: key.into(),
            member: member.into(),
        });
    }

    /// Queue a sorted-set addition
    pub fn sorted_add(&mut self, key: impl Into<String>, score: i64, member: impl Into<String>) {
        self.commands.push(Command::SortedAdd {
            key: key.into(),
            score,
            member: member.into(),
        });
    }

    /// Queue a sorted-set removal
    pub fn sorted_rem(&mut self, key: impl Into<String>, member: impl Into<String>) {
        self.commands.push(Command::SortedRem {
            key: key.into(),
            member: member.into(),
        });
    }

    /// Consume the builder, yielding the batch
    #[must_use]
    pub fn into_commands(self) -> Vec<Command> {
        self.commands
    }

    /// Borrow the queued commands
    #[must_use]
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_builds_in_order() {
        let mut p = Pipeline::new();
        p.set_add("idx:global", "a");
        p.set_rem("idx:public", "a");
        p.del("cache:x");
        let cmds = p.into_commands();
        assert_eq!(cmds.len(), 3);
        assert!(matches!(cmds[0], Command::SetAdd { .. }));
        assert!(matches!(cmds[2], Command::Del { .. }));
    }
}
