//! The log: an append-only op sequence with child logs.

use binnacle_types::{InitId, ProfileId};
use serde::{Deserialize, Serialize};

use crate::op::{Op, OpModel};

/// An append-only ordered sequence of [`Op`]s plus zero or more child logs.
///
/// A log is a rose-tree node: a user log holds dataset logs, a journal holds
/// user logs. The log's identity is the hash of its first op, and every op in
/// a log shares that first op's author.
///
/// Construction goes through [`Log::new`] and decode validation, so a live
/// log always holds at least one op.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Log {
    /// Ordered operations. Never empty.
    pub ops: Vec<Op>,
    /// Child logs in insertion order.
    pub logs: Vec<Log>,
}

impl Log {
    /// Create a log from its first op.
    pub fn new(first: Op) -> Self {
        Self {
            ops: vec![first],
            logs: Vec::new(),
        }
    }

    /// The log's stable identifier: the hash of its first op.
    pub fn init_id(&self) -> InitId {
        self.ops.first().expect("log holds at least one op").hash()
    }

    /// The log's author: the author of its first op.
    pub fn author_id(&self) -> ProfileId {
        self.ops.first().expect("log holds at least one op").author_id
    }

    /// The log's current name: the most recent op that carried one.
    pub fn name(&self) -> &str {
        self.ops
            .iter()
            .rev()
            .find(|op| !op.name.is_empty())
            .map(|op| op.name.as_str())
            .unwrap_or_default()
    }

    /// Whether the most recent op marks this log deleted.
    pub fn is_deleted(&self) -> bool {
        self.ops
            .last()
            .is_some_and(|op| op.model == OpModel::Delete)
    }

    /// Append an op.
    pub fn append(&mut self, op: Op) {
        self.ops.push(op);
    }

    /// Attach a child log.
    pub fn add_child(&mut self, child: Log) {
        self.logs.push(child);
    }

    /// Find a direct child by its identifier.
    pub fn child(&self, id: InitId) -> Option<&Log> {
        self.logs.iter().find(|l| l.init_id() == id)
    }

    /// Find a direct child by its identifier, mutably.
    pub fn child_mut(&mut self, id: InitId) -> Option<&mut Log> {
        self.logs.iter_mut().find(|l| l.init_id() == id)
    }

    /// Detach and return a direct child by its identifier.
    pub fn remove_child(&mut self, id: InitId) -> Option<Log> {
        let pos = self.logs.iter().position(|l| l.init_id() == id)?;
        Some(self.logs.remove(pos))
    }

    /// Save ops in append order, oldest first.
    pub fn saves(&self) -> impl Iterator<Item = &Op> {
        self.ops.iter().filter(|op| op.model == OpModel::VersionSave)
    }

    /// True iff every op in this log and its descendants was authored by
    /// `author`: the binding checked before any foreign log is merged.
    pub fn authored_by(&self, author: ProfileId) -> bool {
        self.ops.iter().all(|op| op.author_id == author)
            && self.logs.iter().all(|l| l.authored_by(author))
    }

    /// True iff `prior`'s op sequence is a prefix of this log's op sequence.
    ///
    /// This is the monotonic-merge predicate: an incoming log may replace a
    /// local copy only when it extends it. Equal sequences extend trivially.
    pub fn extends(&self, prior: &Log) -> bool {
        self.ops.len() >= prior.ops.len() && self.ops[..prior.ops.len()] == prior.ops[..]
    }

    /// Sort children (recursively) by [`InitId`] so identical trees encode to
    /// identical bytes regardless of insertion order.
    pub fn canonicalize(&mut self) {
        for child in &mut self.logs {
            child.canonicalize();
        }
        self.logs.sort_by_key(Log::init_id);
    }

    /// Validate the non-empty invariant after decoding.
    pub(crate) fn validate(&self) -> bool {
        !self.ops.is_empty() && self.logs.iter().all(Log::validate)
    }
}
