//! Operation types for the logbook.

use binnacle_types::{InitId, ProfileId};
use serde::{Deserialize, Serialize};

/// What kind of thing an [`Op`] records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpModel {
    /// An author's root log was created.
    UserInit,
    /// A dataset log was created under a user log.
    DatasetInit,
    /// A dataset version was saved.
    VersionSave,
    /// A dataset was renamed.
    Rename,
    /// A dataset was deleted (the log is retained but marked).
    Delete,
}

/// A single operation in a log.
///
/// Ops are immutable once appended. The hash of a log's first op is the
/// log's stable identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Op {
    /// What this op records.
    pub model: OpModel,
    /// Opaque target identifier. For save ops,, the content path of the
    /// saved version.
    pub target: String,
    /// Previous content path for save ops forming a chain. Opaque: preserved
    /// verbatim and never resolved against any store.
    pub prev: String,
    /// Human label at the time of the op (username or dataset name).
    pub name: String,
    /// Stable identifier of the op's author.
    pub author_id: ProfileId,
    /// Nanoseconds since the UNIX epoch, UTC.
    pub timestamp: u64,
    /// Free-form annotation (commit title).
    pub note: String,
    /// Byte size associated with the op, if any.
    pub size: u64,
}

impl Op {
    /// Compute the content hash of this op: `blake3` of its postcard encoding.
    ///
    /// The hash of a log's first op is the log's [`InitId`].
    pub fn hash(&self) -> InitId {
        let bytes = postcard::to_allocvec(self).expect("op serialization should not fail");
        InitId::from_data(&bytes)
    }
}
