//! Error types for journal operations.

use binnacle_oplog::OplogError;
use binnacle_store::StoreError;

/// Errors that can occur during journal operations.
#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    /// No persisted journal blob exists at the configured path.
    #[error("journal not found at {0}")]
    NotFound(String),

    /// The persisted blob is structurally invalid.
    #[error("corrupt journal blob: {0}")]
    Corrupt(String),

    /// The referenced log is not present in the journal.
    #[error("reference not found: {0}")]
    RefNotFound(String),

    /// A dataset with this name already exists under the user log.
    #[error("dataset name already in use: {0}")]
    DuplicateName(String),

    /// A dataset name is empty or otherwise unusable.
    #[error("invalid dataset name: {0:?}")]
    InvalidName(String),

    /// A save op's previous path does not fit the log's save history.
    #[error("invalid previous-version chain")]
    BadChain,

    /// The authenticated author does not match the log data.
    ///
    /// The exact message is load-bearing: remote peers surface it verbatim.
    #[error("ref contained in log data does not match")]
    AuthorMismatch,

    /// An incoming log with a known identity is not a prefix-extension of
    /// the local copy.
    #[error("logs have diverged")]
    Diverged,

    /// Encoding, decoding, or signature failure.
    #[error(transparent)]
    Oplog(#[from] OplogError),

    /// Blob filesystem failure.
    #[error("blob store error: {0}")]
    Store(#[from] StoreError),
}
