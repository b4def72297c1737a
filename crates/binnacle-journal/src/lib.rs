//! The journal: a per-peer authenticated store of log trees.
//!
//! A [`Journal`] owns a forest of user root logs, one per author the peer
//! knows about, of which exactly one (the local author's) is writable. It is
//! created with a private key and a username, persisted as a single signed
//! blob through a [`binnacle_store::BlobStore`], and reloaded at startup.
//! Every successful mutation re-serializes, re-signs, and rewrites the whole
//! blob before it becomes visible to readers.

mod error;
mod journal;

#[cfg(test)]
mod tests;

pub use error::JournalError;
pub use journal::{CommitInfo, Journal, VersionInfo};
