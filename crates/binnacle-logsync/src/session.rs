//! One-shot client session handles.

use binnacle_oplog::{Log, wire};
use binnacle_types::DatasetRef;

use crate::error::LogsyncError;
use crate::{Logsync, http};

/// A one-shot push of a local sub-log to a remote endpoint.
///
/// Borrows the sub-log bytes from the journal for the duration of the
/// transfer; nothing is retained after [`Push::run`] returns.
pub struct Push<'a> {
    logsync: &'a Logsync,
    r: DatasetRef,
    url: String,
}

impl<'a> Push<'a> {
    pub(crate) fn new(logsync: &'a Logsync, r: DatasetRef, url: String) -> Self {
        Self { logsync, r, url }
    }

    /// Execute the push.
    pub async fn run(&self) -> Result<(), LogsyncError> {
        let journal = self.logsync.journal()?;
        if self.r.is_empty() {
            return Err(LogsyncError::RefEmpty);
        }

        let (bytes, sig) = journal.log_bytes(&self.r).await?;
        http::push(self.logsync.client(), &self.url, journal, &self.r, bytes, &sig).await
    }
}

/// A one-shot pull of a remote sub-log.
pub struct Pull<'a> {
    logsync: &'a Logsync,
    r: DatasetRef,
    url: String,
    /// When set, the received log is merged into the local journal using
    /// the remote's author as the sender.
    pub merge: bool,
}

impl<'a> Pull<'a> {
    pub(crate) fn new(logsync: &'a Logsync, r: DatasetRef, url: String) -> Self {
        Self {
            logsync,
            r,
            url,
            merge: false,
        }
    }

    /// Execute the pull, returning the received log.
    pub async fn run(&self) -> Result<Log, LogsyncError> {
        let journal = self.logsync.journal()?;
        if self.r.is_empty() {
            return Err(LogsyncError::RefEmpty);
        }

        let (bytes, author, sig) =
            http::pull(self.logsync.client(), &self.url, journal, &self.r).await?;
        let log = wire::decode_log(&bytes)?;

        if self.merge {
            journal.merge_log(&author, &bytes, &sig).await?;
        }

        Ok(log)
    }
}
