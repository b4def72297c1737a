//! Push, pull, and remove synchronization of logbooks between peers.
//!
//! [`Logsync`] wraps a [`Journal`] with the three-verb sync protocol:
//!
//! - **push**: send a local sub-log to a remote peer, which merges it.
//! - **pull**: fetch a sub-log from a remote peer, optionally merging it.
//! - **remove**: ask a remote peer to drop a sub-log you author.
//!
//! Each verb passes through optional [`Hooks`] at defined points: pre-checks
//! run before any mutation or expensive work, the push final check runs after
//! parse and verification but before the merge, and post hooks run after the
//! mutation with their errors logged and discarded. The [`http`] module binds
//! the verbs to HTTP request/response semantics; [`Push`] and [`Pull`] are
//! the one-shot client session handles.

mod error;
pub mod http;
mod session;

#[cfg(test)]
mod tests;

pub use error::LogsyncError;
pub use http::router;
pub use session::{Pull, Push};

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};

use binnacle_journal::Journal;
use binnacle_oplog::{Log, wire};
use binnacle_types::{Author, DatasetRef, Profile};
use bytes::Bytes;
use ed25519_dalek::Signature;
use tracing::{debug, warn};

/// Error type returned by hooks.
pub type HookError = Box<dyn std::error::Error + Send + Sync>;

/// Future returned by hooks.
pub type HookFuture = Pin<Box<dyn Future<Output = Result<(), HookError>> + Send>>;

/// An authorization or notification callback.
///
/// Hooks receive the authenticated sender, the dataset ref the verb targets,
/// and a read-only view of the log when one is available at that point
/// (pre-checks for pull and remove run before any log exists and receive
/// `None`).
pub type Hook = Arc<dyn Fn(Profile, DatasetRef, Option<Arc<Log>>) -> HookFuture + Send + Sync>;

/// Optional hook slots. `None` means "no hook installed" and is a no-op.
#[derive(Default, Clone)]
pub struct Hooks {
    /// Runs before a push is inspected. Failure rejects the push.
    pub push_pre_check: Option<Hook>,
    /// Runs after a pushed log is parsed and verified, before the merge.
    pub push_final_check: Option<Hook>,
    /// Runs after a successful merge. Best effort.
    pub pushed: Option<Hook>,
    /// Runs before a pull is served. Failure rejects the pull.
    pub pull_pre_check: Option<Hook>,
    /// Runs after a pull response is produced. Best effort.
    pub pulled: Option<Hook>,
    /// Runs before a remove is applied. Failure rejects the remove.
    pub remove_pre_check: Option<Hook>,
    /// Runs after a successful remove. Best effort.
    pub removed: Option<Hook>,
}

/// The synchronization component: a journal plus the three sync verbs.
///
/// An uninitialized logsync (no journal) returns [`LogsyncError::NoLogsync`]
/// from every verb and `None` from [`Logsync::author`].
pub struct Logsync {
    journal: Option<Arc<Journal>>,
    client: reqwest::Client,
    hooks: RwLock<Hooks>,
}

impl Logsync {
    /// Create a logsync over a journal with no hooks installed.
    pub fn new(journal: Arc<Journal>) -> Self {
        Self::with_hooks(journal, Hooks::default())
    }

    /// Create a logsync over a journal with the given hooks.
    pub fn with_hooks(journal: Arc<Journal>, hooks: Hooks) -> Self {
        Self {
            journal: Some(journal),
            client: reqwest::Client::new(),
            hooks: RwLock::new(hooks),
        }
    }

    /// Create an uninitialized logsync: every verb fails `NoLogsync`.
    pub fn uninitialized() -> Self {
        Self {
            journal: None,
            client: reqwest::Client::new(),
            hooks: RwLock::new(Hooks::default()),
        }
    }

    /// The local author identity, or `None` when uninitialized.
    pub fn author(&self) -> Option<Profile> {
        self.journal.as_ref().map(|j| j.profile().clone())
    }

    /// Replace hook slots. Only call while the logsync is idle; reassigning
    /// concurrently with in-flight verbs is undefined.
    pub fn set_hooks(&self, configure: impl FnOnce(&mut Hooks)) {
        let mut hooks = self.hooks.write().expect("hook lock poisoned");
        configure(&mut hooks);
    }

    pub(crate) fn journal(&self) -> Result<&Arc<Journal>, LogsyncError> {
        self.journal.as_ref().ok_or(LogsyncError::NoLogsync)
    }

    pub(crate) fn client(&self) -> &reqwest::Client {
        &self.client
    }

    // -------------------------------------------------------------------
    // Client sessions
    // -------------------------------------------------------------------

    /// Create a one-shot push session for `r` against a remote endpoint.
    pub fn new_push(&self, r: DatasetRef, url: &str) -> Result<Push<'_>, LogsyncError> {
        self.journal()?;
        Ok(Push::new(self, r, url.to_string()))
    }

    /// Create a one-shot pull session for `r` against a remote endpoint.
    ///
    /// Set [`Pull::merge`] to integrate the received log into the local
    /// journal.
    pub fn new_pull(&self, r: DatasetRef, url: &str) -> Result<Pull<'_>, LogsyncError> {
        self.journal()?;
        Ok(Pull::new(self, r, url.to_string()))
    }

    /// Ask the remote endpoint to drop the referenced sub-log.
    ///
    /// A one-shot convenience: remove has no additional parameters, so no
    /// session handle is needed.
    pub async fn do_remove(&self, r: &DatasetRef, url: &str) -> Result<(), LogsyncError> {
        let journal = self.journal()?;
        if r.is_empty() {
            return Err(LogsyncError::RefEmpty);
        }

        http::remove(&self.client, url, journal, r).await
    }

    // -------------------------------------------------------------------
    // Server-side verbs
    // -------------------------------------------------------------------

    /// Accept a pushed sub-log from `sender` and merge it.
    pub async fn push(
        &self,
        sender: &Profile,
        r: &DatasetRef,
        bytes: &[u8],
        sig: &Signature,
    ) -> Result<(), LogsyncError> {
        let journal = self.journal()?;
        if r.is_empty() {
            return Err(LogsyncError::RefEmpty);
        }

        let log = Arc::new(wire::decode_log(bytes)?);
        self.run_check(|h| &h.push_pre_check, sender, r, Some(log.clone()))
            .await?;

        // Verification: the bytes must carry the sender's signature, every
        // op must be theirs, and the ref must agree with the log data.
        wire::verify(&sender.author_pubkey(), bytes, sig)?;
        if !log.authored_by(sender.author_id()) {
            return Err(binnacle_journal::JournalError::AuthorMismatch.into());
        }
        if let Some(profile_id) = r.profile_id
            && profile_id != log.author_id()
        {
            return Err(binnacle_journal::JournalError::AuthorMismatch.into());
        }
        if let Some(init_id) = r.init_id
            && init_id != log.init_id()
        {
            return Err(binnacle_journal::JournalError::AuthorMismatch.into());
        }

        self.run_check(|h| &h.push_final_check, sender, r, Some(log.clone()))
            .await?;

        journal.merge_log(sender, bytes, sig).await?;
        debug!(author = %sender.author_id(), r = %r.human(), "accepted pushed log");

        self.run_post("pushed", |h| &h.pushed, sender, r, Some(log))
            .await;
        Ok(())
    }

    /// Serve a pull of the referenced sub-log to `sender`.
    pub async fn pull(
        &self,
        sender: &Profile,
        r: &DatasetRef,
    ) -> Result<(Bytes, Signature), LogsyncError> {
        let journal = self.journal()?;
        if r.is_empty() {
            return Err(LogsyncError::RefEmpty);
        }

        self.run_check(|h| &h.pull_pre_check, sender, r, None).await?;

        let (bytes, sig) = journal.log_bytes(r).await?;
        debug!(requester = %sender.author_id(), r = %r.human(), "serving pulled log");

        let log = Arc::new(wire::decode_log(&bytes)?);
        self.run_post("pulled", |h| &h.pulled, sender, r, Some(log))
            .await;
        Ok((bytes, sig))
    }

    /// Apply a remove requested by `sender`.
    pub async fn remove(&self, sender: &Profile, r: &DatasetRef) -> Result<(), LogsyncError> {
        let journal = self.journal()?;
        if r.is_empty() {
            return Err(LogsyncError::RefEmpty);
        }

        self.run_check(|h| &h.remove_pre_check, sender, r, None)
            .await?;

        // The journal enforces that only the log's author may remove it.
        journal.remove_log(sender, r).await?;
        debug!(author = %sender.author_id(), r = %r.human(), "removed log on request");

        self.run_post("removed", |h| &h.removed, sender, r, None).await;
        Ok(())
    }

    // -------------------------------------------------------------------
    // Hook plumbing
    // -------------------------------------------------------------------

    /// Run a pre-check or final-check hook; a failure rejects the verb.
    async fn run_check(
        &self,
        select: impl Fn(&Hooks) -> &Option<Hook>,
        sender: &Profile,
        r: &DatasetRef,
        log: Option<Arc<Log>>,
    ) -> Result<(), LogsyncError> {
        let hook = {
            let hooks = self.hooks.read().expect("hook lock poisoned");
            select(&hooks).clone()
        };

        if let Some(hook) = hook {
            hook(sender.clone(), r.clone(), log)
                .await
                .map_err(|e| LogsyncError::HookRejected(e.to_string()))?;
        }
        Ok(())
    }

    /// Run a post hook; failures are logged and discarded.
    async fn run_post(
        &self,
        name: &'static str,
        select: impl Fn(&Hooks) -> &Option<Hook>,
        sender: &Profile,
        r: &DatasetRef,
        log: Option<Arc<Log>>,
    ) {
        let hook = {
            let hooks = self.hooks.read().expect("hook lock poisoned");
            select(&hooks).clone()
        };

        if let Some(hook) = hook
            && let Err(e) = hook(sender.clone(), r.clone(), log).await
        {
            warn!(hook = name, error = %e, "post hook failed; discarding");
        }
    }
}
