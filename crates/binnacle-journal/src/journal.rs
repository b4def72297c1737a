//! Core journal implementation.

use std::sync::Arc;

use binnacle_oplog::{Log, Op, OpModel, wire};
use binnacle_store::BlobStore;
use binnacle_types::events::{
    DatasetInitialized, EventBus, JournalSaved, LogMerged, LogRemoved, VersionSaved,
};
use binnacle_types::{Author, DatasetRef, InitId, Profile, ProfileId, wall_clock_nanos};
use bytes::Bytes;
use ed25519_dalek::{Signature, SigningKey, VerifyingKey};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::JournalError;

/// Current persisted journal blob version.
const JOURNAL_VERSION: u8 = 1;

/// Blob layout: version byte, big-endian payload length, payload, signature.
const HEADER_LEN: usize = 1 + 8;
const SIG_LEN: usize = 64;

/// Metadata describing one saved dataset version.
///
/// `timestamp` of zero means "now"; `prev` is an opaque hint preserved
/// verbatim, never resolved against any store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitInfo {
    /// Content path of the saved version.
    pub path: String,
    /// Content path of the previous version, if any.
    pub prev: String,
    /// Commit title.
    pub title: String,
    /// Nanoseconds since the UNIX epoch; zero for "now".
    pub timestamp: u64,
    /// Byte size of the version body.
    pub size: u64,
}

/// A reference record for one saved version, as returned by
/// [`Journal::items`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionInfo {
    /// Identifier of the dataset log the version belongs to.
    pub init_id: InitId,
    /// Username of the log's author.
    pub username: String,
    /// Current dataset name.
    pub name: String,
    /// Content path of this version.
    pub path: String,
    /// Content path of the previous version (opaque hint).
    pub prev: String,
    /// Save timestamp, nanoseconds since the UNIX epoch.
    pub timestamp: u64,
    /// Commit title.
    pub note: String,
    /// Byte size of the version body.
    pub size: u64,
}

/// The root-log forest guarded by the journal's lock.
struct Forest {
    logs: Vec<Log>,
}

impl Forest {
    /// Index of the root log owned by `author`.
    fn root_index(&self, author: ProfileId) -> Option<usize> {
        self.logs.iter().position(|l| l.author_id() == author)
    }

    /// Resolve a ref to its owning root and the dataset sub-log.
    ///
    /// `(profile_id, init_id)` is authoritative; `(username, name)` is a
    /// fallback hint matched against live (non-deleted) logs only.
    fn resolve(&self, r: &DatasetRef) -> Option<(&Log, &Log)> {
        if let Some(init_id) = r.init_id {
            return self.locate(r).map(|(root_idx, _)| {
                let root = &self.logs[root_idx];
                (root, root.child(init_id).expect("located child exists"))
            });
        }

        self.logs
            .iter()
            .filter(|root| root.name() == r.username)
            .find_map(|root| {
                root.logs
                    .iter()
                    .find(|l| !l.is_deleted() && l.name() == r.name)
                    .map(|child| (root, child))
            })
    }

    /// Locate a ref as `(root index, child init id)` for mutation.
    fn locate(&self, r: &DatasetRef) -> Option<(usize, InitId)> {
        if let Some(init_id) = r.init_id {
            // Init ids are globally unique; the ref's profile field is an
            // advisory hint and deliberately not consulted here.
            for (i, root) in self.logs.iter().enumerate() {
                if root.child(init_id).is_some() {
                    return Some((i, init_id));
                }
            }
            return None;
        }

        for (i, root) in self.logs.iter().enumerate() {
            if root.name() != r.username {
                continue;
            }
            if let Some(child) = root
                .logs
                .iter()
                .find(|l| !l.is_deleted() && l.name() == r.name)
            {
                return Some((i, child.init_id()));
            }
        }
        None
    }
}

/// A peer's local store of logs.
///
/// The journal holds one root log per known author; only the local author's
/// root is writable. Reads run concurrently; every write serializes behind
/// one lock and persists the full signed blob before returning.
pub struct Journal {
    signing_key: SigningKey,
    profile: Profile,
    store: Arc<dyn BlobStore>,
    path: String,
    bus: EventBus,
    state: RwLock<Forest>,
}

impl Journal {
    /// Create a new journal with a single user root log and persist it.
    pub async fn create(
        signing_key: SigningKey,
        username: &str,
        store: Arc<dyn BlobStore>,
        path: &str,
        bus: EventBus,
    ) -> Result<Self, JournalError> {
        if username.is_empty() {
            return Err(JournalError::InvalidName(username.to_string()));
        }

        let profile = Profile::new(username, signing_key.verifying_key());
        let user_log = Log::new(Op {
            model: OpModel::UserInit,
            target: String::new(),
            prev: String::new(),
            name: username.to_string(),
            author_id: profile.author_id(),
            timestamp: wall_clock_nanos(),
            note: String::new(),
            size: 0,
        });

        let journal = Self {
            signing_key,
            profile,
            store,
            path: path.to_string(),
            bus,
            state: RwLock::new(Forest {
                logs: vec![user_log],
            }),
        };

        let state = journal.state.read().await;
        journal.persist(&state).await?;
        drop(state);

        debug!(username, path, "created journal");
        Ok(journal)
    }

    /// Load a journal from its persisted blob, verifying the signature
    /// against the key's public half.
    pub async fn load(
        signing_key: SigningKey,
        store: Arc<dyn BlobStore>,
        path: &str,
        bus: EventBus,
    ) -> Result<Self, JournalError> {
        let blob = store
            .get(path)
            .await?
            .ok_or_else(|| JournalError::NotFound(path.to_string()))?;

        let logs = decode_blob(&blob, &signing_key.verifying_key())?;

        let author_id = ProfileId::from(&signing_key.verifying_key());
        let active = logs
            .iter()
            .find(|l| l.author_id() == author_id)
            .ok_or_else(|| JournalError::Corrupt("active user log missing".to_string()))?;
        let profile = Profile::new(active.name(), signing_key.verifying_key());

        debug!(username = %profile.username, path, roots = logs.len(), "loaded journal");
        Ok(Self {
            signing_key,
            profile,
            store,
            path: path.to_string(),
            bus,
            state: RwLock::new(Forest { logs }),
        })
    }

    /// Load the journal at `path` if a blob exists there, else create one.
    pub async fn open(
        signing_key: SigningKey,
        username: &str,
        store: Arc<dyn BlobStore>,
        path: &str,
        bus: EventBus,
    ) -> Result<Self, JournalError> {
        if store.get(path).await?.is_some() {
            Self::load(signing_key, store, path, bus).await
        } else {
            Self::create(signing_key, username, store, path, bus).await
        }
    }

    /// The local author's username.
    pub fn username(&self) -> &str {
        &self.profile.username
    }

    /// The local author's identity.
    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    /// Sign arbitrary bytes with the journal's private key.
    ///
    /// The key itself never crosses the journal boundary; transports use
    /// this to produce proof-of-possession material.
    pub fn sign(&self, msg: &[u8]) -> Signature {
        wire::sign(&self.signing_key, msg)
    }

    /// Persist the full journal blob.
    pub async fn save(&self) -> Result<(), JournalError> {
        let state = self.state.write().await;
        self.persist(&state).await
    }

    // -------------------------------------------------------------------
    // Local writes
    // -------------------------------------------------------------------

    /// Create a new dataset log under the active user log.
    ///
    /// Returns the new log's [`InitId`]. Fails with `DuplicateName` if a
    /// live dataset of the same name already exists.
    pub async fn write_dataset_init(&self, name: &str) -> Result<InitId, JournalError> {
        if name.is_empty() {
            return Err(JournalError::InvalidName(name.to_string()));
        }

        let author_id = self.profile.author_id();
        let mut state = self.state.write().await;
        let root_idx = self.active_root(&state)?;

        let taken = state.logs[root_idx]
            .logs
            .iter()
            .any(|l| !l.is_deleted() && l.name() == name);
        if taken {
            return Err(JournalError::DuplicateName(name.to_string()));
        }

        let child = Log::new(Op {
            model: OpModel::DatasetInit,
            target: String::new(),
            prev: String::new(),
            name: name.to_string(),
            author_id,
            timestamp: wall_clock_nanos(),
            note: String::new(),
            size: 0,
        });
        let init_id = child.init_id();
        state.logs[root_idx].add_child(child);

        self.persist(&state).await?;
        self.bus.emit(DatasetInitialized {
            init_id,
            name: name.to_string(),
        });

        debug!(name, %init_id, "initialized dataset log");
        Ok(init_id)
    }

    /// Append a version-save op to the identified dataset log.
    pub async fn write_version_save(
        &self,
        init_id: InitId,
        info: &CommitInfo,
    ) -> Result<(), JournalError> {
        let author_id = self.profile.author_id();
        let mut state = self.state.write().await;
        let root_idx = self.active_root(&state)?;

        let log = state.logs[root_idx]
            .child_mut(init_id)
            .ok_or_else(|| JournalError::RefNotFound(init_id.to_string()))?;

        // The previous path is an opaque hint, but it must agree with the
        // shape of the history: empty iff this is the first save.
        let has_saves = log.saves().next().is_some();
        if info.prev.is_empty() == has_saves {
            return Err(JournalError::BadChain);
        }

        let name = log.name().to_string();
        let timestamp = if info.timestamp == 0 {
            wall_clock_nanos()
        } else {
            info.timestamp
        };

        log.append(Op {
            model: OpModel::VersionSave,
            target: info.path.clone(),
            prev: info.prev.clone(),
            name,
            author_id,
            timestamp,
            note: info.title.clone(),
            size: info.size,
        });

        self.persist(&state).await?;
        self.bus.emit(VersionSaved {
            init_id,
            path: info.path.clone(),
        });

        debug!(%init_id, path = %info.path, "appended version save");
        Ok(())
    }

    /// Append a rename op to the identified dataset log.
    pub async fn write_rename(&self, init_id: InitId, new_name: &str) -> Result<(), JournalError> {
        if new_name.is_empty() {
            return Err(JournalError::InvalidName(new_name.to_string()));
        }

        let author_id = self.profile.author_id();
        let mut state = self.state.write().await;
        let root_idx = self.active_root(&state)?;

        let taken = state.logs[root_idx]
            .logs
            .iter()
            .any(|l| !l.is_deleted() && l.init_id() != init_id && l.name() == new_name);
        if taken {
            return Err(JournalError::DuplicateName(new_name.to_string()));
        }

        let log = state.logs[root_idx]
            .child_mut(init_id)
            .ok_or_else(|| JournalError::RefNotFound(init_id.to_string()))?;

        log.append(Op {
            model: OpModel::Rename,
            target: String::new(),
            prev: String::new(),
            name: new_name.to_string(),
            author_id,
            timestamp: wall_clock_nanos(),
            note: String::new(),
            size: 0,
        });

        self.persist(&state).await?;
        debug!(%init_id, new_name, "renamed dataset log");
        Ok(())
    }

    /// Append a delete op to the identified dataset log. The log is
    /// retained but marked deleted.
    pub async fn write_delete(&self, init_id: InitId) -> Result<(), JournalError> {
        let author_id = self.profile.author_id();
        let mut state = self.state.write().await;
        let root_idx = self.active_root(&state)?;

        let log = state.logs[root_idx]
            .child_mut(init_id)
            .ok_or_else(|| JournalError::RefNotFound(init_id.to_string()))?;

        log.append(Op {
            model: OpModel::Delete,
            target: String::new(),
            prev: String::new(),
            name: String::new(),
            author_id,
            timestamp: wall_clock_nanos(),
            note: String::new(),
            size: 0,
        });

        self.persist(&state).await?;
        debug!(%init_id, "marked dataset log deleted");
        Ok(())
    }

    // -------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------

    /// Saved versions of the referenced dataset, newest first.
    ///
    /// `offset` skips the newest entries; up to `limit` records follow. An
    /// offset past the end yields an empty vec, not an error.
    pub async fn items(
        &self,
        r: &DatasetRef,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<VersionInfo>, JournalError> {
        let state = self.state.read().await;
        let (root, log) = state
            .resolve(r)
            .ok_or_else(|| JournalError::RefNotFound(r.human()))?;

        let init_id = log.init_id();
        let username = root.name().to_string();
        let name = log.name().to_string();

        let saves: Vec<&Op> = log.saves().collect();
        Ok(saves
            .into_iter()
            .rev()
            .skip(offset)
            .take(limit)
            .map(|op| VersionInfo {
                init_id,
                username: username.clone(),
                name: name.clone(),
                path: op.target.clone(),
                prev: op.prev.clone(),
                timestamp: op.timestamp,
                note: op.note.clone(),
                size: op.size,
            })
            .collect())
    }

    /// Canonical wire bytes of the referenced sub-log, plus a detached
    /// signature by this journal's key.
    pub async fn log_bytes(&self, r: &DatasetRef) -> Result<(Bytes, Signature), JournalError> {
        let state = self.state.read().await;
        let (_, log) = state
            .resolve(r)
            .ok_or_else(|| JournalError::RefNotFound(r.human()))?;

        let bytes = wire::encode_log(log)?;
        let sig = wire::sign(&self.signing_key, &bytes);
        Ok((Bytes::from(bytes), sig))
    }

    /// References for every live dataset log the journal knows about.
    pub async fn datasets(&self) -> Vec<DatasetRef> {
        let state = self.state.read().await;
        let mut refs = Vec::new();

        for root in &state.logs {
            for log in root.logs.iter().filter(|l| !l.is_deleted()) {
                refs.push(DatasetRef {
                    username: root.name().to_string(),
                    name: log.name().to_string(),
                    profile_id: Some(log.author_id()),
                    init_id: Some(log.init_id()),
                    path: log.saves().last().map(|op| op.target.clone()).unwrap_or_default(),
                });
            }
        }

        refs
    }

    // -------------------------------------------------------------------
    // Sync surface
    // -------------------------------------------------------------------

    /// Integrate a foreign sub-log sent by `sender`.
    ///
    /// Verifies the signature under the sender's key and the author binding
    /// of every op before taking the write lock. The merge is monotonic: an
    /// unknown log is appended under the sender's user root (created as a
    /// placeholder if absent); a known log is replaced only by a
    /// prefix-extension of itself, otherwise the merge fails `Diverged` and
    /// the local copy is untouched.
    pub async fn merge_log(
        &self,
        sender: &Profile,
        bytes: &[u8],
        sig: &Signature,
    ) -> Result<InitId, JournalError> {
        let incoming = wire::decode_log(bytes)?;
        wire::verify(&sender.author_pubkey(), bytes, sig)?;

        let sender_id = sender.author_id();
        if !incoming.authored_by(sender_id) {
            return Err(JournalError::AuthorMismatch);
        }

        let init_id = incoming.init_id();
        let mut state = self.state.write().await;

        let root_idx = match state.root_index(sender_id) {
            Some(i) => i,
            None => {
                // First contact with this author: a placeholder user log
                // built from the sender identity.
                state.logs.push(Log::new(Op {
                    model: OpModel::UserInit,
                    target: String::new(),
                    prev: String::new(),
                    name: sender.username.clone(),
                    author_id: sender_id,
                    timestamp: wall_clock_nanos(),
                    note: String::new(),
                    size: 0,
                }));
                state.logs.len() - 1
            }
        };

        let root = &mut state.logs[root_idx];
        match root.logs.iter().position(|l| l.init_id() == init_id) {
            Some(pos) => {
                let local = &mut root.logs[pos];
                if !incoming.extends(local) {
                    return Err(JournalError::Diverged);
                }
                *local = incoming;
            }
            None => root.add_child(incoming),
        }

        self.persist(&state).await?;
        self.bus.emit(LogMerged {
            author: sender_id,
            init_id,
        });

        debug!(author = %sender_id, %init_id, "merged foreign log");
        Ok(init_id)
    }

    /// Remove the referenced sub-log at its author's request.
    ///
    /// Only the log's own author may ask for removal; anyone else fails
    /// `AuthorMismatch`.
    pub async fn remove_log(
        &self,
        sender: &Profile,
        r: &DatasetRef,
    ) -> Result<(), JournalError> {
        let sender_id = sender.author_id();
        let mut state = self.state.write().await;

        let (root_idx, init_id) = state
            .locate(r)
            .ok_or_else(|| JournalError::RefNotFound(r.human()))?;

        let sub = state.logs[root_idx]
            .child(init_id)
            .expect("located child exists");
        if sub.author_id() != sender_id {
            return Err(JournalError::AuthorMismatch);
        }

        state.logs[root_idx].remove_child(init_id);
        self.persist(&state).await?;
        self.bus.emit(LogRemoved {
            author: sender_id,
            init_id,
        });

        debug!(author = %sender_id, %init_id, "removed log");
        Ok(())
    }

    // -------------------------------------------------------------------
    // Internal
    // -------------------------------------------------------------------

    /// Index of the active (locally-owned) user root log.
    fn active_root(&self, state: &Forest) -> Result<usize, JournalError> {
        state
            .root_index(self.profile.author_id())
            .ok_or_else(|| JournalError::Corrupt("active user log missing".to_string()))
    }

    /// Encode, sign, and write the full journal blob.
    async fn persist(&self, state: &Forest) -> Result<(), JournalError> {
        let payload = wire::encode_forest(&state.logs)?;
        let sig = wire::sign(&self.signing_key, &payload);

        let mut blob = Vec::with_capacity(HEADER_LEN + payload.len() + SIG_LEN);
        blob.push(JOURNAL_VERSION);
        blob.extend_from_slice(&(payload.len() as u64).to_be_bytes());
        blob.extend_from_slice(&payload);
        blob.extend_from_slice(&sig.to_bytes());

        let size = blob.len();
        self.store.put(&self.path, Bytes::from(blob)).await?;
        self.bus.emit(JournalSaved { bytes: size });

        debug!(path = %self.path, size, "persisted journal blob");
        Ok(())
    }
}

impl Author for Journal {
    fn author_id(&self) -> ProfileId {
        self.profile.author_id()
    }

    fn author_pubkey(&self) -> VerifyingKey {
        self.profile.author_pubkey()
    }
}

/// Parse and verify a persisted journal blob, returning the root forest.
fn decode_blob(blob: &[u8], key: &VerifyingKey) -> Result<Vec<Log>, JournalError> {
    if blob.len() < HEADER_LEN + SIG_LEN {
        return Err(JournalError::Corrupt("truncated blob".to_string()));
    }

    if blob[0] != JOURNAL_VERSION {
        return Err(binnacle_oplog::OplogError::UnsupportedVersion(blob[0]).into());
    }

    let mut len_bytes = [0u8; 8];
    len_bytes.copy_from_slice(&blob[1..9]);
    let payload_len = u64::from_be_bytes(len_bytes) as usize;

    if blob.len() != HEADER_LEN + payload_len + SIG_LEN {
        return Err(JournalError::Corrupt("payload length mismatch".to_string()));
    }

    let payload = &blob[HEADER_LEN..HEADER_LEN + payload_len];
    let mut sig_bytes = [0u8; SIG_LEN];
    sig_bytes.copy_from_slice(&blob[HEADER_LEN + payload_len..]);
    let sig = Signature::from_bytes(&sig_bytes);

    wire::verify(key, payload, &sig)?;
    Ok(wire::decode_forest(payload)?)
}
