//! Shared types and identifiers for Binnacle.
//!
//! This crate defines the core types used across the Binnacle workspace:
//! identifiers ([`ProfileId`], [`InitId`]), dataset references ([`DatasetRef`]),
//! the author identity binding ([`Author`], [`Profile`]), and the in-process
//! [`events::EventBus`].

pub mod events;

use std::fmt;

use ed25519_dalek::VerifyingKey;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ID types
// ---------------------------------------------------------------------------

/// Errors produced when parsing or reconstructing identity material.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    /// A hex-encoded identifier did not parse to 32 bytes.
    #[error("invalid hex identifier: {0}")]
    InvalidHex(String),

    /// Identifier bytes do not form a valid ed25519 public key.
    #[error("bytes do not form a valid ed25519 public key")]
    InvalidKey,
}

/// Render 32 bytes as 64 lowercase hex characters.
fn encode_hex32(bytes: &[u8; 32]) -> String {
    use fmt::Write as _;

    let mut out = String::with_capacity(64);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

/// Parse the 64-character hex form produced by [`encode_hex32`].
fn decode_hex32(s: &str) -> Result<[u8; 32], IdentityError> {
    if s.len() != 64 || !s.is_ascii() {
        return Err(IdentityError::InvalidHex(s.to_string()));
    }

    let mut out = [0u8; 32];

    for (i, byte) in out.iter_mut().enumerate() {
        let pair = &s[i * 2..i * 2 + 2];
        *byte = u8::from_str_radix(pair, 16)
            .map_err(|_| IdentityError::InvalidHex(s.to_string()))?;
    }

    Ok(out)
}

/// Both identifier kinds are 32-byte values with a hex text form; the macro
/// stamps out the newtype plus the conversions each needs. Ids travel in
/// HTTP headers and query strings, so hex parsing is part of the core shape,
/// and siblings sort by id during canonical encoding, so they are `Ord`.
macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name([u8; 32]);

        impl $name {
            /// Derive an id from raw content bytes: `blake3(data)`.
            pub fn from_data(data: &[u8]) -> Self {
                Self(*blake3::hash(data).as_bytes())
            }

            /// Parse an id from the hex form produced by `Display`.
            pub fn from_hex(s: &str) -> Result<Self, IdentityError> {
                decode_hex32(s).map(Self)
            }

            /// The raw 32 bytes.
            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }
        }

        impl From<[u8; 32]> for $name {
            fn from(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&encode_hex32(&self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self)
            }
        }
    };
}

id_type!(
    /// Stable identifier for an author: the raw bytes of their ed25519
    /// public key.
    ProfileId
);

id_type!(
    /// Stable identifier for a log: `blake3` of the canonical encoding of the
    /// log's first operation.
    InitId
);

impl From<&VerifyingKey> for ProfileId {
    fn from(key: &VerifyingKey) -> Self {
        Self(key.to_bytes())
    }
}

// ---------------------------------------------------------------------------
// Dataset references
// ---------------------------------------------------------------------------

/// A reference to a dataset log.
///
/// The pair `(profile_id, init_id)` is the authoritative identity of a
/// dataset; `(username, name)` is a human-readable hint that may drift as
/// datasets are renamed. `path` points at a specific version and is advisory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetRef {
    /// Username of the dataset author at the time the ref was produced.
    pub username: String,
    /// Dataset name at the time the ref was produced.
    pub name: String,
    /// The author's stable identifier.
    pub profile_id: Option<ProfileId>,
    /// The dataset log's stable identifier.
    pub init_id: Option<InitId>,
    /// Content path of a specific version (advisory).
    pub path: String,
}

impl DatasetRef {
    /// True when the ref carries neither an authoritative identity nor a
    /// usable human pair, and therefore cannot be resolved.
    pub fn is_empty(&self) -> bool {
        self.init_id.is_none() && (self.username.is_empty() || self.name.is_empty())
    }

    /// The human-readable `"username/name"` form.
    pub fn human(&self) -> String {
        format!("{}/{}", self.username, self.name)
    }
}

impl fmt::Display for DatasetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.human())
    }
}

// ---------------------------------------------------------------------------
// Author identity
// ---------------------------------------------------------------------------

/// The identity binding consumed by the sync core: a stable identifier plus
/// the public key it is derived from.
pub trait Author {
    /// The author's stable identifier.
    fn author_id(&self) -> ProfileId;

    /// The author's public signing key.
    fn author_pubkey(&self) -> VerifyingKey;
}

/// A resolved author identity: a username and an ed25519 verifying key.
///
/// The [`ProfileId`] is always the key's raw bytes, so holding the key is
/// enough to verify both identity claims and log signatures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    /// Human-readable author name. Advisory; may differ between peers.
    pub username: String,
    key: VerifyingKey,
}

impl Profile {
    /// Create a profile from a username and verifying key.
    pub fn new(username: impl Into<String>, key: VerifyingKey) -> Self {
        Self {
            username: username.into(),
            key,
        }
    }

    /// Reconstruct a profile from a username and a [`ProfileId`].
    ///
    /// Fails if the id bytes are not a valid ed25519 public key.
    pub fn from_id(username: impl Into<String>, id: ProfileId) -> Result<Self, IdentityError> {
        let key = VerifyingKey::from_bytes(id.as_bytes()).map_err(|_| IdentityError::InvalidKey)?;
        Ok(Self::new(username, key))
    }
}

impl Author for Profile {
    fn author_id(&self) -> ProfileId {
        ProfileId::from(&self.key)
    }

    fn author_pubkey(&self) -> VerifyingKey {
        self.key
    }
}

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Current wall-clock time in nanoseconds since the UNIX epoch.
pub fn wall_clock_nanos() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};

    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
