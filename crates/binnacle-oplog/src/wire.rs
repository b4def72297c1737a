//! Canonical wire encoding and detached signing for logs.
//!
//! A log travels (and persists) as `[1 version byte][postcard payload]`.
//! Postcard's length-prefixed, field-ordered encoding makes the bytes
//! canonical: identical trees produce identical output, provided siblings are
//! in canonical order. Encoding therefore canonicalizes a copy first.
//! Decoders reject any unknown version byte before touching the payload.
//!
//! Signatures are detached ed25519 over the full encoded bytes (version byte
//! included) and accompany the bytes at the journal-persistence and transport
//! boundaries; they are never embedded in the payload.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};

use crate::error::OplogError;
use crate::log::Log;

/// Current wire format version.
pub const WIRE_VERSION: u8 = 1;

/// Encode a log into its canonical wire bytes.
pub fn encode_log(log: &Log) -> Result<Vec<u8>, OplogError> {
    let mut canonical = log.clone();
    canonical.canonicalize();

    let payload = postcard::to_allocvec(&canonical)?;
    let mut out = Vec::with_capacity(1 + payload.len());
    out.push(WIRE_VERSION);
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Decode a log from wire bytes, checking the version byte and the
/// non-empty invariant.
pub fn decode_log(bytes: &[u8]) -> Result<Log, OplogError> {
    let payload = check_version(bytes)?;
    let log: Log = postcard::from_bytes(payload)?;

    if !log.validate() {
        return Err(OplogError::EmptyLog);
    }

    Ok(log)
}

/// Encode a forest of root logs (the journal payload). No version byte here;
/// the journal blob carries its own envelope.
pub fn encode_forest(logs: &[Log]) -> Result<Vec<u8>, OplogError> {
    let mut canonical: Vec<Log> = logs.to_vec();
    for log in &mut canonical {
        log.canonicalize();
    }
    canonical.sort_by_key(Log::init_id);

    Ok(postcard::to_allocvec(&canonical)?)
}

/// Decode a forest of root logs.
pub fn decode_forest(bytes: &[u8]) -> Result<Vec<Log>, OplogError> {
    let logs: Vec<Log> = postcard::from_bytes(bytes)?;

    if !logs.iter().all(Log::validate) {
        return Err(OplogError::EmptyLog);
    }

    Ok(logs)
}

/// Produce a detached signature over `bytes` with the author's private key.
pub fn sign(key: &SigningKey, bytes: &[u8]) -> Signature {
    key.sign(bytes)
}

/// Verify a detached signature over `bytes` under the author's public key.
pub fn verify(key: &VerifyingKey, bytes: &[u8], sig: &Signature) -> Result<(), OplogError> {
    key.verify(bytes, sig)
        .map_err(|_| OplogError::SignatureInvalid)
}

/// Split off and check the version byte, returning the payload slice.
fn check_version(bytes: &[u8]) -> Result<&[u8], OplogError> {
    match bytes.split_first() {
        Some((&WIRE_VERSION, payload)) => Ok(payload),
        Some((&version, _)) => Err(OplogError::UnsupportedVersion(version)),
        None => Err(OplogError::EmptyLog),
    }
}
