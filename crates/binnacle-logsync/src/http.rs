//! HTTP binding for the logsync protocol.
//!
//! Verbs map onto methods against a single route:
//!
//! - `PUT /`: push. Body: encoded log bytes; headers: author identity plus
//!   the detached log signature; ref in query parameters.
//! - `GET /`: pull. Query: ref; response body: encoded log bytes; response
//!   headers: log signature and the serving journal's author identity.
//! - `DELETE /`: remove. Query: ref; identity headers only.
//!
//! Author identity is carried as a compact header set: username, hex profile
//! id (the public key), a decimal nanosecond timestamp, and an ed25519 proof
//! signature over the timestamp string. The proof is accepted within a ±5
//! minute skew window.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, HeaderValue, Response, StatusCode};
use axum::routing::put;
use binnacle_journal::Journal;
use binnacle_types::{Author, DatasetRef, InitId, Profile, ProfileId, wall_clock_nanos};
use bytes::Bytes;
use ed25519_dalek::Signature;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::Logsync;
use crate::error::LogsyncError;

pub(crate) const HEADER_USERNAME: &str = "x-binnacle-username";
pub(crate) const HEADER_PROFILE: &str = "x-binnacle-profile";
pub(crate) const HEADER_TIMESTAMP: &str = "x-binnacle-timestamp";
pub(crate) const HEADER_PROOF: &str = "x-binnacle-proof";
pub(crate) const HEADER_LOG_SIGNATURE: &str = "x-binnacle-log-signature";

/// Accepted clock skew for identity proofs: ±5 minutes, in nanoseconds.
const MAX_CLOCK_SKEW_NANOS: u64 = 5 * 60 * 1_000_000_000;

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// Build the axum router serving the three verbs over a shared logsync.
pub fn router(logsync: Arc<Logsync>) -> Router {
    Router::new()
        .route("/", put(handle_push).get(handle_pull).delete(handle_remove))
        .with_state(logsync)
}

async fn handle_push(
    State(logsync): State<Arc<Logsync>>,
    Query(params): Query<RefParams>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, LogsyncError> {
    let sender = verify_identity(&headers)?;
    let r = params.into_ref()?;
    let sig = signature_header(&headers, HEADER_LOG_SIGNATURE)?;

    logsync.push(&sender, &r, &body, &sig).await?;
    Ok(StatusCode::OK)
}

async fn handle_pull(
    State(logsync): State<Arc<Logsync>>,
    Query(params): Query<RefParams>,
    headers: HeaderMap,
) -> Result<Response<Body>, LogsyncError> {
    let sender = verify_identity(&headers)?;
    let r = params.into_ref()?;

    let (bytes, sig) = logsync.pull(&sender, &r).await?;
    let author = logsync.author().ok_or(LogsyncError::NoLogsync)?;

    let response = Response::builder()
        .status(StatusCode::OK)
        .header("content-type", "application/octet-stream")
        .header(HEADER_USERNAME, author.username.as_str())
        .header(HEADER_PROFILE, author.author_id().to_string())
        .header(HEADER_LOG_SIGNATURE, encode_hex(&sig.to_bytes()))
        .body(Body::from(bytes))
        .map_err(|e| LogsyncError::Malformed(e.to_string()))?;
    Ok(response)
}

async fn handle_remove(
    State(logsync): State<Arc<Logsync>>,
    Query(params): Query<RefParams>,
    headers: HeaderMap,
) -> Result<StatusCode, LogsyncError> {
    let sender = verify_identity(&headers)?;
    let r = params.into_ref()?;

    logsync.remove(&sender, &r).await?;
    Ok(StatusCode::OK)
}

/// Authenticate the identity header set and reconstruct the sender profile.
///
/// Runs before any hook or journal access: a request that cannot prove
/// possession of the claimed key never reaches the protocol.
fn verify_identity(headers: &HeaderMap) -> Result<Profile, LogsyncError> {
    let username = header_str(headers, HEADER_USERNAME)?;
    let profile_hex = header_str(headers, HEADER_PROFILE)?;
    let timestamp = header_str(headers, HEADER_TIMESTAMP)?;

    let profile_id = ProfileId::from_hex(profile_hex)
        .map_err(|e| LogsyncError::IdentityInvalid(e.to_string()))?;
    let profile = Profile::from_id(username, profile_id)
        .map_err(|e| LogsyncError::IdentityInvalid(e.to_string()))?;

    let ts: u64 = timestamp
        .parse()
        .map_err(|_| LogsyncError::IdentityInvalid("unparseable timestamp".to_string()))?;
    if wall_clock_nanos().abs_diff(ts) > MAX_CLOCK_SKEW_NANOS {
        return Err(LogsyncError::IdentityInvalid(
            "timestamp outside skew window".to_string(),
        ));
    }

    let proof = signature_header(headers, HEADER_PROOF)?;
    binnacle_oplog::wire::verify(&profile.author_pubkey(), timestamp.as_bytes(), &proof)
        .map_err(|_| LogsyncError::IdentityInvalid("proof does not verify".to_string()))?;

    debug!(username = %profile.username, "authenticated request identity");
    Ok(profile)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str, LogsyncError> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| LogsyncError::IdentityInvalid(format!("missing header {name}")))
}

fn signature_header(headers: &HeaderMap, name: &str) -> Result<Signature, LogsyncError> {
    decode_signature(header_str(headers, name)?)
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// `PUT` a sub-log to the remote endpoint.
pub(crate) async fn push(
    client: &reqwest::Client,
    url: &str,
    journal: &Journal,
    r: &DatasetRef,
    bytes: Bytes,
    sig: &Signature,
) -> Result<(), LogsyncError> {
    let response = client
        .put(url)
        .query(&RefParams::from_ref(r))
        .headers(identity_headers(journal)?)
        .header(HEADER_LOG_SIGNATURE, encode_hex(&sig.to_bytes()))
        .body(bytes)
        .send()
        .await?;

    check_status(response).await?;
    Ok(())
}

/// `GET` a sub-log from the remote endpoint. Returns the bytes together
/// with the remote's author identity and detached signature.
pub(crate) async fn pull(
    client: &reqwest::Client,
    url: &str,
    journal: &Journal,
    r: &DatasetRef,
) -> Result<(Bytes, Profile, Signature), LogsyncError> {
    let response = client
        .get(url)
        .query(&RefParams::from_ref(r))
        .headers(identity_headers(journal)?)
        .send()
        .await?;
    let response = check_status(response).await?;

    let author = {
        let headers = response.headers();
        let username = header_str(headers, HEADER_USERNAME)?;
        let profile_id = ProfileId::from_hex(header_str(headers, HEADER_PROFILE)?)
            .map_err(|e| LogsyncError::IdentityInvalid(e.to_string()))?;
        Profile::from_id(username, profile_id)
            .map_err(|e| LogsyncError::IdentityInvalid(e.to_string()))?
    };
    let sig = signature_header(response.headers(), HEADER_LOG_SIGNATURE)?;

    let bytes = response.bytes().await?;
    Ok((bytes, author, sig))
}

/// `DELETE` a sub-log at the remote endpoint.
pub(crate) async fn remove(
    client: &reqwest::Client,
    url: &str,
    journal: &Journal,
    r: &DatasetRef,
) -> Result<(), LogsyncError> {
    let response = client
        .delete(url)
        .query(&RefParams::from_ref(r))
        .headers(identity_headers(journal)?)
        .send()
        .await?;

    check_status(response).await?;
    Ok(())
}

/// Build the identity header set proving possession of the journal's key.
fn identity_headers(journal: &Journal) -> Result<HeaderMap, LogsyncError> {
    let profile = journal.profile();
    let timestamp = wall_clock_nanos().to_string();
    let proof = journal.sign(timestamp.as_bytes());

    let mut headers = HeaderMap::new();
    headers.insert(
        HEADER_USERNAME,
        HeaderValue::from_str(&profile.username)
            .map_err(|e| LogsyncError::Malformed(e.to_string()))?,
    );
    headers.insert(
        HEADER_PROFILE,
        HeaderValue::from_str(&profile.author_id().to_string())
            .map_err(|e| LogsyncError::Malformed(e.to_string()))?,
    );
    headers.insert(
        HEADER_TIMESTAMP,
        HeaderValue::from_str(&timestamp).map_err(|e| LogsyncError::Malformed(e.to_string()))?,
    );
    headers.insert(
        HEADER_PROOF,
        HeaderValue::from_str(&encode_hex(&proof.to_bytes()))
            .map_err(|e| LogsyncError::Malformed(e.to_string()))?,
    );
    Ok(headers)
}

/// Surface a failure status as a [`LogsyncError::Remote`] carrying the
/// remote error body verbatim.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, LogsyncError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response.text().await.unwrap_or_default();
    let message = if message.is_empty() {
        format!("remote returned {status}")
    } else {
        message
    };
    Err(LogsyncError::Remote {
        status: status.as_u16(),
        message,
    })
}

// ---------------------------------------------------------------------------
// Ref query encoding
// ---------------------------------------------------------------------------

/// Query-string form of a [`DatasetRef`]: ids as hex, empty fields omitted.
#[derive(Debug, Default, Serialize, Deserialize)]
struct RefParams {
    username: Option<String>,
    name: Option<String>,
    profile_id: Option<String>,
    init_id: Option<String>,
    path: Option<String>,
}

impl RefParams {
    fn from_ref(r: &DatasetRef) -> Self {
        let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());
        Self {
            username: non_empty(&r.username),
            name: non_empty(&r.name),
            profile_id: r.profile_id.map(|id| id.to_string()),
            init_id: r.init_id.map(|id| id.to_string()),
            path: non_empty(&r.path),
        }
    }

    fn into_ref(self) -> Result<DatasetRef, LogsyncError> {
        let profile_id = self
            .profile_id
            .map(|s| ProfileId::from_hex(&s))
            .transpose()
            .map_err(|e| LogsyncError::Malformed(e.to_string()))?;
        let init_id = self
            .init_id
            .map(|s| InitId::from_hex(&s))
            .transpose()
            .map_err(|e| LogsyncError::Malformed(e.to_string()))?;

        Ok(DatasetRef {
            username: self.username.unwrap_or_default(),
            name: self.name.unwrap_or_default(),
            profile_id,
            init_id,
            path: self.path.unwrap_or_default(),
        })
    }
}

// ---------------------------------------------------------------------------
// Hex helpers
// ---------------------------------------------------------------------------

fn encode_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn decode_signature(s: &str) -> Result<Signature, LogsyncError> {
    if s.len() != 128 {
        return Err(LogsyncError::Malformed("bad signature length".to_string()));
    }

    let mut out = [0u8; 64];
    for (i, byte) in out.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16)
            .map_err(|_| LogsyncError::Malformed("bad signature hex".to_string()))?;
    }
    Ok(Signature::from_bytes(&out))
}
