//! Error types and HTTP status mapping for logsync.

use axum::body::Body;
use axum::http::{Response, StatusCode};
use axum::response::IntoResponse;
use binnacle_journal::JournalError;
use binnacle_oplog::OplogError;

/// Errors that can occur during log synchronization.
#[derive(Debug, thiserror::Error)]
pub enum LogsyncError {
    /// A verb was invoked on an uninitialized logsync.
    #[error("logsync is not initialized")]
    NoLogsync,

    /// The operation requires a ref but got an empty one.
    #[error("reference is empty")]
    RefEmpty,

    /// A request could not be parsed.
    #[error("malformed request: {0}")]
    Malformed(String),

    /// The sender's identity headers did not verify.
    #[error("invalid author identity: {0}")]
    IdentityInvalid(String),

    /// A pre-check or final-check hook rejected the operation.
    #[error("hook rejected: {0}")]
    HookRejected(String),

    /// A journal operation failed. Transparent so that load-bearing journal
    /// error text (author mismatch, divergence) survives the boundary.
    #[error(transparent)]
    Journal(#[from] JournalError),

    /// Encoding, decoding, or signature failure.
    #[error(transparent)]
    Oplog(#[from] OplogError),

    /// The remote peer answered with a failure status. The message is the
    /// remote error body, surfaced verbatim.
    #[error("{message}")]
    Remote {
        /// HTTP status code from the remote.
        status: u16,
        /// Remote error body text.
        message: String,
    },

    /// The transport itself failed; the caller may retry.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl LogsyncError {
    /// Map to an HTTP status code for the server side of the binding.
    fn status_code(&self) -> StatusCode {
        match self {
            Self::RefEmpty | Self::Malformed(_) => StatusCode::BAD_REQUEST,
            Self::IdentityInvalid(_) => StatusCode::UNAUTHORIZED,
            Self::HookRejected(_) => StatusCode::FORBIDDEN,
            Self::Journal(e) => match e {
                JournalError::RefNotFound(_) | JournalError::NotFound(_) => StatusCode::NOT_FOUND,
                JournalError::Diverged => StatusCode::CONFLICT,
                JournalError::AuthorMismatch => StatusCode::UNAUTHORIZED,
                JournalError::Oplog(o) => oplog_status(o),
                JournalError::DuplicateName(_)
                | JournalError::InvalidName(_)
                | JournalError::BadChain => StatusCode::BAD_REQUEST,
                JournalError::Corrupt(_) | JournalError::Store(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            Self::Oplog(o) => oplog_status(o),
            Self::NoLogsync | Self::Remote { .. } | Self::Transport(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

fn oplog_status(e: &OplogError) -> StatusCode {
    match e {
        OplogError::SignatureInvalid => StatusCode::UNAUTHORIZED,
        OplogError::UnsupportedVersion(_) | OplogError::EmptyLog | OplogError::Serialization(_) => {
            StatusCode::BAD_REQUEST
        }
    }
}

impl IntoResponse for LogsyncError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let message = self.to_string();

        Response::builder()
            .status(status)
            .header("content-type", "text/plain; charset=utf-8")
            .body(Body::from(message))
            .unwrap()
    }
}
