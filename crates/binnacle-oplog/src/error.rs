//! Error types for the oplog crate.

/// Errors that can occur while encoding, decoding, or verifying logs.
#[derive(Debug, thiserror::Error)]
pub enum OplogError {
    /// The wire bytes carry a version this decoder does not understand.
    #[error("unsupported log format version: {0}")]
    UnsupportedVersion(u8),

    /// Bytes do not verify under the claimed author's key.
    #[error("invalid log signature")]
    SignatureInvalid,

    /// A decoded log (or one of its descendants) contains no operations.
    #[error("log contains no operations")]
    EmptyLog,

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<postcard::Error> for OplogError {
    fn from(e: postcard::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
