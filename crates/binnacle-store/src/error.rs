//! Error types for blob storage operations.

/// Errors that can occur during blob storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// An I/O error occurred.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The blob path is not usable (empty, or escapes the store root).
    #[error("invalid blob path: {0}")]
    InvalidPath(String),
}
