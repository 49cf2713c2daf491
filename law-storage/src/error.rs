use std::fmt;

/// Error kinds surfaced by the storage backend and object-store client.
///
/// Mirrors the wire-level error kinds of the core: construction-time
/// failures (`UnsupportedScheme`, `ConfigMissing`), transport failures that
/// the retry layer knows how to classify, and the two checksum/verification
/// failures the multipart uploader can observe.
#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("unsupported storage scheme: {0}")]
    UnsupportedScheme(String),

    #[error("missing storage configuration: {0}")]
    ConfigMissing(String),

    #[error("object not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("remote error {status}: {code} ({message})")]
    Remote {
        status: u16,
        code: String,
        message: String,
    },

    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },
}

impl StorageError {
    /// Whether a request that failed with this error is safe to retry.
    ///
    /// Transport-level failures and 5xx responses are retryable; everything
    /// else (bad request, checksum mismatch, not found) is not.
    pub fn is_retryable(&self) -> bool {
        match self {
            StorageError::Transport(_) => true,
            StorageError::Remote { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for StorageError {
    fn from(e: reqwest::Error) -> Self {
        StorageError::Transport(e)
    }
}

/// A status/body pair parsed out of an S3 error response, kept separate from
/// `StorageError` so the XML layer doesn't need to know about retryability.
#[derive(Debug)]
pub struct RemoteErrorBody {
    pub code: String,
    pub message: String,
}

impl fmt::Display for RemoteErrorBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.code, self.message)
    }
}
