use thiserror::Error;

/// Typed failure kinds carried across component boundaries (pipeline,
/// storage, database collaborator). Application glue above the operator
/// façade wraps these in `anyhow::Error` rather than matching on them.
#[derive(Debug, Error)]
pub enum LawError {
    #[error("missing required configuration: {0}")]
    ConfigMissing(String),

    #[error("unsupported storage scheme: {0}")]
    UnsupportedStorageScheme(String),

    #[error("file too large for a single partition: {path} ({size} bytes)")]
    FileTooLarge { path: String, size: u64 },

    #[error("refusing to restore over a live cluster directory (postmaster.pid present): {0}")]
    AttemptToOverwriteLiveDirectory(String),

    #[error("transport error: {0}")]
    TransportError(String),

    #[error("remote storage error {status}: {code}: {message}")]
    RemoteError {
        status: u16,
        code: String,
        message: String,
    },

    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("object not found: {0}")]
    NotFound(String),

    #[error("pipeline stage {stage_index} failed: {inner}")]
    PipelineStageError {
        stage_index: usize,
        #[source]
        inner: Box<LawError>,
    },

    #[error("database collaborator error: {0}")]
    DatabaseError(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<law_storage::StorageError> for LawError {
    fn from(e: law_storage::StorageError) -> Self {
        use law_storage::StorageError as S;
        match e {
            S::NotFound(key) => LawError::NotFound(key),
            S::Remote {
                status,
                code,
                message,
            } => LawError::RemoteError {
                status,
                code,
                message,
            },
            S::ChecksumMismatch { expected, actual } => {
                LawError::ChecksumMismatch { expected, actual }
            }
            S::UnsupportedScheme(scheme) => LawError::UnsupportedStorageScheme(scheme),
            S::ConfigMissing(msg) => LawError::ConfigMissing(msg),
            S::Transport(e) => LawError::TransportError(e.to_string()),
            S::Io(e) => LawError::Io(e),
        }
    }
}
