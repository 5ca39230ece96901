use blobkeep_types::{BlobRef, TypeError};

/// Errors from blob storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested blob does not exist.
    #[error("blob not found: {0}")]
    NotFound(BlobRef),

    /// The received bytes do not hash to the declared ref.
    #[error("corrupt blob: declared {expected}, content hashes to {computed}")]
    CorruptBlob { expected: BlobRef, computed: BlobRef },

    /// Bytes on disk disagree with the number of bytes written.
    #[error("size mismatch for {blob} ({stage}): wrote {expected} bytes, found {actual}")]
    SizeMismatch {
        blob: BlobRef,
        stage: &'static str,
        expected: u64,
        actual: u64,
    },

    /// The backend does not support this operation.
    #[error("{0} not implemented")]
    NotImplemented(&'static str),

    /// Admission was refused instead of waiting for capacity.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// The blob is larger than a sized ref can describe.
    #[error("blob of {size} bytes exceeds the maximum of {max} bytes")]
    BlobTooLarge { size: u64, max: u64 },

    #[error("invalid blob ref: {0}")]
    InvalidRef(#[from] TypeError),

    /// The consumer of an enumeration went away.
    #[error("enumeration receiver closed")]
    Closed,

    /// Several independent per-blob operations failed.
    #[error("{} blob operations failed", .0.len())]
    Aggregate(Vec<StoreError>),

    /// I/O error from the underlying storage.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Returns `true` if retrying the same call might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Io(_) | Self::ResourceExhausted(_) => true,
            Self::Aggregate(errors) => errors.iter().all(Self::is_retryable),
            _ => false,
        }
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
