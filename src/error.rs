//! Error types for StrataKV

use thiserror::Error;

/// Result type alias for storage operations
pub type Result<T> = std::result::Result<T, StorageError>;

/// Storage engine error types
#[derive(Error, Debug)]
pub enum StorageError {
    /// IO operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Data corruption detected
    #[error("Data corruption: {0}")]
    Corruption(String),

    /// Record or block checksum mismatch
    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    /// Whole-file digest in the sidecar does not match the data file
    #[error("Digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    /// Table format version is not supported
    #[error("Unsupported format version: found {found}, supported {supported}")]
    UnsupportedFormatVersion { found: u32, supported: u32 },

    /// Sidecar schema fingerprint does not match this build
    #[error("Schema fingerprint mismatch: found {found}, expected {expected}")]
    SchemaMismatch { found: String, expected: String },

    /// Invalid data format
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// WAL recovery error
    #[error("WAL recovery error: {0}")]
    WalRecovery(String),

    /// Compaction error
    #[error("Compaction error: {0}")]
    Compaction(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operation on a closed engine
    #[error("Engine is closed")]
    Closed,
}

impl StorageError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, StorageError::Io(_))
    }

    /// Check if error indicates corruption
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            StorageError::Corruption(_)
                | StorageError::ChecksumMismatch { .. }
                | StorageError::DigestMismatch { .. }
        )
    }
}
