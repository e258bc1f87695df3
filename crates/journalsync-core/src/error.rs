//! Error types for journalsync

use thiserror::Error;

/// Main error type for journal and transmission operations
#[derive(Error, Debug)]
pub enum SyncError {
    /// Sync record was not found in the journal
    #[error("Sync record not found: {0}")]
    RecordNotFound(String),

    /// Remote server was not registered in the journal
    #[error("Remote server not found: {0}")]
    ServerNotFound(String),

    /// Error during storage operations (redb)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Database creation/opening error
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    /// Transaction error
    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    /// Table error
    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    /// Storage operation error
    #[error("Storage operation error: {0}")]
    StorageOp(#[from] redb::StorageError),

    /// Commit error
    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    /// Error during serialization/deserialization
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// General I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialized item content could not be read as a record document
    #[error("Invalid record document: {0}")]
    InvalidDocument(String),

    /// Transmission file was written by an unknown format version
    #[error("Transmission version {0} is not supported")]
    TransmissionVersionUnsupported(u8),

    /// Transmission payload does not match its recorded checksum
    #[error("Transmission checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    /// Invalid operation for current state
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

/// Result type alias using SyncError
pub type SyncResult<T> = Result<T, SyncError>;
