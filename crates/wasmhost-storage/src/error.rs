use thiserror::Error;

/// Errors that can occur in ledger operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Ledger rejected changes: {0}")]
    Rejected(String),
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        StorageError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Serialization(e.to_string())
    }
}

impl From<hex::FromHexError> for StorageError {
    fn from(e: hex::FromHexError) -> Self {
        StorageError::Deserialization(e.to_string())
    }
}

impl From<wasmhost_types::TypesError> for StorageError {
    fn from(e: wasmhost_types::TypesError) -> Self {
        StorageError::Deserialization(e.to_string())
    }
}
