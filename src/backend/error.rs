use thiserror::Error;

/// Failure inside a storage backend.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("sqlite error: {0}")]
    Sqlite(String),

    /// Stored data decoded but violates the store's invariants.
    #[error("corrupt store data: {0}")]
    Corrupt(String),

    /// The backend refused or could not take the write.
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

impl From<serde_json::Error> for BackendError {
    fn from(value: serde_json::Error) -> Self {
        BackendError::Codec(value.to_string())
    }
}

#[cfg(feature = "file")]
impl From<bitcode::Error> for BackendError {
    fn from(value: bitcode::Error) -> Self {
        BackendError::Codec(value.to_string())
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for BackendError {
    fn from(value: rusqlite::Error) -> Self {
        BackendError::Sqlite(value.to_string())
    }
}
