//! Error types for the storage backends and the insights collaborator.
//!
//! None of these ever escape `Store::dispatch` or `PersistenceAdapter::load`;
//! they are logged and absorbed there.

/// Failure reading or writing the key-value backend.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// SQLite rejected the statement or the file could not be opened.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The value would not fit in the backend's byte budget. The previously
    /// stored value is untouched.
    #[error("storage quota exceeded for key '{key}': {needed} bytes needed, quota is {quota}")]
    QuotaExceeded {
        key: String,
        needed: usize,
        quota: usize,
    },

    /// The backend is not reachable at all.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Failure from the text-generation collaborator.
#[derive(Debug, thiserror::Error)]
pub enum InsightError {
    #[error("insight generator unavailable: {0}")]
    Unavailable(String),

    #[error("insight generator returned an empty response")]
    EmptyResponse,
}
