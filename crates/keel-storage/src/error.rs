//! Storage error type.

use thiserror::Error;

/// Errors from a [`Storage`](crate::Storage) backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Underlying I/O failed (disk full, permissions, ...).
    #[error("storage I/O failed for key `{key}`")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    /// The backend is not usable in this environment.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}
