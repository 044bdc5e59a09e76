//! Error types for the throttle and its storage collaborators.

/// Failure reported by a [`Storage`](crate::Storage) implementation.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The backing medium could not be read or written.
    #[error("storage i/o failed: {0}")]
    Io(#[from] std::io::Error),
    /// A stored record could not be encoded or decoded.
    #[error("malformed snapshot for {name:?}: {reason}")]
    Format { name: String, reason: String },
    /// The store refused the operation (lock poisoned, backend down, ...).
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Construction was given (or resolved from storage) a value the throttle cannot run with.
    #[error("invalid throttle configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// The user supplied calculation hook failed; its error is passed through untouched.
    #[error(transparent)]
    Calculate(anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
