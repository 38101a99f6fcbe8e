use wsc_types::{RepositoryId, TypeError};

/// Errors from status engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The engine knows nothing about this repository.
    #[error("repository not found: {0}")]
    RepositoryNotFound(RepositoryId),

    /// A path could not be interpreted relative to the repository root.
    #[error("invalid path: {0}")]
    InvalidPath(#[from] TypeError),

    /// The path does not exist where the operation expected it.
    #[error("path not found: {0}")]
    PathNotFound(String),

    /// An ignore-rule file contains a pattern that cannot be compiled.
    #[error("invalid ignore rule in {file}: {reason}")]
    InvalidIgnoreRule { file: String, reason: String },

    /// The operation requires all conflicts to be resolved first.
    #[error("unresolved conflicts: {0}")]
    UnresolvedConflicts(String),

    /// Repository state could not be read consistently.
    #[error("corrupt repository state: {0}")]
    Corrupt(String),

    /// I/O error from the underlying storage.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
