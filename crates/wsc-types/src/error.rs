use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid repository path: {0}")]
    InvalidRepositoryPath(String),

    #[error("path escapes the repository root: {0}")]
    PathEscapesRoot(String),
}
