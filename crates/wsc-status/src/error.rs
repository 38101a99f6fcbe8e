//! Error types for the status crate.

use crate::snapshot::StatusCategory;

/// Errors raised when a snapshot violates its structural invariants.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StatusError {
    /// A path was recorded in two categories that exclude each other.
    #[error("path {path:?} is both {first} and {second}")]
    ConflictingCategories {
        path: String,
        first: StatusCategory,
        second: StatusCategory,
    },

    /// A path is listed even though an enclosing folder already summarizes it.
    #[error("path {path:?} is subsumed by folder {folder:?} ({category})")]
    Subsumed {
        path: String,
        folder: String,
        category: StatusCategory,
    },

    /// A path is not in normalized repository-relative form.
    #[error("path is not normalized: {0:?}")]
    NotNormalized(String),
}

/// Convenience alias for status results.
pub type StatusResult<T> = Result<T, StatusError>;
