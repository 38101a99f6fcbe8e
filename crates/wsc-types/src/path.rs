//! Repository-relative path normalization.
//!
//! Every path stored in a status snapshot uses one spelling: `/`-separated,
//! no leading `./` or `/`, no empty or `.` components, no trailing slash.
//! The repository root is the empty string.

use crate::error::TypeError;

/// Normalize a repository-relative path, rejecting paths that climb out of
/// the repository with `..`.
pub fn try_normalize_path(raw: &str) -> Result<String, TypeError> {
    let mut parts: Vec<&str> = Vec::new();
    for component in raw.split(['/', '\\']) {
        match component {
            "" | "." => continue,
            ".." => return Err(TypeError::PathEscapesRoot(raw.to_string())),
            other => parts.push(other),
        }
    }
    Ok(parts.join("/"))
}

/// Normalize a repository-relative path, returning `None` for paths that
/// cannot name anything inside the repository.
pub fn normalize_path(raw: &str) -> Option<String> {
    try_normalize_path(raw).ok()
}
