//! Hierarchical containment on repository-relative paths.
//!
//! A prefix contains a path when the path equals it or lies beneath it as a
//! directory. The empty prefix and `"/"` denote the repository root and
//! contain every path. These tests back both the ignored-folder short-circuit
//! in the cache and folder summarization in snapshots.

use std::collections::BTreeSet;

/// Returns `true` if `prefix` contains `path`.
///
/// Trailing slashes on the prefix are ignored, so `"a/"` behaves like `"a"`.
pub fn is_prefix_of(prefix: &str, path: &str) -> bool {
    if prefix.is_empty() || prefix == "/" {
        return true;
    }
    let prefix = prefix.trim_end_matches('/');
    match path.strip_prefix(prefix) {
        Some("") => true,
        Some(rest) => rest.starts_with('/'),
        None => false,
    }
}

/// Returns `true` if any of `prefixes` contains `path`.
pub fn is_any_prefix_of<I, S>(path: &str, prefixes: I) -> bool
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    prefixes
        .into_iter()
        .any(|prefix| is_prefix_of(prefix.as_ref(), path))
}

/// Returns `true` if `set` holds `path` itself, one of its ancestor folders,
/// or the root.
///
/// Equivalent to [`is_any_prefix_of`] for sets of normalized paths, but costs
/// one lookup per path component instead of a scan of the whole set.
pub fn is_covered_by(set: &BTreeSet<String>, path: &str) -> bool {
    if set.is_empty() {
        return false;
    }
    if set.contains("") || set.contains("/") || set.contains(path) {
        return true;
    }
    ancestors(path).any(|ancestor| set.contains(ancestor))
}

/// Proper ancestor folders of `path`, outermost first.
///
/// `"a/b/c"` yields `"a"` then `"a/b"`. The root is not yielded.
pub fn ancestors(path: &str) -> impl Iterator<Item = &str> {
    path.match_indices('/')
        .map(move |(idx, _)| &path[..idx])
        .filter(|ancestor| !ancestor.is_empty())
}
