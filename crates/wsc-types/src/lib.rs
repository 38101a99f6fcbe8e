//! Foundation types for the working status cache (WSC).
//!
//! This crate provides the identity and path primitives shared by every other
//! WSC crate.
//!
//! # Key Types
//!
//! - [`RepositoryId`] -- Stable key for a watched repository, derived from the
//!   path of its metadata directory
//! - [`normalize_path`] -- Canonical form for repository-relative paths

pub mod error;
pub mod identity;
pub mod path;

pub use error::TypeError;
pub use identity::RepositoryId;
pub use path::{normalize_path, try_normalize_path};
