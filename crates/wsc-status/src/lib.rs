//! Status snapshots for the working status cache.
//!
//! A [`StatusSnapshot`] is the immutable result of comparing HEAD, the index
//! and the working tree of one repository. The cache publishes snapshots
//! behind an `Arc` and patches them incrementally with [`merge`] when only a
//! few paths changed.
//!
//! # Key Types
//!
//! - [`StatusSnapshot`] -- Categorized path sets for one repository
//! - [`StatusCategory`] -- The nine status categories
//! - [`SnapshotOrigin`] -- Whether a snapshot came from a full or partial recompute
//! - [`is_any_prefix_of`] -- Hierarchical containment test on paths
//! - [`merge_ignored`] -- Ignored-path bookkeeping for incremental updates

pub mod error;
pub mod merge;
pub mod prefix;
pub mod snapshot;

pub use error::{StatusError, StatusResult};
pub use merge::{merge_category, merge_ignored};
pub use prefix::{ancestors, is_any_prefix_of, is_covered_by, is_prefix_of};
pub use snapshot::{Axis, SnapshotOrigin, StatusCategory, StatusSnapshot};
