//! Incremental snapshot merge.
//!
//! An incremental update recomputes status only for the changed paths. Every
//! category of the old snapshot is carried over, except entries at or below
//! a changed path, which are replaced by whatever the recompute reported
//! (possibly nothing).

use std::collections::BTreeSet;

use crate::prefix::{ancestors, is_covered_by};
use crate::snapshot::{SnapshotOrigin, StatusCategory, StatusSnapshot};

/// Merge one category: `(old − covered(changed)) ∪ new`.
///
/// An old entry is covered when it equals a changed path or lies beneath
/// one, so a changed folder re-evaluates all of its descendants.
pub fn merge_category(
    old: &BTreeSet<String>,
    changed: &BTreeSet<String>,
    new: &BTreeSet<String>,
) -> BTreeSet<String> {
    old.iter()
        .filter(|path| !is_covered_by(changed, path))
        .chain(new.iter())
        .cloned()
        .collect()
}

/// Ignored-path bookkeeping for an incremental update.
///
/// Previously ignored paths untouched by the update are retained; every
/// changed path takes its freshly computed ignored status, and drops out if
/// it is no longer ignored.
pub fn merge_ignored(
    old_ignored: &BTreeSet<String>,
    changed: &BTreeSet<String>,
    new_ignored: &BTreeSet<String>,
) -> BTreeSet<String> {
    merge_category(old_ignored, changed, new_ignored)
}

impl StatusSnapshot {
    /// Patch this snapshot with a partial recompute of `changed`.
    ///
    /// `partial` must hold the statuses of the changed paths and their
    /// descendants, as returned by a partial status computation. The result
    /// is tagged [`SnapshotOrigin::Incremental`].
    pub fn merge_partial(&self, changed: &BTreeSet<String>, partial: &StatusSnapshot) -> StatusSnapshot {
        let mut merged = StatusSnapshot::new();
        for category in StatusCategory::ALL {
            *merged.paths_mut(category) =
                merge_category(self.paths(category), changed, partial.paths(category));
        }
        merged.prune_subsumed();
        merged.origin = SnapshotOrigin::Incremental {
            paths: changed.clone(),
        };
        merged
    }

    /// Restrict this snapshot to what a partial recompute of `paths` would
    /// report: entries at or below a requested path, plus the folder
    /// summaries (untracked or ignored) enclosing a requested path.
    pub fn restrict_to(&self, paths: &BTreeSet<String>) -> StatusSnapshot {
        let mut restricted = StatusSnapshot::new();
        for category in StatusCategory::ALL {
            let source = self.paths(category);
            let target = restricted.paths_mut(category);
            target.extend(
                source
                    .iter()
                    .filter(|entry| is_covered_by(paths, entry))
                    .cloned(),
            );
            if matches!(
                category,
                StatusCategory::UntrackedFolder | StatusCategory::Ignored
            ) {
                for path in paths {
                    target.extend(
                        ancestors(path)
                            .filter(|ancestor| source.contains(*ancestor))
                            .map(String::from),
                    );
                }
            }
        }
        restricted.origin = SnapshotOrigin::Incremental {
            paths: paths.clone(),
        };
        restricted
    }
}
