//! Working tree status snapshots.
//!
//! A snapshot records the outcome of comparing the committed tree (HEAD),
//! the index and the working tree. Paths are repository-relative and
//! normalized (see `wsc_types::normalize_path`).

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{StatusError, StatusResult};
use crate::prefix::{ancestors, is_covered_by};

/// Which comparison a category belongs to.
///
/// A path appears at most once per axis. One staged-axis and one
/// worktree-axis membership may coexist (a staged file that was edited
/// again). `Exclusive` categories exclude every other category.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Axis {
    /// HEAD compared with the index.
    Staged,
    /// The index compared with the working tree.
    Worktree,
    /// Categories that rule out any other classification.
    Exclusive,
}

/// The status categories tracked by a snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCategory {
    /// In the index with unresolved merge stages.
    Conflicting,
    /// In the index but not in HEAD.
    Added,
    /// In both HEAD and the index with different content.
    Changed,
    /// In HEAD but removed from the index.
    Removed,
    /// In the index, content on disk differs.
    Modified,
    /// In the index, absent on disk.
    Missing,
    /// On disk, not in the index, not ignored.
    Untracked,
    /// A folder with no tracked content, summarizing its untracked files.
    UntrackedFolder,
    /// On disk, not in the index, excluded by ignore rules.
    Ignored,
}

impl StatusCategory {
    /// Every category, in reporting order.
    pub const ALL: [StatusCategory; 9] = [
        StatusCategory::Conflicting,
        StatusCategory::Added,
        StatusCategory::Changed,
        StatusCategory::Removed,
        StatusCategory::Modified,
        StatusCategory::Missing,
        StatusCategory::Untracked,
        StatusCategory::UntrackedFolder,
        StatusCategory::Ignored,
    ];

    /// The comparison this category belongs to.
    pub fn axis(self) -> Axis {
        match self {
            Self::Added | Self::Changed | Self::Removed => Axis::Staged,
            Self::Modified | Self::Missing | Self::Untracked | Self::UntrackedFolder => {
                Axis::Worktree
            }
            Self::Conflicting | Self::Ignored => Axis::Exclusive,
        }
    }

    /// Stable lowercase name, used in logs and CLI output.
    pub fn name(self) -> &'static str {
        match self {
            Self::Conflicting => "conflicting",
            Self::Added => "added",
            Self::Changed => "changed",
            Self::Removed => "removed",
            Self::Modified => "modified",
            Self::Missing => "missing",
            Self::Untracked => "untracked",
            Self::UntrackedFolder => "untracked_folder",
            Self::Ignored => "ignored",
        }
    }

    /// Whether two categories may both hold the same path.
    pub fn compatible_with(self, other: StatusCategory) -> bool {
        if self == other {
            return true;
        }
        match (self.axis(), other.axis()) {
            (Axis::Staged, Axis::Worktree) | (Axis::Worktree, Axis::Staged) => true,
            _ => false,
        }
    }
}

impl fmt::Display for StatusCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How a snapshot was produced.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum SnapshotOrigin {
    /// A full recompute of the repository.
    #[default]
    Full,
    /// A previous snapshot patched with a recompute of `paths`.
    Incremental {
        /// The paths that were recomputed.
        paths: BTreeSet<String>,
    },
}

impl SnapshotOrigin {
    /// Returns `true` for full recomputes.
    pub fn is_full(&self) -> bool {
        matches!(self, Self::Full)
    }
}

/// Complete three-way status of one repository.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// Files on disk that are neither tracked nor ignored, outside any
    /// untracked folder.
    pub untracked: BTreeSet<String>,
    /// Files staged for addition.
    pub added: BTreeSet<String>,
    /// Files whose staged content differs from HEAD.
    pub changed: BTreeSet<String>,
    /// Files whose working tree content differs from the index.
    pub modified: BTreeSet<String>,
    /// Files staged for removal.
    pub removed: BTreeSet<String>,
    /// Tracked files absent from the working tree.
    pub missing: BTreeSet<String>,
    /// Files with unresolved conflicts.
    pub conflicting: BTreeSet<String>,
    /// Folders with no tracked content; their files are not listed in
    /// `untracked`.
    pub untracked_folders: BTreeSet<String>,
    /// Untracked files and folders excluded by ignore rules. Descendants of
    /// an ignored folder are not listed.
    pub ignored_not_in_index: BTreeSet<String>,
    /// Which job produced this snapshot.
    #[serde(default)]
    pub origin: SnapshotOrigin,
}

impl StatusSnapshot {
    /// Create an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// The path set for `category`.
    pub fn paths(&self, category: StatusCategory) -> &BTreeSet<String> {
        match category {
            StatusCategory::Conflicting => &self.conflicting,
            StatusCategory::Added => &self.added,
            StatusCategory::Changed => &self.changed,
            StatusCategory::Removed => &self.removed,
            StatusCategory::Modified => &self.modified,
            StatusCategory::Missing => &self.missing,
            StatusCategory::Untracked => &self.untracked,
            StatusCategory::UntrackedFolder => &self.untracked_folders,
            StatusCategory::Ignored => &self.ignored_not_in_index,
        }
    }

    /// Mutable access to the path set for `category`.
    pub fn paths_mut(&mut self, category: StatusCategory) -> &mut BTreeSet<String> {
        match category {
            StatusCategory::Conflicting => &mut self.conflicting,
            StatusCategory::Added => &mut self.added,
            StatusCategory::Changed => &mut self.changed,
            StatusCategory::Removed => &mut self.removed,
            StatusCategory::Modified => &mut self.modified,
            StatusCategory::Missing => &mut self.missing,
            StatusCategory::Untracked => &mut self.untracked,
            StatusCategory::UntrackedFolder => &mut self.untracked_folders,
            StatusCategory::Ignored => &mut self.ignored_not_in_index,
        }
    }

    /// Record `path` under `category`.
    pub fn insert(&mut self, category: StatusCategory, path: impl Into<String>) -> bool {
        self.paths_mut(category).insert(path.into())
    }

    /// Builder-style variant of [`Self::insert`].
    pub fn with(mut self, category: StatusCategory, path: impl Into<String>) -> Self {
        self.insert(category, path);
        self
    }

    /// Replace the origin tag.
    pub fn with_origin(mut self, origin: SnapshotOrigin) -> Self {
        self.origin = origin;
        self
    }

    /// Returns `true` if `path` is an ignored entry or lies inside an ignored
    /// folder.
    pub fn is_ignored(&self, path: &str) -> bool {
        is_covered_by(&self.ignored_not_in_index, path)
    }

    /// Returns `true` if `path` is an untracked folder or lies inside one.
    pub fn is_inside_untracked_folder(&self, path: &str) -> bool {
        is_covered_by(&self.untracked_folders, path)
    }

    /// Returns `true` if every path lies strictly inside a folder this
    /// snapshot already records as ignored. An ignored entry itself and
    /// anything beneath an untracked folder can still change status when
    /// edited or staged. An empty batch is trivially subsumed.
    pub fn subsumes_all<'a, I>(&self, paths: I) -> bool
    where
        I: IntoIterator<Item = &'a String>,
    {
        paths.into_iter().all(|path| {
            ancestors(path).any(|folder| self.ignored_not_in_index.contains(folder))
        })
    }

    /// Replace each path lying inside a summarized folder (untracked or
    /// ignored) with the outermost such folder.
    ///
    /// Staging a file beneath an untracked folder changes the status of its
    /// siblings too, so a partial recompute must cover the whole folder.
    pub fn widen_to_summaries<'a, I>(&self, paths: I) -> BTreeSet<String>
    where
        I: IntoIterator<Item = &'a String>,
    {
        paths
            .into_iter()
            .map(|path| {
                ancestors(path)
                    .find(|folder| {
                        self.untracked_folders.contains(*folder)
                            || self.ignored_not_in_index.contains(*folder)
                    })
                    .map_or_else(|| path.clone(), String::from)
            })
            .collect()
    }

    /// Every category recording `path`, folder summaries included.
    pub fn categories_of(&self, path: &str) -> Vec<StatusCategory> {
        StatusCategory::ALL
            .into_iter()
            .filter(|category| match category {
                StatusCategory::Ignored => self.is_ignored(path),
                StatusCategory::Untracked => {
                    self.untracked.contains(path) || self.is_inside_untracked_folder(path)
                }
                StatusCategory::UntrackedFolder => self.untracked_folders.contains(path),
                other => self.paths(*other).contains(path),
            })
            .collect()
    }

    /// The most significant category recording `path`, if any.
    ///
    /// Paths with no entry are either clean and tracked, or unknown to the
    /// repository.
    pub fn category_of(&self, path: &str) -> Option<StatusCategory> {
        self.categories_of(path).into_iter().next()
    }

    /// Returns `true` if any category records `path`.
    pub fn contains(&self, path: &str) -> bool {
        self.category_of(path).is_some()
    }

    /// Returns `true` if there are no changes of any kind. Ignored paths do
    /// not count as changes.
    pub fn is_clean(&self) -> bool {
        StatusCategory::ALL
            .into_iter()
            .filter(|category| *category != StatusCategory::Ignored)
            .all(|category| self.paths(category).is_empty())
    }

    /// Returns `true` if anything is staged.
    pub fn has_staged_changes(&self) -> bool {
        !self.added.is_empty() || !self.changed.is_empty() || !self.removed.is_empty()
    }

    /// Returns `true` if there are any conflicts.
    pub fn has_conflicts(&self) -> bool {
        !self.conflicting.is_empty()
    }

    /// Total number of entries across all categories, ignored included.
    pub fn total_entries(&self) -> usize {
        StatusCategory::ALL
            .into_iter()
            .map(|category| self.paths(category).len())
            .sum()
    }

    /// Drop entries that an enclosing folder summary already covers:
    /// descendants of ignored folders from every category they cannot be in,
    /// and untracked files or folders nested inside an untracked folder.
    pub fn prune_subsumed(&mut self) {
        let ignored_folders = self.ignored_not_in_index.clone();
        let untracked_folders = self.untracked_folders.clone();

        self.ignored_not_in_index
            .retain(|path| !ancestors(path).any(|a| ignored_folders.contains(a)));
        for category in [StatusCategory::Untracked, StatusCategory::UntrackedFolder] {
            self.paths_mut(category).retain(|path| {
                !is_covered_by(&ignored_folders, path)
                    && !ancestors(path).any(|a| untracked_folders.contains(a))
            });
        }
    }

    /// Check the structural invariants: normalized paths, exclusivity
    /// between categories, and folder summarization.
    pub fn validate(&self) -> StatusResult<()> {
        for category in StatusCategory::ALL {
            for path in self.paths(category) {
                if path.starts_with('/') || path.ends_with('/') || path.contains("//") {
                    return Err(StatusError::NotNormalized(path.clone()));
                }
            }
        }

        for (i, first) in StatusCategory::ALL.iter().enumerate() {
            for second in &StatusCategory::ALL[i + 1..] {
                if first.compatible_with(*second) {
                    continue;
                }
                if let Some(path) = self
                    .paths(*first)
                    .intersection(self.paths(*second))
                    .next()
                {
                    return Err(StatusError::ConflictingCategories {
                        path: path.clone(),
                        first: *first,
                        second: *second,
                    });
                }
            }
        }

        for path in self.untracked.iter().chain(&self.untracked_folders) {
            if let Some(folder) = ancestors(path).find(|a| self.untracked_folders.contains(*a)) {
                return Err(StatusError::Subsumed {
                    path: path.clone(),
                    folder: folder.to_string(),
                    category: StatusCategory::UntrackedFolder,
                });
            }
        }
        // Tracked files may live inside ignored folders; only untracked
        // bookkeeping is subsumed.
        for category in [
            StatusCategory::Untracked,
            StatusCategory::UntrackedFolder,
            StatusCategory::Ignored,
        ] {
            for path in self.paths(category) {
                if let Some(folder) = ancestors(path).find(|a| self.ignored_not_in_index.contains(*a)) {
                    return Err(StatusError::Subsumed {
                        path: path.clone(),
                        folder: folder.to_string(),
                        category: StatusCategory::Ignored,
                    });
                }
            }
        }
        Ok(())
    }
}
