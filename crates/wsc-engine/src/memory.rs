//! In-memory status engine for testing and ephemeral use.
//!
//! [`InMemoryStatusEngine`] keeps, per repository, the committed tree, the
//! index and the working tree as `BTreeMap`s behind a `RwLock`, and computes
//! status by comparing them the way git does. Mutators mirror the porcelain
//! operations that change status (`write`, `rm`, `add`, `reset`, `commit`).

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use tracing::debug;
use wsc_status::{ancestors, StatusCategory, StatusSnapshot};
use wsc_types::{try_normalize_path, RepositoryId};

use crate::error::{EngineError, EngineResult};
use crate::ignore_rules::{IgnoreRules, IGNORE_FILE_NAME};
use crate::traits::StatusEngine;

type ContentHash = [u8; 32];

fn hash_content(content: &[u8]) -> ContentHash {
    *blake3::hash(content).as_bytes()
}

/// A staged entry in the index.
#[derive(Clone, Debug, PartialEq, Eq)]
struct IndexRecord {
    content: ContentHash,
    conflict: bool,
}

/// HEAD, index and working tree of one repository.
#[derive(Clone, Debug, Default)]
struct WorkingCopy {
    head: BTreeMap<String, ContentHash>,
    index: BTreeMap<String, IndexRecord>,
    worktree: BTreeMap<String, Vec<u8>>,
    exclude_rules: Vec<String>,
}

impl WorkingCopy {
    fn ignore_rules(&self) -> EngineResult<IgnoreRules> {
        let files: Vec<(&str, String)> = self
            .worktree
            .iter()
            .filter_map(|(path, content)| {
                let directory = match path.rsplit_once('/') {
                    Some((dir, IGNORE_FILE_NAME)) => dir,
                    None if path == IGNORE_FILE_NAME => "",
                    _ => return None,
                };
                Some((directory, String::from_utf8_lossy(content).into_owned()))
            })
            .collect();
        IgnoreRules::build(
            files.iter().map(|(dir, text)| (*dir, text.as_str())),
            &self.exclude_rules,
        )
    }

    /// Returns `true` if the index tracks anything inside `folder`.
    fn tracks_inside(&self, folder: &str) -> bool {
        let prefix = format!("{folder}/");
        self.index
            .range(prefix.clone()..)
            .next()
            .is_some_and(|(path, _)| path.starts_with(&prefix))
    }

    fn status(&self) -> EngineResult<StatusSnapshot> {
        let rules = self.ignore_rules()?;
        let mut snapshot = StatusSnapshot::new();

        for (path, record) in &self.index {
            if record.conflict {
                snapshot.insert(StatusCategory::Conflicting, path.clone());
                continue;
            }
            match self.head.get(path) {
                None => {
                    snapshot.insert(StatusCategory::Added, path.clone());
                }
                Some(committed) if *committed != record.content => {
                    snapshot.insert(StatusCategory::Changed, path.clone());
                }
                Some(_) => {}
            }
            match self.worktree.get(path) {
                None => {
                    snapshot.insert(StatusCategory::Missing, path.clone());
                }
                Some(content) if hash_content(content) != record.content => {
                    snapshot.insert(StatusCategory::Modified, path.clone());
                }
                Some(_) => {}
            }
        }

        for path in self.head.keys() {
            if !self.index.contains_key(path) {
                snapshot.insert(StatusCategory::Removed, path.clone());
            }
        }

        for path in self.worktree.keys() {
            if self.index.contains_key(path) {
                continue;
            }
            if let Some(ignored) = rules.ignored_root(path) {
                snapshot.insert(StatusCategory::Ignored, ignored);
                continue;
            }
            match ancestors(path).find(|folder| !self.tracks_inside(folder)) {
                Some(folder) => snapshot.insert(StatusCategory::UntrackedFolder, folder),
                None => snapshot.insert(StatusCategory::Untracked, path.clone()),
            };
        }

        snapshot.prune_subsumed();
        Ok(snapshot)
    }
}

/// An in-memory implementation of [`StatusEngine`].
///
/// All state lives in a `HashMap` behind a `RwLock` and is lost when the
/// engine is dropped. Computation counters let tests observe how often the
/// cache asked for full and partial status.
#[derive(Debug, Default)]
pub struct InMemoryStatusEngine {
    repositories: RwLock<HashMap<RepositoryId, WorkingCopy>>,
    full_computations: AtomicU64,
    partial_computations: AtomicU64,
}

impl InMemoryStatusEngine {
    /// Create an engine with no repositories.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an empty repository. Registering an existing repository is a
    /// no-op.
    pub fn create_repository(&self, repository: &RepositoryId) -> EngineResult<()> {
        let mut repos = self.write_lock()?;
        repos.entry(repository.clone()).or_default();
        debug!(repo = %repository.short_id(), "repository created");
        Ok(())
    }

    /// Forget a repository. Returns `true` if it existed.
    pub fn remove_repository(&self, repository: &RepositoryId) -> EngineResult<bool> {
        Ok(self.write_lock()?.remove(repository).is_some())
    }

    /// Returns `true` if the engine knows `repository`.
    pub fn contains(&self, repository: &RepositoryId) -> bool {
        self.repositories
            .read()
            .map(|repos| repos.contains_key(repository))
            .unwrap_or(false)
    }

    /// Create or overwrite a working tree file.
    pub fn write_file(
        &self,
        repository: &RepositoryId,
        path: &str,
        content: impl AsRef<[u8]>,
    ) -> EngineResult<()> {
        let path = normalize(path)?;
        self.with_copy(repository, |copy| {
            copy.worktree.insert(path, content.as_ref().to_vec());
            Ok(())
        })
    }

    /// Delete a working tree file.
    pub fn delete_file(&self, repository: &RepositoryId, path: &str) -> EngineResult<()> {
        let path = normalize(path)?;
        self.with_copy(repository, |copy| {
            copy.worktree
                .remove(&path)
                .map(|_| ())
                .ok_or(EngineError::PathNotFound(path))
        })
    }

    /// Stage the working tree state of `path` (`git add`). Staging a deleted
    /// file stages its removal. Staging resolves a conflict.
    pub fn stage(&self, repository: &RepositoryId, path: &str) -> EngineResult<()> {
        let path = normalize(path)?;
        self.with_copy(repository, |copy| {
            match copy.worktree.get(&path) {
                Some(content) => {
                    let record = IndexRecord {
                        content: hash_content(content),
                        conflict: false,
                    };
                    copy.index.insert(path, record);
                }
                None => {
                    if copy.index.remove(&path).is_none() {
                        return Err(EngineError::PathNotFound(path));
                    }
                }
            }
            Ok(())
        })
    }

    /// Remove `path` from the index, keeping the working tree file
    /// (`git rm --cached`).
    pub fn stage_removal(&self, repository: &RepositoryId, path: &str) -> EngineResult<()> {
        let path = normalize(path)?;
        self.with_copy(repository, |copy| {
            copy.index
                .remove(&path)
                .map(|_| ())
                .ok_or(EngineError::PathNotFound(path))
        })
    }

    /// Reset the index entry of `path` to HEAD (`git reset -- path`).
    pub fn unstage(&self, repository: &RepositoryId, path: &str) -> EngineResult<()> {
        let path = normalize(path)?;
        self.with_copy(repository, |copy| {
            match copy.head.get(&path) {
                Some(committed) => {
                    let record = IndexRecord {
                        content: *committed,
                        conflict: false,
                    };
                    copy.index.insert(path, record);
                }
                None => {
                    copy.index.remove(&path);
                }
            }
            Ok(())
        })
    }

    /// Make the index the new HEAD. Fails while conflicts are unresolved.
    pub fn commit(&self, repository: &RepositoryId) -> EngineResult<()> {
        self.with_copy(repository, |copy| {
            let conflicts: Vec<&str> = copy
                .index
                .iter()
                .filter(|(_, record)| record.conflict)
                .map(|(path, _)| path.as_str())
                .collect();
            if !conflicts.is_empty() {
                return Err(EngineError::UnresolvedConflicts(conflicts.join(", ")));
            }
            copy.head = copy
                .index
                .iter()
                .map(|(path, record)| (path.clone(), record.content))
                .collect();
            Ok(())
        })
    }

    /// Flag `path` as conflicted in the index, as a failed merge would.
    pub fn mark_conflict(&self, repository: &RepositoryId, path: &str) -> EngineResult<()> {
        let path = normalize(path)?;
        self.with_copy(repository, |copy| {
            let content = copy
                .worktree
                .get(&path)
                .map(|c| hash_content(c))
                .or_else(|| copy.index.get(&path).map(|r| r.content))
                .ok_or_else(|| EngineError::PathNotFound(path.clone()))?;
            copy.index.insert(
                path,
                IndexRecord {
                    content,
                    conflict: true,
                },
            );
            Ok(())
        })
    }

    /// Replace the repository-wide exclude rules (`info/exclude`).
    pub fn set_exclude_rules<I, S>(&self, repository: &RepositoryId, lines: I) -> EngineResult<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let lines: Vec<String> = lines.into_iter().map(Into::into).collect();
        self.with_copy(repository, |copy| {
            copy.exclude_rules = lines;
            Ok(())
        })
    }

    /// Number of full status computations served.
    pub fn full_computations(&self) -> u64 {
        self.full_computations.load(Ordering::Relaxed)
    }

    /// Number of partial status computations served.
    pub fn partial_computations(&self) -> u64 {
        self.partial_computations.load(Ordering::Relaxed)
    }

    fn with_copy<T>(
        &self,
        repository: &RepositoryId,
        f: impl FnOnce(&mut WorkingCopy) -> EngineResult<T>,
    ) -> EngineResult<T> {
        let mut repos = self.write_lock()?;
        let copy = repos
            .get_mut(repository)
            .ok_or_else(|| EngineError::RepositoryNotFound(repository.clone()))?;
        f(copy)
    }

    fn write_lock(
        &self,
    ) -> EngineResult<std::sync::RwLockWriteGuard<'_, HashMap<RepositoryId, WorkingCopy>>> {
        self.repositories
            .write()
            .map_err(|e| EngineError::Corrupt(format!("lock poisoned: {e}")))
    }

    fn copy_of(&self, repository: &RepositoryId) -> EngineResult<WorkingCopy> {
        let repos = self
            .repositories
            .read()
            .map_err(|e| EngineError::Corrupt(format!("lock poisoned: {e}")))?;
        repos
            .get(repository)
            .cloned()
            .ok_or_else(|| EngineError::RepositoryNotFound(repository.clone()))
    }
}

impl StatusEngine for InMemoryStatusEngine {
    fn name(&self) -> &str {
        "in-memory"
    }

    fn compute_full(&self, repository: &RepositoryId) -> EngineResult<StatusSnapshot> {
        self.full_computations.fetch_add(1, Ordering::Relaxed);
        let copy = self.copy_of(repository)?;
        copy.status()
    }

    fn compute_partial(
        &self,
        repository: &RepositoryId,
        paths: &BTreeSet<String>,
    ) -> EngineResult<StatusSnapshot> {
        self.partial_computations.fetch_add(1, Ordering::Relaxed);
        let copy = self.copy_of(repository)?;
        Ok(copy.status()?.restrict_to(paths))
    }
}

fn normalize(path: &str) -> EngineResult<String> {
    let normalized = try_normalize_path(path)?;
    if normalized.is_empty() {
        return Err(EngineError::PathNotFound(path.to_string()));
    }
    Ok(normalized)
}
