//! Gitignore evaluation over an in-memory tree.
//!
//! Rules come from per-directory `.gitignore` files and from the
//! repository-wide exclude file. A deeper `.gitignore` takes precedence over
//! a shallower one, and a whitelist (`!pattern`) match stops the search. The
//! repository-wide rules are consulted last.

use std::path::Path;

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use ignore::Match;
use wsc_status::{ancestors, is_prefix_of};

use crate::error::{EngineError, EngineResult};

/// File name of per-directory ignore-rule files.
pub const IGNORE_FILE_NAME: &str = ".gitignore";

/// Compiled ignore rules for one repository.
pub struct IgnoreRules {
    /// Per-directory matchers, deepest directory first.
    per_directory: Vec<(String, Gitignore)>,
    /// Repository-wide exclude rules, rooted at the repository root.
    exclude: Gitignore,
}

impl std::fmt::Debug for IgnoreRules {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IgnoreRules")
            .field(
                "directories",
                &self.per_directory.iter().map(|(d, _)| d).collect::<Vec<_>>(),
            )
            .field("exclude_rules", &self.exclude.num_ignores())
            .finish()
    }
}

impl IgnoreRules {
    /// Compile rules from `(directory, contents)` pairs of ignore files and
    /// the repository-wide exclude lines.
    pub fn build<'a, I>(ignore_files: I, exclude_lines: &[String]) -> EngineResult<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut per_directory = Vec::new();
        for (directory, contents) in ignore_files {
            let file = if directory.is_empty() {
                IGNORE_FILE_NAME.to_string()
            } else {
                format!("{directory}/{IGNORE_FILE_NAME}")
            };
            let matcher = compile(contents.lines(), &file)?;
            per_directory.push((directory.to_string(), matcher));
        }
        per_directory.sort_by(|(a, _), (b, _)| depth(b).cmp(&depth(a)).then_with(|| a.cmp(b)));

        let exclude = compile(exclude_lines.iter().map(String::as_str), "info/exclude")?;
        Ok(Self {
            per_directory,
            exclude,
        })
    }

    /// Rules that ignore nothing.
    pub fn empty() -> Self {
        Self {
            per_directory: Vec::new(),
            exclude: Gitignore::empty(),
        }
    }

    /// Returns `true` if the rules ignore `path` itself. Ancestor folders are
    /// not consulted; see [`Self::ignored_root`].
    pub fn is_ignored(&self, path: &str, is_dir: bool) -> bool {
        for (directory, matcher) in &self.per_directory {
            if directory == path || !is_prefix_of(directory, path) {
                continue;
            }
            let relative = relative_to(directory, path);
            match matcher.matched(Path::new(relative), is_dir) {
                Match::Ignore(_) => return true,
                Match::Whitelist(_) => return false,
                Match::None => {}
            }
        }
        self.exclude.matched(Path::new(path), is_dir).is_ignore()
    }

    /// The outermost ignored entry covering the file at `path`: an ignored
    /// ancestor folder, or the file itself. Git never descends into an
    /// ignored folder, so its contents are summarized by the folder.
    pub fn ignored_root(&self, path: &str) -> Option<String> {
        ancestors(path)
            .find(|folder| self.is_ignored(folder, true))
            .map(String::from)
            .or_else(|| self.is_ignored(path, false).then(|| path.to_string()))
    }
}

/// Matchers are rooted at "." and always queried with paths relative to the
/// directory holding the rules.
fn compile<'a>(lines: impl Iterator<Item = &'a str>, file: &str) -> EngineResult<Gitignore> {
    let mut builder = GitignoreBuilder::new(Path::new("."));
    for line in lines {
        builder
            .add_line(None, line)
            .map_err(|e| EngineError::InvalidIgnoreRule {
                file: file.to_string(),
                reason: e.to_string(),
            })?;
    }
    builder.build().map_err(|e| EngineError::InvalidIgnoreRule {
        file: file.to_string(),
        reason: e.to_string(),
    })
}

fn relative_to<'a>(directory: &str, path: &'a str) -> &'a str {
    if directory.is_empty() {
        path
    } else {
        path.strip_prefix(directory)
            .map(|rest| rest.trim_start_matches('/'))
            .unwrap_or(path)
    }
}

fn depth(directory: &str) -> usize {
    if directory.is_empty() {
        0
    } else {
        directory.matches('/').count() + 1
    }
}
