//! Update-versus-reload decision.
//!
//! An incremental update is only correct for a small batch of paths whose
//! change cannot affect the status of other paths. Everything else is served
//! by a full reload.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::config::CacheConfig;

/// Why a change escalated to a full reload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ReloadReason {
    /// The batch holds more paths than the update threshold.
    TooManyPaths { count: usize, threshold: usize },
    /// An ignore-rule file changed, which can alter the status of any path.
    IgnoreRulesChanged { path: String },
    /// A ref or HEAD moved.
    RefChanged,
    /// There is no published snapshot to patch.
    NotLoaded,
}

impl std::fmt::Display for ReloadReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooManyPaths { count, threshold } => {
                write!(f, "{count} paths exceed threshold {threshold}")
            }
            Self::IgnoreRulesChanged { path } => write!(f, "ignore rules changed: {path}"),
            Self::RefChanged => f.write_str("ref changed"),
            Self::NotLoaded => f.write_str("no snapshot loaded"),
        }
    }
}

/// Decides whether a batch of changed paths needs a full reload.
#[derive(Clone, Debug)]
pub struct ReloadPolicy {
    update_threshold: usize,
    ignore_file_names: Vec<String>,
    exclude_files: Vec<String>,
}

impl ReloadPolicy {
    pub fn from_config(config: &CacheConfig) -> Self {
        Self {
            update_threshold: config.update_threshold,
            ignore_file_names: config.ignore_file_names.clone(),
            exclude_files: config.exclude_files.clone(),
        }
    }

    pub fn update_threshold(&self) -> usize {
        self.update_threshold
    }

    /// Returns the reason a reload is needed for `paths`, or `None` if an
    /// incremental update suffices.
    pub fn should_reload(&self, paths: &BTreeSet<String>) -> Option<ReloadReason> {
        if paths.len() > self.update_threshold {
            return Some(ReloadReason::TooManyPaths {
                count: paths.len(),
                threshold: self.update_threshold,
            });
        }
        paths
            .iter()
            .find(|path| self.is_ignore_rule_file(path))
            .map(|path| ReloadReason::IgnoreRulesChanged { path: path.clone() })
    }

    /// Returns `true` if `path` names a file holding ignore rules.
    pub fn is_ignore_rule_file(&self, path: &str) -> bool {
        let file_name = path.rsplit('/').next().unwrap_or(path);
        self.ignore_file_names.iter().any(|name| name == file_name)
            || self.exclude_files.iter().any(|exclude| exclude == path)
    }
}

impl Default for ReloadPolicy {
    fn default() -> Self {
        Self::from_config(&CacheConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn single_path_updates_incrementally() {
        let policy = ReloadPolicy::default();
        assert_eq!(policy.should_reload(&set(&["src/lib.rs"])), None);
    }

    #[test]
    fn batch_over_threshold_reloads() {
        let policy = ReloadPolicy::default();
        assert_eq!(
            policy.should_reload(&set(&["a", "b"])),
            Some(ReloadReason::TooManyPaths {
                count: 2,
                threshold: 1
            })
        );
    }

    #[test]
    fn threshold_is_configurable() {
        let config = CacheConfig {
            update_threshold: 3,
            ..Default::default()
        };
        let policy = ReloadPolicy::from_config(&config);
        assert_eq!(policy.should_reload(&set(&["a", "b", "c"])), None);
        assert!(policy.should_reload(&set(&["a", "b", "c", "d"])).is_some());
    }

    #[test]
    fn ignore_file_anywhere_in_tree_reloads() {
        let policy = ReloadPolicy::default();
        assert_eq!(
            policy.should_reload(&set(&["docs/.gitignore"])),
            Some(ReloadReason::IgnoreRulesChanged {
                path: "docs/.gitignore".into()
            })
        );
        assert!(policy.is_ignore_rule_file(".gitignore"));
        assert!(!policy.is_ignore_rule_file("docs/gitignore.md"));
    }

    #[test]
    fn exclude_file_reloads() {
        let policy = ReloadPolicy::default();
        assert!(policy.is_ignore_rule_file(".git/info/exclude"));
        assert!(!policy.is_ignore_rule_file("info/exclude"));
    }

    #[test]
    fn reason_display() {
        let reason = ReloadReason::TooManyPaths {
            count: 5,
            threshold: 1,
        };
        assert_eq!(reason.to_string(), "5 paths exceed threshold 1");
        assert_eq!(ReloadReason::RefChanged.to_string(), "ref changed");
    }
}
