use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CacheError, CacheResult};

/// Configuration for the status cache.
///
/// Every field has a default, so an empty TOML document is a valid
/// configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Largest batch of changed paths handled by an incremental update.
    /// Larger batches escalate to a full reload.
    pub update_threshold: usize,
    /// File names that hold ignore rules wherever they appear in the tree.
    /// A change to one of them forces a full reload.
    pub ignore_file_names: Vec<String>,
    /// Repository-relative paths of repository-wide exclude files. A change
    /// to one of them forces a full reload.
    pub exclude_files: Vec<String>,
    /// Skip change batches that lie entirely inside ignored or untracked
    /// folders of the current snapshot.
    pub filter_ignored_changes: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            update_threshold: 1,
            ignore_file_names: vec![".gitignore".to_string()],
            exclude_files: vec![".git/info/exclude".to_string()],
            filter_ignored_changes: true,
        }
    }
}

impl CacheConfig {
    /// Parse and validate a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> CacheResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| CacheError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> CacheResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| CacheError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Render the configuration as TOML.
    pub fn to_toml_string(&self) -> CacheResult<String> {
        toml::to_string_pretty(self).map_err(|e| CacheError::Config(e.to_string()))
    }

    /// Reject values the cache cannot work with.
    pub fn validate(&self) -> CacheResult<()> {
        if self.update_threshold == 0 {
            return Err(CacheError::Config(
                "update_threshold must be at least 1".into(),
            ));
        }
        if let Some(name) = self
            .ignore_file_names
            .iter()
            .find(|name| name.is_empty() || name.contains('/'))
        {
            return Err(CacheError::Config(format!(
                "ignore file name {name:?} must be a bare file name"
            )));
        }
        if self.exclude_files.iter().any(|path| path.is_empty()) {
            return Err(CacheError::Config("exclude file path is empty".into()));
        }
        Ok(())
    }
}
