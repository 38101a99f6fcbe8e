use std::path::PathBuf;

use wsc_engine::EngineError;

/// Errors produced by the status cache.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The registry was shut down and accepts no new entries.
    #[error("status cache is shut down")]
    ShutDown,

    /// No tokio runtime is available to run cache jobs.
    #[error("no tokio runtime available: {0}")]
    NoRuntime(String),

    /// The configuration holds an invalid value.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The configuration file could not be read.
    #[error("failed to read config file {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The status engine failed.
    #[error("status engine error: {0}")]
    Engine(#[from] EngineError),

    /// A status computation panicked or was cancelled.
    #[error("status job aborted: {0}")]
    JobPanicked(String),
}

/// Convenience alias used throughout the cache crate.
pub type CacheResult<T> = std::result::Result<T, CacheError>;
