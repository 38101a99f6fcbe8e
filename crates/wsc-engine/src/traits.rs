use std::collections::BTreeSet;

use wsc_status::StatusSnapshot;
use wsc_types::RepositoryId;

use crate::error::EngineResult;

/// Computes three-way status snapshots for repositories.
///
/// Implementations must be thread-safe (`Send + Sync`). Calls may block on
/// I/O; callers run them off the async executor.
pub trait StatusEngine: Send + Sync {
    /// Human-readable engine name, used in log fields.
    fn name(&self) -> &str {
        "status-engine"
    }

    /// Compute the status of every path in the repository.
    fn compute_full(&self, repository: &RepositoryId) -> EngineResult<StatusSnapshot>;

    /// Compute the status of `paths` and their descendants only.
    ///
    /// Paths with no status are simply absent from the result. The default
    /// implementation restricts a full computation; backends should override
    /// it with a genuinely narrower walk.
    fn compute_partial(
        &self,
        repository: &RepositoryId,
        paths: &BTreeSet<String>,
    ) -> EngineResult<StatusSnapshot> {
        Ok(self.compute_full(repository)?.restrict_to(paths))
    }
}
