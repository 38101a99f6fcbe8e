//! Status engines for the working status cache.
//!
//! A status engine compares HEAD, the index and the working tree of a
//! repository and reports the result as a [`StatusSnapshot`]. The cache
//! consumes engines through the [`StatusEngine`] trait and never walks a
//! working tree itself.
//!
//! # Engines
//!
//! - [`InMemoryStatusEngine`] -- Three-way status over in-memory HEAD, index
//!   and worktree maps, with gitignore semantics. Used by tests, demos and the
//!   replay CLI.
//!
//! # Contract
//!
//! 1. `compute_full` reports every path with a status.
//! 2. `compute_partial` reports the requested paths and their descendants,
//!    plus the untracked or ignored folders enclosing a requested path.
//! 3. Paths are repository-relative and normalized.
//! 4. Engines are `Send + Sync`; the cache calls them from blocking worker
//!    threads.
//!
//! [`StatusSnapshot`]: wsc_status::StatusSnapshot

pub mod error;
pub mod ignore_rules;
pub mod memory;
pub mod traits;

pub use error::{EngineError, EngineResult};
pub use ignore_rules::{IgnoreRules, IGNORE_FILE_NAME};
pub use memory::InMemoryStatusEngine;
pub use traits::StatusEngine;
