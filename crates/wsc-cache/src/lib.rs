//! Incremental working status cache.
//!
//! Keeps the git status of many repositories available without blocking the
//! callers that report changes. Each repository gets a [`CacheEntry`] that
//! turns change notifications into status jobs, patches its snapshot for
//! small batches of changed paths, reloads it for anything larger, and
//! publishes every new snapshot to the registry's listeners.
//!
//! # Key Types
//!
//! - [`CacheRegistry`] -- Explicitly constructed owner of all entries
//! - [`CacheEntry`] -- Snapshot, pending changes and job slots of one repository
//! - [`ReloadPolicy`] -- Decides between an incremental update and a full reload
//! - [`JobScheduler`] -- Runs jobs on tokio and tracks the in-flight count
//! - [`StatusListener`] -- Receives each published [`StatusEvent`]
//! - [`CacheConfig`] -- Thresholds and ignore-rule file names, loaded from TOML
//!
//! # Guarantees
//!
//! 1. A snapshot is only replaced by the result of a job that started later
//!    than the one that produced it.
//! 2. Listeners observe each entry's snapshots in publication order.
//! 3. An engine failure leaves the previous snapshot published.
//! 4. Requests return immediately; engine calls run on blocking threads.

pub mod config;
pub mod entry;
pub mod error;
pub mod job;
pub mod listener;
pub mod notification;
pub mod policy;
pub mod registry;
pub mod scheduler;

#[cfg(test)]
mod test_support;

pub use config::CacheConfig;
pub use entry::{CacheEntry, EntryState, EntryStats, EntryStatsSnapshot};
pub use error::{CacheError, CacheResult};
pub use job::JobKind;
pub use listener::{ChannelListener, ListenerId, StatusEvent, StatusListener};
pub use notification::ChangeNotification;
pub use policy::{ReloadPolicy, ReloadReason};
pub use registry::CacheRegistry;
pub use scheduler::JobScheduler;
