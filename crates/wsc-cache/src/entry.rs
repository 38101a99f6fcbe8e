//! Per-repository cache entry.
//!
//! A [`CacheEntry`] owns the published snapshot of one repository and turns
//! change requests into status jobs. Requests never block: they record what
//! is needed under the entry lock and submit at most one task per job kind.
//!
//! # Job rules
//!
//! - Per kind, at most one job is pending and at most one is running.
//! - A job takes its sequence number when it starts, not when it is
//!   scheduled. Requests keep coalescing into a scheduled job until it
//!   starts and captures its inputs, so only the start orders those inputs.
//!   A result publishes only if its sequence number is not older than the
//!   published one.
//! - An update never starts while a reload runs; it waits and starts when
//!   the reload completes. A reload may start while an update runs.
//! - A reload request drops a pending update, whose paths the reload covers.
//! - Listeners run outside the entry lock, in publication order.

use std::collections::{BTreeSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tracing::{debug, info, warn};
use wsc_engine::StatusEngine;
use wsc_status::{SnapshotOrigin, StatusSnapshot};
use wsc_types::{try_normalize_path, RepositoryId};

use crate::error::{CacheError, CacheResult};
use crate::job::{JobKind, JobSlot};
use crate::listener::{ListenerSet, StatusEvent};
use crate::notification::ChangeNotification;
use crate::policy::{ReloadPolicy, ReloadReason};
use crate::scheduler::JobScheduler;

/// Services shared by every entry of a registry.
pub(crate) struct EntryContext {
    pub engine: Arc<dyn StatusEngine>,
    pub scheduler: JobScheduler,
    pub listeners: Arc<ListenerSet>,
    pub policy: ReloadPolicy,
    pub filter_ignored_changes: bool,
}

/// Lifecycle state of an entry, derived from its snapshot and job slots.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryState {
    /// No snapshot and no job requested.
    Uninitialized,
    /// The first snapshot is being computed.
    Loading,
    /// A snapshot is published and no job is pending or running.
    Ready,
    /// An incremental update is pending or running.
    Updating,
    /// A full reload is pending or running.
    Reloading,
    /// The entry was disposed and ignores further requests.
    Disposed,
}

/// Job counters for one entry.
#[derive(Debug, Default)]
pub struct EntryStats {
    pub reloads_started: AtomicU64,
    pub updates_started: AtomicU64,
    pub updates_escalated: AtomicU64,
    pub published: AtomicU64,
    pub discarded: AtomicU64,
    pub failed: AtomicU64,
    pub filtered: AtomicU64,
    pub coalesced: AtomicU64,
    pub superseded: AtomicU64,
}

/// Point-in-time copy of [`EntryStats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct EntryStatsSnapshot {
    pub reloads_started: u64,
    pub updates_started: u64,
    pub updates_escalated: u64,
    pub published: u64,
    pub discarded: u64,
    pub failed: u64,
    pub filtered: u64,
    pub coalesced: u64,
    pub superseded: u64,
}

impl EntryStats {
    pub fn snapshot(&self) -> EntryStatsSnapshot {
        EntryStatsSnapshot {
            reloads_started: self.reloads_started.load(Ordering::Relaxed),
            updates_started: self.updates_started.load(Ordering::Relaxed),
            updates_escalated: self.updates_escalated.load(Ordering::Relaxed),
            published: self.published.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            filtered: self.filtered.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            superseded: self.superseded.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Mutable entry state, guarded by the entry lock.
#[derive(Default)]
struct EntryCore {
    snapshot: Option<Arc<StatusSnapshot>>,
    published_seq: u64,
    next_seq: u64,
    /// Changed paths accumulated for the next update.
    pending_paths: BTreeSet<String>,
    update: JobSlot,
    reload: JobSlot,
    last_error: Option<String>,
    /// Published events awaiting delivery, oldest first.
    outbox: VecDeque<StatusEvent>,
}

impl EntryCore {
    fn slot_mut(&mut self, kind: JobKind) -> &mut JobSlot {
        match kind {
            JobKind::Update => &mut self.update,
            JobKind::Reload => &mut self.reload,
        }
    }

    fn take_sequence(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }
}

struct EntryInner {
    repository: RepositoryId,
    context: Arc<EntryContext>,
    core: Mutex<EntryCore>,
    /// Held while draining the outbox, so deliveries never interleave.
    delivery: Mutex<()>,
    disposed: AtomicBool,
    stats: EntryStats,
}

/// The cached status of one repository.
///
/// Cloning is cheap; clones share the same entry.
#[derive(Clone)]
pub struct CacheEntry {
    inner: Arc<EntryInner>,
}

impl CacheEntry {
    pub(crate) fn new(repository: RepositoryId, context: Arc<EntryContext>) -> Self {
        Self {
            inner: Arc::new(EntryInner {
                repository,
                context,
                core: Mutex::new(EntryCore::default()),
                delivery: Mutex::new(()),
                disposed: AtomicBool::new(false),
                stats: EntryStats::default(),
            }),
        }
    }

    pub fn repository(&self) -> &RepositoryId {
        &self.inner.repository
    }

    /// Request a full reload.
    ///
    /// Coalesces with a reload that has not started yet and drops a pending
    /// update. Never blocks on the engine.
    pub fn refresh(&self) {
        self.inner.request_reload(None);
    }

    /// Request an incremental update of `paths`.
    ///
    /// Paths are normalized; paths that escape the repository are dropped. A
    /// batch that lies entirely inside ignored or untracked folders of the
    /// current snapshot is skipped. A change to the repository root requests
    /// a reload.
    pub fn refresh_files<I, S>(&self, paths: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut changed = BTreeSet::new();
        for raw in paths {
            match try_normalize_path(raw.as_ref()) {
                Ok(path) => {
                    changed.insert(path);
                }
                Err(e) => debug!(
                    repo = %self.inner.repository.short_id(),
                    path = raw.as_ref(),
                    error = %e,
                    "dropping invalid changed path"
                ),
            }
        }
        if changed.is_empty() {
            return;
        }
        if changed.contains("") {
            self.inner.request_reload(None);
            return;
        }
        self.inner.request_update(changed);
    }

    /// Route a change notification to [`Self::refresh`] or
    /// [`Self::refresh_files`].
    pub fn notify(&self, notification: ChangeNotification) {
        match notification {
            ChangeNotification::Paths(paths) => self.refresh_files(paths),
            ChangeNotification::RefChanged => {
                self.inner.request_reload(Some(ReloadReason::RefChanged))
            }
        }
    }

    /// The last published snapshot. Never waits for a running job.
    pub fn snapshot(&self) -> Option<Arc<StatusSnapshot>> {
        self.inner.lock().snapshot.clone()
    }

    /// Sequence number of the last published snapshot, 0 before the first.
    pub fn sequence(&self) -> u64 {
        self.inner.lock().published_seq
    }

    pub fn state(&self) -> EntryState {
        if self.is_disposed() {
            return EntryState::Disposed;
        }
        let core = self.inner.lock();
        match (&core.snapshot, core.reload.is_active(), core.update.is_active()) {
            (None, false, false) => EntryState::Uninitialized,
            (None, _, _) => EntryState::Loading,
            (Some(_), true, _) => EntryState::Reloading,
            (Some(_), false, true) => EntryState::Updating,
            (Some(_), false, false) => EntryState::Ready,
        }
    }

    /// Message of the last failed job, cleared by the next publication.
    pub fn last_error(&self) -> Option<String> {
        self.inner.lock().last_error.clone()
    }

    pub fn stats(&self) -> EntryStatsSnapshot {
        self.inner.stats.snapshot()
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    /// Stop the entry. Pending jobs exit when they start and running jobs
    /// discard their result. Returns `false` if already disposed.
    pub(crate) fn dispose(&self) -> bool {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return false;
        }
        let mut core = self.inner.lock();
        core.update.cancel_pending();
        core.reload.cancel_pending();
        core.pending_paths.clear();
        core.outbox.clear();
        info!(repo = %self.inner.repository.short_id(), "cache entry disposed");
        true
    }
}

impl std::fmt::Debug for CacheEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEntry")
            .field("repository", &self.inner.repository)
            .field("state", &self.state())
            .field("sequence", &self.sequence())
            .finish()
    }
}

impl EntryInner {
    fn lock(&self) -> MutexGuard<'_, EntryCore> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    fn request_reload(self: &Arc<Self>, reason: Option<ReloadReason>) {
        let mut core = self.lock();
        if self.is_disposed() {
            return;
        }
        if core.update.cancel_pending() {
            debug!(
                repo = %self.repository.short_id(),
                paths = core.pending_paths.len(),
                "pending update superseded by reload"
            );
            core.pending_paths.clear();
            EntryStats::bump(&self.stats.superseded);
        }
        if core.reload.request() {
            match &reason {
                Some(reason) => {
                    debug!(repo = %self.repository.short_id(), %reason, "reload requested")
                }
                None => debug!(repo = %self.repository.short_id(), "reload requested"),
            }
        } else {
            debug!(repo = %self.repository.short_id(), "reload coalesced with pending reload");
            EntryStats::bump(&self.stats.coalesced);
        }
        self.dispatch(&mut core);
    }

    fn request_update(self: &Arc<Self>, changed: BTreeSet<String>) {
        let mut core = self.lock();
        if self.is_disposed() {
            return;
        }
        let subsumed = self.context.filter_ignored_changes
            && core
                .snapshot
                .as_ref()
                .is_some_and(|snapshot| snapshot.subsumes_all(&changed));
        if subsumed {
            debug!(
                repo = %self.repository.short_id(),
                paths = changed.len(),
                "changes inside ignored folders skipped"
            );
            EntryStats::bump(&self.stats.filtered);
            return;
        }
        if core.reload.pending {
            debug!(
                repo = %self.repository.short_id(),
                paths = changed.len(),
                "changes absorbed by pending reload"
            );
            EntryStats::bump(&self.stats.coalesced);
            return;
        }
        core.pending_paths.extend(changed);
        if !core.update.request() {
            EntryStats::bump(&self.stats.coalesced);
        }
        self.dispatch(&mut core);
    }

    /// Submit tasks for pending jobs that may start now.
    fn dispatch(self: &Arc<Self>, core: &mut EntryCore) {
        if core.reload.needs_dispatch() {
            core.reload.scheduled = true;
            let entry = Arc::clone(self);
            self.context.scheduler.submit(async move { entry.run_reload().await });
        }
        if core.update.needs_dispatch() && !core.reload.running {
            core.update.scheduled = true;
            let entry = Arc::clone(self);
            self.context.scheduler.submit(async move { entry.run_update().await });
        }
    }

    async fn run_reload(self: Arc<Self>) {
        let seq = {
            let mut core = self.lock();
            core.reload.scheduled = false;
            if self.is_disposed() || !core.reload.pending {
                return;
            }
            core.reload.start();
            core.take_sequence()
        };
        EntryStats::bump(&self.stats.reloads_started);
        debug!(repo = %self.repository.short_id(), seq, "reload started");

        let engine = Arc::clone(&self.context.engine);
        let repository = self.repository.clone();
        let result = self
            .context
            .scheduler
            .run_blocking(move || engine.compute_full(&repository))
            .await
            .and_then(|computed| computed.map_err(CacheError::from))
            .map(|full| full.with_origin(SnapshotOrigin::Full));

        self.complete(JobKind::Reload, seq, None, result);
    }

    async fn run_update(self: Arc<Self>) {
        let (seq, paths) = {
            let mut core = self.lock();
            core.update.scheduled = false;
            if self.is_disposed() || !core.update.pending {
                return;
            }
            if core.reload.running {
                // Dispatched again when the reload completes.
                return;
            }
            let paths = std::mem::take(&mut core.pending_paths);
            let escalation = if core.snapshot.is_none() {
                Some(ReloadReason::NotLoaded)
            } else {
                self.context.policy.should_reload(&paths)
            };
            if let Some(reason) = escalation {
                core.update.cancel_pending();
                EntryStats::bump(&self.stats.updates_escalated);
                debug!(
                    repo = %self.repository.short_id(),
                    paths = paths.len(),
                    %reason,
                    "update escalated to reload"
                );
                if !core.reload.request() {
                    EntryStats::bump(&self.stats.coalesced);
                }
                self.dispatch(&mut core);
                return;
            }
            let paths = match &core.snapshot {
                Some(snapshot) => snapshot.widen_to_summaries(&paths),
                None => paths,
            };
            core.update.start();
            (core.take_sequence(), paths)
        };
        EntryStats::bump(&self.stats.updates_started);
        debug!(
            repo = %self.repository.short_id(),
            seq,
            paths = paths.len(),
            "update started"
        );

        let engine = Arc::clone(&self.context.engine);
        let repository = self.repository.clone();
        let requested = paths.clone();
        let result = self
            .context
            .scheduler
            .run_blocking(move || engine.compute_partial(&repository, &requested))
            .await
            .and_then(|computed| computed.map_err(CacheError::from));

        self.complete(JobKind::Update, seq, Some(paths), result);
    }

    /// Publish or discard a job result, then start follow-up jobs and
    /// deliver what was published.
    fn complete(
        self: &Arc<Self>,
        kind: JobKind,
        seq: u64,
        changed: Option<BTreeSet<String>>,
        result: CacheResult<StatusSnapshot>,
    ) {
        let mut core = self.lock();
        core.slot_mut(kind).finish();
        if self.is_disposed() {
            EntryStats::bump(&self.stats.discarded);
            debug!(repo = %self.repository.short_id(), seq, %kind, "entry disposed, result discarded");
            return;
        }

        match result {
            Err(e) => {
                warn!(
                    repo = %self.repository.short_id(),
                    seq,
                    %kind,
                    error = %e,
                    "status job failed, keeping previous snapshot"
                );
                core.last_error = Some(e.to_string());
                EntryStats::bump(&self.stats.failed);
            }
            Ok(_) if seq < core.published_seq => {
                debug!(
                    repo = %self.repository.short_id(),
                    seq,
                    published = core.published_seq,
                    %kind,
                    "stale result discarded"
                );
                EntryStats::bump(&self.stats.discarded);
            }
            Ok(computed) => {
                let snapshot = match (&changed, core.snapshot.as_deref()) {
                    (Some(changed), Some(base)) => base.merge_partial(changed, &computed),
                    // Updates start only once a snapshot exists, and it is never cleared.
                    _ => computed,
                };
                let snapshot = Arc::new(snapshot);
                core.snapshot = Some(Arc::clone(&snapshot));
                core.published_seq = seq;
                core.last_error = None;
                core.outbox.push_back(StatusEvent {
                    repository: self.repository.clone(),
                    snapshot,
                    sequence: seq,
                    kind,
                });
                EntryStats::bump(&self.stats.published);
                debug!(repo = %self.repository.short_id(), seq, %kind, "snapshot published");
            }
        }

        self.dispatch(&mut core);
        drop(core);
        self.deliver();
    }

    /// Drain the outbox into the listeners. Only one caller drains at a
    /// time and events leave in the order they were published.
    ///
    /// Listeners run on the calling worker thread while the delivery lock is
    /// held, so a slow listener stalls that worker and any job of this entry
    /// completing concurrently. See [`crate::StatusListener`].
    fn deliver(&self) {
        let _turn = self.delivery.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            let next = self.lock().outbox.pop_front();
            let Some(event) = next else {
                break;
            };
            self.context.listeners.notify(&event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use crate::listener::ChannelListener;
    use crate::test_support::{drain, eventually, repo, GatedEngine};
    use tokio::sync::mpsc::UnboundedReceiver;

    struct Fixture {
        engine: Arc<GatedEngine>,
        scheduler: JobScheduler,
        entry: CacheEntry,
        events: UnboundedReceiver<StatusEvent>,
    }

    impl Fixture {
        fn new(config: CacheConfig) -> Self {
            let engine = Arc::new(GatedEngine::default());
            let repository = repo("entry-test");
            engine.inner.create_repository(&repository).unwrap();

            let scheduler = JobScheduler::current().unwrap();
            let listeners = Arc::new(ListenerSet::default());
            let (listener, events) = ChannelListener::new();
            listeners.add(Arc::new(listener));

            let context = Arc::new(EntryContext {
                engine: engine.clone(),
                scheduler: scheduler.clone(),
                listeners,
                policy: ReloadPolicy::from_config(&config),
                filter_ignored_changes: config.filter_ignored_changes,
            });
            let entry = CacheEntry::new(repository, context);
            Self {
                engine,
                scheduler,
                entry,
                events,
            }
        }

        fn write(&self, path: &str) {
            self.engine
                .inner
                .write_file(self.entry.repository(), path, path)
                .unwrap();
        }

        async fn settle(&mut self) -> Vec<StatusEvent> {
            self.scheduler.wait_idle().await;
            drain(&mut self.events)
        }

        /// Initial reload, with its event consumed.
        async fn loaded(config: CacheConfig) -> Self {
            let mut fixture = Self::new(config);
            fixture.entry.refresh();
            let events = fixture.settle().await;
            assert_eq!(events.len(), 1);
            fixture
        }
    }

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn new_entry_is_uninitialized() {
        let fixture = Fixture::new(CacheConfig::default());
        assert_eq!(fixture.entry.state(), EntryState::Uninitialized);
        assert!(fixture.entry.snapshot().is_none());
        assert_eq!(fixture.entry.sequence(), 0);
    }

    #[tokio::test]
    async fn refresh_publishes_one_full_snapshot() {
        let mut fixture = Fixture::loaded(CacheConfig::default()).await;
        fixture.write("new.txt");

        fixture.entry.refresh();
        let events = fixture.settle().await;

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, JobKind::Reload);
        assert!(events[0].snapshot.origin.is_full());
        assert_eq!(events[0].snapshot.untracked, set(&["new.txt"]));
        assert_eq!(fixture.entry.state(), EntryState::Ready);
    }

    #[tokio::test]
    async fn repeated_refresh_before_start_coalesces() {
        let mut fixture = Fixture::new(CacheConfig::default());
        fixture.entry.refresh();
        fixture.entry.refresh();
        fixture.entry.refresh();
        assert_eq!(fixture.entry.state(), EntryState::Loading);

        let events = fixture.settle().await;
        assert_eq!(events.len(), 1);
        assert_eq!(fixture.engine.inner.full_computations(), 1);
        assert_eq!(fixture.entry.stats().coalesced, 2);
    }

    #[tokio::test]
    async fn single_path_updates_incrementally() {
        let mut fixture = Fixture::loaded(CacheConfig::default()).await;
        fixture.write("a");

        fixture.entry.refresh_files(["a"]);
        let events = fixture.settle().await;

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, JobKind::Update);
        assert_eq!(
            events[0].snapshot.origin,
            SnapshotOrigin::Incremental { paths: set(&["a"]) }
        );
        assert_eq!(events[0].snapshot.untracked, set(&["a"]));
        assert_eq!(fixture.engine.inner.full_computations(), 1);
        assert_eq!(fixture.engine.inner.partial_computations(), 1);
    }

    #[tokio::test]
    async fn batch_over_threshold_escalates_to_reload() {
        let mut fixture = Fixture::loaded(CacheConfig::default()).await;
        fixture.write("a");
        fixture.write("b");

        fixture.entry.refresh_files(["a", "b"]);
        let events = fixture.settle().await;

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, JobKind::Reload);
        assert_eq!(events[0].snapshot.untracked, set(&["a", "b"]));
        let stats = fixture.entry.stats();
        assert_eq!(stats.updates_escalated, 1);
        assert_eq!(stats.updates_started, 0);
        assert_eq!(fixture.engine.inner.partial_computations(), 0);
        assert_eq!(fixture.engine.inner.full_computations(), 2);
    }

    #[tokio::test]
    async fn ignore_file_change_reloads_regardless_of_threshold() {
        let config = CacheConfig {
            update_threshold: 50,
            ..Default::default()
        };
        let mut fixture = Fixture::loaded(config).await;
        fixture
            .engine
            .inner
            .write_file(fixture.entry.repository(), ".gitignore", "*.log\n")
            .unwrap();
        fixture.write("debug.log");

        fixture.entry.refresh_files([".gitignore"]);
        let events = fixture.settle().await;

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, JobKind::Reload);
        assert_eq!(events[0].snapshot.ignored_not_in_index, set(&["debug.log"]));
    }

    #[tokio::test]
    async fn changes_inside_ignored_folder_schedule_nothing() {
        let mut fixture = Fixture::new(CacheConfig::default());
        fixture
            .engine
            .inner
            .write_file(fixture.entry.repository(), ".gitignore", "target/\n")
            .unwrap();
        fixture.write("target/debug/app");
        fixture.entry.refresh();
        fixture.settle().await;

        fixture.entry.refresh_files(["target/debug/app", "target/debug/app.d"]);
        assert_eq!(fixture.scheduler.in_flight(), 0);
        assert!(fixture.settle().await.is_empty());
        assert_eq!(fixture.entry.stats().filtered, 1);
        assert_eq!(fixture.engine.inner.full_computations(), 1);
    }

    #[tokio::test]
    async fn staging_inside_untracked_folder_updates_status() {
        let mut fixture = Fixture::new(CacheConfig::default());
        fixture.write("scratch/a");
        fixture.write("scratch/b");
        fixture.entry.refresh();
        let events = fixture.settle().await;
        assert_eq!(events[0].snapshot.untracked_folders, set(&["scratch"]));

        fixture
            .engine
            .inner
            .stage(fixture.entry.repository(), "scratch/a")
            .unwrap();
        fixture.entry.refresh_files(["scratch/a"]);
        let events = fixture.settle().await;

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, JobKind::Update);
        let snapshot = &events[0].snapshot;
        assert_eq!(snapshot.added, set(&["scratch/a"]));
        assert_eq!(snapshot.untracked, set(&["scratch/b"]));
        assert!(snapshot.untracked_folders.is_empty());
        assert!(snapshot.validate().is_ok());
        assert_eq!(fixture.entry.stats().filtered, 0);
    }

    #[tokio::test]
    async fn deleting_ignored_file_updates_status() {
        let mut fixture = Fixture::new(CacheConfig::default());
        fixture
            .engine
            .inner
            .write_file(fixture.entry.repository(), ".gitignore", "*.log\n")
            .unwrap();
        fixture.write("debug.log");
        fixture.entry.refresh();
        let events = fixture.settle().await;
        assert_eq!(events[0].snapshot.ignored_not_in_index, set(&["debug.log"]));

        fixture
            .engine
            .inner
            .delete_file(fixture.entry.repository(), "debug.log")
            .unwrap();
        fixture.entry.refresh_files(["debug.log"]);
        let events = fixture.settle().await;

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, JobKind::Update);
        assert!(events[0].snapshot.ignored_not_in_index.is_empty());
        assert_eq!(events[0].snapshot.untracked, set(&[".gitignore"]));
        assert_eq!(fixture.entry.stats().filtered, 0);
    }

    #[tokio::test]
    async fn filter_can_be_disabled() {
        let config = CacheConfig {
            filter_ignored_changes: false,
            ..Default::default()
        };
        let mut fixture = Fixture::new(config);
        fixture
            .engine
            .inner
            .write_file(fixture.entry.repository(), ".gitignore", "target/\n")
            .unwrap();
        fixture.write("target/app");
        fixture.entry.refresh();
        fixture.settle().await;

        fixture.entry.refresh_files(["target/app"]);
        assert_eq!(fixture.settle().await.len(), 1);
        assert_eq!(fixture.entry.stats().filtered, 0);
    }

    #[tokio::test]
    async fn invalid_paths_are_dropped() {
        let mut fixture = Fixture::loaded(CacheConfig::default()).await;
        fixture.entry.refresh_files(["../outside", "/../x"]);
        assert!(fixture.settle().await.is_empty());
    }

    #[tokio::test]
    async fn root_change_requests_reload() {
        let mut fixture = Fixture::loaded(CacheConfig::default()).await;
        fixture.entry.refresh_files(["."]);
        let events = fixture.settle().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, JobKind::Reload);
    }

    #[tokio::test]
    async fn ref_change_reloads() {
        let mut fixture = Fixture::loaded(CacheConfig::default()).await;
        fixture.entry.notify(ChangeNotification::RefChanged);
        let events = fixture.settle().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, JobKind::Reload);
    }

    #[tokio::test]
    async fn refresh_supersedes_pending_update() {
        let mut fixture = Fixture::new(CacheConfig::default());
        fixture.engine.hold_full();
        fixture.entry.refresh();
        let engine = Arc::clone(&fixture.engine);
        eventually(|| engine.held() == 1).await;

        // Update waits behind the running reload, then a refresh drops it.
        fixture.write("a");
        fixture.entry.refresh_files(["a"]);
        assert_eq!(fixture.entry.state(), EntryState::Loading);
        fixture.entry.refresh();
        fixture.engine.open();

        let events = fixture.settle().await;
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.kind == JobKind::Reload));
        assert_eq!(fixture.entry.stats().superseded, 1);
        assert_eq!(fixture.engine.inner.partial_computations(), 0);
    }

    #[tokio::test]
    async fn update_waits_for_running_reload() {
        let mut fixture = Fixture::loaded(CacheConfig::default()).await;
        fixture.engine.hold_full();
        fixture.entry.refresh();
        let engine = Arc::clone(&fixture.engine);
        eventually(|| engine.held() == 1).await;

        fixture.write("late.txt");
        fixture.entry.refresh_files(["late.txt"]);
        tokio::task::yield_now().await;
        assert_eq!(fixture.engine.inner.partial_computations(), 0);
        fixture.engine.open();

        let events = fixture.settle().await;
        let kinds: Vec<JobKind> = events.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![JobKind::Reload, JobKind::Update]);
        assert!(events[0].sequence < events[1].sequence);
        assert_eq!(events[1].snapshot.untracked, set(&["late.txt"]));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn stale_update_is_discarded() {
        let mut fixture = Fixture::loaded(CacheConfig::default()).await;
        assert_eq!(fixture.entry.sequence(), 1);

        fixture.engine.hold_partial();
        fixture.write("a");
        fixture.entry.refresh_files(["a"]);
        let engine = Arc::clone(&fixture.engine);
        eventually(|| engine.held() == 1).await;

        // The reload starts after the held update and publishes first.
        fixture.write("b");
        fixture.entry.refresh();
        let entry = fixture.entry.clone();
        eventually(|| entry.sequence() == 3).await;

        fixture.engine.open();
        let events = fixture.settle().await;

        let sequences: Vec<u64> = events.iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![3]);
        assert_eq!(fixture.entry.stats().discarded, 1);
        assert_eq!(fixture.entry.sequence(), 3);
        let snapshot = fixture.entry.snapshot().unwrap();
        assert!(snapshot.origin.is_full());
        assert_eq!(snapshot.untracked, set(&["a", "b"]));
    }

    #[tokio::test]
    async fn engine_failure_keeps_previous_snapshot() {
        let mut fixture = Fixture::loaded(CacheConfig::default()).await;
        let before = fixture.entry.snapshot().unwrap();

        fixture.engine.set_failing(true);
        fixture.write("a");
        fixture.entry.refresh();
        assert!(fixture.settle().await.is_empty());
        assert!(Arc::ptr_eq(&before, &fixture.entry.snapshot().unwrap()));
        assert!(fixture.entry.last_error().unwrap().contains("injected failure"));
        assert_eq!(fixture.entry.stats().failed, 1);

        fixture.engine.set_failing(false);
        fixture.entry.refresh_files(["a"]);
        let events = fixture.settle().await;
        assert_eq!(events.len(), 1);
        assert!(fixture.entry.last_error().is_none());
    }

    #[tokio::test]
    async fn engine_panic_is_contained() {
        let mut fixture = Fixture::loaded(CacheConfig::default()).await;
        fixture.engine.set_panicking(true);
        fixture.entry.refresh();
        assert!(fixture.settle().await.is_empty());
        assert_eq!(fixture.entry.stats().failed, 1);
        assert!(fixture.entry.last_error().is_some());

        fixture.engine.set_panicking(false);
        fixture.entry.refresh();
        assert_eq!(fixture.settle().await.len(), 1);
    }

    #[tokio::test]
    async fn update_without_snapshot_escalates() {
        let mut fixture = Fixture::new(CacheConfig::default());
        fixture.write("a");
        fixture.entry.refresh_files(["a"]);
        let events = fixture.settle().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, JobKind::Reload);
        assert_eq!(fixture.entry.stats().updates_escalated, 1);
    }

    #[tokio::test]
    async fn dispose_discards_running_job() {
        let mut fixture = Fixture::new(CacheConfig::default());
        fixture.engine.hold_full();
        fixture.entry.refresh();
        let engine = Arc::clone(&fixture.engine);
        eventually(|| engine.held() == 1).await;

        assert!(fixture.entry.dispose());
        assert!(!fixture.entry.dispose());
        fixture.engine.open();

        assert!(fixture.settle().await.is_empty());
        assert!(fixture.entry.snapshot().is_none());
        assert_eq!(fixture.entry.state(), EntryState::Disposed);
        assert_eq!(fixture.entry.stats().discarded, 1);

        fixture.entry.refresh();
        assert_eq!(fixture.scheduler.in_flight(), 0);
    }

    #[tokio::test]
    async fn dispose_cancels_pending_job() {
        let mut fixture = Fixture::new(CacheConfig::default());
        fixture.entry.refresh();
        fixture.entry.dispose();
        assert!(fixture.settle().await.is_empty());
        assert_eq!(fixture.engine.inner.full_computations(), 0);
    }
}
