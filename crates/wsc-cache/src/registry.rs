use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info};
use wsc_engine::StatusEngine;
use wsc_types::RepositoryId;

use crate::config::CacheConfig;
use crate::entry::{CacheEntry, EntryContext};
use crate::error::{CacheError, CacheResult};
use crate::listener::{ChannelListener, ListenerId, ListenerSet, StatusEvent, StatusListener};
use crate::notification::ChangeNotification;
use crate::policy::ReloadPolicy;
use crate::scheduler::JobScheduler;

struct RegistryInner {
    config: CacheConfig,
    context: Arc<EntryContext>,
    entries: RwLock<HashMap<RepositoryId, CacheEntry>>,
    shut_down: AtomicBool,
}

/// Owns one [`CacheEntry`] per watched repository.
///
/// Created explicitly with [`CacheRegistry::init`] and passed to whatever
/// needs it. Cloning is cheap; clones share the same registry.
#[derive(Clone)]
pub struct CacheRegistry {
    inner: Arc<RegistryInner>,
}

impl CacheRegistry {
    /// Create a registry whose jobs run on the current tokio runtime.
    pub fn init(engine: Arc<dyn StatusEngine>, config: CacheConfig) -> CacheResult<Self> {
        let scheduler = JobScheduler::current()?;
        Self::build(engine, config, scheduler)
    }

    /// Create a registry whose jobs run on the runtime behind `handle`.
    pub fn with_handle(
        engine: Arc<dyn StatusEngine>,
        config: CacheConfig,
        handle: Handle,
    ) -> CacheResult<Self> {
        Self::build(engine, config, JobScheduler::new(handle))
    }

    fn build(
        engine: Arc<dyn StatusEngine>,
        config: CacheConfig,
        scheduler: JobScheduler,
    ) -> CacheResult<Self> {
        config.validate()?;
        info!(
            engine = engine.name(),
            update_threshold = config.update_threshold,
            "status cache started"
        );
        let context = Arc::new(EntryContext {
            engine,
            scheduler,
            listeners: Arc::new(ListenerSet::default()),
            policy: ReloadPolicy::from_config(&config),
            filter_ignored_changes: config.filter_ignored_changes,
        });
        Ok(Self {
            inner: Arc::new(RegistryInner {
                config,
                context,
                entries: RwLock::new(HashMap::new()),
                shut_down: AtomicBool::new(false),
            }),
        })
    }

    /// The entry for `repository`, created on first access.
    ///
    /// Concurrent first accesses create a single entry, and only its creator
    /// schedules the initial full reload.
    pub fn get_entry(&self, repository: &RepositoryId) -> CacheResult<CacheEntry> {
        self.ensure_running()?;
        if let Some(entry) = self.read_entries().get(repository) {
            return Ok(entry.clone());
        }

        let entry = {
            let mut entries = self
                .inner
                .entries
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            self.ensure_running()?;
            if let Some(entry) = entries.get(repository) {
                return Ok(entry.clone());
            }
            let entry = CacheEntry::new(repository.clone(), Arc::clone(&self.inner.context));
            entries.insert(repository.clone(), entry.clone());
            entry
        };
        info!(repo = %repository.short_id(), path = %repository, "cache entry created");
        entry.refresh();
        Ok(entry)
    }

    /// The entry for `repository`, if one exists.
    pub fn entry(&self, repository: &RepositoryId) -> Option<CacheEntry> {
        self.read_entries().get(repository).cloned()
    }

    /// Route a change notification to the entry for `repository`, creating
    /// it if needed.
    pub fn notify(
        &self,
        repository: &RepositoryId,
        notification: ChangeNotification,
    ) -> CacheResult<()> {
        debug!(repo = %repository.short_id(), %notification, "change notification");
        self.get_entry(repository)?.notify(notification);
        Ok(())
    }

    pub fn add_listener(&self, listener: Arc<dyn StatusListener>) -> ListenerId {
        self.inner.context.listeners.add(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.inner.context.listeners.remove(id)
    }

    /// Register a channel listener and return its receiving end.
    pub fn subscribe(&self) -> (ListenerId, UnboundedReceiver<StatusEvent>) {
        let (listener, receiver) = ChannelListener::new();
        (self.add_listener(Arc::new(listener)), receiver)
    }

    pub fn listener_count(&self) -> usize {
        self.inner.context.listeners.len()
    }

    /// Remove and dispose the entry for `repository`. Returns `false` if
    /// there was none.
    pub fn dispose_entry(&self, repository: &RepositoryId) -> bool {
        let removed = self
            .inner
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(repository);
        match removed {
            Some(entry) => entry.dispose(),
            None => false,
        }
    }

    /// Dispose every entry.
    pub fn dispose_all(&self) {
        let drained: Vec<CacheEntry> = self
            .inner
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, entry)| entry)
            .collect();
        for entry in &drained {
            entry.dispose();
        }
        debug!(count = drained.len(), "cache entries disposed");
    }

    /// Dispose every entry and refuse new ones. Jobs already running finish
    /// and discard their results; see [`Self::wait_idle`].
    pub fn shutdown(&self) {
        if self.inner.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        self.dispose_all();
        info!("status cache shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::Acquire)
    }

    /// Resolve once no cache job is in flight.
    pub async fn wait_idle(&self) {
        self.inner.context.scheduler.wait_idle().await;
    }

    /// Repositories with an entry, in no particular order.
    pub fn repositories(&self) -> Vec<RepositoryId> {
        self.read_entries().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_entries().is_empty()
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    fn ensure_running(&self) -> CacheResult<()> {
        if self.is_shut_down() {
            return Err(CacheError::ShutDown);
        }
        Ok(())
    }

    fn read_entries(
        &self,
    ) -> std::sync::RwLockReadGuard<'_, HashMap<RepositoryId, CacheEntry>> {
        self.inner
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for CacheRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheRegistry")
            .field("entries", &self.len())
            .field("listeners", &self.listener_count())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}
