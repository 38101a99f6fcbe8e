//! Status listeners and fan-out.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::mpsc;
use tracing::warn;
use wsc_status::StatusSnapshot;
use wsc_types::RepositoryId;

use crate::job::JobKind;

/// A published snapshot, as delivered to listeners.
#[derive(Clone, Debug)]
pub struct StatusEvent {
    pub repository: RepositoryId,
    pub snapshot: Arc<StatusSnapshot>,
    /// Sequence number of the job that produced the snapshot. Strictly
    /// increasing per repository across delivered events.
    pub sequence: u64,
    pub kind: JobKind,
}

/// Receives every snapshot the cache publishes.
///
/// Called on a cache worker, once per published snapshot, in publication
/// order per repository.
///
/// Implementations must not block. Delivery holds a per-repository lock on
/// an async worker thread, so blocking stalls that worker and every later
/// publication for the repository. Hand slow work off, for example through
/// a [`ChannelListener`].
pub trait StatusListener: Send + Sync {
    fn on_status_changed(&self, event: &StatusEvent);

    /// Returns `true` once the listener will never accept another event.
    /// Closed listeners are dropped from the registry.
    fn is_closed(&self) -> bool {
        false
    }
}

impl<F> StatusListener for F
where
    F: Fn(&StatusEvent) + Send + Sync,
{
    fn on_status_changed(&self, event: &StatusEvent) {
        self(event)
    }
}

/// Forwards events into an unbounded channel for async consumers.
#[derive(Debug)]
pub struct ChannelListener {
    sender: mpsc::UnboundedSender<StatusEvent>,
}

impl ChannelListener {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<StatusEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl StatusListener for ChannelListener {
    fn on_status_changed(&self, event: &StatusEvent) {
        // A dropped receiver is detected through `is_closed`.
        let _ = self.sender.send(event.clone());
    }

    fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Handle for removing a registered listener.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl std::fmt::Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// The registry-wide listener list.
#[derive(Default)]
pub(crate) struct ListenerSet {
    next_id: AtomicU64,
    listeners: RwLock<Vec<(ListenerId, Arc<dyn StatusListener>)>>,
}

impl ListenerSet {
    pub fn add(&self, listener: Arc<dyn StatusListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, listener));
        id
    }

    pub fn remove(&self, id: ListenerId) -> bool {
        let mut listeners = self
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Deliver `event` to every listener. The list lock is not held while
    /// listeners run, so a listener may add or remove listeners. A panic in
    /// one listener is logged and does not reach the others.
    pub fn notify(&self, event: &StatusEvent) {
        let current: Vec<(ListenerId, Arc<dyn StatusListener>)> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let mut closed = Vec::new();
        for (id, listener) in current {
            if listener.is_closed() {
                closed.push(id);
                continue;
            }
            let delivered = catch_unwind(AssertUnwindSafe(|| listener.on_status_changed(event)));
            if delivered.is_err() {
                warn!(
                    listener = %id,
                    repo = %event.repository.short_id(),
                    seq = event.sequence,
                    "status listener panicked"
                );
            }
        }
        for id in closed {
            self.remove(id);
        }
    }
}

impl std::fmt::Debug for ListenerSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerSet")
            .field("listeners", &self.len())
            .finish()
    }
}
