//! Engines and helpers shared by the cache's scheduling tests.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use wsc_engine::{EngineError, EngineResult, InMemoryStatusEngine, StatusEngine};
use wsc_status::StatusSnapshot;
use wsc_types::RepositoryId;

use crate::listener::StatusEvent;

pub fn repo(name: &str) -> RepositoryId {
    RepositoryId::new(format!("/virtual/{name}/.git"))
}

#[derive(Default)]
struct Gate {
    full: bool,
    partial: bool,
}

/// Wraps the in-memory engine with gates that hold computations until the
/// test opens them, and with switchable failures.
#[derive(Default)]
pub struct GatedEngine {
    pub inner: InMemoryStatusEngine,
    gate: Mutex<Gate>,
    released: Condvar,
    held: AtomicU64,
    fail: AtomicBool,
    panic: AtomicBool,
}

impl GatedEngine {
    pub fn hold_full(&self) {
        self.gate.lock().unwrap().full = true;
    }

    pub fn hold_partial(&self) {
        self.gate.lock().unwrap().partial = true;
    }

    pub fn open(&self) {
        *self.gate.lock().unwrap() = Gate::default();
        self.released.notify_all();
    }

    /// Number of computations that have reached a closed gate.
    pub fn held(&self) -> u64 {
        self.held.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn set_panicking(&self, panic: bool) {
        self.panic.store(panic, Ordering::SeqCst);
    }

    fn pass(&self, full: bool) -> EngineResult<()> {
        let mut gate = self.gate.lock().unwrap();
        let closed = |gate: &Gate| if full { gate.full } else { gate.partial };
        if closed(&gate) {
            self.held.fetch_add(1, Ordering::SeqCst);
        }
        while closed(&gate) {
            gate = self.released.wait(gate).unwrap();
        }
        drop(gate);

        if self.panic.load(Ordering::SeqCst) {
            panic!("status engine panicked");
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(EngineError::Corrupt("injected failure".into()));
        }
        Ok(())
    }
}

impl StatusEngine for GatedEngine {
    fn compute_full(&self, repository: &RepositoryId) -> EngineResult<StatusSnapshot> {
        self.pass(true)?;
        self.inner.compute_full(repository)
    }

    fn compute_partial(
        &self,
        repository: &RepositoryId,
        paths: &BTreeSet<String>,
    ) -> EngineResult<StatusSnapshot> {
        self.pass(false)?;
        self.inner.compute_partial(repository, paths)
    }
}

/// Poll `condition` until it holds, failing the test after a few seconds.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

/// Everything currently queued on an event channel.
pub fn drain(receiver: &mut mpsc::UnboundedReceiver<StatusEvent>) -> Vec<StatusEvent> {
    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        events.push(event);
    }
    events
}
