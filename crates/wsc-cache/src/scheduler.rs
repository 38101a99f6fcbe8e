//! Job submission onto a tokio runtime with in-flight accounting.

use std::future::Future;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::watch;

use crate::error::{CacheError, CacheResult};

/// Submits cache jobs to a tokio runtime and tracks how many are in flight.
///
/// The scheduler knows nothing about coalescing or ordering; entries decide
/// what to submit. Cloning is cheap and clones share the in-flight count.
#[derive(Clone, Debug)]
pub struct JobScheduler {
    handle: Handle,
    in_flight: Arc<watch::Sender<usize>>,
}

/// Decrements the in-flight count when a job's task ends, including on
/// panic or runtime shutdown.
struct InFlightGuard(Arc<watch::Sender<usize>>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.send_modify(|count| *count = count.saturating_sub(1));
    }
}

impl JobScheduler {
    /// Bind to an explicit runtime handle.
    pub fn new(handle: Handle) -> Self {
        let (in_flight, _) = watch::channel(0usize);
        Self {
            handle,
            in_flight: Arc::new(in_flight),
        }
    }

    /// Bind to the runtime of the calling context.
    pub fn current() -> CacheResult<Self> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|e| CacheError::NoRuntime(e.to_string()))
    }

    /// Spawn a job. The in-flight count rises before this returns.
    pub fn submit<F>(&self, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.in_flight.send_modify(|count| *count += 1);
        let guard = InFlightGuard(Arc::clone(&self.in_flight));
        self.handle.spawn(async move {
            let _guard = guard;
            job.await;
        });
    }

    /// Run blocking work on the runtime's blocking pool. A panic in `work`
    /// is reported as [`CacheError::JobPanicked`].
    pub async fn run_blocking<T, F>(&self, work: F) -> CacheResult<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        self.handle
            .spawn_blocking(work)
            .await
            .map_err(|e| CacheError::JobPanicked(e.to_string()))
    }

    /// Number of submitted jobs that have not finished.
    pub fn in_flight(&self) -> usize {
        *self.in_flight.borrow()
    }

    /// Resolve once no job is in flight.
    pub async fn wait_idle(&self) {
        let mut idle = self.in_flight.subscribe();
        let _ = idle.wait_for(|count| *count == 0).await;
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn no_runtime_outside_tokio() {
        assert!(matches!(
            JobScheduler::current(),
            Err(CacheError::NoRuntime(_))
        ));
    }

    #[tokio::test]
    async fn wait_idle_covers_submitted_jobs() {
        let scheduler = JobScheduler::current().unwrap();
        let done = Arc::new(AtomicUsize::new(0));
        for _ in 0..8 {
            let done = Arc::clone(&done);
            scheduler.submit(async move {
                tokio::task::yield_now().await;
                done.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(scheduler.in_flight(), 8);
        scheduler.wait_idle().await;
        assert_eq!(done.load(Ordering::SeqCst), 8);
        assert_eq!(scheduler.in_flight(), 0);
    }

    #[tokio::test]
    async fn nested_submission_keeps_scheduler_busy() {
        let scheduler = JobScheduler::current().unwrap();
        let done = Arc::new(AtomicUsize::new(0));
        let inner = scheduler.clone();
        let counter = Arc::clone(&done);
        scheduler.submit(async move {
            inner.submit(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        });
        scheduler.wait_idle().await;
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn blocking_panic_is_reported() {
        let scheduler = JobScheduler::current().unwrap();
        let result: CacheResult<()> = scheduler.run_blocking(|| panic!("engine blew up")).await;
        assert!(matches!(result, Err(CacheError::JobPanicked(_))));

        let value = scheduler.run_blocking(|| 41 + 1).await.unwrap();
        assert_eq!(value, 42);
    }
}
