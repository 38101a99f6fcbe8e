use serde::Serialize;

/// The two kinds of status job an entry runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Recompute the accumulated changed paths and merge them into the
    /// current snapshot.
    Update,
    /// Recompute the whole repository and replace the snapshot.
    Reload,
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Update => f.write_str("update"),
            Self::Reload => f.write_str("reload"),
        }
    }
}

/// Single-flight bookkeeping for one job kind of one entry.
///
/// At most one job is pending and at most one is running. A pending job is
/// `scheduled` once a task has been submitted for it; it leaves the pending
/// state when that task starts and captures its inputs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct JobSlot {
    pub pending: bool,
    pub scheduled: bool,
    pub running: bool,
}

impl JobSlot {
    /// Mark a job as requested. Returns `false` if one was already pending.
    pub fn request(&mut self) -> bool {
        !std::mem::replace(&mut self.pending, true)
    }

    /// Drop a pending job that has not started.
    pub fn cancel_pending(&mut self) -> bool {
        std::mem::replace(&mut self.pending, false)
    }

    /// Returns `true` if a task should be submitted for the pending job.
    pub fn needs_dispatch(&self) -> bool {
        self.pending && !self.scheduled && !self.running
    }

    /// Returns `true` if a job is pending or running.
    pub fn is_active(&self) -> bool {
        self.pending || self.running
    }

    pub fn start(&mut self) {
        self.pending = false;
        self.scheduled = false;
        self.running = true;
    }

    pub fn finish(&mut self) {
        self.running = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_coalesces() {
        let mut slot = JobSlot::default();
        assert!(slot.request());
        assert!(!slot.request());
        assert!(slot.needs_dispatch());
    }

    #[test]
    fn running_job_blocks_dispatch_of_next() {
        let mut slot = JobSlot::default();
        slot.request();
        slot.scheduled = true;
        slot.start();
        assert!(!slot.needs_dispatch());

        assert!(slot.request());
        assert!(!slot.needs_dispatch());
        slot.finish();
        assert!(slot.needs_dispatch());
    }

    #[test]
    fn cancel_pending() {
        let mut slot = JobSlot::default();
        assert!(!slot.cancel_pending());
        slot.request();
        assert!(slot.cancel_pending());
        assert!(!slot.is_active());
    }

    #[test]
    fn kind_display() {
        assert_eq!(JobKind::Update.to_string(), "update");
        assert_eq!(JobKind::Reload.to_string(), "reload");
    }
}
