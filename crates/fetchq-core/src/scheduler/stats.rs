//! Scheduler counters, published on every state change.

/// Snapshot of scheduler-wide counters.
///
/// `pending` mirrors the pending stack length, `active` is the number of
/// admitted transfers that have not finished yet, and `outstanding` counts
/// requests that were admitted but not yet released.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub pending: usize,
    pub active: usize,
    pub outstanding: usize,
    /// Highest `active` value seen so far.
    pub peak_active: usize,
    pub admitted: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub released: u64,
    /// How many times an admission monitor has been started.
    pub monitor_starts: u64,
}

impl SchedulerStats {
    /// Requests that are still queued or transferring.
    pub fn unfinished(&self) -> usize {
        self.pending + self.active
    }

    /// Finished requests whose owner has not released them yet.
    pub fn unreleased(&self) -> usize {
        self.outstanding.saturating_sub(self.active)
    }

    pub fn is_idle(&self) -> bool {
        self.unfinished() == 0
    }
}
