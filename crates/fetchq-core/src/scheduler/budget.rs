//! Active-transfer budget.
//!
//! The monitor admits a request only while fewer than `max_active` transfers
//! are running. The count itself lives in [`SchedulerStats::active`]; this
//! type owns the limit and the arithmetic around it.
//!
//! [`SchedulerStats::active`]: super::SchedulerStats::active

use super::stats::SchedulerStats;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferBudget {
    max_active: usize,
}

impl TransferBudget {
    /// Create a budget; a limit of 0 is treated as 1.
    pub fn new(max_active: usize) -> Self {
        Self {
            max_active: max_active.max(1),
        }
    }

    pub fn max_active(&self) -> usize {
        self.max_active
    }

    /// True if one more transfer may start.
    pub fn has_room(&self, stats: &SchedulerStats) -> bool {
        stats.active < self.max_active
    }

    /// Free slots. May be 0 when the budget is fully used.
    pub fn available(&self, stats: &SchedulerStats) -> usize {
        self.max_active.saturating_sub(stats.active)
    }

    /// Count one admitted transfer.
    pub(crate) fn reserve(&self, stats: &mut SchedulerStats) {
        stats.active += 1;
        stats.peak_active = stats.peak_active.max(stats.active);
    }

    /// Return one slot when a transfer finishes. Never goes below zero.
    pub(crate) fn release(&self, stats: &mut SchedulerStats) {
        if stats.active == 0 {
            tracing::warn!("transfer finished with no active transfers counted");
            return;
        }
        stats.active -= 1;
    }
}

impl Default for TransferBudget {
    fn default() -> Self {
        Self::new(5)
    }
}
