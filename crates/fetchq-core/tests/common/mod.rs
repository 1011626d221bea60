//! Shared helpers for scheduler integration tests.

#![allow(dead_code)]

pub mod scripted;

use std::time::Duration;

use fetchq_core::SchedulerSettings;

/// Tick length used by every test scheduler.
pub const TICK: Duration = Duration::from_millis(10);

/// Settings with a short tick and the leak sweep off.
pub fn settings() -> SchedulerSettings {
    SchedulerSettings {
        tick_interval: TICK,
        leak_check: false,
        ..SchedulerSettings::default()
    }
}

/// Sleep for `n` scheduler ticks (instant under a paused clock).
pub async fn ticks(n: u32) {
    tokio::time::sleep(TICK * n).await;
}
