//! Unreleased-request sweep, compiled into debug builds only.
//!
//! A finished request keeps its fetch handle (and the fetched buffer) until
//! its owner releases it. Once the scheduler has gone idle and a grace period
//! has passed, an unreleased request warns on every tick until it is released.

use super::Shared;
use crate::request::Request;

pub(super) async fn sweep(shared: &Shared, request: &Request) {
    let mut stats = shared.stats.subscribe();
    if stats.wait_for(|s| s.is_idle()).await.is_err() {
        return;
    }
    tokio::time::sleep(shared.settings.leak_grace).await;

    while !request.is_released() {
        let warnings = request.record_leak_warning();
        tracing::warn!(
            id = request.id(),
            url = request.url(),
            warnings,
            "request finished but not released yet"
        );
        tokio::time::sleep(shared.settings.tick_interval.max(super::MIN_TICK)).await;
    }
}
