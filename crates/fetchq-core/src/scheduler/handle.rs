//! Caller-facing handle on one submitted request.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use super::Shared;
use crate::error::ReleaseError;
use crate::request::{Request, RequestState};

/// Handle returned by [`FetchScheduler::submit`](super::FetchScheduler::submit).
///
/// Clones refer to the same request. The owner must call
/// [`release`](Self::release) once it is done with a finished request; until
/// then the fetched buffer stays alive and debug builds warn about it.
#[derive(Clone)]
pub struct RequestHandle {
    request: Arc<Request>,
    shared: Arc<Shared>,
}

impl RequestHandle {
    pub(super) fn new(request: Arc<Request>, shared: Arc<Shared>) -> Self {
        Self { request, shared }
    }

    /// Scheduler-unique id, increasing with submission order.
    pub fn id(&self) -> u64 {
        self.request.id()
    }

    pub fn url(&self) -> &str {
        self.request.url()
    }

    pub fn state(&self) -> RequestState {
        self.request.state()
    }

    pub fn progress(&self) -> f32 {
        self.request.progress()
    }

    /// Set iff the request failed.
    pub fn error_message(&self) -> Option<String> {
        self.request.error_message()
    }

    /// Position in admission order (0 for the first request this scheduler
    /// admitted), or `None` while still queued.
    pub fn admission_index(&self) -> Option<u64> {
        self.request.admission_index()
    }

    /// Transfer duration once finished.
    pub fn elapsed(&self) -> Option<Duration> {
        self.request.elapsed()
    }

    /// Number of unreleased-request warnings emitted for this request.
    /// Always 0 in release builds.
    pub fn leak_warnings(&self) -> u64 {
        self.request.leak_warnings()
    }

    pub fn is_released(&self) -> bool {
        self.request.is_released()
    }

    /// Wait until the request has succeeded or failed (or was already released).
    pub async fn finished(&self) -> RequestState {
        let mut rx = self.request.subscribe_state();
        let state = match rx.wait_for(|state| !state.is_unfinished()).await {
            Ok(state) => *state,
            Err(_) => self.request.state(),
        };
        state
    }

    /// Release a finished request: dispose its fetch handle and stop counting
    /// it as outstanding.
    pub fn release(&self) -> Result<(), ReleaseError> {
        self.request.release().map_err(|state| match state {
            RequestState::Released => ReleaseError::AlreadyReleased {
                url: self.url().to_string(),
            },
            state => ReleaseError::NotFinished {
                url: self.url().to_string(),
                state,
            },
        })?;
        self.shared.update_stats(|s| {
            s.outstanding = s.outstanding.saturating_sub(1);
            s.released += 1;
        });
        tracing::debug!(id = self.id(), url = self.url(), "request released");
        Ok(())
    }

    pub fn summary(&self) -> RequestSummary {
        RequestSummary {
            id: self.id(),
            url: self.url().to_string(),
            state: self.state(),
            progress: self.progress(),
            admission_index: self.admission_index(),
            elapsed_ms: self.elapsed().map(|d| d.as_millis() as u64),
            error: self.error_message(),
        }
    }
}

impl std::fmt::Debug for RequestHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestHandle")
            .field("id", &self.id())
            .field("url", &self.url())
            .field("state", &self.state())
            .finish()
    }
}

/// Serializable point-in-time view of a request.
#[derive(Debug, Clone, Serialize)]
pub struct RequestSummary {
    pub id: u64,
    pub url: String,
    pub state: RequestState,
    pub progress: f32,
    pub admission_index: Option<u64>,
    pub elapsed_ms: Option<u64>,
    pub error: Option<String>,
}
