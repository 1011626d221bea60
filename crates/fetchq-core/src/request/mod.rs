//! Per-submission state record.
//!
//! A [`Request`] is shared between the pending stack, its transfer task, the
//! leak sweep and every [`RequestHandle`](crate::scheduler::RequestHandle)
//! clone. The lifecycle state lives in a `watch` channel so handles can await
//! completion or release without polling.

mod state;

pub use state::RequestState;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tokio::sync::watch;

use crate::error::TransferError;
use crate::fetch::{FetchHandle, FetchResult};

/// Continuation invoked exactly once with the outcome of the fetch.
pub type Continuation = Box<dyn FnOnce(Result<FetchResult, TransferError>) + Send + 'static>;

pub(crate) struct Request {
    id: u64,
    url: String,
    state: watch::Sender<RequestState>,
    inner: Mutex<RequestInner>,
    leak_warnings: AtomicU64,
}

#[derive(Default)]
struct RequestInner {
    progress: f32,
    admission_index: Option<u64>,
    started_at: Option<Instant>,
    elapsed: Option<Duration>,
    error_message: Option<String>,
    result: Option<Box<dyn FetchHandle>>,
    continuation: Option<Continuation>,
}

impl Request {
    pub(crate) fn new(id: u64, url: String, continuation: Option<Continuation>) -> Self {
        let (state, _) = watch::channel(RequestState::Submitted);
        Self {
            id,
            url,
            state,
            inner: Mutex::new(RequestInner {
                continuation,
                ..RequestInner::default()
            }),
            leak_warnings: AtomicU64::new(0),
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn url(&self) -> &str {
        &self.url
    }

    pub(crate) fn state(&self) -> RequestState {
        *self.state.borrow()
    }

    pub(crate) fn subscribe_state(&self) -> watch::Receiver<RequestState> {
        self.state.subscribe()
    }

    fn lock(&self) -> MutexGuard<'_, RequestInner> {
        // A poisoned record still holds consistent plain data.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Moves to `next` if legal; returns the state actually held otherwise.
    fn transition(&self, next: RequestState) -> Result<(), RequestState> {
        let mut outcome = Ok(());
        self.state.send_if_modified(|current| {
            if current.can_transition_to(next) {
                *current = next;
                true
            } else {
                outcome = Err(*current);
                false
            }
        });
        outcome
    }

    pub(crate) fn admit(&self, admission_index: u64) -> Result<(), RequestState> {
        self.transition(RequestState::Admitted)?;
        self.lock().admission_index = Some(admission_index);
        Ok(())
    }

    pub(crate) fn begin_transfer(&self, started_at: Instant) -> Result<(), RequestState> {
        self.lock().started_at = Some(started_at);
        self.transition(RequestState::Transferring)
    }

    pub(crate) fn set_progress(&self, progress: f32) {
        self.lock().progress = progress.clamp(0.0, 1.0);
    }

    pub(crate) fn progress(&self) -> f32 {
        self.lock().progress
    }

    pub(crate) fn admission_index(&self) -> Option<u64> {
        self.lock().admission_index
    }

    pub(crate) fn error_message(&self) -> Option<String> {
        self.lock().error_message.clone()
    }

    pub(crate) fn elapsed(&self) -> Option<Duration> {
        self.lock().elapsed
    }

    /// Records the outcome and takes ownership of the finished fetch handle,
    /// if one survived. `error` set means Failed, otherwise Succeeded.
    pub(crate) fn complete(
        &self,
        handle: Option<Box<dyn FetchHandle>>,
        error: Option<String>,
        elapsed: Duration,
    ) -> Result<(), RequestState> {
        let next = if error.is_some() {
            RequestState::Failed
        } else {
            RequestState::Succeeded
        };
        {
            let mut inner = self.lock();
            inner.progress = 1.0;
            inner.elapsed = Some(elapsed);
            inner.error_message = error;
            inner.result = handle;
        }
        self.transition(next)
    }

    /// Invokes the continuation, if any, exactly once. Returns false if the
    /// continuation panicked.
    pub(crate) fn deliver(&self, outcome: Result<FetchResult, TransferError>) -> bool {
        let continuation = self.lock().continuation.take();
        let Some(continuation) = continuation else {
            return true;
        };
        std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || continuation(outcome)))
            .is_ok()
    }

    /// Moves to Released and disposes the fetch handle.
    pub(crate) fn release(&self) -> Result<(), RequestState> {
        self.transition(RequestState::Released)?;
        let handle = self.lock().result.take();
        if let Some(mut handle) = handle {
            handle.dispose();
        }
        Ok(())
    }

    pub(crate) fn is_released(&self) -> bool {
        self.state() == RequestState::Released
    }

    #[cfg_attr(not(debug_assertions), allow(dead_code))]
    pub(crate) fn record_leak_warning(&self) -> u64 {
        self.leak_warnings.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn leak_warnings(&self) -> u64 {
        self.leak_warnings.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("id", &self.id)
            .field("url", &self.url)
            .field("state", &self.state())
            .finish()
    }
}
