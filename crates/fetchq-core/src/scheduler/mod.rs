//! Admission-control scheduler.
//!
//! Submitted requests wait in a pending stack. A single admission monitor task
//! drains it: it waits for the serialization gate (when serialized mode is on)
//! and for room in the transfer budget, then pops the next request according
//! to the [`AdmissionPolicy`] and spawns its transfer. The monitor is started
//! lazily by the first submission and retires itself once the stack is empty,
//! so a later submission starts a fresh one.
//!
//! Every counter change is published on a `watch` channel; the monitor, the
//! leak sweep and [`FetchScheduler::idle`] wait on it instead of polling.

mod budget;
mod handle;
#[cfg(debug_assertions)]
mod leak;
mod mode;
mod monitor;
mod pending;
mod stats;
mod transfer;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::broadcast::{CompletionBroadcast, Subscription};
use crate::config::FetchqConfig;
use crate::error::{SchedulerError, SubmitError, TransferError};
use crate::fetch::{FetchResult, Fetcher, LoadPriority};
use crate::request::{Continuation, Request};

pub use budget::TransferBudget;
pub use handle::{RequestHandle, RequestSummary};
pub use mode::SerializedMode;
pub use pending::{AdmissionPolicy, PendingStack};
pub use stats::SchedulerStats;

const DEFAULT_LEAK_GRACE: Duration = Duration::from_secs(5);
/// Shortest tick taken from config, and the leak sweep's floor.
const MIN_TICK: Duration = Duration::from_millis(1);

/// Construction-time scheduler parameters.
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    /// Maximum number of transfers running at once (clamped to at least 1).
    pub max_active_transfers: usize,
    pub admission_policy: AdmissionPolicy,
    /// Initial value of the serialized-mode flag; it can be flipped at runtime.
    pub serialized: bool,
    /// One scheduler tick. Zero means "yield to the runtime once".
    pub tick_interval: Duration,
    pub load_priority: LoadPriority,
    /// Run the unreleased-request sweep after each transfer (debug builds only).
    pub leak_check: bool,
    pub leak_grace: Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            max_active_transfers: 5,
            admission_policy: AdmissionPolicy::Lifo,
            serialized: false,
            tick_interval: Duration::from_millis(16),
            load_priority: LoadPriority::Normal,
            leak_check: true,
            leak_grace: DEFAULT_LEAK_GRACE,
        }
    }
}

impl From<&FetchqConfig> for SchedulerSettings {
    fn from(cfg: &FetchqConfig) -> Self {
        let leak = cfg.leak_check_or_default();
        Self {
            max_active_transfers: cfg.max_active_transfers,
            admission_policy: cfg.admission_policy,
            serialized: cfg.serialized,
            tick_interval: Duration::from_millis(cfg.tick_interval_ms).max(MIN_TICK),
            load_priority: cfg.load_priority,
            leak_check: leak.enabled,
            leak_grace: Duration::try_from_secs_f64(leak.grace_secs).unwrap_or(DEFAULT_LEAK_GRACE),
        }
    }
}

/// State shared by the scheduler front end, the monitor and transfer tasks.
pub(crate) struct Shared {
    settings: SchedulerSettings,
    budget: TransferBudget,
    serialized: SerializedMode,
    fetcher: Arc<dyn Fetcher>,
    runtime: Handle,
    queue: Mutex<QueueState>,
    stats: watch::Sender<SchedulerStats>,
    completions: CompletionBroadcast,
    next_id: AtomicU64,
}

struct QueueState {
    pending: PendingStack<Arc<Request>>,
    monitor: Option<MonitorSlot>,
    /// Set by `stop()`: no monitor is started until `start()`.
    stopped: bool,
    next_generation: u64,
    next_admission: u64,
}

struct MonitorSlot {
    generation: u64,
    task: JoinHandle<()>,
}

impl Shared {
    fn lock_queue(&self) -> MutexGuard<'_, QueueState> {
        self.queue.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn update_stats(&self, f: impl FnOnce(&mut SchedulerStats)) {
        self.stats.send_modify(f);
    }

    /// Suspend until the next tick.
    async fn tick(&self) {
        if self.settings.tick_interval.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(self.settings.tick_interval).await;
        }
    }

    /// Starts a monitor if work is pending and none is alive. Called with the
    /// queue lock held so it cannot race the monitor's own exit check.
    fn ensure_monitor(self: &Arc<Self>, queue: &mut QueueState) {
        if queue.stopped || queue.pending.is_empty() {
            return;
        }
        if let Some(slot) = &queue.monitor {
            if !slot.task.is_finished() {
                return;
            }
            tracing::warn!(
                generation = slot.generation,
                "admission monitor exited without retiring; starting a new one"
            );
        }
        let generation = queue.next_generation;
        queue.next_generation += 1;
        let task = self
            .runtime
            .spawn(monitor::run_monitor(Arc::clone(self), generation));
        queue.monitor = Some(MonitorSlot { generation, task });
        self.update_stats(|s| s.monitor_starts += 1);
    }
}

/// Bounded-concurrency fetch scheduler. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct FetchScheduler {
    shared: Arc<Shared>,
}

impl FetchScheduler {
    /// Create a scheduler driven by the current tokio runtime.
    pub fn new(
        settings: SchedulerSettings,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<Self, SchedulerError> {
        let runtime = Handle::try_current()?;
        Ok(Self::with_runtime(settings, fetcher, runtime))
    }

    pub fn from_config(
        cfg: &FetchqConfig,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<Self, SchedulerError> {
        Self::new(SchedulerSettings::from(cfg), fetcher)
    }

    /// Create a scheduler that spawns its tasks on `runtime`.
    pub fn with_runtime(
        settings: SchedulerSettings,
        fetcher: Arc<dyn Fetcher>,
        runtime: Handle,
    ) -> Self {
        let (stats, _) = watch::channel(SchedulerStats::default());
        let shared = Shared {
            budget: TransferBudget::new(settings.max_active_transfers),
            serialized: SerializedMode::new(settings.serialized),
            queue: Mutex::new(QueueState {
                pending: PendingStack::new(settings.admission_policy),
                monitor: None,
                stopped: false,
                next_generation: 0,
                next_admission: 0,
            }),
            settings,
            fetcher,
            runtime,
            stats,
            completions: CompletionBroadcast::new(),
            next_id: AtomicU64::new(1),
        };
        Self {
            shared: Arc::new(shared),
        }
    }

    /// Queue a fetch of `url`. `on_complete` runs exactly once, on a runtime
    /// worker, with the fetched bytes or the transfer error.
    ///
    /// Returns immediately; the transfer starts once the request is admitted.
    pub fn submit<F>(&self, url: &str, on_complete: F) -> Result<RequestHandle, SubmitError>
    where
        F: FnOnce(Result<FetchResult, TransferError>) + Send + 'static,
    {
        self.enqueue(url, Some(Box::new(on_complete)))
    }

    /// Queue a fetch without a continuation; observe it through the handle.
    pub fn submit_detached(&self, url: &str) -> Result<RequestHandle, SubmitError> {
        self.enqueue(url, None)
    }

    fn enqueue(
        &self,
        url: &str,
        continuation: Option<Continuation>,
    ) -> Result<RequestHandle, SubmitError> {
        validate_url(url)?;
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let request = Arc::new(Request::new(id, url.to_string(), continuation));
        {
            let mut queue = self.shared.lock_queue();
            queue.pending.push(Arc::clone(&request));
            self.shared.update_stats(|s| s.pending += 1);
            self.shared.ensure_monitor(&mut queue);
        }
        tracing::debug!(id, url, "request submitted");
        Ok(RequestHandle::new(request, Arc::clone(&self.shared)))
    }

    /// Allow the monitor to run again after [`stop`](Self::stop), starting it
    /// right away if requests are waiting.
    pub fn start(&self) {
        let mut queue = self.shared.lock_queue();
        queue.stopped = false;
        self.shared.ensure_monitor(&mut queue);
    }

    /// Halt admissions. Transfers already admitted run to completion; queued
    /// requests stay queued until [`start`](Self::start).
    pub fn stop(&self) {
        let mut queue = self.shared.lock_queue();
        queue.stopped = true;
        if let Some(slot) = queue.monitor.take() {
            slot.task.abort();
            tracing::debug!(generation = slot.generation, "admission monitor stopped");
        }
    }

    pub fn is_monitor_running(&self) -> bool {
        let queue = self.shared.lock_queue();
        queue
            .monitor
            .as_ref()
            .is_some_and(|slot| !slot.task.is_finished())
    }

    /// Handle on the serialized-mode flag; flipping it affects the next admission.
    pub fn serialized_mode(&self) -> SerializedMode {
        self.shared.serialized.clone()
    }

    pub fn set_serialized(&self, enabled: bool) {
        self.shared.serialized.set(enabled);
    }

    pub fn admission_policy(&self) -> AdmissionPolicy {
        self.shared.settings.admission_policy
    }

    pub fn budget(&self) -> TransferBudget {
        self.shared.budget
    }

    pub fn completions(&self) -> &CompletionBroadcast {
        &self.shared.completions
    }

    /// Run `handler` for every successfully fetched URL until the returned
    /// subscription is dropped or unsubscribed.
    pub fn on_completion<F>(&self, handler: F) -> Subscription
    where
        F: FnMut(&str) + Send + 'static,
    {
        self.shared
            .completions
            .subscribe_fn(&self.shared.runtime, handler)
    }

    pub fn stats(&self) -> SchedulerStats {
        *self.shared.stats.borrow()
    }

    /// Stream of counter snapshots, updated on every state change.
    pub fn watch_stats(&self) -> watch::Receiver<SchedulerStats> {
        self.shared.stats.subscribe()
    }

    /// Wait until nothing is queued or transferring.
    pub async fn idle(&self) {
        let mut rx = self.shared.stats.subscribe();
        let _ = rx.wait_for(|s| s.is_idle()).await;
    }
}

impl std::fmt::Debug for FetchScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchScheduler")
            .field("settings", &self.shared.settings)
            .field("stats", &self.stats())
            .finish()
    }
}

fn validate_url(url: &str) -> Result<(), SubmitError> {
    if url.trim().is_empty() {
        return Err(SubmitError::EmptyUrl);
    }
    url::Url::parse(url).map_err(|e| SubmitError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    Ok(())
}
