//! libcurl-backed fetch primitive.
//!
//! Each transfer runs a blocking `curl::easy::Easy` on its own OS thread and
//! publishes progress and outcome through shared state the handle reads.
//! libcurl also serves `file://` URLs, which is what local bundles use.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{FetchHandle, Fetcher, LoadPriority};
use crate::config::CurlConfig;

/// Timeouts applied to every transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurlOptions {
    pub connect_timeout: Duration,
    /// Whole-transfer timeout; `None` lets large bodies take as long as they need.
    pub timeout: Option<Duration>,
    /// Receive-rate cap (bytes/s) for [`LoadPriority::Low`] transfers.
    pub low_priority_recv_limit: Option<u64>,
}

impl Default for CurlOptions {
    fn default() -> Self {
        Self::from(&CurlConfig::default())
    }
}

impl From<&CurlConfig> for CurlOptions {
    fn from(cfg: &CurlConfig) -> Self {
        Self {
            connect_timeout: Duration::from_secs(cfg.connect_timeout_secs.max(1)),
            timeout: cfg.timeout_secs.map(Duration::from_secs),
            low_priority_recv_limit: cfg.low_priority_max_recv_bytes_per_sec.filter(|&n| n > 0),
        }
    }
}

impl CurlOptions {
    /// `CURLOPT_MAX_RECV_SPEED_LARGE` for a transfer at `priority`: the
    /// configured cap for `Low`, twice it for `BelowNormal`, none otherwise.
    pub fn recv_speed_limit(&self, priority: LoadPriority) -> Option<u64> {
        match priority {
            LoadPriority::Low => self.low_priority_recv_limit,
            LoadPriority::BelowNormal => self.low_priority_recv_limit.map(|n| n.saturating_mul(2)),
            LoadPriority::Normal | LoadPriority::High => None,
        }
    }
}

/// [`Fetcher`] backed by libcurl.
///
/// libcurl has no scheduling priority of its own. Lower priorities are
/// expressed as a receive-rate cap (see [`CurlOptions::recv_speed_limit`]);
/// `Normal` and `High` both run unthrottled.
#[derive(Debug, Default, Clone)]
pub struct CurlFetcher {
    opts: CurlOptions,
}

impl CurlFetcher {
    pub fn new(opts: CurlOptions) -> Self {
        Self { opts }
    }
}

impl Fetcher for CurlFetcher {
    fn open(&self, url: &str, priority: LoadPriority) -> Box<dyn FetchHandle> {
        let shared = Arc::new(TransferState::default());
        let spawned = std::thread::Builder::new()
            .name("fetchq-curl".to_string())
            .spawn({
                let url = url.to_string();
                let opts = self.opts;
                let recv_limit = opts.recv_speed_limit(priority);
                let shared = Arc::clone(&shared);
                move || {
                    let outcome = perform(&url, &opts, recv_limit, &shared);
                    shared.finish(outcome);
                }
            });
        if let Err(e) = spawned {
            shared.finish(Err(format!("could not start transfer thread: {}", e)));
        }
        tracing::trace!(url, ?priority, "curl transfer opened");
        Box::new(CurlHandle { shared })
    }
}

/// State shared between the transfer thread and its handle.
#[derive(Default)]
struct TransferState {
    /// `f32` bits of the progress fraction.
    progress: AtomicU32,
    done: AtomicBool,
    outcome: Mutex<Option<Result<Arc<[u8]>, String>>>,
}

impl TransferState {
    fn set_progress(&self, fraction: f32) {
        self.progress
            .store(fraction.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    fn finish(&self, outcome: Result<Vec<u8>, String>) {
        if let Ok(mut slot) = self.outcome.lock() {
            *slot = Some(outcome.map(Arc::from));
        }
        self.done.store(true, Ordering::Release);
    }
}

struct CurlHandle {
    shared: Arc<TransferState>,
}

impl FetchHandle for CurlHandle {
    fn progress(&self) -> f32 {
        f32::from_bits(self.shared.progress.load(Ordering::Relaxed))
    }

    fn is_done(&self) -> bool {
        self.shared.done.load(Ordering::Acquire)
    }

    fn error(&self) -> Option<String> {
        let slot = self.shared.outcome.lock().ok()?;
        match slot.as_ref() {
            Some(Err(message)) => Some(message.clone()),
            _ => None,
        }
    }

    fn body(&self) -> Option<Arc<[u8]>> {
        let slot = self.shared.outcome.lock().ok()?;
        match slot.as_ref() {
            Some(Ok(body)) => Some(Arc::clone(body)),
            _ => None,
        }
    }

    fn dispose(&mut self) {
        if let Ok(mut slot) = self.shared.outcome.lock() {
            slot.take();
        }
    }
}

/// Runs one blocking transfer. Errors are flattened to messages since the
/// scheduler only records and reports them.
fn perform(
    url: &str,
    opts: &CurlOptions,
    recv_limit: Option<u64>,
    state: &TransferState,
) -> Result<Vec<u8>, String> {
    let mut body = Vec::new();

    let mut easy = ::curl::easy::Easy::new();
    easy.url(url).map_err(|e| format!("invalid URL: {}", e))?;
    easy.follow_location(true).map_err(|e| e.to_string())?;
    easy.connect_timeout(opts.connect_timeout)
        .map_err(|e| e.to_string())?;
    if let Some(timeout) = opts.timeout {
        easy.timeout(timeout).map_err(|e| e.to_string())?;
    }
    if let Some(limit) = recv_limit {
        easy.max_recv_speed(limit).map_err(|e| e.to_string())?;
    }
    easy.progress(true).map_err(|e| e.to_string())?;

    {
        let mut transfer = easy.transfer();
        transfer
            .write_function(|data| {
                body.extend_from_slice(data);
                Ok(data.len())
            })
            .map_err(|e| e.to_string())?;
        transfer
            .progress_function(|dl_total, dl_now, _, _| {
                if dl_total > 0.0 {
                    state.set_progress((dl_now / dl_total) as f32);
                }
                true
            })
            .map_err(|e| e.to_string())?;
        transfer.perform().map_err(|e| e.to_string())?;
    }

    // file:// transfers report 0.
    let code = easy.response_code().map_err(|e| e.to_string())?;
    if code != 0 && !(200..300).contains(&code) {
        return Err(format!("HTTP {}", code));
    }
    state.set_progress(1.0);
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_from_config() {
        let cfg = CurlConfig {
            connect_timeout_secs: 3,
            timeout_secs: Some(60),
            low_priority_max_recv_bytes_per_sec: Some(0),
        };
        let opts = CurlOptions::from(&cfg);
        assert_eq!(opts.connect_timeout, Duration::from_secs(3));
        assert_eq!(opts.timeout, Some(Duration::from_secs(60)));
        assert_eq!(opts.low_priority_recv_limit, None);
    }

    #[test]
    fn lower_priorities_are_rate_capped() {
        let cfg = CurlConfig {
            low_priority_max_recv_bytes_per_sec: Some(64 * 1024),
            ..CurlConfig::default()
        };
        let opts = CurlOptions::from(&cfg);
        assert_eq!(opts.recv_speed_limit(LoadPriority::Low), Some(64 * 1024));
        assert_eq!(opts.recv_speed_limit(LoadPriority::BelowNormal), Some(128 * 1024));
        assert_eq!(opts.recv_speed_limit(LoadPriority::Normal), None);
        assert_eq!(opts.recv_speed_limit(LoadPriority::High), None);
        assert_eq!(CurlOptions::default().recv_speed_limit(LoadPriority::Low), None);
    }

    #[test]
    fn zero_connect_timeout_is_clamped() {
        let cfg = CurlConfig {
            connect_timeout_secs: 0,
            ..CurlConfig::default()
        };
        assert_eq!(CurlOptions::from(&cfg).connect_timeout, Duration::from_secs(1));
    }

    #[test]
    fn transfer_state_outcomes() {
        let state = Arc::new(TransferState::default());
        let handle = CurlHandle {
            shared: Arc::clone(&state),
        };
        assert!(!handle.is_done());
        state.set_progress(0.25);
        assert!((handle.progress() - 0.25).abs() < f32::EPSILON);
        state.finish(Err("Couldn't resolve host name".to_string()));
        assert!(handle.is_done());
        assert_eq!(handle.error().as_deref(), Some("Couldn't resolve host name"));
        assert!(handle.body().is_none());
    }

    #[test]
    fn dispose_drops_body() {
        let state = Arc::new(TransferState::default());
        let mut handle = CurlHandle {
            shared: Arc::clone(&state),
        };
        state.finish(Ok(b"abc".to_vec()));
        assert_eq!(handle.body().as_deref(), Some(&b"abc"[..]));
        handle.dispose();
        assert!(handle.body().is_none());
        assert!(handle.error().is_none());
    }
}
