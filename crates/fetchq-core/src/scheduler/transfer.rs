//! Per-request transfer task.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use super::Shared;
use crate::error::TransferError;
use crate::fetch::{local_file_path, FetchHandle, FetchResult};
use crate::request::Request;

/// Drives one admitted request: opens the fetch handle, mirrors its progress
/// every tick, records the outcome, then notifies subscribers and the
/// continuation. In debug builds it finishes with the leak sweep.
pub(super) async fn run_transfer(shared: Arc<Shared>, request: Arc<Request>) {
    let url = request.url().to_string();
    let started = Instant::now();
    tracing::debug!(id = request.id(), url = %url, "fetch request");

    if let Err(state) = request.begin_transfer(started) {
        tracing::warn!(url = %url, ?state, "admitted request changed state before transfer");
    }

    let Polled {
        handle,
        error,
        body,
    } = poll_fetch(&shared, &request, &url).await;
    let error = error.filter(|e| !e.is_empty());
    let elapsed = started.elapsed();
    if let Err(state) = request.complete(handle, error.clone(), elapsed) {
        tracing::warn!(url = %url, ?state, "finished transfer for request in unexpected state");
    }
    shared.update_stats(|s| {
        shared.budget.release(s);
        if error.is_some() {
            s.failed += 1;
        } else {
            s.succeeded += 1;
        }
    });

    let delivered = match error {
        Some(message) => {
            if let Some(path) = local_file_path(&url) {
                match path.try_exists() {
                    Ok(exists) => {
                        tracing::error!(path = %path.display(), exists, "local file state")
                    }
                    Err(e) => tracing::error!(
                        path = %path.display(),
                        "could not check local file: {}",
                        e
                    ),
                }
            }
            tracing::error!(url = %url, error = %message, "fetch failed");
            request.deliver(Err(TransferError {
                url: url.clone(),
                message,
            }))
        }
        None => {
            tracing::info!(
                url = %url,
                elapsed_ms = elapsed.as_millis() as u64,
                "fetch loaded"
            );
            shared.completions.publish(&url);
            request.deliver(Ok(FetchResult {
                url: url.clone(),
                body: body.unwrap_or_else(|| Arc::from(Vec::new())),
                elapsed,
            }))
        }
    };
    if !delivered {
        tracing::error!(url = %url, "completion callback panicked");
    }

    sweep_unreleased(&shared, &request).await;
}

/// What a finished fetch handle reported. `handle` is `None` when the fetch
/// primitive panicked; the broken handle is dropped instead of kept for release.
struct Polled {
    handle: Option<Box<dyn FetchHandle>>,
    error: Option<String>,
    body: Option<Arc<[u8]>>,
}

impl Polled {
    fn panicked(what: &str, payload: Box<dyn Any + Send>) -> Self {
        Self {
            handle: None,
            error: Some(format!(
                "fetch primitive panicked {}: {}",
                what,
                panic_message(&*payload)
            )),
            body: None,
        }
    }
}

/// Opens the fetch handle and polls it once per tick until done, mirroring
/// progress. A panic in the primitive becomes a failed outcome.
async fn poll_fetch(shared: &Shared, request: &Request, url: &str) -> Polled {
    let priority = shared.settings.load_priority;
    let opened = panic::catch_unwind(AssertUnwindSafe(|| shared.fetcher.open(url, priority)));
    let handle = match opened {
        Ok(handle) => handle,
        Err(payload) => return Polled::panicked("in open", payload),
    };

    loop {
        match panic::catch_unwind(AssertUnwindSafe(|| (handle.is_done(), handle.progress()))) {
            Ok((true, _)) => break,
            Ok((false, progress)) => request.set_progress(progress),
            Err(payload) => {
                discard(handle);
                return Polled::panicked("while polling", payload);
            }
        }
        shared.tick().await;
    }

    match panic::catch_unwind(AssertUnwindSafe(|| (handle.error(), handle.body()))) {
        Ok((error, body)) => Polled {
            handle: Some(handle),
            error,
            body,
        },
        Err(payload) => {
            discard(handle);
            Polled::panicked("reading the outcome", payload)
        }
    }
}

fn discard(handle: Box<dyn FetchHandle>) {
    if panic::catch_unwind(AssertUnwindSafe(move || drop(handle))).is_err() {
        tracing::warn!("fetch handle panicked while being dropped");
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

#[cfg(debug_assertions)]
async fn sweep_unreleased(shared: &Shared, request: &Request) {
    if shared.settings.leak_check {
        super::leak::sweep(shared, request).await;
    }
}

#[cfg(not(debug_assertions))]
async fn sweep_unreleased(_shared: &Shared, _request: &Request) {}
