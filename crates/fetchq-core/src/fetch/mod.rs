//! Fetch primitive seam.
//!
//! The scheduler never performs a transfer itself. It asks a [`Fetcher`] for a
//! [`FetchHandle`] once a request is admitted and polls that handle once per
//! tick until it reports done. [`CurlFetcher`] is the libcurl-backed
//! implementation used by the CLI.

mod curl;
mod local;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

pub use self::curl::{CurlFetcher, CurlOptions};
pub use self::local::{local_file_path, FILE_PROTOCOL};

/// Priority hint forwarded to the fetch primitive when a transfer starts.
///
/// The scheduler does not interpret it; it only passes the configured value through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadPriority {
    Low,
    BelowNormal,
    #[default]
    Normal,
    High,
}

/// One in-progress (or finished) transfer as seen by the scheduler.
pub trait FetchHandle: Send {
    /// Fraction of the transfer completed, in `[0.0, 1.0]`.
    fn progress(&self) -> f32;

    fn is_done(&self) -> bool;

    /// Error message once done. `None` (or an empty string) means success.
    fn error(&self) -> Option<String>;

    /// Fetched bytes once done successfully.
    fn body(&self) -> Option<Arc<[u8]>>;

    /// Release the underlying buffer. Called exactly once, when the owner
    /// releases the request.
    fn dispose(&mut self);
}

/// Starts transfers. Must not block: the transfer itself runs elsewhere.
pub trait Fetcher: Send + Sync + 'static {
    fn open(&self, url: &str, priority: LoadPriority) -> Box<dyn FetchHandle>;
}

/// Successful result handed to a request's continuation.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub url: String,
    pub body: Arc<[u8]>,
    /// Time from transfer start to completion.
    pub elapsed: Duration,
}

impl FetchResult {
    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}
