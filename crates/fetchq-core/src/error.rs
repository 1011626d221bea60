//! Error types for submission, transfer and release.

use crate::request::RequestState;

/// The fetch primitive reported an error for a request.
///
/// Delivered to the request's continuation; the request itself ends up `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("fetch {url} failed: {message}")]
pub struct TransferError {
    pub url: String,
    pub message: String,
}

/// Rejected submission. Nothing is queued when this is returned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    #[error("URL is empty")]
    EmptyUrl,
    #[error("invalid URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Misuse of [`RequestHandle::release`](crate::scheduler::RequestHandle::release).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReleaseError {
    #[error("request for {url} is still {state:?}; only finished requests can be released")]
    NotFinished { url: String, state: RequestState },
    #[error("request for {url} was already released")]
    AlreadyReleased { url: String },
}

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// `FetchScheduler::new` was called outside a tokio runtime.
    #[error("no tokio runtime available to drive the scheduler: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_error_message_names_url() {
        let err = TransferError {
            url: "https://example.com/a.bin".to_string(),
            message: "HTTP 404".to_string(),
        };
        assert_eq!(err.to_string(), "fetch https://example.com/a.bin failed: HTTP 404");
    }

    #[test]
    fn release_error_mentions_state() {
        let err = ReleaseError::NotFinished {
            url: "x".to_string(),
            state: RequestState::Transferring,
        };
        assert!(err.to_string().contains("Transferring"));
    }
}
