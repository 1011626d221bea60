//! Runtime toggle for serialized mode.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared flag read by the admission monitor at the top of every iteration.
///
/// While set, a request is only admitted once every previously admitted
/// request has been released. Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct SerializedMode(Arc<AtomicBool>);

impl SerializedMode {
    pub fn new(enabled: bool) -> Self {
        Self(Arc::new(AtomicBool::new(enabled)))
    }

    pub fn is_enabled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn set(&self, enabled: bool) {
        self.0.store(enabled, Ordering::Release);
    }
}
