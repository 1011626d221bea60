//! Per-request lifecycle states and the legal transitions between them.

use serde::Serialize;

/// Lifecycle of one submitted fetch.
///
/// Submitted → Admitted → Transferring → Succeeded | Failed → Released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestState {
    /// Waiting in the pending stack.
    Submitted,
    /// Popped by the admission monitor; its transfer task is being spawned.
    Admitted,
    Transferring,
    Succeeded,
    Failed,
    /// The owner released the result; nothing holds the fetched buffer any more.
    Released,
}

impl RequestState {
    /// Succeeded or Failed: finished but still holding its result.
    pub fn is_terminal(self) -> bool {
        matches!(self, RequestState::Succeeded | RequestState::Failed)
    }

    /// Not yet finished: queued, admitted or transferring.
    pub fn is_unfinished(self) -> bool {
        matches!(
            self,
            RequestState::Submitted | RequestState::Admitted | RequestState::Transferring
        )
    }

    pub fn can_transition_to(self, next: RequestState) -> bool {
        use RequestState::*;
        matches!(
            (self, next),
            (Submitted, Admitted)
                | (Admitted, Transferring)
                | (Transferring, Succeeded)
                | (Transferring, Failed)
                | (Succeeded, Released)
                | (Failed, Released)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::RequestState::*;

    #[test]
    fn forward_path() {
        assert!(Submitted.can_transition_to(Admitted));
        assert!(Admitted.can_transition_to(Transferring));
        assert!(Transferring.can_transition_to(Succeeded));
        assert!(Transferring.can_transition_to(Failed));
        assert!(Succeeded.can_transition_to(Released));
        assert!(Failed.can_transition_to(Released));
    }

    #[test]
    fn no_skips_or_reversals() {
        assert!(!Submitted.can_transition_to(Transferring));
        assert!(!Submitted.can_transition_to(Released));
        assert!(!Transferring.can_transition_to(Released));
        assert!(!Succeeded.can_transition_to(Failed));
        assert!(!Released.can_transition_to(Submitted));
        assert!(!Released.can_transition_to(Released));
    }

    #[test]
    fn classification() {
        assert!(Succeeded.is_terminal() && Failed.is_terminal());
        assert!(!Released.is_terminal());
        assert!(Submitted.is_unfinished() && Transferring.is_unfinished());
        assert!(!Failed.is_unfinished() && !Released.is_unfinished());
    }
}
