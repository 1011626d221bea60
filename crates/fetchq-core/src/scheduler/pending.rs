//! Not-yet-admitted requests and the order they come out in.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Which queued request the admission monitor takes next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdmissionPolicy {
    /// Newest submission first: a fresh request never waits behind a stale backlog.
    #[default]
    Lifo,
    /// Oldest submission first.
    Fifo,
}

/// Pending requests. Pushes always go to the back; pops come from the back
/// (LIFO) or the front (FIFO). Duplicates are kept as separate entries.
#[derive(Debug)]
pub struct PendingStack<T> {
    items: VecDeque<T>,
    policy: AdmissionPolicy,
}

impl<T> PendingStack<T> {
    pub fn new(policy: AdmissionPolicy) -> Self {
        Self {
            items: VecDeque::new(),
            policy,
        }
    }

    pub fn policy(&self) -> AdmissionPolicy {
        self.policy
    }

    pub fn push(&mut self, item: T) {
        self.items.push_back(item);
    }

    pub fn pop(&mut self) -> Option<T> {
        match self.policy {
            AdmissionPolicy::Lifo => self.items.pop_back(),
            AdmissionPolicy::Fifo => self.items.pop_front(),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(stack: &mut PendingStack<&'static str>) -> Vec<&'static str> {
        std::iter::from_fn(|| stack.pop()).collect()
    }

    #[test]
    fn lifo_serves_newest_first() {
        let mut stack = PendingStack::new(AdmissionPolicy::Lifo);
        stack.push("a");
        stack.push("b");
        stack.push("c");
        assert_eq!(stack.len(), 3);
        assert_eq!(drain(&mut stack), vec!["c", "b", "a"]);
        assert!(stack.is_empty());
    }

    #[test]
    fn fifo_serves_oldest_first() {
        let mut stack = PendingStack::new(AdmissionPolicy::Fifo);
        stack.push("a");
        stack.push("b");
        stack.push("c");
        assert_eq!(drain(&mut stack), vec!["a", "b", "c"]);
    }

    #[test]
    fn late_push_jumps_the_lifo_queue() {
        let mut stack = PendingStack::new(AdmissionPolicy::Lifo);
        stack.push("a");
        stack.push("b");
        assert_eq!(stack.pop(), Some("b"));
        stack.push("c");
        assert_eq!(drain(&mut stack), vec!["c", "a"]);
    }

    #[test]
    fn duplicates_are_kept() {
        let mut stack = PendingStack::new(AdmissionPolicy::Lifo);
        stack.push("a");
        stack.push("a");
        assert_eq!(drain(&mut stack), vec!["a", "a"]);
    }
}
