//! Latest-result-wins gate for overlapping recomputations.
//!
//! Each recomputation takes a ticket before it starts. When it finishes, its
//! result is only published if no newer ticket has been handed out, so a slow
//! stale run can never replace the output of a newer one.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Generation handed out by [`RecomputeGate::begin`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Ticket(u64);

impl Ticket {
    pub fn generation(&self) -> u64 {
        self.0
    }
}

#[derive(Debug)]
pub struct RecomputeGate<T> {
    generation: AtomicU64,
    latest: Mutex<Option<(u64, T)>>,
}

impl<T> Default for RecomputeGate<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> RecomputeGate<T> {
    pub fn new() -> Self {
        Self {
            generation: AtomicU64::new(0),
            latest: Mutex::new(None),
        }
    }

    /// Starts a recomputation, superseding every earlier ticket
    pub fn begin(&self) -> Ticket {
        Ticket(self.generation.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn is_current(&self, ticket: Ticket) -> bool {
        self.generation.load(Ordering::SeqCst) == ticket.0
    }

    /// Publishes `value` if `ticket` is still the newest. Returns whether it
    /// was kept.
    pub fn complete(&self, ticket: Ticket, value: T) -> bool {
        if !self.is_current(ticket) {
            log::debug!("Discarding result of superseded run {}", ticket.0);
            return false;
        }
        let mut latest = self.latest.lock().unwrap_or_else(|e| e.into_inner());
        if matches!(latest.as_ref(), Some((generation, _)) if *generation > ticket.0) {
            return false;
        }
        *latest = Some((ticket.0, value));
        true
    }

    /// Generation of the published result, if any
    pub fn published_generation(&self) -> Option<u64> {
        let latest = self.latest.lock().unwrap_or_else(|e| e.into_inner());
        latest.as_ref().map(|(generation, _)| *generation)
    }
}

impl<T: Clone> RecomputeGate<T> {
    /// The most recently published result
    pub fn latest(&self) -> Option<T> {
        let latest = self.latest.lock().unwrap_or_else(|e| e.into_inner());
        latest.as_ref().map(|(_, value)| value.clone())
    }

    /// Runs `work` under a fresh ticket. Returns the value only if it was
    /// published.
    pub async fn run<F>(&self, work: F) -> Option<T>
    where
        F: Future<Output = T>,
    {
        let ticket = self.begin();
        let value = work.await;
        let published = value.clone();
        self.complete(ticket, value).then_some(published)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_newest_ticket_wins() {
        let gate = RecomputeGate::new();
        let first = gate.begin();
        let second = gate.begin();

        assert!(gate.complete(second, "new"));
        assert!(!gate.complete(first, "old"));
        assert_eq!(gate.latest(), Some("new"));
        assert_eq!(gate.published_generation(), Some(second.generation()));
    }

    #[test]
    fn test_superseded_before_completion() {
        let gate = RecomputeGate::new();
        let first = gate.begin();
        assert!(gate.is_current(first));
        let _second = gate.begin();
        assert!(!gate.is_current(first));
        assert!(!gate.complete(first, 1));
        assert_eq!(gate.latest(), None);
    }

    #[test]
    fn test_run_publishes_sequential_results() {
        let gate = RecomputeGate::new();
        let value = futures::executor::block_on(gate.run(async { 5 }));
        assert_eq!(value, Some(5));
        let value = futures::executor::block_on(gate.run(async { 6 }));
        assert_eq!(value, Some(6));
        assert_eq!(gate.latest(), Some(6));
    }
}
