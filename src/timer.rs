//! Deterministic timer queue over a virtual millisecond clock.
//!
//! All delayed work in the page engine — the copy-button revert, the
//! per-character typing delays, the output-panel reveal — goes through one
//! [`Timers`] queue. The queue never threads or blocks: callers advance the
//! clock explicitly (the TUI feeds it real elapsed time between event polls,
//! tests feed it exact amounts) and receive the events that came due, in
//! firing order. Each handler runs to completion before the next is
//! delivered.

/// Handle to a scheduled timer, usable to cancel it before it fires.
pub type TimerId = u64;

/// A single pending timer.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Pending<E> {
    id: TimerId,
    due_ms: u64,
    event: E,
}

/// A queue of pending timers over a virtual clock.
///
/// Events are delivered in `(due time, schedule order)` order, so two timers
/// due at the same instant fire in the order they were scheduled.
#[derive(Debug)]
pub struct Timers<E> {
    now_ms: u64,
    next_id: TimerId,
    pending: Vec<Pending<E>>,
}

impl<E> Timers<E> {
    pub fn new() -> Self {
        Self {
            now_ms: 0,
            next_id: 1,
            pending: Vec::new(),
        }
    }

    /// Current virtual time in milliseconds.
    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    /// Schedule `event` to fire `delay_ms` from now. Returns a handle that
    /// can be passed to [`Timers::cancel`].
    pub fn schedule(&mut self, delay_ms: u64, event: E) -> TimerId {
        let id = self.next_id;
        self.next_id += 1;
        self.pending.push(Pending {
            id,
            due_ms: self.now_ms.saturating_add(delay_ms),
            event,
        });
        id
    }

    /// Cancel a pending timer. Returns `true` if it was still pending.
    ///
    /// Cancelling an already-fired or unknown id is a no-op; this is what
    /// lets handlers for removed targets simply never run.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        let before = self.pending.len();
        self.pending.retain(|p| p.id != id);
        self.pending.len() != before
    }

    /// Milliseconds until the earliest pending timer, if any.
    pub fn next_due_in_ms(&self) -> Option<u64> {
        self.pending
            .iter()
            .map(|p| p.due_ms.saturating_sub(self.now_ms))
            .min()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Advance the clock by `elapsed_ms` and collect every event that came
    /// due, ordered by due time then schedule order.
    pub fn advance(&mut self, elapsed_ms: u64) -> Vec<E> {
        self.now_ms = self.now_ms.saturating_add(elapsed_ms);
        let now = self.now_ms;

        let mut due: Vec<Pending<E>> = Vec::new();
        let mut rest: Vec<Pending<E>> = Vec::new();
        for p in self.pending.drain(..) {
            if p.due_ms <= now {
                due.push(p);
            } else {
                rest.push(p);
            }
        }
        self.pending = rest;

        due.sort_by_key(|p| (p.due_ms, p.id));
        due.into_iter().map(|p| p.event).collect()
    }
}

impl<E> Default for Timers<E> {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nothing_fires_before_due() {
        let mut timers: Timers<&str> = Timers::new();
        timers.schedule(100, "a");
        assert!(timers.advance(99).is_empty());
        assert_eq!(timers.advance(1), vec!["a"]);
        assert!(timers.is_empty());
    }

    #[test]
    fn delivery_ordered_by_due_time_then_schedule_order() {
        let mut timers: Timers<&str> = Timers::new();
        timers.schedule(50, "late");
        timers.schedule(10, "early");
        timers.schedule(50, "late2");
        assert_eq!(timers.advance(60), vec!["early", "late", "late2"]);
    }

    #[test]
    fn cancel_prevents_delivery() {
        let mut timers: Timers<&str> = Timers::new();
        let id = timers.schedule(10, "a");
        timers.schedule(20, "b");
        assert!(timers.cancel(id));
        assert_eq!(timers.advance(30), vec!["b"]);
    }

    #[test]
    fn cancel_after_fire_is_noop() {
        let mut timers: Timers<&str> = Timers::new();
        let id = timers.schedule(10, "a");
        assert_eq!(timers.advance(10), vec!["a"]);
        assert!(!timers.cancel(id));
    }

    #[test]
    fn next_due_tracks_earliest() {
        let mut timers: Timers<u32> = Timers::new();
        assert_eq!(timers.next_due_in_ms(), None);
        timers.schedule(40, 1);
        timers.schedule(15, 2);
        assert_eq!(timers.next_due_in_ms(), Some(15));
        timers.advance(10);
        assert_eq!(timers.next_due_in_ms(), Some(5));
    }

    #[test]
    fn clock_accumulates_across_advances() {
        let mut timers: Timers<&str> = Timers::new();
        timers.advance(5);
        timers.schedule(10, "a");
        assert_eq!(timers.now_ms(), 5);
        assert!(timers.advance(9).is_empty());
        assert_eq!(timers.advance(1), vec!["a"]);
        assert_eq!(timers.now_ms(), 15);
    }
}
