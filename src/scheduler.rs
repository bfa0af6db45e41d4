//! Cancellable timer queue on a virtual clock.
//!
//! This is the single serialized "main queue": marquee ticks, delayed
//! clears and closes all live here and fire in deadline order. Time only
//! moves when the owner calls [`Scheduler::pop_due`] / [`Scheduler::advance_to`],
//! so tests can step through seconds of animation instantly while the
//! render thread feeds it wall-clock time.
//!
//! ## Rust concepts
//! - `BTreeMap` as an ordered priority queue keyed by `(deadline, seq)`
//! - Newtype IDs (`TimerId`) so handles can't be mixed up with plain numbers
//! - Generic over the event type `E`

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

/// Handle to one scheduled event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

pub struct Scheduler<E> {
    now: Duration,
    next_seq: u64,
    queue: BTreeMap<(Duration, u64), E>,
    deadlines: HashMap<u64, Duration>,
}

impl<E> Default for Scheduler<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Scheduler<E> {
    pub fn new() -> Self {
        Self {
            now: Duration::ZERO,
            next_seq: 0,
            queue: BTreeMap::new(),
            deadlines: HashMap::new(),
        }
    }

    /// Current virtual time.
    pub fn now(&self) -> Duration {
        self.now
    }

    /// Schedule `event` to fire `delay` after the current time. Events with
    /// equal deadlines fire in scheduling order.
    pub fn schedule(&mut self, delay: Duration, event: E) -> TimerId {
        let seq = self.next_seq;
        self.next_seq += 1;
        let deadline = self.now + delay;
        self.queue.insert((deadline, seq), event);
        self.deadlines.insert(seq, deadline);
        TimerId(seq)
    }

    /// Remove a pending event. Returns it if it had not fired yet.
    pub fn cancel(&mut self, id: TimerId) -> Option<E> {
        let deadline = self.deadlines.remove(&id.0)?;
        self.queue.remove(&(deadline, id.0))
    }

    /// Remove every pending event matching `pred`; returns how many.
    pub fn cancel_where(&mut self, mut pred: impl FnMut(&E) -> bool) -> usize {
        let doomed: Vec<(Duration, u64)> = self
            .queue
            .iter()
            .filter(|(_, e)| pred(e))
            .map(|(k, _)| *k)
            .collect();
        for key in &doomed {
            self.queue.remove(key);
            self.deadlines.remove(&key.1);
        }
        doomed.len()
    }

    pub fn is_pending(&self, id: TimerId) -> bool {
        self.deadlines.contains_key(&id.0)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Deadline of the earliest pending event.
    pub fn next_deadline(&self) -> Option<Duration> {
        self.queue.keys().next().map(|(d, _)| *d)
    }

    /// Pop the earliest event due at or before `now`, moving the clock to
    /// its deadline so anything it schedules is relative to when it fired.
    pub fn pop_due(&mut self, now: Duration) -> Option<E> {
        let (&(deadline, seq), _) = self.queue.iter().next()?;
        if deadline > now {
            return None;
        }
        self.deadlines.remove(&seq);
        self.now = self.now.max(deadline);
        self.queue.remove(&(deadline, seq))
    }

    /// Move the clock forward to `now` (never backwards). Call after
    /// draining [`Scheduler::pop_due`].
    pub fn advance_to(&mut self, now: Duration) {
        self.now = self.now.max(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn drain(s: &mut Scheduler<&'static str>, now: Duration) -> Vec<&'static str> {
        let mut out = Vec::new();
        while let Some(e) = s.pop_due(now) {
            out.push(e);
        }
        s.advance_to(now);
        out
    }

    #[test]
    fn fires_in_deadline_order() {
        let mut s = Scheduler::new();
        s.schedule(ms(30), "c");
        s.schedule(ms(10), "a");
        s.schedule(ms(20), "b");
        assert_eq!(drain(&mut s, ms(100)), vec!["a", "b", "c"]);
    }

    #[test]
    fn equal_deadlines_keep_insertion_order() {
        let mut s = Scheduler::new();
        s.schedule(ms(5), "first");
        s.schedule(ms(5), "second");
        assert_eq!(drain(&mut s, ms(5)), vec!["first", "second"]);
    }

    #[test]
    fn nothing_fires_early() {
        let mut s = Scheduler::new();
        s.schedule(ms(50), "x");
        assert_eq!(drain(&mut s, ms(49)), Vec::<&str>::new());
        assert_eq!(s.next_deadline(), Some(ms(50)));
        assert_eq!(drain(&mut s, ms(50)), vec!["x"]);
    }

    #[test]
    fn cancel_removes_one() {
        let mut s = Scheduler::new();
        let a = s.schedule(ms(10), "a");
        s.schedule(ms(10), "b");
        assert_eq!(s.cancel(a), Some("a"));
        assert_eq!(s.cancel(a), None);
        assert!(!s.is_pending(a));
        assert_eq!(drain(&mut s, ms(10)), vec!["b"]);
    }

    #[test]
    fn cancel_where_filters() {
        let mut s = Scheduler::new();
        s.schedule(ms(1), "tick");
        s.schedule(ms(2), "close");
        s.schedule(ms(3), "tick");
        assert_eq!(s.cancel_where(|e| *e == "tick"), 2);
        assert_eq!(s.len(), 1);
        assert_eq!(drain(&mut s, ms(10)), vec!["close"]);
    }

    #[test]
    fn delays_are_relative_to_fire_time() {
        let mut s = Scheduler::new();
        s.schedule(ms(10), "a");
        assert_eq!(s.pop_due(ms(100)), Some("a"));
        assert_eq!(s.now(), ms(10));
        s.schedule(ms(5), "b");
        assert_eq!(s.next_deadline(), Some(ms(15)));
    }

    #[test]
    fn clock_never_runs_backwards() {
        let mut s: Scheduler<&str> = Scheduler::new();
        s.advance_to(ms(100));
        s.advance_to(ms(50));
        assert_eq!(s.now(), ms(100));
        assert!(s.is_empty());
    }
}
