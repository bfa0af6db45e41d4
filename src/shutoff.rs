//! Timed fade-to-black and release of the matrix.
//!
//! Every render path arms this after pushing, so the hardware is never
//! left lit indefinitely. Arming again replaces the previous pair.

use crate::scheduler::{Scheduler, TimerId};
use std::time::Duration;

/// How long a static image (or shape) stays up.
pub const IMAGE_HOLD: Duration = Duration::from_secs(10);
/// Gap between the clear and the release.
pub const CLOSE_GAP: Duration = Duration::from_millis(250);
/// Delays at or below this collapse into "clear now, release shortly".
pub const IMMEDIATE_THRESHOLD: Duration = Duration::from_millis(100);
/// Release delay used by the collapsed form.
pub const IMMEDIATE_CLOSE_DELAY: Duration = Duration::from_millis(100);

/// Whether the caller has to clear the matrix right away.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShutoffPlan {
    /// Both steps are on the timer queue.
    Scheduled,
    /// Clear immediately; only the release was scheduled.
    ClearNow,
}

/// Owner of the pending clear/close pair.
#[derive(Debug, Default)]
pub struct AutoShutoff {
    clear: Option<TimerId>,
    close: Option<TimerId>,
}

impl AutoShutoff {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel any earlier pair, then schedule `clear_event` at `after` and
    /// `close_event` at `after + CLOSE_GAP`.
    pub fn schedule<E>(&mut self, sched: &mut Scheduler<E>, after: Duration, clear_event: E, close_event: E) -> ShutoffPlan {
        self.cancel(sched);
        if after <= IMMEDIATE_THRESHOLD {
            self.close = Some(sched.schedule(IMMEDIATE_CLOSE_DELAY, close_event));
            return ShutoffPlan::ClearNow;
        }
        self.clear = Some(sched.schedule(after, clear_event));
        self.close = Some(sched.schedule(after + CLOSE_GAP, close_event));
        ShutoffPlan::Scheduled
    }

    /// Remove both pending steps, whatever their state.
    pub fn cancel<E>(&mut self, sched: &mut Scheduler<E>) {
        if let Some(id) = self.clear.take() {
            sched.cancel(id);
        }
        if let Some(id) = self.close.take() {
            sched.cancel(id);
        }
    }

    /// True while a clear or close is still waiting to fire.
    pub fn is_armed<E>(&self, sched: &Scheduler<E>) -> bool {
        self.clear.is_some_and(|id| sched.is_pending(id)) || self.close.is_some_and(|id| sched.is_pending(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    enum Ev {
        Clear,
        Close,
    }

    fn fire_all(s: &mut Scheduler<Ev>) -> Vec<(u128, Ev)> {
        let mut out = Vec::new();
        while let Some(e) = s.pop_due(Duration::MAX) {
            out.push((s.now().as_millis(), e));
        }
        out
    }

    #[test]
    fn schedules_clear_then_close() {
        let mut s = Scheduler::new();
        let mut shutoff = AutoShutoff::new();
        assert_eq!(shutoff.schedule(&mut s, IMAGE_HOLD, Ev::Clear, Ev::Close), ShutoffPlan::Scheduled);
        assert!(shutoff.is_armed(&s));
        assert_eq!(fire_all(&mut s), vec![(10_000, Ev::Clear), (10_250, Ev::Close)]);
        assert!(!shutoff.is_armed(&s));
    }

    #[test]
    fn rescheduling_replaces_the_earlier_pair() {
        let mut s = Scheduler::new();
        let mut shutoff = AutoShutoff::new();
        shutoff.schedule(&mut s, Duration::from_millis(5000), Ev::Clear, Ev::Close);
        shutoff.schedule(&mut s, Duration::from_millis(8000), Ev::Clear, Ev::Close);
        assert_eq!(fire_all(&mut s), vec![(8000, Ev::Clear), (8250, Ev::Close)]);
    }

    #[test]
    fn tiny_delay_collapses_to_immediate_clear() {
        let mut s = Scheduler::new();
        let mut shutoff = AutoShutoff::new();
        assert_eq!(
            shutoff.schedule(&mut s, Duration::from_millis(100), Ev::Clear, Ev::Close),
            ShutoffPlan::ClearNow
        );
        assert_eq!(fire_all(&mut s), vec![(100, Ev::Close)]);
    }

    #[test]
    fn immediate_form_also_cancels_pending_pair() {
        let mut s = Scheduler::new();
        let mut shutoff = AutoShutoff::new();
        shutoff.schedule(&mut s, IMAGE_HOLD, Ev::Clear, Ev::Close);
        shutoff.schedule(&mut s, Duration::ZERO, Ev::Clear, Ev::Close);
        assert_eq!(fire_all(&mut s), vec![(100, Ev::Close)]);
    }

    #[test]
    fn cancel_removes_both() {
        let mut s = Scheduler::new();
        let mut shutoff = AutoShutoff::new();
        shutoff.schedule(&mut s, IMAGE_HOLD, Ev::Clear, Ev::Close);
        shutoff.cancel(&mut s);
        assert!(s.is_empty());
        assert!(!shutoff.is_armed(&s));
        // Cancelling twice is harmless.
        shutoff.cancel(&mut s);
    }
}
