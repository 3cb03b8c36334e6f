//! Auto-reconnect attempt window.
//!
//! When a fresh discovery cycle surfaces the persisted preferred peer, the
//! node confirms it automatically - but only once per cycle, and the attempt
//! is bounded by a window (5 seconds by default). A new user action or a
//! connected session supersedes and cancels the pending attempt.

use std::time::{Duration, Instant};

/// Tracks whether an auto-connect attempt may begin.
#[derive(Debug)]
pub struct ReconnectWindow {
    window: Duration,
    attempted_this_cycle: bool,
    inflight_until: Option<Instant>,
}

impl ReconnectWindow {
    /// Window with the given attempt bound.
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            attempted_this_cycle: false,
            inflight_until: None,
        }
    }

    /// A fresh discovery cycle started: one new attempt is allowed again.
    pub fn begin_cycle(&mut self) {
        self.attempted_this_cycle = false;
        self.inflight_until = None;
    }

    /// Try to claim the single auto-attempt for this cycle.
    ///
    /// Returns `true` when no attempt ran this cycle and none is still in
    /// flight; the caller must then actually confirm the peer.
    pub fn try_begin(&mut self, now: Instant) -> bool {
        if self.attempted_this_cycle {
            return false;
        }
        if let Some(deadline) = self.inflight_until {
            if now < deadline {
                return false;
            }
        }
        self.attempted_this_cycle = true;
        self.inflight_until = Some(now + self.window);
        true
    }

    /// Whether an attempt is currently in flight.
    #[must_use]
    pub fn is_inflight(&self, now: Instant) -> bool {
        self.inflight_until.is_some_and(|deadline| now < deadline)
    }

    /// Cancel any pending attempt (superseded by a user action or a
    /// connected session).
    pub fn cancel(&mut self) {
        self.inflight_until = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_attempt_per_cycle() {
        let mut window = ReconnectWindow::new(Duration::from_secs(5));
        let now = Instant::now();

        assert!(window.try_begin(now));
        assert!(window.is_inflight(now));
        // Second candidate in the same cycle must not retrigger.
        assert!(!window.try_begin(now));
        // Even after the window lapses, the cycle is spent.
        assert!(!window.try_begin(now + Duration::from_secs(6)));
    }

    #[test]
    fn fresh_cycle_allows_again() {
        let mut window = ReconnectWindow::new(Duration::from_secs(5));
        let now = Instant::now();
        assert!(window.try_begin(now));

        window.begin_cycle();
        assert!(window.try_begin(now + Duration::from_millis(1)));
    }

    #[test]
    fn cancel_clears_inflight() {
        let mut window = ReconnectWindow::new(Duration::from_secs(5));
        let now = Instant::now();
        assert!(window.try_begin(now));
        assert!(window.is_inflight(now));

        window.cancel();
        assert!(!window.is_inflight(now));
    }
}
