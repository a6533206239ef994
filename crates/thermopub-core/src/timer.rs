//! Countdown timers used by the publish state machine.
//!
//! There are exactly two timers, addressed by [`TimerId`]. An expiry is a
//! one-shot edge: the first [`Timers::expired`] call that observes it also
//! disarms the timer, so a slow caller cannot trigger on it twice.

use std::time::{Duration, Instant};

/// Timer identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerId {
    /// Delay between the end of one publish cycle and the start of the next
    Publish,
    /// Bounds how long a transport operation may stay pending
    Watchdog,
}

impl TimerId {
    const COUNT: usize = 2;

    fn slot(self) -> usize {
        match self {
            TimerId::Publish => 0,
            TimerId::Watchdog => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Timer {
    expires_at: Option<Instant>,
}

/// Fixed set of countdown timers.
#[derive(Debug, Clone, Default)]
pub struct Timers {
    slots: [Timer; TimerId::COUNT],
}

impl Timers {
    /// Create a set with every timer disarmed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm `id` to expire `duration` after `now`.
    pub fn arm(&mut self, id: TimerId, duration: Duration, now: Instant) {
        self.slots[id.slot()].expires_at = Some(now + duration);
    }

    /// Disarm `id`.
    pub fn cancel(&mut self, id: TimerId) {
        self.slots[id.slot()].expires_at = None;
    }

    pub fn is_armed(&self, id: TimerId) -> bool {
        self.slots[id.slot()].expires_at.is_some()
    }

    /// Time left before `id` fires, or `None` when disarmed.
    pub fn remaining(&self, id: TimerId, now: Instant) -> Option<Duration> {
        self.slots[id.slot()]
            .expires_at
            .map(|at| at.saturating_duration_since(now))
    }

    /// Returns true when `id` is disarmed or its expiry has been reached.
    ///
    /// Observing an expiry disarms the timer.
    pub fn expired(&mut self, id: TimerId, now: Instant) -> bool {
        let slot = &mut self.slots[id.slot()];
        match slot.expires_at {
            None => true,
            Some(at) if now >= at => {
                slot.expires_at = None;
                true
            }
            Some(_) => false,
        }
    }
}
