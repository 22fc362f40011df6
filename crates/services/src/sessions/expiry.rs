use chrono::{DateTime, Duration, Utc};

/// Per-second remaining-time counter shown to the candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Countdown {
    remaining_secs: u64,
}

impl Countdown {
    #[must_use]
    pub fn new(remaining_secs: u64) -> Self {
        Self { remaining_secs }
    }

    #[must_use]
    pub fn remaining_secs(&self) -> u64 {
        self.remaining_secs
    }

    /// Decrement by one second. Returns `true` on the tick that reaches zero.
    pub fn tick(&mut self) -> bool {
        match self.remaining_secs {
            0 => false,
            secs => {
                self.remaining_secs = secs - 1;
                self.remaining_secs == 0
            }
        }
    }
}

/// Wall-clock deadline check, independent of the countdown.
///
/// Fires at most once per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryGuard {
    start: DateTime<Utc>,
    duration: Duration,
    fired: bool,
}

impl ExpiryGuard {
    #[must_use]
    pub fn new(start: DateTime<Utc>, duration: Duration) -> Self {
        Self {
            start,
            duration,
            fired: false,
        }
    }

    #[must_use]
    pub fn deadline(&self) -> DateTime<Utc> {
        self.start + self.duration
    }

    #[must_use]
    pub fn has_fired(&self) -> bool {
        self.fired
    }

    /// Returns `true` the first time `now` is at or past the deadline.
    pub fn check(&mut self, now: DateTime<Utc>) -> bool {
        if self.fired || now < self.deadline() {
            return false;
        }
        self.fired = true;
        true
    }
}
