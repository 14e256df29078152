use std::time::{Duration, Instant};

/// Countdown driving periodic signal generation. One configured interval,
/// one in-flight call at a time: a trigger arriving while a generate call is
/// pending is dropped, not queued. Success and failure reset the countdown
/// identically.
#[derive(Debug)]
pub struct ScanScheduler {
    interval: Duration,
    last_reset: Instant,
    in_flight: bool,
}

impl ScanScheduler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_reset: Instant::now(),
            in_flight: false,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    /// Countdown expired and no generate call pending.
    pub fn due(&self) -> bool {
        !self.in_flight && self.last_reset.elapsed() >= self.interval
    }

    /// Single-flight acquire. Returns false if a call is already pending.
    pub fn try_begin(&mut self) -> bool {
        if self.in_flight {
            return false;
        }
        self.in_flight = true;
        true
    }

    /// Call resolved (either way): clear the guard, restart the countdown.
    pub fn finish(&mut self) {
        self.in_flight = false;
        self.last_reset = Instant::now();
    }

    /// Manual trigger restarts the countdown even when the call is coalesced.
    pub fn reset(&mut self) {
        self.last_reset = Instant::now();
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn remaining(&self) -> Duration {
        self.interval.saturating_sub(self.last_reset.elapsed())
    }
}
