/// Whole-second countdown driven by external ticks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Countdown {
    total: u32,
    remaining: u32,
    paused: bool,
}

impl Countdown {
    pub fn new(total_seconds: u32) -> Self {
        Self {
            total: total_seconds,
            remaining: total_seconds,
            paused: false,
        }
    }

    /// Countdown resumed from saved progress; `remaining` is clamped to the total.
    pub fn with_remaining(total_seconds: u32, remaining: u32) -> Self {
        Self {
            total: total_seconds,
            remaining: remaining.min(total_seconds),
            paused: false,
        }
    }

    /// Advances one second. Returns the new remaining time, or `None` when
    /// paused or already at zero.
    pub fn tick(&mut self) -> Option<u32> {
        if self.paused || self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        Some(self.remaining)
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_expired(&self) -> bool {
        self.remaining == 0
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    pub fn elapsed_seconds(&self) -> u32 {
        self.total - self.remaining
    }

    /// Whole minutes spent, rounded down.
    pub fn elapsed_minutes(&self) -> i32 {
        (self.elapsed_seconds() / 60) as i32
    }
}
