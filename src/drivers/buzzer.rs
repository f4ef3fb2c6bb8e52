// Posture Coach — Buzzer Driver
//
// Simple GPIO-driven active buzzer, played in timed pulse patterns.

use std::time::Duration;

use crate::hal::{Clock, OutputLine};

/// `count` pulses of `on`, each followed by `pause`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeepPattern {
    pub on: Duration,
    pub pause: Duration,
    pub count: u32,
}

impl BeepPattern {
    pub fn new(count: u32, on: Duration, pause: Duration) -> Self {
        Self { on, pause, count }
    }

    /// Total time the pattern blocks the caller.
    pub fn duration(&self) -> Duration {
        (self.on + self.pause) * self.count
    }
}

pub struct Buzzer {
    pin: Box<dyn OutputLine>,
}

impl Buzzer {
    pub fn new(pin: Box<dyn OutputLine>) -> Self {
        Self { pin }
    }

    /// Play a pattern (blocks the calling thread for `pattern.duration()`).
    pub fn play(&mut self, pattern: BeepPattern, clock: &dyn Clock) {
        for _ in 0..pattern.count {
            self.pin.set_high();
            clock.sleep(pattern.on);
            self.pin.set_low();
            clock.sleep(pattern.pause);
        }
    }
}
