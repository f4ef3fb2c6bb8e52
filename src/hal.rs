// Posture Coach — Hardware Seams
//
// The core only talks to hardware through these traits.  ESP-IDF drivers
// implement them on the device (see `drivers::esp`); `mock` implements them
// for the host simulator and tests.

use std::cell::RefCell;
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};

use crate::error::SensorError;

/// Blocking I2C master.
pub trait I2cBus {
    fn write(&mut self, addr: u8, bytes: &[u8]) -> Result<(), SensorError>;
    fn write_read(&mut self, addr: u8, bytes: &[u8], buf: &mut [u8]) -> Result<(), SensorError>;
}

/// One bus shared by the multiplexer, the sensors and the display.  There is
/// exactly one control thread, so a `RefCell` is all the exclusion needed.
pub type SharedBus = Rc<RefCell<dyn I2cBus>>;

/// Digital input line. Buttons are wired active LOW with pull-up.
pub trait InputLine {
    fn is_low(&self) -> bool;
}

/// Digital output line.
pub trait OutputLine {
    fn set_high(&mut self);
    fn set_low(&mut self);
}

/// Two-line character display.
pub trait TextDisplay {
    fn clear(&mut self);
    /// Write `text` at the start of `row`. Text beyond the display width is cut.
    fn write_line(&mut self, row: usize, text: &str);
    fn set_blink(&mut self, on: bool);
    /// Park the (blinking) cursor at column 0 of `row`.
    fn set_cursor_row(&mut self, row: usize);
}

/// Monotonic time source. Injected so timing logic runs on virtual time in
/// tests.
pub trait Clock {
    /// Time since the clock was created.
    fn now(&self) -> Duration;
    fn sleep(&self, duration: Duration);
}

/// Wall-clock implementation backed by `Instant` and `thread::sleep`.
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self { start: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}
