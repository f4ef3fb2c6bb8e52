// Posture Coach — Mock Hardware
//
// Host-side stand-ins for the hardware seams: a simulated body (multiplexer +
// ten MPU6050 + LCD backpack on one bus), scripted buttons, a recording
// buzzer and display, and a manually advanced clock.  Used by the host
// simulator binary and by the tests.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use crate::classifier::Classifier;
use crate::config::*;
use crate::drivers::imu::{REG_ACCEL_XOUT_H, REG_PWR_MGMT_1, REG_WHO_AM_I, WHO_AM_I_EXPECTED};
use crate::error::{Error, Result, SensorError};
use crate::features::CompleteVector;
use crate::hal::{Clock, I2cBus, InputLine, OutputLine, TextDisplay};
use crate::segment::{Segment, SEGMENT_COUNT};

// ---------------------------------------------------------------------------
// ManualClock — virtual time, `sleep` advances it
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }

    pub fn set(&self, to: Duration) {
        self.now.set(to);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.now.get()
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

// ---------------------------------------------------------------------------
// MockBody — everything on the simulated I2C bus
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, Default)]
struct SimSensor {
    accel: [f32; 3], // g
    failed: bool,
    stall: Duration,
    awake: bool,
}

pub struct MockBody {
    sensors: [SimSensor; SEGMENT_COUNT],
    mux_present: bool,
    mux_mask: u8,
    mux_writes: Vec<u8>,
    reject_mux_close: bool,
    reject_mux_select: bool,
    log: Vec<(u8, Vec<u8>)>,
    clock: Option<Rc<dyn Clock>>,
}

/// Postures the simulator knows how to hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Posture {
    Upright,
    Slouched,
}

impl MockBody {
    /// Every sensor level: gravity straight down the z axis.
    pub fn upright() -> Self {
        let level = SimSensor {
            accel: [0.0, 0.0, 1.0],
            ..SimSensor::default()
        };
        Self {
            sensors: std::array::from_fn(|_| level.clone()),
            mux_present: true,
            mux_mask: 0,
            mux_writes: Vec::new(),
            reject_mux_close: false,
            reject_mux_select: false,
            log: Vec::new(),
            clock: None,
        }
    }

    /// Rounded upper back, shoulders rolled forward, lower back flexed.
    pub fn slouched() -> Self {
        let mut body = Self::upright();
        body.tilt(Segment::UpperBack, 28.0, 0.0);
        body.tilt(Segment::UpperMidBack, 22.0, 0.0);
        body.tilt(Segment::LowerMidBack, 15.0, 0.0);
        body.tilt(Segment::LowerBack, 12.0, 0.0);
        body.tilt(Segment::LeftShoulder, 18.0, 4.0);
        body.tilt(Segment::RightShoulder, 18.0, -4.0);
        body
    }

    pub fn with_posture(posture: Posture) -> Self {
        match posture {
            Posture::Upright => Self::upright(),
            Posture::Slouched => Self::slouched(),
        }
    }

    /// Stalls are served by sleeping on this clock.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Some(Rc::new(clock));
        self
    }

    /// Orient one sensor so it reads back the given pitch and roll.
    pub fn tilt(&mut self, segment: Segment, pitch_deg: f64, roll_deg: f64) {
        let (p, r) = (pitch_deg.to_radians(), roll_deg.to_radians());
        self.sensors[segment.index()].accel = [
            (-p.sin()) as f32,
            (p.cos() * r.sin()) as f32,
            (p.cos() * r.cos()) as f32,
        ];
    }

    /// Make a sensor stop acknowledging.
    pub fn fail(&mut self, segment: Segment) {
        self.sensors[segment.index()].failed = true;
    }

    pub fn restore(&mut self, segment: Segment) {
        self.sensors[segment.index()].failed = false;
    }

    /// Make every accel read of a sensor take `by`.
    pub fn stall(&mut self, segment: Segment, by: Duration) {
        self.sensors[segment.index()].stall = by;
    }

    pub fn remove_mux(&mut self) {
        self.mux_present = false;
    }

    /// NACK every close (zero mask) write; the open channel stays open.
    pub fn fail_mux_close(&mut self, on: bool) {
        self.reject_mux_close = on;
    }

    /// NACK every channel select (non-zero mask) write.
    pub fn fail_mux_select(&mut self, on: bool) {
        self.reject_mux_select = on;
    }

    pub fn mux_mask(&self) -> u8 {
        self.mux_mask
    }

    /// Every control byte written to the multiplexer, in order.
    pub fn mux_writes(&self) -> Vec<u8> {
        self.mux_writes.clone()
    }

    /// Raw bytes written to a device other than the mux and the sensors.
    pub fn writes_to(&self, addr: u8) -> Vec<u8> {
        self.log
            .iter()
            .filter(|(a, _)| *a == addr)
            .flat_map(|(_, bytes)| bytes.iter().copied())
            .collect()
    }

    pub fn clear_log(&mut self) {
        self.log.clear();
        self.mux_writes.clear();
    }

    /// Which sensor answers at `addr` with the current channel selection.
    /// With a channel open, the channel's sensor answers at the shared address.
    fn resolve(&self, addr: u8) -> Option<Segment> {
        if addr == I2C_ADDR_MPU6050 && self.mux_mask != 0 {
            if self.mux_mask.count_ones() != 1 {
                return None; // several sensors driving the same address
            }
            let channel = self.mux_mask.trailing_zeros() as u8;
            return Segment::ALL
                .into_iter()
                .find(|s| s.port() == crate::segment::SensorPort::Multiplexed { channel });
        }
        Segment::ALL
            .into_iter()
            .find(|s| s.port() == crate::segment::SensorPort::Direct { addr })
    }

    fn sensor_at(&mut self, addr: u8) -> std::result::Result<&mut SimSensor, SensorError> {
        let nack = SensorError::Bus {
            addr,
            reason: "no acknowledge".into(),
        };
        let segment = self.resolve(addr).ok_or_else(|| nack.clone())?;
        let sensor = &mut self.sensors[segment.index()];
        if sensor.failed {
            return Err(nack);
        }
        Ok(sensor)
    }
}

impl I2cBus for MockBody {
    fn write(&mut self, addr: u8, bytes: &[u8]) -> std::result::Result<(), SensorError> {
        match addr {
            I2C_ADDR_TCA9548A => {
                if !self.mux_present {
                    return Err(SensorError::Bus {
                        addr,
                        reason: "no acknowledge".into(),
                    });
                }
                let mask = bytes.first().copied().unwrap_or(0);
                let rejected = if mask == 0 { self.reject_mux_close } else { self.reject_mux_select };
                if rejected {
                    return Err(SensorError::Bus {
                        addr,
                        reason: "no acknowledge".into(),
                    });
                }
                self.mux_mask = mask;
                self.mux_writes.push(mask);
                Ok(())
            }
            I2C_ADDR_LCD => {
                self.log.push((addr, bytes.to_vec()));
                Ok(())
            }
            _ => {
                let sensor = self.sensor_at(addr)?;
                if bytes.first() == Some(&REG_PWR_MGMT_1) {
                    sensor.awake = bytes.get(1) == Some(&0x00);
                }
                Ok(())
            }
        }
    }

    fn write_read(
        &mut self,
        addr: u8,
        bytes: &[u8],
        buf: &mut [u8],
    ) -> std::result::Result<(), SensorError> {
        let clock = self.clock.clone();
        let sensor = self.sensor_at(addr)?;
        match bytes.first().copied() {
            Some(REG_WHO_AM_I) => {
                buf.fill(0);
                if let Some(b) = buf.first_mut() {
                    *b = WHO_AM_I_EXPECTED;
                }
            }
            Some(REG_ACCEL_XOUT_H) => {
                if !sensor.stall.is_zero() {
                    if let Some(clock) = clock {
                        clock.sleep(sensor.stall);
                    }
                }
                let raw: Vec<u8> = sensor
                    .accel
                    .iter()
                    .flat_map(|g| ((g * ACCEL_SCALE_8G).round() as i16).to_be_bytes())
                    .collect();
                for (dst, src) in buf.iter_mut().zip(raw) {
                    *dst = src;
                }
            }
            _ => buf.fill(0),
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Buttons — pressed during scripted time windows
// ---------------------------------------------------------------------------
#[derive(Clone)]
pub struct ScriptedButton {
    clock: Rc<dyn Clock>,
    presses: Rc<RefCell<Vec<(Duration, Duration)>>>,
}

impl ScriptedButton {
    pub fn new(clock: Rc<dyn Clock>) -> Self {
        Self {
            clock,
            presses: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// Hold the button down from `at` for `hold`.
    pub fn press_at(&self, at: Duration, hold: Duration) {
        self.presses.borrow_mut().push((at, at + hold));
    }
}

impl InputLine for ScriptedButton {
    fn is_low(&self) -> bool {
        let now = self.clock.now();
        self.presses
            .borrow()
            .iter()
            .any(|&(start, end)| now >= start && now < end)
    }
}

// ---------------------------------------------------------------------------
// Buzzer pin — records (start, length) of every pulse
// ---------------------------------------------------------------------------
#[derive(Clone)]
pub struct MockBuzzerPin {
    clock: Rc<dyn Clock>,
    high_since: Rc<Cell<Option<Duration>>>,
    pulses: Rc<RefCell<Vec<(Duration, Duration)>>>,
}

impl MockBuzzerPin {
    pub fn new(clock: impl Clock + 'static) -> Self {
        Self::shared(Rc::new(clock))
    }

    pub fn shared(clock: Rc<dyn Clock>) -> Self {
        Self {
            clock,
            high_since: Rc::new(Cell::new(None)),
            pulses: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn pulses(&self) -> Vec<(Duration, Duration)> {
        self.pulses.borrow().clone()
    }

    pub fn pulse_count(&self) -> usize {
        self.pulses.borrow().len()
    }

    pub fn clear(&self) {
        self.pulses.borrow_mut().clear();
    }
}

impl OutputLine for MockBuzzerPin {
    fn set_high(&mut self) {
        if self.high_since.get().is_none() {
            self.high_since.set(Some(self.clock.now()));
        }
    }

    fn set_low(&mut self) {
        if let Some(start) = self.high_since.take() {
            let length = self.clock.now().saturating_sub(start);
            self.pulses.borrow_mut().push((start, length));
        }
    }
}

// ---------------------------------------------------------------------------
// Display — keeps the current two lines and a history of screens
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DisplayState {
    pub lines: [String; LCD_ROWS],
    pub blink: bool,
    pub cursor_row: usize,
    /// Every line written, as (row, text).
    pub history: Vec<(usize, String)>,
}

#[derive(Clone, Default)]
pub struct MockDisplay {
    state: Rc<RefCell<DisplayState>>,
}

impl MockDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> DisplayState {
        self.state.borrow().clone()
    }

    pub fn line(&self, row: usize) -> String {
        self.state.borrow().lines[row].clone()
    }

    /// Whether `text` was ever written to any row.
    pub fn showed(&self, text: &str) -> bool {
        self.state.borrow().history.iter().any(|(_, t)| t == text)
    }
}

impl TextDisplay for MockDisplay {
    fn clear(&mut self) {
        let mut state = self.state.borrow_mut();
        state.lines = Default::default();
    }

    fn write_line(&mut self, row: usize, text: &str) {
        let text: String = text.chars().take(LCD_COLS).collect();
        let mut state = self.state.borrow_mut();
        let row = row.min(LCD_ROWS - 1);
        state.lines[row] = text.clone();
        state.history.push((row, text));
    }

    fn set_blink(&mut self, on: bool) {
        self.state.borrow_mut().blink = on;
    }

    fn set_cursor_row(&mut self, row: usize) {
        self.state.borrow_mut().cursor_row = row;
    }
}

// ---------------------------------------------------------------------------
// ScriptedClassifier — hands out queued labels, then repeats a fallback
// ---------------------------------------------------------------------------
pub struct ScriptedClassifier {
    queue: RefCell<VecDeque<String>>,
    fallback: String,
    calls: Rc<Cell<usize>>,
}

impl ScriptedClassifier {
    pub fn new<I, S>(labels: I, fallback: &str) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            queue: RefCell::new(labels.into_iter().map(Into::into).collect()),
            fallback: fallback.to_string(),
            calls: Rc::new(Cell::new(0)),
        }
    }

    /// Shared counter of `classify` calls, readable after the classifier has
    /// been moved into a controller.
    pub fn call_counter(&self) -> Rc<Cell<usize>> {
        self.calls.clone()
    }
}

impl Classifier for ScriptedClassifier {
    fn classify(&self, _vector: &CompleteVector) -> Result<String> {
        self.calls.set(self.calls.get() + 1);
        let label = self.queue.borrow_mut().pop_front();
        Ok(label.unwrap_or_else(|| self.fallback.clone()))
    }

    fn labels(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Classifier that always fails; exercises error paths.
pub struct FailingClassifier;

impl Classifier for FailingClassifier {
    fn classify(&self, _vector: &CompleteVector) -> Result<String> {
        Err(Error::Classify("model unavailable".into()))
    }

    fn labels(&self) -> Vec<String> {
        Vec::new()
    }
}
