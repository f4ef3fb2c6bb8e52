// Posture Coach — Sensor Bus
//
// Reads the ten orientation sensors one after another.  Eight sit behind the
// multiplexer at a shared address, two are addressed directly.  A failing
// sensor only costs its own slot in the snapshot; the pass always visits all
// ten, and a multiplexer channel is never left open after a read.  If closing
// the channel fails, the close is retried before the next direct read, and the
// direct sensor sharing the multiplexed address is not read until it succeeds.

use std::rc::Rc;
use std::time::Duration;

use crate::drivers::imu::Mpu6050;
use crate::drivers::mux::Tca9548a;
use crate::config::{I2C_ADDR_MPU6050, I2C_ADDR_TCA9548A};
use crate::error::{Error, Result, SensorError};
use crate::hal::{Clock, I2cBus, SharedBus};
use crate::segment::{Angles, Segment, SensorPort, Snapshot, SEGMENT_COUNT};

pub struct SensorBus {
    bus: SharedBus,
    clock: Rc<dyn Clock>,
    mux: Tca9548a,
    /// Indexed by `Segment::index()`.
    sensors: [Mpu6050; SEGMENT_COUNT],
    read_timeout: Duration,
    /// A close after a multiplexed access failed; a channel may still be open.
    mux_dirty: bool,
}

impl SensorBus {
    pub fn new(bus: SharedBus, clock: Rc<dyn Clock>, read_timeout: Duration) -> Self {
        let sensors = Segment::ALL.map(|segment| match segment.port() {
            SensorPort::Multiplexed { .. } => Mpu6050::new(I2C_ADDR_MPU6050),
            SensorPort::Direct { addr } => Mpu6050::new(addr),
        });
        Self {
            bus,
            clock,
            mux: Tca9548a::new(),
            sensors,
            read_timeout,
            mux_dirty: false,
        }
    }

    /// Bring-up check.  The multiplexer must acknowledge, otherwise nothing
    /// behind it is reachable and the caller should stop.  Sensors that do not
    /// answer are only reported; they stay subject to per-read isolation.
    pub fn probe(&mut self) -> Result<Vec<Segment>> {
        self.mux
            .close_all(&mut *self.bus.borrow_mut())
            .map_err(|e| Error::HardwareInit(format!("multiplexer not responding: {}", e)))?;
        self.mux_dirty = false;

        let mut missing = Vec::new();
        for segment in Segment::READ_ORDER {
            match self.with_port(segment, |sensor, bus| sensor.init(bus)) {
                Ok(()) => log::info!("{:<15} ok", segment.name()),
                Err(e) => {
                    log::warn!("{:<15} not responding: {}", segment.name(), e);
                    missing.push(segment);
                }
            }
        }
        Ok(missing)
    }

    /// Read one segment.  Any failure, including a read that takes longer than
    /// the per-read timeout, is returned rather than propagated further.
    pub fn read(&mut self, segment: Segment) -> std::result::Result<Angles, SensorError> {
        let start = self.clock.now();
        let accel = self.with_port(segment, |sensor, bus| sensor.read_accel(bus));
        let elapsed = self.clock.now().saturating_sub(start);

        if elapsed > self.read_timeout {
            self.sensors[segment.index()].invalidate();
            return Err(SensorError::Timeout);
        }

        accel.map(|a| Angles::from_accel(a.ax as f64, a.ay as f64, a.az as f64))
    }

    /// One full sampling pass in bus read order.
    pub fn read_all_segments(&mut self) -> Snapshot {
        let mut snapshot = Snapshot::new();
        for segment in Segment::READ_ORDER {
            match self.read(segment) {
                Ok(angles) => snapshot.set(segment, Some(angles)),
                Err(e) => {
                    log::warn!("{} unavailable: {}", segment.name(), e);
                    snapshot.set(segment, None);
                }
            }
        }
        snapshot
    }

    /// Run `op` against the segment's sensor with the bus routed to it:
    /// open → op → close for multiplexed sensors (the close happens even when
    /// the open or the op failed).  Direct sensors first retry a close that
    /// failed earlier; 0x68 is refused while a channel may still be open, since
    /// the channel's sensor would answer in its place.
    fn with_port<T>(
        &mut self,
        segment: Segment,
        op: impl FnOnce(&mut Mpu6050, &mut dyn I2cBus) -> std::result::Result<T, SensorError>,
    ) -> std::result::Result<T, SensorError> {
        let mut bus = self.bus.borrow_mut();
        let sensor = &mut self.sensors[segment.index()];

        match segment.port() {
            SensorPort::Direct { addr } => {
                if self.mux_dirty {
                    match self.mux.close_all(&mut *bus) {
                        Ok(()) => self.mux_dirty = false,
                        Err(e) if addr == I2C_ADDR_MPU6050 => {
                            return Err(SensorError::Bus {
                                addr: I2C_ADDR_TCA9548A,
                                reason: format!("channel left open: {}", e),
                            });
                        }
                        Err(_) => {}
                    }
                }
                op(sensor, &mut *bus)
            }
            SensorPort::Multiplexed { channel } => {
                let result = self
                    .mux
                    .select_channel(&mut *bus, channel)
                    .and_then(|_| op(sensor, &mut *bus));
                match self.mux.close_all(&mut *bus) {
                    Ok(()) => self.mux_dirty = false,
                    Err(e) => {
                        log::warn!("Failed to close multiplexer after channel {}: {}", channel, e);
                        self.mux_dirty = true;
                    }
                }
                result
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{ManualClock, MockBody};
    use std::cell::RefCell;

    fn bus_with(body: MockBody) -> (Rc<RefCell<MockBody>>, SensorBus) {
        let body = Rc::new(RefCell::new(body));
        let clock = Rc::new(ManualClock::new());
        let sensors = SensorBus::new(body.clone(), clock, Duration::from_millis(50));
        (body, sensors)
    }

    #[test]
    fn reads_all_ten_segments() {
        let (_, mut sensors) = bus_with(MockBody::upright());
        let snap = sensors.read_all_segments();

        assert!(snap.is_complete());
        for (_, reading) in snap.iter() {
            let a = reading.unwrap();
            assert!(a.pitch.abs() < 0.01 && a.roll.abs() < 0.01);
        }
    }

    #[test]
    fn one_failure_leaves_the_other_nine() {
        let mut body = MockBody::upright();
        body.fail(Segment::RightThigh);
        let (_, mut sensors) = bus_with(body);

        let snap = sensors.read_all_segments();
        assert_eq!(snap.missing(), vec![Segment::RightThigh]);
        assert_eq!(snap.iter().filter(|(_, r)| r.is_some()).count(), 9);
    }

    #[test]
    fn channel_closed_after_failed_read() {
        let mut body = MockBody::upright();
        body.fail(Segment::UpperBack); // channel 5
        let (body, mut sensors) = bus_with(body);

        assert!(sensors.read(Segment::UpperBack).is_err());
        assert_eq!(body.borrow().mux_mask(), 0);
        assert_eq!(body.borrow().mux_writes(), vec![1 << 5, 0]);
    }

    #[test]
    fn every_multiplexed_read_is_bracketed() {
        let (body, mut sensors) = bus_with(MockBody::upright());
        sensors.read_all_segments();

        let writes = body.borrow().mux_writes();
        let expected: Vec<u8> = (0..8).flat_map(|ch| [1u8 << ch, 0]).collect();
        assert_eq!(writes, expected);
    }

    #[test]
    fn failed_select_leaves_channels_closed() {
        let mut body = MockBody::upright();
        body.fail_mux_select(true);
        let (body, mut sensors) = bus_with(body);

        assert!(sensors.read(Segment::UpperBack).is_err());
        assert_eq!(body.borrow().mux_mask(), 0);
        // The close is still sent after the rejected open.
        assert_eq!(body.borrow().mux_writes(), vec![0]);
    }

    #[test]
    fn shared_address_refused_while_channel_stuck_open() {
        let mut body = MockBody::upright();
        body.tilt(Segment::LeftShoulder, 40.0, 0.0);
        body.fail_mux_close(true);
        let (body, mut sensors) = bus_with(body);

        // Channel 7 opens, then the close is rejected.
        sensors.read(Segment::LeftShoulder).unwrap();
        assert_eq!(body.borrow().mux_mask(), 1 << 7);

        // 0x68 would reach left_shoulder instead of lower_mid_back.
        assert!(sensors.read(Segment::LowerMidBack).is_err());
        // 0x69 has no twin behind the multiplexer.
        assert!(sensors.read(Segment::LowerBack).is_ok());

        body.borrow_mut().fail_mux_close(false);
        let a = sensors.read(Segment::LowerMidBack).unwrap();
        assert!(a.pitch.abs() < 0.01, "pitch {}", a.pitch);
        assert_eq!(body.borrow().mux_mask(), 0);
    }

    #[test]
    fn stuck_channel_costs_only_the_shared_address_slot() {
        let mut body = MockBody::upright();
        body.fail_mux_close(true);
        let (_, mut sensors) = bus_with(body);

        let snap = sensors.read_all_segments();
        assert_eq!(snap.missing(), vec![Segment::LowerMidBack]);
    }

    #[test]
    fn direct_read_never_touches_multiplexer() {
        let (body, mut sensors) = bus_with(MockBody::upright());
        sensors.read(Segment::LowerBack).unwrap();
        sensors.read(Segment::LowerMidBack).unwrap();
        assert!(body.borrow().mux_writes().is_empty());
    }

    #[test]
    fn slow_read_becomes_timeout() {
        let clock = Rc::new(ManualClock::new());
        let mut body = MockBody::upright().with_clock((*clock).clone());
        body.stall(Segment::LeftCalf, Duration::from_millis(200));
        let body = Rc::new(RefCell::new(body));
        let mut sensors = SensorBus::new(body.clone(), clock, Duration::from_millis(50));

        assert_eq!(sensors.read(Segment::LeftCalf), Err(SensorError::Timeout));
        let snap = sensors.read_all_segments();
        assert_eq!(snap.missing(), vec![Segment::LeftCalf]);
    }

    #[test]
    fn tilted_segment_reports_its_angles() {
        let mut body = MockBody::upright();
        body.tilt(Segment::UpperBack, 30.0, -10.0);
        let (_, mut sensors) = bus_with(body);

        let a = sensors.read(Segment::UpperBack).unwrap();
        // Raw counts are quantised at 1/4096 g, so allow a small error.
        assert!((a.pitch - 30.0).abs() < 0.05, "pitch {}", a.pitch);
        assert!((a.roll + 10.0).abs() < 0.05, "roll {}", a.roll);
    }

    #[test]
    fn probe_fails_without_multiplexer() {
        let mut body = MockBody::upright();
        body.remove_mux();
        let (_, mut sensors) = bus_with(body);
        assert!(matches!(sensors.probe(), Err(Error::HardwareInit(_))));
    }

    #[test]
    fn probe_reports_absent_sensors() {
        let mut body = MockBody::upright();
        body.fail(Segment::LowerBack);
        let (_, mut sensors) = bus_with(body);
        assert_eq!(sensors.probe().unwrap(), vec![Segment::LowerBack]);
    }
}
