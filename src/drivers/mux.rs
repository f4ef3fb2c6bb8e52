// Posture Coach — TCA9548A I2C Multiplexer
//
// Eight downstream buses behind one address.  Writing a control byte with a
// single bit set opens that channel; writing zero closes them all.

use crate::config::{I2C_ADDR_TCA9548A, MUX_CHANNEL_COUNT};
use crate::error::SensorError;
use crate::hal::I2cBus;

pub struct Tca9548a {
    addr: u8,
}

impl Tca9548a {
    pub fn new() -> Self {
        Self { addr: I2C_ADDR_TCA9548A }
    }

    /// Open exactly `channel` (0..7), closing every other one.
    pub fn select_channel(&self, bus: &mut dyn I2cBus, channel: u8) -> Result<(), SensorError> {
        debug_assert!(channel < MUX_CHANNEL_COUNT);
        bus.write(self.addr, &[1u8 << channel])
    }

    pub fn close_all(&self, bus: &mut dyn I2cBus) -> Result<(), SensorError> {
        bus.write(self.addr, &[0])
    }
}

impl Default for Tca9548a {
    fn default() -> Self {
        Self::new()
    }
}
