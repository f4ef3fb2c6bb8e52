// Posture Coach — MPU6050 IMU Driver
//
// Register-level driver.  Holds no bus handle of its own: the sensor bus owns
// the shared I2C handle and lends it per transaction, so a multiplexed sensor
// is only ever touched while its channel is open.

use crate::config::*;
use crate::error::SensorError;
use crate::hal::I2cBus;

// MPU6050 register addresses
pub const REG_PWR_MGMT_1: u8 = 0x6B;
pub const REG_CONFIG: u8 = 0x1A;
pub const REG_ACCEL_CONFIG: u8 = 0x1C;
pub const REG_ACCEL_XOUT_H: u8 = 0x3B; // Start of 6-byte accel burst
pub const REG_WHO_AM_I: u8 = 0x75;
pub const WHO_AM_I_EXPECTED: u8 = 0x68;

/// Acceleration in g.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Accel {
    pub ax: f32,
    pub ay: f32,
    pub az: f32,
}

pub struct Mpu6050 {
    addr: u8,
    configured: bool,
}

impl Mpu6050 {
    pub fn new(addr: u8) -> Self {
        Self { addr, configured: false }
    }

    fn who_am_i(&self, bus: &mut dyn I2cBus) -> Result<(), SensorError> {
        let mut buf = [0u8; 1];
        bus.write_read(self.addr, &[REG_WHO_AM_I], &mut buf)?;
        if buf[0] != WHO_AM_I_EXPECTED {
            return Err(SensorError::DeviceNotFound(buf[0]));
        }
        Ok(())
    }

    /// Wake the sensor and configure accel (±8 g), DLPF 21 Hz.
    pub fn init(&mut self, bus: &mut dyn I2cBus) -> Result<(), SensorError> {
        self.who_am_i(bus)?;

        // Wake up (clear SLEEP bit)
        bus.write(self.addr, &[REG_PWR_MGMT_1, 0x00])?;

        // DLPF bandwidth 21 Hz
        bus.write(self.addr, &[REG_CONFIG, 0x04])?;

        // Accelerometer: ±8 g
        bus.write(self.addr, &[REG_ACCEL_CONFIG, 0x10])?;

        self.configured = true;
        log::debug!("MPU6050 @ {:#04x} initialised (±8g, DLPF 21Hz)", self.addr);
        Ok(())
    }

    /// Burst-read the three accelerometer axes.  Configures the sensor first
    /// if it has never been configured or the previous read failed, so a
    /// sensor that was unplugged and reseated recovers on its own.
    pub fn read_accel(&mut self, bus: &mut dyn I2cBus) -> Result<Accel, SensorError> {
        if !self.configured {
            self.init(bus)?;
        }

        let mut raw = [0u8; 6];
        if let Err(e) = bus.write_read(self.addr, &[REG_ACCEL_XOUT_H], &mut raw) {
            self.configured = false;
            return Err(e);
        }

        Ok(Accel {
            ax: i16::from_be_bytes([raw[0], raw[1]]) as f32 / ACCEL_SCALE_8G,
            ay: i16::from_be_bytes([raw[2], raw[3]]) as f32 / ACCEL_SCALE_8G,
            az: i16::from_be_bytes([raw[4], raw[5]]) as f32 / ACCEL_SCALE_8G,
        })
    }

    /// Forget the configuration so the next read re-initialises.
    pub fn invalidate(&mut self) {
        self.configured = false;
    }
}
