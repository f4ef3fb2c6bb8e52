// Posture Coach — ESP-IDF Bindings
//
// Implements the hardware seams on the ESP32-C3 and mounts the flash
// partition the model artifact lives on.

use esp_idf_hal::delay::TickType;
use esp_idf_hal::gpio::{AnyInputPin, AnyOutputPin, Input, Output, PinDriver};
use esp_idf_hal::i2c::I2cDriver;
use esp_idf_sys::EspError;

use crate::config::SPIFFS_BASE_PATH;
use crate::error::{Error, Result, SensorError};
use crate::hal::{I2cBus, InputLine, OutputLine};

/// I2C master with the per-read bound applied to every transaction.
pub struct EspI2c {
    driver: I2cDriver<'static>,
    timeout_ticks: u32,
}

impl EspI2c {
    pub fn new(driver: I2cDriver<'static>, timeout_ms: u64) -> Self {
        Self {
            driver,
            timeout_ticks: TickType::new_millis(timeout_ms).ticks(),
        }
    }
}

fn bus_error(addr: u8, e: EspError) -> SensorError {
    if e.code() == esp_idf_sys::ESP_ERR_TIMEOUT as i32 {
        SensorError::Timeout
    } else {
        SensorError::Bus {
            addr,
            reason: e.to_string(),
        }
    }
}

impl I2cBus for EspI2c {
    fn write(&mut self, addr: u8, bytes: &[u8]) -> std::result::Result<(), SensorError> {
        self.driver
            .write(addr, bytes, self.timeout_ticks)
            .map_err(|e| bus_error(addr, e))
    }

    fn write_read(
        &mut self,
        addr: u8,
        bytes: &[u8],
        buf: &mut [u8],
    ) -> std::result::Result<(), SensorError> {
        self.driver
            .write_read(addr, bytes, buf, self.timeout_ticks)
            .map_err(|e| bus_error(addr, e))
    }
}

/// Button input. The pull-up must be enabled with [`configure_pullup`].
pub struct EspButton(pub PinDriver<'static, AnyInputPin, Input>);

impl InputLine for EspButton {
    fn is_low(&self) -> bool {
        self.0.is_low()
    }
}

pub struct EspBuzzerPin(pub PinDriver<'static, AnyOutputPin, Output>);

impl OutputLine for EspBuzzerPin {
    fn set_high(&mut self) {
        let _ = self.0.set_high();
    }

    fn set_low(&mut self) {
        let _ = self.0.set_low();
    }
}

/// Enable the internal pull-up on an already configured input pin.
pub fn configure_pullup(gpio: i32) {
    unsafe {
        esp_idf_sys::gpio_set_pull_mode(gpio, esp_idf_sys::gpio_pull_mode_t_GPIO_PULLUP_ONLY);
    }
}

/// Mount the SPIFFS partition at [`SPIFFS_BASE_PATH`].
pub fn mount_spiffs() -> Result<()> {
    let base_path = std::ffi::CString::new(SPIFFS_BASE_PATH)
        .map_err(|e| Error::HardwareInit(e.to_string()))?;
    let conf = esp_idf_sys::esp_vfs_spiffs_conf_t {
        base_path: base_path.as_ptr(),
        partition_label: core::ptr::null(),
        max_files: 4,
        format_if_mount_failed: false,
    };

    let ret = unsafe { esp_idf_sys::esp_vfs_spiffs_register(&conf) };
    if ret != esp_idf_sys::ESP_OK {
        return Err(Error::HardwareInit(format!("SPIFFS mount failed ({})", ret)));
    }
    log::info!("SPIFFS mounted at {}", SPIFFS_BASE_PATH);
    Ok(())
}

