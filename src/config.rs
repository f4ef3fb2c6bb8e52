// Posture Coach — Hardware & System Configuration
// Target: Seeed Studio Xiao ESP32-C3 (RISC-V), ten MPU6050 on one I2C bus

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// GPIO Pin Definitions (Xiao ESP32-C3 pinout)
// ---------------------------------------------------------------------------
pub const PIN_NAV_BUTTON: i32 = 3;  // D1 — Navigate button (INPUT_PULLUP, active LOW)
pub const PIN_SEL_BUTTON: i32 = 5;  // D3 — Select button (INPUT_PULLUP, active LOW)
pub const PIN_BUZZER: i32 = 4;      // D2 — Active buzzer
pub const PIN_I2C_SDA: i32 = 6;     // D4 — I2C data line
pub const PIN_I2C_SCL: i32 = 7;     // D5 — I2C clock line

// ---------------------------------------------------------------------------
// I2C Bus
// ---------------------------------------------------------------------------
pub const I2C_BAUDRATE_KHZ: u32 = 400;
pub const I2C_ADDR_TCA9548A: u8 = 0x70;
pub const I2C_ADDR_MPU6050: u8 = 0x68;     // Every multiplexed sensor, and lower_mid_back
pub const I2C_ADDR_MPU6050_ALT: u8 = 0x69; // AD0 pulled high — lower_back
pub const I2C_ADDR_LCD: u8 = 0x27;
pub const MUX_CHANNEL_COUNT: u8 = 8;

// ---------------------------------------------------------------------------
// Display (16x2 HD44780 behind a PCF8574 backpack)
// ---------------------------------------------------------------------------
pub const LCD_COLS: usize = 16;
pub const LCD_ROWS: usize = 2;

// ---------------------------------------------------------------------------
// Model artifact
// ---------------------------------------------------------------------------
pub const MODEL_FILE: &str = "model_package.json";
pub const SPIFFS_BASE_PATH: &str = "/spiffs";
pub const HOST_MODEL_PATH: &str = "assets/model_package.json"; // Simulator default

/// Labels the training data is captured with.
pub const LABELS: [&str; 4] = ["sitting_good", "sitting_bad", "standing_good", "standing_bad"];

// ---------------------------------------------------------------------------
// Timing (milliseconds)
// ---------------------------------------------------------------------------
pub const SAMPLE_INTERVAL_MS: u64 = 1000;   // Continuous mode sampling period
pub const ALERT_COOLDOWN_MS: u64 = 60_000;  // Minimum gap between bad-posture alerts
pub const SENSOR_READ_TIMEOUT_MS: u64 = 50; // Per-sensor bound, expiry = unavailable
pub const INPUT_POLL_INTERVAL_MS: u64 = 50; // 20 Hz button poll
pub const NAV_SETTLE_MS: u64 = 300;
pub const SEL_SETTLE_MS: u64 = 200;
pub const RESULT_HOLD_MS: u64 = 2000;       // One-shot result stays on screen
pub const SPLASH_DISPLAY_MS: u64 = 1500;
pub const BEEP_ON_MS: u64 = 100;
pub const BEEP_PAUSE_MS: u64 = 200;
pub const CAPTURE_INTERVAL_MS: u64 = 100;   // 10 samples per second
pub const CAPTURE_SESSION_MS: u64 = 30_000;

// ---------------------------------------------------------------------------
// MPU6050 Sensor Scale Factors
// ---------------------------------------------------------------------------
pub const ACCEL_SCALE_8G: f32 = 4096.0; // LSB/g at ±8 g

// ---------------------------------------------------------------------------
// Runtime tunables
// ---------------------------------------------------------------------------

/// Tunables for the feedback loop. Defaults mirror the constants above; the
/// host simulator can override them from a TOML file.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CoachConfig {
    pub sample_interval_secs: f64,
    pub cooldown_secs: f64,
    pub read_timeout_ms: u64,
    pub input_poll_ms: u64,
    pub nav_settle_ms: u64,
    pub sel_settle_ms: u64,
    pub result_hold_secs: f64,
    pub beep_on_ms: u64,
    pub beep_pause_ms: u64,
    pub capture_interval_ms: u64,
    pub capture_session_secs: f64,
    pub model_path: String,
}

impl Default for CoachConfig {
    fn default() -> Self {
        Self {
            sample_interval_secs: SAMPLE_INTERVAL_MS as f64 / 1000.0,
            cooldown_secs: ALERT_COOLDOWN_MS as f64 / 1000.0,
            read_timeout_ms: SENSOR_READ_TIMEOUT_MS,
            input_poll_ms: INPUT_POLL_INTERVAL_MS,
            nav_settle_ms: NAV_SETTLE_MS,
            sel_settle_ms: SEL_SETTLE_MS,
            result_hold_secs: RESULT_HOLD_MS as f64 / 1000.0,
            beep_on_ms: BEEP_ON_MS,
            beep_pause_ms: BEEP_PAUSE_MS,
            capture_interval_ms: CAPTURE_INTERVAL_MS,
            capture_session_secs: CAPTURE_SESSION_MS as f64 / 1000.0,
            model_path: HOST_MODEL_PATH.to_string(),
        }
    }
}

impl CoachConfig {
    /// Load and validate a TOML file. Missing keys fall back to defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: CoachConfig =
            toml::from_str(&contents).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let interval = seconds_setting("sample_interval_secs", self.sample_interval_secs)?;
        if interval.is_zero() {
            return Err(Error::Config("sample_interval_secs must be positive".into()));
        }
        seconds_setting("cooldown_secs", self.cooldown_secs)?;
        seconds_setting("result_hold_secs", self.result_hold_secs)?;
        seconds_setting("capture_session_secs", self.capture_session_secs)?;

        for (name, ms) in [
            ("read_timeout_ms", self.read_timeout_ms),
            ("input_poll_ms", self.input_poll_ms),
            ("capture_interval_ms", self.capture_interval_ms),
        ] {
            if ms == 0 {
                return Err(Error::Config(format!("{} must be non-zero", name)));
            }
        }
        for (name, ms) in [
            ("read_timeout_ms", self.read_timeout_ms),
            ("input_poll_ms", self.input_poll_ms),
            ("nav_settle_ms", self.nav_settle_ms),
            ("sel_settle_ms", self.sel_settle_ms),
            ("beep_on_ms", self.beep_on_ms),
            ("beep_pause_ms", self.beep_pause_ms),
            ("capture_interval_ms", self.capture_interval_ms),
        ] {
            if ms as f64 / 1000.0 > MAX_SETTING_SECS {
                return Err(Error::Config(format!("{} is longer than a day", name)));
            }
        }
        Ok(())
    }

    pub fn sample_interval(&self) -> Duration {
        clamped_secs(self.sample_interval_secs)
    }

    pub fn cooldown(&self) -> Duration {
        clamped_secs(self.cooldown_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn input_poll(&self) -> Duration {
        Duration::from_millis(self.input_poll_ms)
    }

    pub fn result_hold(&self) -> Duration {
        clamped_secs(self.result_hold_secs)
    }

    pub fn capture_interval(&self) -> Duration {
        Duration::from_millis(self.capture_interval_ms)
    }

    pub fn capture_session(&self) -> Duration {
        clamped_secs(self.capture_session_secs)
    }
}

/// Upper bound for any timing setting.
pub const MAX_SETTING_SECS: f64 = 86_400.0;

/// Checked seconds → `Duration`: rejects NaN, negative, infinite and
/// anything longer than [`MAX_SETTING_SECS`].
pub fn seconds_setting(name: &str, secs: f64) -> Result<Duration> {
    if !(secs <= MAX_SETTING_SECS) {
        return Err(Error::Config(format!(
            "{} must be at most {} s (got {})",
            name, MAX_SETTING_SECS, secs
        )));
    }
    Duration::try_from_secs_f64(secs)
        .map_err(|_| Error::Config(format!("{} must not be negative (got {})", name, secs)))
}

/// Never panics; unvalidated values are clamped into the valid range.
fn clamped_secs(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs.clamp(0.0, MAX_SETTING_SECS)).unwrap_or(Duration::ZERO)
}
