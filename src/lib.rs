//! Posture Coach — wearable posture feedback.
//!
//! Ten MPU6050 sensors on one I2C bus (eight behind a TCA9548A multiplexer,
//! two addressed directly) are sampled into a 20-value pitch/roll vector,
//! classified by a random-forest model and reported through a buzzer and a
//! 16x2 display.  A two-button menu picks between a one-shot check and
//! continuous monitoring with a cooldown on alerts.
//!
//! Hardware is reached only through the traits in [`hal`], so everything
//! except `drivers::esp` runs on a host against `mock`, which is left out of
//! device builds.

pub mod alert;
pub mod capture;
pub mod classifier;
pub mod config;
pub mod controller;
pub mod drivers;
pub mod error;
pub mod events;
pub mod features;
pub mod hal;
pub mod input;
#[cfg(any(test, not(target_os = "espidf")))]
pub mod mock;
pub mod screen;
pub mod segment;
pub mod sensor_bus;

pub use error::{Error, Result};
