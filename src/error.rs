// Posture Coach — Error Types

use crate::segment::Segment;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Why a single sensor produced no reading. Never escapes the sensor bus
/// except as a missing slot in the snapshot.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SensorError {
    /// Bus transaction failed (NACK, arbitration loss, driver error)
    #[error("I2C error at {addr:#04x}: {reason}")]
    Bus { addr: u8, reason: String },

    /// Read did not complete within the per-read bound
    #[error("read timed out")]
    Timeout,

    /// Something answered, but it is not an MPU6050
    #[error("unexpected WHO_AM_I {0:#04x}")]
    DeviceNotFound(u8),
}

/// Posture Coach error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A sensor failure surfaced outside the sampling pass (probe, capture)
    #[error("Sensor error: {0}")]
    Sensor(#[from] SensorError),

    /// Classification needs all ten segments
    #[error("Incomplete sensor data: {} segment(s) missing ({})", .missing.len(), names(.missing))]
    IncompleteFeatureVector { missing: Vec<Segment> },

    /// Model artifact missing, unreadable or structurally invalid
    #[error("Model load failed: {0}")]
    ModelLoad(String),

    /// Artifact was trained on a different column layout
    #[error("Model feature columns do not match: {0}")]
    ModelMismatch(String),

    /// Classifier rejected the input
    #[error("Classification failed: {0}")]
    Classify(String),

    /// Bus, multiplexer, display or GPIO could not be brought up
    #[error("Hardware initialization failed: {0}")]
    HardwareInit(String),

    /// Invalid configuration value or file
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn names(segments: &[Segment]) -> String {
    segments
        .iter()
        .map(|s| s.name())
        .collect::<Vec<_>>()
        .join(", ")
}
