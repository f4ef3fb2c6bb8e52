pub mod buzzer;
pub mod imu;
pub mod lcd;
pub mod mux;

#[cfg(target_os = "espidf")]
pub mod esp;
