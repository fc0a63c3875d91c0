//! Hardware abstraction for camera capture and buzzer control.
//!
//! Provides V4L2-based color camera access and GPIO character-device
//! line control for the alarm buzzer.

pub mod buzzer;
pub mod camera;
pub mod frame;

pub use buzzer::{Buzzer, BuzzerError};
pub use camera::{Camera, CameraError, DeviceInfo};
pub use frame::RgbFrame;
