//! Error types shared across subsystems.

pub mod types;

pub use types::{CaptureError, ConfigError, ControlError, WebError};
