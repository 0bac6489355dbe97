//! Error handling for the CL-3000 monitor
//!
//! This module defines custom error types and a Result alias for use
//! throughout the application.

use thiserror::Error;

/// Errors raised by the device communication layer.
///
/// Connection and read errors are recoverable; the poller retries them and
/// only escalates after repeated consecutive failures. Decode errors count
/// against the same read-failure budget.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// The device could not be opened or the handshake failed
    #[error("Connection error: device open returned status 0x{status:08X}")]
    Connection { status: i32 },

    /// A single measurement frame read failed
    #[error("Read error: measurement read returned status 0x{status:08X}")]
    Read { status: i32 },

    /// The frame was read but its contents could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// The vendor communication library could not be loaded or is missing
    /// a required entry point
    #[error("SDK error: {0}")]
    Sdk(String),
}

impl DeviceError {
    /// Whether this error counts as a frame-read failure for the
    /// consecutive-failure budget (as opposed to a connection failure).
    pub fn is_read_failure(&self) -> bool {
        matches!(self, DeviceError::Read { .. } | DeviceError::Decode(_))
    }
}

/// Main error type for the monitor application
#[derive(Error, Debug)]
pub enum MonitorError {
    /// Errors from the device communication layer
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors related to channel communication between threads
    #[error("Channel error: {0}")]
    Channel(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for monitor operations
pub type Result<T> = std::result::Result<T, MonitorError>;

/// Result type alias for device-layer operations
pub type DeviceResult<T> = std::result::Result<T, DeviceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DeviceError::Connection { status: 0xFF };
        assert_eq!(
            err.to_string(),
            "Connection error: device open returned status 0x000000FF"
        );
    }

    #[test]
    fn test_read_failure_classification() {
        assert!(DeviceError::Read { status: 1 }.is_read_failure());
        assert!(DeviceError::Decode("truncated frame".to_string()).is_read_failure());
        assert!(!DeviceError::Connection { status: 1 }.is_read_failure());
        assert!(!DeviceError::Sdk("missing library".to_string()).is_read_failure());
    }

    #[test]
    fn test_device_error_converts() {
        let err: MonitorError = DeviceError::Sdk("no CL3IF library".to_string()).into();
        assert!(err.to_string().contains("no CL3IF library"));
    }
}
