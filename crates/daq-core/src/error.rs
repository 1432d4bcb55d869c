//! Custom error types for the acquisition core.
//!
//! This module defines the primary error type, `DaqError`, shared by the frame buffer,
//! the device registry and the acquisition engine. Using the `thiserror` crate, it
//! provides a centralized and consistent way to report the error conditions the
//! acquisition pipeline distinguishes.
//!
//! ## Error Hierarchy
//!
//! - **`IncompatibleImage`**: an insert whose shape differs from the configured buffer
//!   shape. Programmer or configuration error; the insert is rejected atomically.
//! - **`BufferNotInitialized`**: use-before-init of the circular buffer.
//! - **`BufferAllocation`**: the buffer could not be (re)allocated.
//! - **`Driver`**: structured hardware error with a category, see [`DriverError`].
//!
//! Backpressure (a full buffer) is deliberately *not* an error: inserts report it
//! through their outcome value and the sticky overflow flag.

use thiserror::Error;

// =============================================================================
// Driver Errors
// =============================================================================

/// Category of a hardware driver failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverErrorKind {
    /// Device failed to initialize.
    Initialization,
    /// Device rejected a configuration value.
    Configuration,
    /// Transport-level failure (serial, USB, network).
    Communication,
    /// Device reported a fault.
    Hardware,
    /// Device did not answer in time.
    Timeout,
    /// Argument out of the device's range.
    InvalidParameter,
    /// Anything else.
    Unknown,
}

impl std::fmt::Display for DriverErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            DriverErrorKind::Initialization => "initialization",
            DriverErrorKind::Configuration => "configuration",
            DriverErrorKind::Communication => "communication",
            DriverErrorKind::Hardware => "hardware",
            DriverErrorKind::Timeout => "timeout",
            DriverErrorKind::InvalidParameter => "invalid_parameter",
            DriverErrorKind::Unknown => "unknown",
        };
        write!(f, "{}", label)
    }
}

/// Structured error raised by a device driver.
#[derive(Error, Debug, Clone)]
#[error("Driver '{driver_type}' {kind} error: {message}")]
pub struct DriverError {
    /// Driver identifier, e.g. `mock_stage`.
    pub driver_type: String,
    /// Failure category.
    pub kind: DriverErrorKind,
    /// Human readable detail.
    pub message: String,
}

impl DriverError {
    /// Create a new driver error.
    pub fn new(
        driver_type: impl Into<String>,
        kind: DriverErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            driver_type: driver_type.into(),
            kind,
            message: message.into(),
        }
    }
}

/// Convenience alias for results using the core error type.
pub type AppResult<T> = std::result::Result<T, DaqError>;

/// Primary error type for the acquisition core.
#[derive(Error, Debug)]
pub enum DaqError {
    /// Inserted image does not match the configured buffer shape.
    ///
    /// **Error Type**: Permanent for this insert. The buffer contents are untouched.
    ///
    /// **Recovery Strategy**: Reinitialize the buffer with the camera's current shape
    /// (the registry does this when an acquisition starts).
    #[error(
        "Incompatible image: got {width}x{height}x{depth} ({channels} ch), \
         buffer expects {expected_width}x{expected_height}x{expected_depth} ({expected_channels} ch)"
    )]
    IncompatibleImage {
        /// Width of the rejected image.
        width: u32,
        /// Height of the rejected image.
        height: u32,
        /// Bytes per pixel of the rejected image.
        depth: u32,
        /// Channel count of the rejected image.
        channels: u32,
        /// Configured width.
        expected_width: u32,
        /// Configured height.
        expected_height: u32,
        /// Configured bytes per pixel.
        expected_depth: u32,
        /// Configured channel count.
        expected_channels: u32,
    },

    /// Pixel payload is shorter than the declared shape requires.
    #[error("Pixel payload of {actual} bytes is shorter than the {expected} bytes required")]
    PixelPayloadTooShort {
        /// Bytes required by the declared shape.
        expected: usize,
        /// Bytes supplied.
        actual: usize,
    },

    /// The circular buffer was used before `initialize()` succeeded.
    ///
    /// **Error Type**: Programmer error. Never silently writes into a zero-capacity buffer.
    #[error("Circular buffer is not initialized")]
    BufferNotInitialized,

    /// The circular buffer could not be allocated.
    ///
    /// The buffer holds zero frames afterwards and must be reinitialized.
    #[error("Circular buffer allocation failed: {0}")]
    BufferAllocation(String),

    /// Requested frame dimensions exceed supported limits.
    #[error("Frame dimensions {width}x{height} exceed maximum {max_dimension} per dimension")]
    FrameDimensionsTooLarge {
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
        /// Supported maximum.
        max_dimension: u32,
    },

    /// Calculating a size overflowed usize.
    #[error("Size overflow while computing {context}")]
    SizeOverflow {
        /// What was being computed.
        context: &'static str,
    },

    /// Configuration validation failed.
    ///
    /// Occurs when configuration values parse correctly but fail semantic validation
    /// (negative exposure, non-finite stage coordinate, zero memory budget).
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// Metadata interchange text could not be parsed.
    #[error("Malformed metadata: {0}")]
    MetadataFormat(String),

    /// No device is registered under the given label for the requested role.
    #[error("No {role} device registered as '{label}'")]
    DeviceNotFound {
        /// Capability role that was looked up (e.g. "xy stage").
        role: &'static str,
        /// Device label.
        label: String,
    },

    /// Structured driver error with category
    #[error("{0}")]
    Driver(DriverError),
}

impl From<DriverError> for DaqError {
    fn from(err: DriverError) -> Self {
        DaqError::Driver(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_error_display() {
        let err = DaqError::Driver(DriverError::new(
            "mock_camera",
            DriverErrorKind::Initialization,
            "failed to connect",
        ));
        assert!(err
            .to_string()
            .contains("Driver 'mock_camera' initialization error"));
    }

    #[test]
    fn test_incompatible_image_display() {
        let err = DaqError::IncompatibleImage {
            width: 10,
            height: 10,
            depth: 2,
            channels: 1,
            expected_width: 512,
            expected_height: 512,
            expected_depth: 2,
            expected_channels: 1,
        };
        let text = err.to_string();
        assert!(text.contains("10x10x2"));
        assert!(text.contains("512x512x2"));
    }

    #[test]
    fn test_device_not_found_display() {
        let err = DaqError::DeviceNotFound {
            role: "xy stage",
            label: "XY".into(),
        };
        assert_eq!(err.to_string(), "No xy stage device registered as 'XY'");
    }
}
