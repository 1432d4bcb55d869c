//! Mock Hardware Drivers for rust-mda
//!
//! Simulated devices for running acquisitions without physical hardware. All
//! delays use `tokio::time::sleep`, so tests can run them under a paused clock.
//!
//! # Available Mock Drivers
//!
//! - [`MockStage`] - single-axis stage or focus drive with limits and move history
//! - [`MockXYStage`] - dual-axis stage
//! - [`MockCamera`] - test-pattern camera, single or multi-channel
//! - [`MockAutofocus`] - autofocus that drives an attached focus stage
//! - [`MockStateDevice`] - filter wheel / shutter style property device
//! - [`MockSerialPort`] - serial port answering from a command table
//!
//! # Modes
//!
//! Every driver runs in [`MockMode::Instant`] by default. [`MockMode::Realistic`]
//! adds exposure, readout, motion and settling delays from [`TimingConfig`].
//!
//! # Error Injection
//!
//! Each driver accepts an [`ErrorConfig`] and checks it before every operation:
//!
//! ```rust,ignore
//! use daq_driver_mock::{ErrorConfig, ErrorScenario, MockStage};
//!
//! let z = MockStage::builder()
//!     .error_config(ErrorConfig::scenario(ErrorScenario::FailOnCall {
//!         operation: "move",
//!         call: 3,
//!     }))
//!     .build();
//! ```

pub mod common;
mod mock_autofocus;
mod mock_camera;
mod mock_serial;
mod mock_stage;
mod mock_state_device;
mod mock_xy_stage;
mod pattern;

// Re-export common types
pub use common::{ErrorConfig, ErrorScenario, MockMode, MockRng, TimingConfig};

// Re-export driver types
pub use mock_autofocus::MockAutofocus;
pub use mock_camera::{MockCamera, MockCameraBuilder, MockCameraConfig};
pub use mock_serial::MockSerialPort;
pub use mock_stage::{LimitBehavior, MockStage, MockStageBuilder, MockStageConfig, StageLimits};
pub use mock_state_device::MockStateDevice;
pub use mock_xy_stage::MockXYStage;
pub use pattern::generate_test_pattern;
