//! # rust_mda
//!
//! Multi-dimensional image acquisition on top of the `daq-*` crates.
//!
//! The member crates provide the pieces:
//!
//! - **`daq-core`**: pixel containers, metadata, capability traits and the
//!   `HardwareBoundary` the acquisition engine talks to
//! - **`daq-storage`**: the bounded `CircularFrameBuffer`
//! - **`daq-hardware`**: `DeviceRegistry`, which implements the boundary over
//!   registered devices, and the configuration preset table
//! - **`daq-experiment`**: acquisition settings, the step sequencer and the runner
//! - **`daq-driver-mock`**: simulated devices
//!
//! This crate wires them into an application:
//!
//! - **`config`**: figment-based configuration (TOML file + `RUST_MDA_` environment)
//! - **`logging`**: tracing subscriber setup
//! - **`consumer`**: `FrameDrain`, a thread emptying the frame buffer
//! - **`rig`**: a simulated microscope built from the configuration
//! - **`app`**: plan and run an acquisition end to end

pub mod app;
pub mod config;
pub mod consumer;
pub mod logging;
pub mod rig;

pub use app::{plan, run_acquisition, SessionSummary};
pub use config::AppConfig;
pub use consumer::{DrainConfig, DrainSummary, FrameDrain};
pub use rig::MockRig;

pub use daq_core;
pub use daq_experiment;
pub use daq_hardware;
pub use daq_storage;
