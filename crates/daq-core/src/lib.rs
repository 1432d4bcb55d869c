//! `daq-core`
//!
//! Core trait definitions and types for multi-dimensional image acquisition.
//!
//! This crate provides the fundamental building blocks shared by the frame buffer,
//! the device registry, the acquisition engine and the mock drivers. It defines the
//! pixel containers, the metadata model, capability traits for devices, the
//! hardware boundary used by the engine, and the common error type.
//!
//! ## Layers
//!
//! - **Capabilities**: small per-role device traits (`Movable`, `XYStageDevice`, `Camera`, ...)
//! - **HardwareBoundary**: the single interface the acquisition engine calls
//! - **Storage types**: [`ImgBuffer`] / [`ImageFrame`] preallocated and reused in place
//!
//! ## Key Types
//!
//! - [`ImgBuffer`]: one channel of pixel bytes plus metadata
//! - [`ImageFrame`]: channels acquired at one instant
//! - [`Metadata`]: qualified-name → tag map with a text interchange format
//! - [`DaqError`]: error type for everything that is not a device call

pub mod capabilities;
pub mod error;
pub mod hardware;
pub mod image;
pub mod limits;
pub mod metadata;

pub use capabilities::SnappedImage;
pub use error::{AppResult, DaqError, DriverError, DriverErrorKind};
pub use hardware::{HardwareBoundary, InsertOutcome};
pub use image::{ImageFrame, ImageShape, ImgBuffer, PixelType};
pub use metadata::{Metadata, MetadataTag, TagValue};

// Re-export commonly used types
pub use anyhow::{anyhow, Result};
