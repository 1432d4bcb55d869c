//! The hardware boundary seen by the acquisition engine.
//!
//! [`HardwareBoundary`] is the only interface the sequencer and runner call. It
//! bundles stage, focus, camera and configuration operations (async, may block on
//! device busy) with the image buffer operations (sync, never block).
//!
//! Implementations must not hold buffer locks across any of the async calls.

use crate::capabilities::SnappedImage;
use crate::error::DaqError;
use crate::image::ImageShape;
use crate::metadata::Metadata;
use anyhow::Result;
use async_trait::async_trait;

/// Result of a non-failing insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Frame stored.
    Inserted,
    /// Buffer full; nothing was written and the overflow flag is set.
    Overflow,
}

impl InsertOutcome {
    /// True for [`InsertOutcome::Inserted`].
    pub fn is_inserted(&self) -> bool {
        matches!(self, InsertOutcome::Inserted)
    }
}

/// Operations the acquisition engine performs against hardware and the frame buffer.
#[async_trait]
pub trait HardwareBoundary: Send + Sync {
    // ---- single-axis stages ------------------------------------------------

    /// Move the single-axis stage `stage` to `position`.
    async fn set_stage_position(&self, stage: &str, position: f64) -> Result<()>;

    /// Position of the single-axis stage `stage`.
    async fn stage_position(&self, stage: &str) -> Result<f64>;

    // ---- focus -------------------------------------------------------------

    /// Position of the current focus device.
    async fn focus_position(&self) -> Result<f64>;

    /// Move the current focus device.
    async fn set_focus_position(&self, position: f64) -> Result<()>;

    /// Start a continuous focus move.
    async fn move_focus(&self, velocity: f64) -> Result<()>;

    // ---- XY stages ---------------------------------------------------------

    /// Position of the XY stage `stage`.
    async fn xy_position(&self, stage: &str) -> Result<(f64, f64)>;

    /// Move the XY stage `stage`.
    async fn set_xy_position(&self, stage: &str, x: f64, y: f64) -> Result<()>;

    /// Start a continuous XY move.
    async fn move_xy_stage(&self, stage: &str, vx: f64, vy: f64) -> Result<()>;

    // ---- camera ------------------------------------------------------------

    /// Set the current camera's exposure in milliseconds.
    async fn set_exposure(&self, ms: f64) -> Result<()>;

    /// Current camera's exposure in milliseconds.
    async fn exposure(&self) -> Result<f64>;

    /// Snap one image with the current camera.
    async fn snap_image(&self) -> Result<SnappedImage>;

    /// Run full autofocus.
    async fn full_focus(&self) -> Result<()>;

    // ---- configuration -----------------------------------------------------

    /// Apply configuration preset `name` of `group`.
    async fn set_config(&self, group: &str, name: &str) -> Result<()>;

    /// Preset of `group` applied last.
    async fn current_config(&self, group: &str) -> Result<String>;

    // ---- serial passthrough ------------------------------------------------

    /// Write raw bytes to serial port `port`.
    async fn write_to_serial(&self, port: &str, _data: &[u8]) -> Result<()> {
        anyhow::bail!("Serial port '{}' not available", port)
    }

    /// Read up to `max` pending bytes from `port`.
    async fn read_from_serial(&self, port: &str, _max: usize) -> Result<Vec<u8>> {
        anyhow::bail!("Serial port '{}' not available", port)
    }

    /// Discard pending input on `port`.
    async fn purge_serial(&self, port: &str) -> Result<()> {
        anyhow::bail!("Serial port '{}' not available", port)
    }

    /// Send `command` followed by `terminator` on `port`.
    async fn set_serial_command(&self, port: &str, _command: &str, _terminator: &str) -> Result<()> {
        anyhow::bail!("Serial port '{}' not available", port)
    }

    /// Read one `terminator`-terminated answer from `port`.
    async fn get_serial_answer(&self, port: &str, _terminator: &str) -> Result<String> {
        anyhow::bail!("Serial port '{}' not available", port)
    }

    // ---- image buffer ------------------------------------------------------

    /// Insert a single-channel image. Never blocks.
    fn insert_image(
        &self,
        source: &str,
        pixels: &[u8],
        shape: ImageShape,
        components: u32,
        metadata: Option<&Metadata>,
    ) -> Result<InsertOutcome, DaqError>;

    /// Insert `channels` images stored back to back in `pixels`. Never blocks.
    fn insert_multi_channel(
        &self,
        source: &str,
        pixels: &[u8],
        channels: u32,
        shape: ImageShape,
        components: u32,
        metadata: Option<&Metadata>,
    ) -> Result<InsertOutcome, DaqError>;

    /// (Re)size the image buffer for `channels` images of `shape`.
    fn initialize_image_buffer(&self, channels: u32, shape: ImageShape) -> Result<(), DaqError>;

    /// Drop every buffered frame and clear the overflow flag.
    fn clear_image_buffer(&self);
}
