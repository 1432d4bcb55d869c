//! Atomic Hardware Capabilities
//!
//! This module defines fine-grained capability traits that device drivers implement.
//! The acquisition core never sees a vendor type: it talks to a focus drive, an XY
//! stage, a camera or a configuration switch only through these small traits.
//!
//! - A z drive implements: `Movable` (and therefore `FocusDevice`)
//! - A camera implements: `Snappable + ExposureControl` (and therefore `Camera`)
//! - A filter wheel or shutter implements: `Settable`
//! - A serial hub implements: `SerialTransport`
//!
//! # Design Philosophy
//!
//! Each capability trait:
//! - Is async (uses #[async_trait])
//! - Is thread-safe (requires Send + Sync)
//! - Uses anyhow::Result for errors
//! - Focuses on ONE thing
//!
//! Calls block until the device reports it is no longer busy. There is no
//! timeout at this layer; a hung device blocks its caller.
//!
//! # Example
//!
//! ```rust,ignore
//! async fn focus_then_snap<F, C>(focus: &F, camera: &C, z: f64) -> Result<SnappedImage>
//! where
//!     F: FocusDevice,
//!     C: Camera,
//! {
//!     focus.move_abs(z).await?;
//!     focus.wait_settled().await?;
//!     camera.set_exposure(20.0).await?;
//!     camera.snap().await
//! }
//! ```

use crate::image::ImageShape;
use anyhow::Result;
use async_trait::async_trait;

// =============================================================================
// Motion
// =============================================================================

/// Capability: Single-Axis Motion Control
///
/// Devices that can move to positions along one axis (focus drives, linear stages).
///
/// # Contract
/// - Positions are in device-native units (typically µm)
/// - `move_abs` returns once the device has accepted and completed the move
/// - `position` returns current position
///
/// # Thread Safety
/// - All methods are async and require `&self` (immutable reference)
/// - Interior mutability (Mutex/RwLock) should be used for state
#[async_trait]
pub trait Movable: Send + Sync {
    /// Move to absolute position
    ///
    /// # Arguments
    /// * `position` - Target position in device-native units
    ///
    /// # Returns
    /// - Ok(()) if motion completed
    /// - Err if position is out of range or hardware error
    async fn move_abs(&self, position: f64) -> Result<()>;

    /// Move relative to current position
    async fn move_rel(&self, distance: f64) -> Result<()> {
        let current = self.position().await?;
        self.move_abs(current + distance).await
    }

    /// Get current position
    async fn position(&self) -> Result<f64>;

    /// Wait for motion to settle
    ///
    /// # Default Implementation
    /// Devices whose `move_abs` already blocks until done need not override this.
    async fn wait_settled(&self) -> Result<()> {
        Ok(())
    }

    /// Start continuous motion at `velocity` (device units per second).
    ///
    /// # Default Implementation
    /// Returns an error indicating velocity moves are not supported.
    async fn move_velocity(&self, velocity: f64) -> Result<()> {
        anyhow::bail!("Velocity move ({velocity}) not supported by this device")
    }

    /// Stop motion immediately
    ///
    /// # Default Implementation
    /// Returns an error indicating stop is not supported.
    async fn stop(&self) -> Result<()> {
        anyhow::bail!("Stop not supported by this device")
    }
}

/// Role trait for the focus (z) drive.
pub trait FocusDevice: Movable {}

/// Blanket implementation - any single-axis stage can serve as focus device
impl<T: Movable> FocusDevice for T {}

/// Capability: Dual-Axis (XY) Motion Control
///
/// # Contract
/// - `set_xy` returns once both axes have reached the target
/// - Coordinates are in device-native units (typically µm)
#[async_trait]
pub trait XYStageDevice: Send + Sync {
    /// Move both axes to an absolute position.
    async fn set_xy(&self, x: f64, y: f64) -> Result<()>;

    /// Current `(x, y)` position.
    async fn xy(&self) -> Result<(f64, f64)>;

    /// Start continuous motion at `(vx, vy)`.
    ///
    /// # Default Implementation
    /// Returns an error indicating velocity moves are not supported.
    async fn move_velocity(&self, vx: f64, vy: f64) -> Result<()> {
        anyhow::bail!("Velocity move ({vx}, {vy}) not supported by this XY stage")
    }

    /// Wait for both axes to settle.
    async fn wait_settled(&self) -> Result<()> {
        Ok(())
    }
}

// =============================================================================
// Imaging
// =============================================================================

/// Capability: Exposure Time Control
///
/// # Contract
/// - Exposure is in milliseconds
/// - Setting exposure does not start acquisition
/// - Exposure applies to next snap
#[async_trait]
pub trait ExposureControl: Send + Sync {
    /// Set exposure time in milliseconds
    ///
    /// # Returns
    /// - Ok(()) if exposure set successfully
    /// - Err if value is out of hardware range
    async fn set_exposure(&self, ms: f64) -> Result<()>;

    /// Get current exposure setting in milliseconds
    async fn get_exposure(&self) -> Result<f64>;
}

/// Pixels returned by a synchronous snap.
///
/// Multi-channel cameras return all channels back to back in `pixels`,
/// each `shape.footprint()` bytes long.
#[derive(Debug, Clone)]
pub struct SnappedImage {
    /// Label of the camera that produced the image.
    pub source: String,
    /// Raw pixel bytes of every channel.
    pub pixels: Vec<u8>,
    /// Per-channel shape.
    pub shape: ImageShape,
    /// Number of components per pixel (1 for grayscale, 4 for RGB).
    pub components: u32,
    /// Number of channels in `pixels`.
    pub channels: u32,
}

/// Capability: Synchronous Image Capture
///
/// # Contract
/// - `snap()` exposes once and returns the image; it blocks for at least the exposure
/// - `image_shape()` and `channels()` describe what the next `snap()` returns
#[async_trait]
pub trait Snappable: Send + Sync {
    /// Acquire one image.
    async fn snap(&self) -> Result<SnappedImage>;

    /// Shape of one channel of the next image.
    fn image_shape(&self) -> ImageShape;

    /// Components per pixel.
    fn components(&self) -> u32 {
        1
    }

    /// Channels per snap.
    fn channels(&self) -> u32 {
        1
    }
}

/// Composite trait for cameras (convenience)
pub trait Camera: Snappable + ExposureControl {}

/// Blanket implementation - any type implementing both traits gets Camera for free
impl<T: Snappable + ExposureControl> Camera for T {}

/// Capability: Autofocus
#[async_trait]
pub trait Autofocus: Send + Sync {
    /// Run a full autofocus search. Blocks until focus is found or the search fails.
    async fn full_focus(&self) -> Result<()>;

    /// Score of the current focus position, higher is sharper.
    async fn focus_score(&self) -> Result<f64> {
        anyhow::bail!("Focus score not supported by this device")
    }
}

// =============================================================================
// Configuration
// =============================================================================

/// Capability: Settable (Configurable Parameters)
///
/// Devices that have parameters which can be set and optionally queried.
///
/// # Contract
/// - `set_value()` sets the parameter to a new value.
/// - `get_value()` queries the current value of the parameter.
/// - Values are represented as `serde_json::Value` to allow flexibility (f64, i64, bool, string, enum).
/// - Methods take `&self` (not `&mut self`) to allow use with `Arc<dyn Settable>`.
///   Implementations should use interior mutability (e.g., `Mutex`) for state changes.
#[async_trait]
pub trait Settable: Send + Sync {
    /// Set a named parameter to a new value.
    async fn set_value(&self, name: &str, value: serde_json::Value) -> Result<()>;

    /// Get the current value of a named parameter.
    async fn get_value(&self, name: &str) -> Result<serde_json::Value> {
        anyhow::bail!("Get value for '{}' not supported by this device", name)
    }
}

/// Capability: Named Configuration Presets
///
/// A group (e.g. `"Channel"`) holds named presets (e.g. `"DAPI"`, `"GFP"`); applying
/// a preset sets every device property it lists.
#[async_trait]
pub trait ConfigSwitchable: Send + Sync {
    /// Apply preset `name` of `group`.
    async fn set_config(&self, group: &str, name: &str) -> Result<()>;

    /// Name of the preset of `group` applied last.
    async fn current_config(&self, group: &str) -> Result<String>;
}

// =============================================================================
// Serial Transport
// =============================================================================

/// Capability: Opaque Serial Byte Stream
///
/// A named virtual port carrying adapter-specific protocols. The core only moves
/// bytes; framing beyond a terminator is the adapter's business.
#[async_trait]
pub trait SerialTransport: Send + Sync {
    /// Write raw bytes.
    async fn write(&self, data: &[u8]) -> Result<()>;

    /// Read up to `max` bytes that are already available. Returns an empty
    /// vector when nothing is pending.
    async fn read(&self, max: usize) -> Result<Vec<u8>>;

    /// Discard pending input.
    async fn purge(&self) -> Result<()>;

    /// Write `command` followed by `terminator`.
    async fn send_command(&self, command: &str, terminator: &str) -> Result<()> {
        let mut frame = Vec::with_capacity(command.len() + terminator.len());
        frame.extend_from_slice(command.as_bytes());
        frame.extend_from_slice(terminator.as_bytes());
        self.write(&frame).await
    }

    /// Read until `terminator` and return the answer without it.
    async fn read_answer(&self, terminator: &str) -> Result<String> {
        let term = terminator.as_bytes();
        let mut answer = Vec::new();
        loop {
            let chunk = self.read(256).await?;
            if chunk.is_empty() {
                anyhow::bail!(
                    "No terminated answer on serial port (got {} bytes)",
                    answer.len()
                );
            }
            answer.extend_from_slice(&chunk);
            if !term.is_empty() && answer.ends_with(term) {
                answer.truncate(answer.len() - term.len());
                break;
            }
            if term.is_empty() {
                break;
            }
        }
        Ok(String::from_utf8_lossy(&answer).into_owned())
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;

    // Mock implementations for testing

    struct MockStage {
        position: std::sync::Mutex<f64>,
    }

    #[async_trait]
    impl Movable for MockStage {
        async fn move_abs(&self, position: f64) -> Result<()> {
            *self.position.lock().unwrap() = position;
            Ok(())
        }

        async fn position(&self) -> Result<f64> {
            Ok(*self.position.lock().unwrap())
        }
    }

    fn use_focus<F: FocusDevice>(_: &F) {}

    #[tokio::test]
    async fn test_movable_defaults() {
        let stage = MockStage {
            position: std::sync::Mutex::new(0.0),
        };
        use_focus(&stage);

        stage.move_abs(10.0).await.unwrap();
        stage.move_rel(5.0).await.unwrap();
        assert_eq!(stage.position().await.unwrap(), 15.0);

        stage.wait_settled().await.unwrap();
        assert!(stage.move_velocity(1.0).await.is_err());
        assert!(stage.stop().await.is_err());
    }

    struct LoopbackPort {
        pending: std::sync::Mutex<Vec<u8>>,
    }

    #[async_trait]
    impl SerialTransport for LoopbackPort {
        async fn write(&self, data: &[u8]) -> Result<()> {
            self.pending.lock().unwrap().extend_from_slice(data);
            Ok(())
        }

        async fn read(&self, max: usize) -> Result<Vec<u8>> {
            let mut pending = self.pending.lock().unwrap();
            let n = max.min(pending.len());
            Ok(pending.drain(..n).collect())
        }

        async fn purge(&self) -> Result<()> {
            self.pending.lock().unwrap().clear();
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_serial_command_answer() {
        let port = LoopbackPort {
            pending: std::sync::Mutex::new(Vec::new()),
        };
        port.send_command("VER", "\r").await.unwrap();
        assert_eq!(port.read_answer("\r").await.unwrap(), "VER");

        port.write(b"partial").await.unwrap();
        assert!(port.read_answer("\r").await.is_err());

        port.write(b"junk").await.unwrap();
        port.purge().await.unwrap();
        assert!(port.read(16).await.unwrap().is_empty());
    }
}
