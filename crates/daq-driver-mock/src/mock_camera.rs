//! Mock camera producing synthetic test-pattern frames on every snap.

use crate::common::{ErrorConfig, MockMode, TimingConfig};
use crate::pattern::generate_test_pattern;
use anyhow::{bail, Result};
use async_trait::async_trait;
use daq_core::capabilities::{ExposureControl, SnappedImage, Snappable};
use daq_core::ImageShape;
use parking_lot::Mutex;
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::sleep;

const DRIVER_TYPE: &str = "mock_camera";

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for MockCamera
#[derive(Debug, Clone, Deserialize)]
pub struct MockCameraConfig {
    /// Label reported as the image source (default: "Camera")
    #[serde(default = "default_label")]
    pub label: String,

    /// Frame width in pixels (default: 512)
    #[serde(default = "default_width")]
    pub width: u32,

    /// Frame height in pixels (default: 512)
    #[serde(default = "default_height")]
    pub height: u32,

    /// Bytes per pixel (default: 2)
    #[serde(default = "default_depth")]
    pub depth: u32,

    /// Components per pixel, 1 for grayscale and 4 for RGB (default: 1)
    #[serde(default = "default_components")]
    pub components: u32,

    /// Channels per snap (default: 1)
    #[serde(default = "default_channels")]
    pub channels: u32,

    /// Initial exposure in milliseconds (default: 10.0)
    #[serde(default = "default_exposure")]
    pub exposure_ms: f64,
}

fn default_label() -> String {
    "Camera".to_string()
}
fn default_width() -> u32 {
    512
}
fn default_height() -> u32 {
    512
}
fn default_depth() -> u32 {
    2
}
fn default_components() -> u32 {
    1
}
fn default_channels() -> u32 {
    1
}
fn default_exposure() -> f64 {
    10.0
}

impl Default for MockCameraConfig {
    fn default() -> Self {
        Self {
            label: default_label(),
            width: default_width(),
            height: default_height(),
            depth: default_depth(),
            components: default_components(),
            channels: default_channels(),
            exposure_ms: default_exposure(),
        }
    }
}

// =============================================================================
// MockCamera
// =============================================================================

/// Mock camera.
///
/// - `snap` returns `channels` test-pattern images back to back
/// - Realistic mode sleeps exposure plus readout before returning
/// - Error injection on `"snap"` and `"set_exposure"`
pub struct MockCamera {
    label: String,
    shape: ImageShape,
    components: u32,
    channels: u32,
    exposure_ms: Mutex<f64>,
    frame_count: AtomicU64,
    timing: TimingConfig,
    mode: MockMode,
    error_config: ErrorConfig,
}

impl MockCamera {
    /// 512x512 16-bit single-channel camera.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Create a camera from configuration.
    pub fn with_config(config: MockCameraConfig) -> Self {
        Self::builder()
            .label(config.label)
            .shape(ImageShape::new(config.width, config.height, config.depth))
            .components(config.components)
            .channels(config.channels)
            .exposure_ms(config.exposure_ms)
            .build()
    }

    /// Create a builder for configuring MockCamera
    pub fn builder() -> MockCameraBuilder {
        MockCameraBuilder::new()
    }

    /// Label reported as image source.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Snaps completed so far.
    pub fn frame_count(&self) -> u64 {
        self.frame_count.load(Ordering::SeqCst)
    }
}

impl Default for MockCamera {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExposureControl for MockCamera {
    async fn set_exposure(&self, ms: f64) -> Result<()> {
        self.error_config.check_operation(DRIVER_TYPE, "set_exposure")?;
        if !ms.is_finite() || ms < 0.0 {
            bail!("Exposure must be a non-negative number of milliseconds, got {ms}");
        }
        *self.exposure_ms.lock() = ms;
        Ok(())
    }

    async fn get_exposure(&self) -> Result<f64> {
        Ok(*self.exposure_ms.lock())
    }
}

#[async_trait]
impl Snappable for MockCamera {
    async fn snap(&self) -> Result<SnappedImage> {
        self.error_config.check_operation(DRIVER_TYPE, "snap")?;

        if self.mode.simulates_timing() {
            let exposure = Duration::from_secs_f64(*self.exposure_ms.lock() / 1000.0);
            sleep(exposure + self.timing.readout()).await;
        }

        let frame_num = self.frame_count.fetch_add(1, Ordering::SeqCst);
        let mut pixels = Vec::with_capacity(self.shape.footprint() * self.channels as usize);
        for channel in 0..self.channels {
            pixels.extend(generate_test_pattern(self.shape, frame_num, channel));
        }
        tracing::trace!(camera = %self.label, frame_num, "MockCamera: snap");

        Ok(SnappedImage {
            source: self.label.clone(),
            pixels,
            shape: self.shape,
            components: self.components,
            channels: self.channels,
        })
    }

    fn image_shape(&self) -> ImageShape {
        self.shape
    }

    fn components(&self) -> u32 {
        self.components
    }

    fn channels(&self) -> u32 {
        self.channels
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for MockCamera with fluent API
pub struct MockCameraBuilder {
    label: String,
    shape: ImageShape,
    components: u32,
    channels: u32,
    exposure_ms: f64,
    timing: TimingConfig,
    mode: MockMode,
    error_config: ErrorConfig,
}

impl MockCameraBuilder {
    /// Create a new builder with defaults
    pub fn new() -> Self {
        Self {
            label: default_label(),
            shape: ImageShape::new(default_width(), default_height(), default_depth()),
            components: default_components(),
            channels: default_channels(),
            exposure_ms: default_exposure(),
            timing: TimingConfig::camera(),
            mode: MockMode::Instant,
            error_config: ErrorConfig::none(),
        }
    }

    /// Set the source label
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Set per-channel image shape
    pub fn shape(mut self, shape: ImageShape) -> Self {
        self.shape = shape;
        self
    }

    /// Set components per pixel
    pub fn components(mut self, components: u32) -> Self {
        self.components = components;
        self
    }

    /// Set channels per snap
    pub fn channels(mut self, channels: u32) -> Self {
        self.channels = channels.max(1);
        self
    }

    /// Set initial exposure
    pub fn exposure_ms(mut self, ms: f64) -> Self {
        self.exposure_ms = ms;
        self
    }

    /// Set timing used in realistic mode
    pub fn timing(mut self, timing: TimingConfig) -> Self {
        self.timing = timing;
        self
    }

    /// Set operational mode
    pub fn mode(mut self, mode: MockMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set error configuration
    pub fn error_config(mut self, config: ErrorConfig) -> Self {
        self.error_config = config;
        self
    }

    /// Build the MockCamera
    pub fn build(self) -> MockCamera {
        MockCamera {
            label: self.label,
            shape: self.shape,
            components: self.components,
            channels: self.channels,
            exposure_ms: Mutex::new(self.exposure_ms),
            frame_count: AtomicU64::new(0),
            timing: self.timing,
            mode: self.mode,
            error_config: self.error_config,
        }
    }
}

impl Default for MockCameraBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::common::ErrorScenario;

    #[tokio::test]
    async fn test_snap_returns_shape_and_source() {
        let camera = MockCamera::builder()
            .label("Cam1")
            .shape(ImageShape::new(32, 16, 2))
            .build();
        let image = camera.snap().await.unwrap();
        assert_eq!(image.source, "Cam1");
        assert_eq!(image.shape, ImageShape::new(32, 16, 2));
        assert_eq!(image.pixels.len(), 32 * 16 * 2);
        assert_eq!(camera.frame_count(), 1);
    }

    #[tokio::test]
    async fn test_multi_channel_snap() {
        let camera = MockCamera::builder()
            .shape(ImageShape::new(8, 8, 1))
            .channels(3)
            .build();
        let image = camera.snap().await.unwrap();
        assert_eq!(image.channels, 3);
        assert_eq!(image.pixels.len(), 3 * 64);
        assert_ne!(image.pixels[..64], image.pixels[64..128]);
    }

    #[tokio::test]
    async fn test_exposure_roundtrip_and_validation() {
        let camera = MockCamera::new();
        camera.set_exposure(25.0).await.unwrap();
        assert_eq!(camera.get_exposure().await.unwrap(), 25.0);
        assert!(camera.set_exposure(-1.0).await.is_err());
        assert_eq!(camera.get_exposure().await.unwrap(), 25.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_realistic_snap_waits_for_exposure() {
        let camera = MockCamera::builder()
            .shape(ImageShape::new(4, 4, 1))
            .exposure_ms(40.0)
            .mode(MockMode::Realistic)
            .build();
        let start = tokio::time::Instant::now();
        camera.snap().await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_injected_snap_failure() {
        let camera = MockCamera::builder()
            .shape(ImageShape::new(4, 4, 1))
            .error_config(ErrorConfig::scenario(ErrorScenario::FailOnCall {
                operation: "snap",
                call: 2,
            }))
            .build();
        camera.snap().await.unwrap();
        assert!(camera.snap().await.is_err());
        camera.snap().await.unwrap();
        assert_eq!(camera.frame_count(), 2);
    }

    #[test]
    fn test_config_defaults() {
        let config: MockCameraConfig = serde_json::from_str(r#"{"width": 64}"#).unwrap();
        assert_eq!(config.width, 64);
        assert_eq!(config.height, 512);
        assert_eq!(config.label, "Camera");
    }
}
