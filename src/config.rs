//! Application configuration using Figment
//!
//! Configuration is merged from:
//! 1. built-in defaults
//! 2. a TOML file (default `config/mda.toml`)
//! 3. environment variables prefixed with `RUST_MDA_`, nested keys joined by `__`
//!    (e.g. `RUST_MDA_APPLICATION__LOG_LEVEL=debug`, `RUST_MDA_BUFFER__MEMORY_MB=512`)
//!
//! # Example
//! ```no_run
//! use rust_mda::config::AppConfig;
//!
//! let config = AppConfig::load_from("config/mda.example.toml")?;
//! config.validate()?;
//! println!("{} frames planned", config.acquisition.num_frames());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use crate::logging::{parse_log_level, OutputFormat};
use daq_core::limits::DEFAULT_BUFFER_MEMORY_MB;
use daq_core::DaqError;
use daq_driver_mock::{MockCameraConfig, MockMode, MockStageConfig};
use daq_experiment::AcquisitionSettings;
use daq_hardware::ConfigPresets;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;
use std::path::Path;

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/mda.toml";

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Circular buffer sizing
    #[serde(default)]
    pub buffer: BufferConfig,
    /// Simulated camera
    #[serde(default)]
    pub camera: MockCameraConfig,
    /// Simulated stages
    #[serde(default)]
    pub hardware: HardwareConfig,
    /// Acquisition to plan or run
    #[serde(default)]
    pub acquisition: AcquisitionSettings,
    /// Configuration presets, group → preset → property writes
    #[serde(default)]
    pub presets: ConfigPresets,
}

/// Application-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    #[serde(default = "default_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log output format
    #[serde(default)]
    pub log_format: OutputFormat,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: default_log_level(),
            log_format: OutputFormat::default(),
        }
    }
}

/// Circular buffer configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BufferConfig {
    /// Memory budget in megabytes
    #[serde(default = "default_memory_mb")]
    pub memory_mb: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            memory_mb: default_memory_mb(),
        }
    }
}

/// Simulated hardware configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HardwareConfig {
    /// `instant` (no delays) or `realistic` (exposure, motion and settling times)
    #[serde(default)]
    pub mode: MockMode,
    /// Focus drive
    #[serde(default)]
    pub focus: MockStageConfig,
    /// Focus position the simulated autofocus converges to
    #[serde(default)]
    pub autofocus_best_position: f64,
}

// Default value functions
fn default_name() -> String {
    "rust_mda".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_memory_mb() -> usize {
    DEFAULT_BUFFER_MEMORY_MB
}

impl AppConfig {
    /// Load from [`DEFAULT_CONFIG_PATH`] and the environment.
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load from a specific file and the environment.
    ///
    /// A missing file leaves every section at its default.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, figment::Error> {
        Self::figment(path.as_ref()).extract()
    }

    /// Provider chain used by [`load_from`](Self::load_from).
    pub fn figment(path: &Path) -> Figment {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("RUST_MDA_").split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), DaqError> {
        parse_log_level(&self.application.log_level)?;

        if self.buffer.memory_mb == 0 {
            return Err(DaqError::Configuration(
                "buffer.memory_mb must be at least 1".into(),
            ));
        }

        let cam = &self.camera;
        if cam.label.is_empty() {
            return Err(DaqError::Configuration("camera.label cannot be empty".into()));
        }
        if cam.width == 0 || cam.height == 0 || cam.channels == 0 {
            return Err(DaqError::Configuration(format!(
                "camera dimensions must be non-zero, got {}x{} with {} channels",
                cam.width, cam.height, cam.channels
            )));
        }
        if ![1, 2, 4, 8].contains(&cam.depth) {
            return Err(DaqError::Configuration(format!(
                "camera.depth must be 1, 2, 4 or 8 bytes per pixel, got {}",
                cam.depth
            )));
        }
        if ![1, 4].contains(&cam.components) {
            return Err(DaqError::Configuration(format!(
                "camera.components must be 1 (grayscale) or 4 (RGB), got {}",
                cam.components
            )));
        }
        // 8 bytes per pixel only exists as four 16-bit components
        if cam.depth == 8 && cam.components != 4 {
            return Err(DaqError::Configuration(
                "camera.depth 8 requires camera.components = 4 (RGB64)".into(),
            ));
        }
        if !cam.exposure_ms.is_finite() || cam.exposure_ms < 0.0 {
            return Err(DaqError::Configuration(format!(
                "camera.exposure_ms must be a non-negative number, got {}",
                cam.exposure_ms
            )));
        }

        let focus = &self.hardware.focus;
        let speed_ok = focus.speed_um_per_sec.is_finite() && focus.speed_um_per_sec > 0.0;
        if !focus.initial_position.is_finite() || !speed_ok {
            return Err(DaqError::Configuration(
                "hardware.focus needs a finite initial_position and a positive speed".into(),
            ));
        }

        self.acquisition.validate()?;

        for group in self.presets.groups() {
            if self.presets.presets(group).is_empty() {
                return Err(DaqError::Configuration(format!(
                    "preset group '{group}' defines no presets"
                )));
            }
        }
        for channel in &self.acquisition.channels {
            if self.presets.preset(&channel.group, &channel.name).is_err() {
                return Err(DaqError::Configuration(format!(
                    "channel {}/{} has no preset",
                    channel.group, channel.name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use daq_experiment::ChannelSpec;
    use std::io::Write;

    #[test]
    fn test_defaults_without_file() {
        let config = AppConfig::load_from("does/not/exist.toml").unwrap();
        assert_eq!(config.application.log_level, "info");
        assert_eq!(config.buffer.memory_mb, DEFAULT_BUFFER_MEMORY_MB);
        assert_eq!(config.camera.width, 512);
        assert_eq!(config.acquisition.num_frames(), 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [application]
            log_level = "debug"
            log_format = "json"

            [buffer]
            memory_mb = 64

            [camera]
            width = 64
            height = 32
            depth = 1

            [acquisition]
            slices = [0.0, 1.0]

            [[acquisition.channels]]
            group = "Channel"
            name = "DAPI"
            exposure_ms = 5.0

            [[presets.Channel.DAPI]]
            device = "Wheel"
            property = "State"
            value = 1
            "#
        )
        .unwrap();

        let config = AppConfig::load_from(file.path()).unwrap();
        assert_eq!(config.application.log_format, OutputFormat::Json);
        assert_eq!(config.buffer.memory_mb, 64);
        assert_eq!((config.camera.width, config.camera.height), (64, 32));
        assert_eq!(config.acquisition.num_frames(), 2);
        assert_eq!(config.presets.presets("Channel"), vec!["DAPI"]);
        config.validate().unwrap();
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = AppConfig::default();
        config.application.log_level = "invalid".into();
        assert!(matches!(
            config.validate(),
            Err(DaqError::Configuration(_))
        ));
    }

    #[test]
    fn test_invalid_camera_depth() {
        let mut config = AppConfig::default();
        config.camera.depth = 3;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rgb64_camera_depth() {
        let mut config = AppConfig::default();
        config.camera.depth = 8;
        config.camera.components = 4;
        assert!(config.validate().is_ok());

        config.camera.components = 1;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("RGB64"), "{err}");
    }

    #[test]
    fn test_channel_without_preset() {
        let mut config = AppConfig::default();
        config
            .acquisition
            .channels
            .push(ChannelSpec::new("Channel", "Cy5", 10.0));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Channel"), "{err}");
    }
}
