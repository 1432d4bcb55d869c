//! Declarative description of a multi-dimensional acquisition.
//!
//! Settings deserialize from TOML or JSON. Times are milliseconds and stage
//! coordinates are in device units (typically µm).
//!
//! ```toml
//! time_intervals_ms = [0.0, 500.0, 500.0]
//! slices = [-2.0, 0.0, 2.0]
//! slice_mode = "relative"
//! positions_first = true
//! channels_first = false
//!
//! [[channels]]
//! group = "Channel"
//! name = "DAPI"
//! exposure_ms = 20.0
//!
//! [[positions]]
//! label = "Well-A1"
//! stages = [{ stage = "Z2", position = 10.0 }]
//! xy = [{ stage = "XY", x = 0.0, y = 0.0 }]
//! ```

use daq_core::DaqError;
use serde::{Deserialize, Serialize};

/// Coordinate for one single-axis stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageCoordinate {
    /// Stage device label
    pub stage: String,
    /// Target position
    pub position: f64,
}

/// Coordinate for one XY stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct XYCoordinate {
    /// XY stage device label
    pub stage: String,
    /// Target x
    pub x: f64,
    /// Target y
    pub y: f64,
}

/// A named stage position: any number of single-axis and XY coordinates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PositionBundle {
    /// Position label, reported in image metadata
    pub label: String,
    /// Single-axis coordinates, written in order
    #[serde(default)]
    pub stages: Vec<StageCoordinate>,
    /// XY coordinates, written after the single-axis ones
    #[serde(default)]
    pub xy: Vec<XYCoordinate>,
}

impl PositionBundle {
    /// Empty bundle named `label`.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Self::default()
        }
    }

    /// Add a single-axis coordinate.
    pub fn with_stage(mut self, stage: impl Into<String>, position: f64) -> Self {
        self.stages.push(StageCoordinate {
            stage: stage.into(),
            position,
        });
        self
    }

    /// Add an XY coordinate.
    pub fn with_xy(mut self, stage: impl Into<String>, x: f64, y: f64) -> Self {
        self.xy.push(XYCoordinate {
            stage: stage.into(),
            x,
            y,
        });
        self
    }
}

/// One channel: a configuration preset plus the exposure to use with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSpec {
    /// Preset group (e.g. "Channel")
    pub group: String,
    /// Preset name (e.g. "DAPI")
    pub name: String,
    /// Camera exposure in milliseconds
    pub exposure_ms: f64,
}

impl ChannelSpec {
    /// Create a channel spec.
    pub fn new(group: impl Into<String>, name: impl Into<String>, exposure_ms: f64) -> Self {
        Self {
            group: group.into(),
            name: name.into(),
            exposure_ms,
        }
    }
}

/// How slice offsets are interpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SliceMode {
    /// Slices are absolute focus positions
    #[default]
    Absolute,
    /// Slices are offsets from the focus position at run start
    Relative,
}

fn default_true() -> bool {
    true
}

/// Full description of an acquisition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionSettings {
    /// Wait interval before each time point, in milliseconds
    #[serde(default)]
    pub time_intervals_ms: Vec<f64>,
    /// Stage positions, visited in order
    #[serde(default)]
    pub positions: Vec<PositionBundle>,
    /// Focus positions of the z-stack
    #[serde(default)]
    pub slices: Vec<f64>,
    /// Interpretation of `slices`
    #[serde(default)]
    pub slice_mode: SliceMode,
    /// Channels, visited in order
    #[serde(default)]
    pub channels: Vec<ChannelSpec>,
    /// Outer loop over positions (time inside) when true, over time when false
    #[serde(default = "default_true")]
    pub positions_first: bool,
    /// Outer loop over slices (channels inside) when true, over channels when false
    #[serde(default = "default_true")]
    pub channels_first: bool,
    /// Run full autofocus before every snap
    #[serde(default)]
    pub autofocus: bool,
}

impl Default for AcquisitionSettings {
    fn default() -> Self {
        Self {
            time_intervals_ms: Vec::new(),
            positions: Vec::new(),
            slices: Vec::new(),
            slice_mode: SliceMode::default(),
            channels: Vec::new(),
            positions_first: true,
            channels_first: true,
            autofocus: false,
        }
    }
}

impl AcquisitionSettings {
    /// Number of frames (and steps) the acquisition produces.
    pub fn num_frames(&self) -> usize {
        [
            self.time_intervals_ms.len(),
            self.positions.len(),
            self.channels.len(),
            self.slices.len(),
        ]
        .iter()
        .map(|&n| n.max(1))
        .product()
    }

    /// Number of time points (0 when no time series is configured).
    pub fn num_time_points(&self) -> usize {
        self.time_intervals_ms.len()
    }

    /// Check values before a run starts.
    ///
    /// # Errors
    /// [`DaqError::Configuration`] naming the first offending field.
    pub fn validate(&self) -> Result<(), DaqError> {
        fn invalid(msg: String) -> Result<(), DaqError> {
            Err(DaqError::Configuration(msg))
        }

        for (i, &interval) in self.time_intervals_ms.iter().enumerate() {
            if !interval.is_finite() || interval < 0.0 {
                return invalid(format!(
                    "time_intervals_ms[{i}] must be a non-negative number, got {interval}"
                ));
            }
        }
        for (i, &z) in self.slices.iter().enumerate() {
            if !z.is_finite() {
                return invalid(format!("slices[{i}] is not finite"));
            }
        }
        for (i, ch) in self.channels.iter().enumerate() {
            if ch.group.is_empty() || ch.name.is_empty() {
                return invalid(format!("channels[{i}] needs a group and a name"));
            }
            if !ch.exposure_ms.is_finite() || ch.exposure_ms < 0.0 {
                return invalid(format!(
                    "channel '{}' exposure must be a non-negative number, got {}",
                    ch.name, ch.exposure_ms
                ));
            }
        }
        for pos in &self.positions {
            let finite = pos.stages.iter().all(|s| s.position.is_finite())
                && pos.xy.iter().all(|c| c.x.is_finite() && c.y.is_finite());
            if !finite {
                return invalid(format!("position '{}' has a non-finite coordinate", pos.label));
            }
            if pos.stages.iter().any(|s| s.stage.is_empty())
                || pos.xy.iter().any(|c| c.stage.is_empty())
            {
                return invalid(format!("position '{}' names an empty stage", pos.label));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_num_frames() {
        assert_eq!(AcquisitionSettings::default().num_frames(), 1);

        let settings = AcquisitionSettings {
            time_intervals_ms: vec![0.0, 100.0, 100.0],
            channels: vec![
                ChannelSpec::new("Channel", "DAPI", 10.0),
                ChannelSpec::new("Channel", "FITC", 20.0),
            ],
            slices: vec![0.0, 1.0, 2.0, 3.0],
            ..AcquisitionSettings::default()
        };
        assert_eq!(settings.num_frames(), 3 * 2 * 4);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let negative_exposure = AcquisitionSettings {
            channels: vec![ChannelSpec::new("Channel", "DAPI", -1.0)],
            ..AcquisitionSettings::default()
        };
        assert!(matches!(
            negative_exposure.validate(),
            Err(DaqError::Configuration(msg)) if msg.contains("DAPI")
        ));

        let nan_position = AcquisitionSettings {
            positions: vec![PositionBundle::new("P1").with_xy("XY", f64::NAN, 0.0)],
            ..AcquisitionSettings::default()
        };
        assert!(nan_position.validate().is_err());

        let negative_interval = AcquisitionSettings {
            time_intervals_ms: vec![0.0, -5.0],
            ..AcquisitionSettings::default()
        };
        assert!(negative_interval.validate().is_err());

        assert!(AcquisitionSettings::default().validate().is_ok());
    }

    #[test]
    fn test_deserialize_defaults() {
        let settings: AcquisitionSettings =
            serde_json::from_str(r#"{"slices": [1.0], "slice_mode": "relative"}"#).unwrap();
        assert!(settings.positions_first);
        assert!(settings.channels_first);
        assert!(!settings.autofocus);
        assert_eq!(settings.slice_mode, SliceMode::Relative);
        assert_eq!(settings.num_frames(), 1);
    }
}
