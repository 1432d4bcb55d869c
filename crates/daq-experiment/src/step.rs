//! One unit of acquisition work and its execution against the hardware boundary.

use crate::error::StepIndices;
use crate::pacing::Pacer;
use crate::settings::{ChannelSpec, PositionBundle};
use anyhow::{Context, Result};
use daq_core::metadata::tags;
use daq_core::{HardwareBoundary, InsertOutcome, Metadata};
use std::fmt;
use tokio::time::Duration;

/// An axis index together with the payload for that axis.
#[derive(Debug, Clone, PartialEq)]
pub struct AxisEntry<T> {
    /// Index along the axis
    pub index: usize,
    /// Payload (position bundle, slice offset, channel)
    pub value: T,
}

impl<T> AxisEntry<T> {
    /// Create an entry.
    pub fn new(index: usize, value: T) -> Self {
        Self { index, value }
    }
}

/// One step: an optional update of each axis followed by a snap.
///
/// Absent axes (`None`) are not touched. `wait_ms` is only set on the first
/// step of each time point, or of each (position, time point) pair when
/// positions are the outer loop; the remaining steps carry the time index
/// without waiting.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AcquisitionStep {
    /// Time point index
    pub time: Option<usize>,
    /// Interval to the previous time point, in milliseconds
    pub wait_ms: Option<f64>,
    /// Stage position
    pub position: Option<AxisEntry<PositionBundle>>,
    /// Channel preset and exposure
    pub channel: Option<AxisEntry<ChannelSpec>>,
    /// Focus position (absolute or offset, see [`StepContext::focus_origin`])
    pub slice: Option<AxisEntry<f64>>,
}

/// State shared by consecutive steps of one run.
pub struct StepContext<'a> {
    /// Hardware the steps drive
    pub hw: &'a dyn HardwareBoundary,
    /// Pacing of timed steps
    pub pacer: Pacer,
    /// Run full autofocus before each snap
    pub autofocus: bool,
    /// Added to every slice value (0 for absolute z-stacks)
    pub focus_origin: f64,
}

impl<'a> StepContext<'a> {
    /// Context with absolute slices and no autofocus.
    pub fn new(hw: &'a dyn HardwareBoundary) -> Self {
        Self {
            hw,
            pacer: Pacer::new(),
            autofocus: false,
            focus_origin: 0.0,
        }
    }
}

impl AcquisitionStep {
    /// Axis indices of this step.
    pub fn indices(&self) -> StepIndices {
        StepIndices {
            time: self.time,
            position: self.position.as_ref().map(|p| p.index),
            channel: self.channel.as_ref().map(|c| c.index),
            slice: self.slice.as_ref().map(|s| s.index),
        }
    }

    /// Metadata attached to the image this step acquires.
    ///
    /// Every axis index is present; absent axes are reported as 0.
    pub fn metadata(&self, focus_origin: f64) -> Metadata {
        let [time, position, channel, slice] = self.indices().clamped();
        let mut md = Metadata::new();
        md.put_single(tags::FRAME, time);
        md.put_single(tags::POSITION_INDEX, position);
        md.put_single(tags::CHANNEL_INDEX, channel);
        md.put_single(tags::SLICE_INDEX, slice);

        if let Some(pos) = &self.position {
            md.put_single(tags::POSITION_NAME, &pos.value.label);
        }
        if let Some(ch) = &self.channel {
            md.put_single(tags::CHANNEL, &ch.value.name);
            md.put_single(tags::EXPOSURE_MS, ch.value.exposure_ms);
        }
        if let Some(z) = &self.slice {
            md.put_single(tags::Z_POSITION_UM, focus_origin + z.value);
        }
        md
    }

    /// Run the step: position, slice, channel, wait, autofocus, then snap and insert.
    ///
    /// Returns the insert outcome; [`InsertOutcome::Overflow`] means the
    /// frame was acquired but the buffer had no room for it.
    pub async fn execute(&self, ctx: &mut StepContext<'_>) -> Result<InsertOutcome> {
        let hw = ctx.hw;

        if let Some(pos) = &self.position {
            for s in &pos.value.stages {
                hw.set_stage_position(&s.stage, s.position)
                    .await
                    .with_context(|| format!("Moving stage '{}' to {}", s.stage, s.position))?;
            }
            for c in &pos.value.xy {
                hw.set_xy_position(&c.stage, c.x, c.y)
                    .await
                    .with_context(|| {
                        format!("Moving XY stage '{}' to ({}, {})", c.stage, c.x, c.y)
                    })?;
            }
        }

        if let Some(z) = &self.slice {
            let target = ctx.focus_origin + z.value;
            hw.set_focus_position(target)
                .await
                .with_context(|| format!("Moving focus to {target}"))?;
        }

        if let Some(ch) = &self.channel {
            let ch = &ch.value;
            hw.set_exposure(ch.exposure_ms)
                .await
                .with_context(|| format!("Setting exposure {} ms", ch.exposure_ms))?;
            hw.set_config(&ch.group, &ch.name)
                .await
                .with_context(|| format!("Applying preset {}/{}", ch.group, ch.name))?;
        }

        if let Some(wait_ms) = self.wait_ms {
            let interval = Duration::try_from_secs_f64(wait_ms / 1000.0).unwrap_or(Duration::ZERO);
            let slept = ctx.pacer.wait(interval).await;
            tracing::trace!(?slept, "Paced time point");
        }

        if ctx.autofocus {
            hw.full_focus().await.context("Autofocus")?;
        }

        let image = hw.snap_image().await.context("Snapping image")?;
        let md = self.metadata(ctx.focus_origin);
        let outcome = hw.insert_multi_channel(
            &image.source,
            &image.pixels,
            image.channels,
            image.shape,
            image.components,
            Some(&md),
        )?;
        Ok(outcome)
    }
}

impl fmt::Display for AcquisitionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(t) = self.time {
            match self.wait_ms {
                Some(ms) => parts.push(format!("t{t} (+{ms} ms)")),
                None => parts.push(format!("t{t}")),
            }
        }
        if let Some(p) = &self.position {
            parts.push(format!("pos{} {}", p.index, p.value.label));
        }
        if let Some(z) = &self.slice {
            parts.push(format!("z{} {}", z.index, z.value));
        }
        if let Some(c) = &self.channel {
            parts.push(format!("ch{} {}/{}", c.index, c.value.group, c.value.name));
        }
        if parts.is_empty() {
            write!(f, "snap")
        } else {
            write!(f, "{}", parts.join(" | "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_clamps_absent_axes() {
        let step = AcquisitionStep {
            channel: Some(AxisEntry::new(1, ChannelSpec::new("Channel", "FITC", 15.0))),
            ..AcquisitionStep::default()
        };
        let md = step.metadata(0.0);
        assert_eq!(md.get_str(tags::FRAME), Some("0"));
        assert_eq!(md.get_str(tags::POSITION_INDEX), Some("0"));
        assert_eq!(md.get_str(tags::CHANNEL_INDEX), Some("1"));
        assert_eq!(md.get_str(tags::SLICE_INDEX), Some("0"));
        assert_eq!(md.get_str(tags::CHANNEL), Some("FITC"));
        assert!(!md.contains(tags::POSITION_NAME));
    }

    #[test]
    fn test_metadata_relative_slice() {
        let step = AcquisitionStep {
            slice: Some(AxisEntry::new(2, 1.5)),
            ..AcquisitionStep::default()
        };
        assert_eq!(step.metadata(10.0).get_str(tags::Z_POSITION_UM), Some("11.5"));
    }

    #[test]
    fn test_display() {
        let step = AcquisitionStep {
            time: Some(1),
            wait_ms: Some(200.0),
            position: Some(AxisEntry::new(0, PositionBundle::new("A1"))),
            ..AcquisitionStep::default()
        };
        assert_eq!(step.to_string(), "t1 (+200 ms) | pos0 A1");
        assert_eq!(AcquisitionStep::default().to_string(), "snap");
    }
}
