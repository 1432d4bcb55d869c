//! Timing configuration for realistic mode.
//!
//! Delays imitate a widefield microscope: a camera that reads out after the
//! exposure, stages that settle after moving, and a slow autofocus search.

use std::time::Duration;

/// Timing configuration for realistic mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimingConfig {
    /// Readout time after the exposure in milliseconds (camera)
    pub frame_readout_ms: u64,
    /// Settling time in milliseconds (stages, filter wheels)
    pub settling_time_ms: u64,
    /// Communication delay in milliseconds (serial, property writes)
    pub communication_delay_ms: u64,
}

impl TimingConfig {
    /// Camera: 10 ms readout
    pub fn camera() -> Self {
        Self {
            frame_readout_ms: 10,
            settling_time_ms: 0,
            communication_delay_ms: 1,
        }
    }

    /// Single-axis or XY stage
    pub fn stage() -> Self {
        Self {
            frame_readout_ms: 0,
            settling_time_ms: 20,
            communication_delay_ms: 2,
        }
    }

    /// Filter wheel, shutter or other state device
    pub fn state_device() -> Self {
        Self {
            frame_readout_ms: 0,
            settling_time_ms: 30,
            communication_delay_ms: 1,
        }
    }

    /// Autofocus search
    pub fn autofocus() -> Self {
        Self {
            frame_readout_ms: 0,
            settling_time_ms: 250,
            communication_delay_ms: 0,
        }
    }

    /// Serial port round trip
    pub fn serial() -> Self {
        Self {
            frame_readout_ms: 0,
            settling_time_ms: 0,
            communication_delay_ms: 2,
        }
    }

    /// Readout as a [`Duration`].
    pub fn readout(&self) -> Duration {
        Duration::from_millis(self.frame_readout_ms)
    }

    /// Settling as a [`Duration`].
    pub fn settling(&self) -> Duration {
        Duration::from_millis(self.settling_time_ms)
    }

    /// Communication delay as a [`Duration`].
    pub fn communication(&self) -> Duration {
        Duration::from_millis(self.communication_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timing() {
        let config = TimingConfig::default();
        assert_eq!(config.readout(), Duration::ZERO);
        assert_eq!(config.settling(), Duration::ZERO);
        assert_eq!(config.communication(), Duration::ZERO);
    }

    #[test]
    fn test_role_presets() {
        assert_eq!(TimingConfig::camera().frame_readout_ms, 10);
        assert_eq!(TimingConfig::stage().settling_time_ms, 20);
        assert_eq!(TimingConfig::autofocus().settling(), Duration::from_millis(250));
    }
}
