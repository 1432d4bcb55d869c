//! Operational modes for mock devices.
//!
//! - **Instant**: Zero delays, deterministic behavior for unit tests
//! - **Realistic**: Hardware-like timing (exposure, motion, settling) for demos
//!   and pacing tests

use serde::Deserialize;

/// Operational modes for mock devices
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MockMode {
    /// Zero delays, deterministic - for unit tests
    #[default]
    Instant,
    /// Hardware-like timing
    Realistic,
}

impl MockMode {
    /// True when devices should sleep to imitate hardware.
    pub fn simulates_timing(&self) -> bool {
        matches!(self, MockMode::Realistic)
    }
}
