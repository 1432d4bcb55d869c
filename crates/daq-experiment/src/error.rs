//! Error types for acquisition runs.

use daq_core::DaqError;
use std::fmt;
use thiserror::Error;

/// Axis indices of a step; `None` marks an absent axis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepIndices {
    /// Time point index
    pub time: Option<usize>,
    /// Position index
    pub position: Option<usize>,
    /// Channel index
    pub channel: Option<usize>,
    /// Slice index
    pub slice: Option<usize>,
}

impl StepIndices {
    /// Indices with absent axes reported as 0, in (time, position, channel, slice) order.
    pub fn clamped(&self) -> [usize; 4] {
        [self.time, self.position, self.channel, self.slice].map(|i| i.unwrap_or(0))
    }
}

impl fmt::Display for StepIndices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |i: Option<usize>| i.map_or_else(|| "-".to_string(), |i| i.to_string());
        write!(
            f,
            "time={} position={} channel={} slice={}",
            show(self.time),
            show(self.position),
            show(self.channel),
            show(self.slice)
        )
    }
}

/// A hardware or buffer call failed while executing a step.
#[derive(Debug, Error)]
#[error("Step [{indices}] failed: {source:#}")]
pub struct StepError {
    /// Which step failed
    pub indices: StepIndices,
    /// Underlying failure
    #[source]
    pub source: anyhow::Error,
}

/// Reasons a run cannot be started.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// A run is already in progress
    #[error("An acquisition is already running")]
    AlreadyRunning,

    /// Settings failed validation
    #[error("Invalid acquisition settings: {0}")]
    InvalidSettings(#[from] DaqError),

    /// The runner thread or its runtime could not be created
    #[error("Failed to start acquisition thread: {0}")]
    Spawn(#[from] std::io::Error),
}
