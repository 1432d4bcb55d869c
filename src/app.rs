//! Plan and run acquisitions described by an [`AppConfig`].

use crate::config::AppConfig;
use crate::consumer::{DrainConfig, DrainSummary, FrameDrain};
use crate::rig::MockRig;
use anyhow::{anyhow, Context, Result};
use daq_experiment::{AcquisitionRunner, AcquisitionSequencer, AcquisitionStep, RunReport};
use std::fmt;
use std::time::Duration;
use tracing::info;

const PROGRESS_POLL: Duration = Duration::from_millis(20);

/// Steps the configured acquisition would execute, in order.
pub fn plan(config: &AppConfig) -> Result<Vec<AcquisitionStep>> {
    config.validate()?;
    Ok(AcquisitionSequencer::new(&config.acquisition).generate())
}

/// Outcome of [`run_acquisition`].
#[derive(Debug)]
pub struct SessionSummary {
    /// Report of the runner
    pub report: RunReport,
    /// What the consumer pulled out of the buffer
    pub drained: DrainSummary,
}

impl fmt::Display for SessionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}; {}", self.report, self.drained)
    }
}

/// Run the configured acquisition on a simulated rig while a [`FrameDrain`]
/// empties the buffer.
///
/// `on_progress(done, total)` is called whenever the completed step count changes.
pub fn run_acquisition(
    config: &AppConfig,
    mut on_progress: impl FnMut(usize, usize),
) -> Result<SessionSummary> {
    config.validate()?;

    let rig = MockRig::from_config(config)?;
    rig.initialize_buffer()
        .context("Sizing the frame buffer for the camera")?;

    let drain = FrameDrain::spawn(rig.buffer(), DrainConfig::default())
        .context("Starting the frame drain")?;
    let runner = AcquisitionRunner::new(rig.hardware());
    let run_id = runner.start(config.acquisition.clone())?;
    info!(%run_id, frames = runner.total_steps(), "Acquisition running");

    let mut reported = None;
    loop {
        let finished = runner.is_finished();
        let done = runner.steps_completed();
        if reported != Some(done) {
            on_progress(done, runner.total_steps());
            reported = Some(done);
        }
        if finished {
            break;
        }
        std::thread::sleep(PROGRESS_POLL);
    }

    let report = runner
        .wait()
        .ok_or_else(|| anyhow!("Acquisition thread ended without a report"))?;
    let drained = drain.stop();
    let status = rig.buffer().status();
    info!(
        capacity = status.capacity,
        remaining = status.remaining,
        overflow = status.overflow,
        "Frame buffer after run"
    );
    Ok(SessionSummary { report, drained })
}
