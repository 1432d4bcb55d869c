//! `daq-experiment`
//!
//! Multi-dimensional acquisition: settings, step sequencing and the runner.
//!
//! An acquisition spans up to four axes: time points, stage positions,
//! focus slices and channels. [`AcquisitionSettings`] describes them,
//! [`AcquisitionSequencer`] expands them into an ordered list of
//! [`AcquisitionStep`]s, and [`AcquisitionRunner`] executes those steps on a
//! dedicated thread against any [`HardwareBoundary`](daq_core::HardwareBoundary),
//! inserting every snapped image into the frame buffer.
//!
//! ```rust,ignore
//! let settings = AcquisitionSettings {
//!     time_intervals_ms: vec![0.0, 1000.0, 1000.0],
//!     channels: vec![ChannelSpec::new("Channel", "DAPI", 20.0)],
//!     ..AcquisitionSettings::default()
//! };
//! let runner = AcquisitionRunner::new(registry);
//! runner.start(settings)?;
//! let report = runner.wait();
//! ```

pub mod error;
pub mod pacing;
pub mod runner;
pub mod sequencer;
pub mod settings;
pub mod step;

pub use error::{RunnerError, StepError, StepIndices};
pub use pacing::Pacer;
pub use runner::{AcquisitionRunner, RunOutcome, RunReport, RunnerState};
pub use sequencer::AcquisitionSequencer;
pub use settings::{
    AcquisitionSettings, ChannelSpec, PositionBundle, SliceMode, StageCoordinate, XYCoordinate,
};
pub use step::{AcquisitionStep, AxisEntry, StepContext};
