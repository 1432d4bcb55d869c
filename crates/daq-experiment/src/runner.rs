//! AcquisitionRunner - executes a sequenced acquisition on a dedicated thread
//!
//! # State Machine
//!
//! ```text
//! ┌──────┐  start()  ┌─────────┐  all steps done   ┌──────────┐
//! │ Idle │──────────▶│ Running │──────────────────▶│ Finished │
//! └──────┘           └────┬────┘                   └──────────┘
//!                      ▲  │ pause() observed
//!             resume() │  ▼ between steps
//!                    ┌────────┐
//!                    │ Paused │
//!                    └────────┘
//!   stop() or buffer overflow (between steps) ──▶ Stopped
//!   hardware or buffer error in a step         ──▶ Failed
//! ```
//!
//! Stop and pause are cooperative: both are observed at a single checkpoint
//! before each step and never interrupt a step in progress. A paused run keeps
//! its step index and continues with the next step on resume.
//!
//! # Usage
//!
//! ```rust,ignore
//! let runner = AcquisitionRunner::new(hardware);
//! let run_id = runner.start(settings)?;
//!
//! while !runner.is_finished() {
//!     println!("{}/{}", runner.steps_completed(), runner.total_steps());
//!     std::thread::sleep(Duration::from_millis(100));
//! }
//! let report = runner.wait().expect("run was started");
//! println!("{report}");
//! ```

use crate::error::{RunnerError, StepError, StepIndices};
use crate::sequencer::AcquisitionSequencer;
use crate::settings::{AcquisitionSettings, SliceMode};
use crate::step::{AcquisitionStep, StepContext};
use daq_core::{HardwareBoundary, InsertOutcome};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::watch;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Runner state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    /// No run started yet
    Idle,
    /// Executing steps
    Running,
    /// Suspended between two steps
    Paused,
    /// Ended early by `stop()` or by buffer overflow
    Stopped,
    /// Every step executed
    Finished,
    /// A step failed
    Failed,
}

impl fmt::Display for RunnerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunnerState::Idle => write!(f, "idle"),
            RunnerState::Running => write!(f, "running"),
            RunnerState::Paused => write!(f, "paused"),
            RunnerState::Stopped => write!(f, "stopped"),
            RunnerState::Finished => write!(f, "finished"),
            RunnerState::Failed => write!(f, "failed"),
        }
    }
}

/// Request observed at the between-step checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    Run,
    Pause,
    Stop,
}

/// How a run ended.
#[derive(Debug)]
pub enum RunOutcome {
    /// Every step executed
    Finished,
    /// `stop()` was observed before step `at_step`
    Stopped {
        /// Index of the first step not executed
        at_step: usize,
    },
    /// The frame buffer was full
    Overflow {
        /// Frames stored before the overflow
        produced: usize,
        /// Frames the run would have produced
        total: usize,
    },
    /// A step failed; the rest of the run was skipped
    Failed(StepError),
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::Finished => write!(f, "finished"),
            RunOutcome::Stopped { at_step } => write!(f, "stopped before step {at_step}"),
            RunOutcome::Overflow { produced, total } => write!(
                f,
                "buffer overflow: {produced} of {total} frames produced"
            ),
            RunOutcome::Failed(err) => write!(f, "failed: {err}"),
        }
    }
}

/// Summary of a completed run.
#[derive(Debug)]
pub struct RunReport {
    /// Unique run identifier
    pub run_id: Uuid,
    /// How the run ended
    pub outcome: RunOutcome,
    /// Frames stored in the buffer
    pub frames_produced: usize,
    /// Steps executed to completion
    pub steps_completed: usize,
    /// Steps in the sequence
    pub steps_total: usize,
}

impl RunReport {
    /// True when every step ran and every frame was stored.
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, RunOutcome::Finished)
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "run {}: {} ({} of {} frames produced)",
            self.run_id, self.outcome, self.frames_produced, self.steps_total
        )
    }
}

/// State shared between the runner handle and its worker thread.
struct Shared {
    state: Mutex<RunnerState>,
    control: watch::Sender<Control>,
    steps_completed: AtomicUsize,
    total_steps: AtomicUsize,
    run_id: Mutex<Option<Uuid>>,
}

impl Shared {
    fn set_state(&self, state: RunnerState) {
        *self.state.lock() = state;
    }
}

/// Executes acquisitions against a [`HardwareBoundary`].
pub struct AcquisitionRunner {
    hw: Arc<dyn HardwareBoundary>,
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<RunReport>>>,
}

impl AcquisitionRunner {
    /// Runner driving `hw`.
    pub fn new(hw: Arc<dyn HardwareBoundary>) -> Self {
        let (control, _) = watch::channel(Control::Run);
        Self {
            hw,
            shared: Arc::new(Shared {
                state: Mutex::new(RunnerState::Idle),
                control,
                steps_completed: AtomicUsize::new(0),
                total_steps: AtomicUsize::new(0),
                run_id: Mutex::new(None),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Validate `settings`, sequence them and start executing on a new thread.
    ///
    /// A report of a previous run that was never collected with
    /// [`wait`](Self::wait) is discarded.
    #[instrument(skip_all, fields(frames = settings.num_frames()))]
    pub fn start(&self, settings: AcquisitionSettings) -> Result<Uuid, RunnerError> {
        settings.validate()?;

        let mut worker = self.worker.lock();
        if matches!(self.state(), RunnerState::Running | RunnerState::Paused) {
            return Err(RunnerError::AlreadyRunning);
        }
        if let Some(previous) = worker.take() {
            if previous.join().is_err() {
                warn!("Previous acquisition thread panicked");
            }
        }

        let steps = AcquisitionSequencer::new(&settings).generate();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()?;

        let run_id = Uuid::new_v4();
        self.shared.steps_completed.store(0, Ordering::SeqCst);
        self.shared.total_steps.store(steps.len(), Ordering::SeqCst);
        *self.shared.run_id.lock() = Some(run_id);
        self.shared.control.send_replace(Control::Run);
        self.shared.set_state(RunnerState::Running);

        let execution = Execution {
            hw: Arc::clone(&self.hw),
            shared: Arc::clone(&self.shared),
            steps,
            autofocus: settings.autofocus,
            slice_mode: settings.slice_mode,
            run_id,
        };
        let spawned = std::thread::Builder::new()
            .name("mda-runner".into())
            .spawn(move || runtime.block_on(execution.run()));

        match spawned {
            Ok(handle) => {
                *worker = Some(handle);
                Ok(run_id)
            }
            Err(e) => {
                self.shared.set_state(RunnerState::Idle);
                Err(e.into())
            }
        }
    }

    /// Request a stop before the next step. No-op when no run is active.
    pub fn stop(&self) {
        if matches!(self.state(), RunnerState::Running | RunnerState::Paused) {
            info!("Stop requested");
            self.shared.control.send_replace(Control::Stop);
        }
    }

    /// Request a pause before the next step.
    pub fn pause(&self) -> anyhow::Result<()> {
        let state = self.state();
        if state != RunnerState::Running {
            anyhow::bail!("Cannot pause: runner is {}", state);
        }
        info!("Pause requested");
        self.shared.control.send_if_modified(|c| {
            if *c == Control::Run {
                *c = Control::Pause;
                true
            } else {
                false
            }
        });
        Ok(())
    }

    /// Resume a paused run, or cancel a pause that has not taken effect yet.
    pub fn resume(&self) -> anyhow::Result<()> {
        let state = self.state();
        if !matches!(state, RunnerState::Running | RunnerState::Paused) {
            anyhow::bail!("Cannot resume: runner is {}", state);
        }
        info!("Resume requested");
        self.shared.control.send_if_modified(|c| {
            if *c == Control::Pause {
                *c = Control::Run;
                true
            } else {
                false
            }
        });
        Ok(())
    }

    /// Current state.
    pub fn state(&self) -> RunnerState {
        *self.shared.state.lock()
    }

    /// True unless a run is running or paused. Never blocks.
    pub fn is_finished(&self) -> bool {
        !matches!(self.state(), RunnerState::Running | RunnerState::Paused)
    }

    /// Steps executed so far in the current (or last) run.
    pub fn steps_completed(&self) -> usize {
        self.shared.steps_completed.load(Ordering::SeqCst)
    }

    /// Steps in the current (or last) run.
    pub fn total_steps(&self) -> usize {
        self.shared.total_steps.load(Ordering::SeqCst)
    }

    /// Identifier of the current (or last) run.
    pub fn run_id(&self) -> Option<Uuid> {
        *self.shared.run_id.lock()
    }

    /// Block until the current run ends and return its report.
    ///
    /// Returns `None` if no run was started since the last `wait`.
    pub fn wait(&self) -> Option<RunReport> {
        let handle = self.worker.lock().take()?;
        match handle.join() {
            Ok(report) => Some(report),
            Err(_) => {
                error!("Acquisition thread panicked");
                self.shared.set_state(RunnerState::Failed);
                None
            }
        }
    }
}

impl Drop for AcquisitionRunner {
    fn drop(&mut self) {
        self.stop();
        if let Some(handle) = self.worker.get_mut().take() {
            let _ = handle.join();
        }
    }
}

/// One run, owned by the worker thread.
struct Execution {
    hw: Arc<dyn HardwareBoundary>,
    shared: Arc<Shared>,
    steps: Vec<AcquisitionStep>,
    autofocus: bool,
    slice_mode: SliceMode,
    run_id: Uuid,
}

impl Execution {
    async fn run(self) -> RunReport {
        let Execution {
            hw,
            shared,
            steps,
            autofocus,
            slice_mode,
            run_id,
        } = self;
        let total = steps.len();
        info!(%run_id, total, "Acquisition started");

        let mut control = shared.control.subscribe();
        let mut ctx = StepContext::new(hw.as_ref());
        ctx.autofocus = autofocus;
        let mut produced = 0usize;

        let outcome = 'run: {
            if slice_mode == SliceMode::Relative && steps.iter().any(|s| s.slice.is_some()) {
                match hw.focus_position().await {
                    Ok(z) => ctx.focus_origin = z,
                    Err(e) => {
                        break 'run RunOutcome::Failed(StepError {
                            indices: StepIndices::default(),
                            source: e.context("Reading focus position for relative z-stack"),
                        })
                    }
                }
            }

            for (i, step) in steps.iter().enumerate() {
                if !checkpoint(&shared, &mut control).await {
                    info!(%run_id, at_step = i, "Acquisition stopped");
                    break 'run RunOutcome::Stopped { at_step: i };
                }

                match step.execute(&mut ctx).await {
                    Ok(InsertOutcome::Inserted) => {
                        produced += 1;
                        shared.steps_completed.fetch_add(1, Ordering::SeqCst);
                    }
                    Ok(InsertOutcome::Overflow) => {
                        warn!(%run_id, produced, total, "Frame buffer overflow, stopping");
                        break 'run RunOutcome::Overflow { produced, total };
                    }
                    Err(source) => {
                        let indices = step.indices();
                        error!(%run_id, %indices, error = %source, "Step failed");
                        break 'run RunOutcome::Failed(StepError { indices, source });
                    }
                }
            }
            RunOutcome::Finished
        };

        shared.set_state(match outcome {
            RunOutcome::Finished => RunnerState::Finished,
            RunOutcome::Stopped { .. } | RunOutcome::Overflow { .. } => RunnerState::Stopped,
            RunOutcome::Failed(_) => RunnerState::Failed,
        });

        let report = RunReport {
            run_id,
            outcome,
            frames_produced: produced,
            steps_completed: shared.steps_completed.load(Ordering::SeqCst),
            steps_total: total,
        };
        info!(%run_id, outcome = %report.outcome, produced, total, "Acquisition ended");
        report
    }
}

/// Between-step gate. Returns false when the run must stop.
async fn checkpoint(shared: &Shared, control: &mut watch::Receiver<Control>) -> bool {
    let requested = *control.borrow_and_update();
    match requested {
        Control::Run => true,
        Control::Stop => false,
        Control::Pause => {
            shared.set_state(RunnerState::Paused);
            info!("Paused between steps");
            let resumed = match control.wait_for(|c| *c != Control::Pause).await {
                Ok(c) => *c == Control::Run,
                Err(_) => false,
            };
            if resumed {
                shared.set_state(RunnerState::Running);
                info!("Resumed");
            }
            resumed
        }
    }
}
