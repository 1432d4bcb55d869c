//! Mock single-axis stage (focus drive or linear stage).

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use daq_core::capabilities::Movable;
use parking_lot::Mutex;
use serde::Deserialize;
use std::time::Duration;
use tokio::time::sleep;

use crate::common::{ErrorConfig, MockMode, TimingConfig};

const DRIVER_TYPE: &str = "mock_stage";

/// Configuration for MockStage
#[derive(Debug, Clone, Deserialize)]
pub struct MockStageConfig {
    /// Initial position in µm (default: 0.0)
    #[serde(default)]
    pub initial_position: f64,

    /// Motion speed in µm/sec (default: 1000.0)
    #[serde(default = "default_speed")]
    pub speed_um_per_sec: f64,
}

fn default_speed() -> f64 {
    1000.0
}

impl Default for MockStageConfig {
    fn default() -> Self {
        Self {
            initial_position: 0.0,
            speed_um_per_sec: default_speed(),
        }
    }
}

/// Limit behavior when a target exceeds the travel range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitBehavior {
    /// Return an error at the limit
    HardStop,
    /// Move to the nearest boundary without error
    Clamp,
}

/// Stage travel range
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageLimits {
    /// Lower bound
    pub min_position: f64,
    /// Upper bound
    pub max_position: f64,
    /// What to do outside the bounds
    pub behavior: LimitBehavior,
}

impl StageLimits {
    /// Limits that reject out-of-range targets
    pub fn hard_stop(min: f64, max: f64) -> Self {
        Self {
            min_position: min,
            max_position: max,
            behavior: LimitBehavior::HardStop,
        }
    }

    /// Limits that clamp out-of-range targets
    pub fn clamp(min: f64, max: f64) -> Self {
        Self {
            min_position: min,
            max_position: max,
            behavior: LimitBehavior::Clamp,
        }
    }

    pub(crate) fn enforce(&self, target: f64) -> Result<f64> {
        match self.behavior {
            LimitBehavior::Clamp => Ok(target.clamp(self.min_position, self.max_position)),
            LimitBehavior::HardStop => {
                if target < self.min_position || target > self.max_position {
                    Err(anyhow!(
                        "Position {:.2} exceeds limits [{:.2}, {:.2}]",
                        target,
                        self.min_position,
                        self.max_position
                    ))
                } else {
                    Ok(target)
                }
            }
        }
    }
}

#[derive(Debug)]
struct StageState {
    position: f64,
    velocity: f64,
    /// Every completed absolute move target, oldest first
    history: Vec<f64>,
}

/// Mock single-axis stage.
///
/// Simulates a z drive or linear stage with:
/// - Constant-speed motion plus settling time in realistic mode
/// - Optional travel limits
/// - A move history for assertions
/// - Error injection on the `"move"` operation
///
/// # Example
///
/// ```rust,ignore
/// let z = MockStage::builder()
///     .limits(StageLimits::clamp(-500.0, 500.0))
///     .mode(MockMode::Realistic)
///     .build();
///
/// z.move_abs(12.5).await?;
/// assert_eq!(z.position().await?, 12.5);
/// ```
pub struct MockStage {
    state: Mutex<StageState>,
    speed: f64,
    limits: Option<StageLimits>,
    timing: TimingConfig,
    mode: MockMode,
    error_config: ErrorConfig,
}

impl MockStage {
    /// Create a stage at 0.0 with instant motion.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Create a stage from configuration.
    pub fn with_config(config: MockStageConfig) -> Self {
        Self::builder()
            .initial_position(config.initial_position)
            .speed(config.speed_um_per_sec)
            .build()
    }

    /// Create a builder for configuring MockStage
    pub fn builder() -> MockStageBuilder {
        MockStageBuilder::new()
    }

    /// Completed absolute move targets, oldest first.
    pub fn history(&self) -> Vec<f64> {
        self.state.lock().history.clone()
    }

    /// Velocity of the last continuous move (0.0 when stopped).
    pub fn velocity(&self) -> f64 {
        self.state.lock().velocity
    }

    fn motion_duration(&self, distance: f64) -> Duration {
        if !self.mode.simulates_timing() || self.speed <= 0.0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(distance.abs() / self.speed) + self.timing.settling()
    }
}

impl Default for MockStage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Movable for MockStage {
    async fn move_abs(&self, target: f64) -> Result<()> {
        self.error_config.check_operation(DRIVER_TYPE, "move")?;

        let target = match &self.limits {
            Some(limits) => limits.enforce(target)?,
            None => target,
        };

        let current = self.state.lock().position;
        tracing::debug!(from = current, to = target, "MockStage: moving");

        let duration = self.motion_duration(target - current);
        if !duration.is_zero() {
            sleep(duration).await;
        }

        let mut state = self.state.lock();
        state.position = target;
        state.velocity = 0.0;
        state.history.push(target);
        Ok(())
    }

    async fn position(&self) -> Result<f64> {
        self.error_config.check_operation(DRIVER_TYPE, "position")?;
        Ok(self.state.lock().position)
    }

    async fn move_velocity(&self, velocity: f64) -> Result<()> {
        self.error_config.check_operation(DRIVER_TYPE, "move_velocity")?;
        tracing::debug!(velocity, "MockStage: continuous move");
        self.state.lock().velocity = velocity;
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.state.lock().velocity = 0.0;
        tracing::debug!("MockStage: stop");
        Ok(())
    }
}

/// Builder for MockStage with fluent API
pub struct MockStageBuilder {
    initial_position: f64,
    speed: f64,
    limits: Option<StageLimits>,
    timing: TimingConfig,
    mode: MockMode,
    error_config: ErrorConfig,
}

impl MockStageBuilder {
    /// Create a new builder with defaults
    pub fn new() -> Self {
        Self {
            initial_position: 0.0,
            speed: default_speed(),
            limits: None,
            timing: TimingConfig::stage(),
            mode: MockMode::Instant,
            error_config: ErrorConfig::none(),
        }
    }

    /// Set initial position
    pub fn initial_position(mut self, position: f64) -> Self {
        self.initial_position = position;
        self
    }

    /// Set speed in units per second
    pub fn speed(mut self, speed: f64) -> Self {
        self.speed = speed;
        self
    }

    /// Set travel limits
    pub fn limits(mut self, limits: StageLimits) -> Self {
        self.limits = Some(limits);
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

    /// Build the MockStage
    pub fn build(self) -> MockStage {
        MockStage {
            state: Mutex::new(StageState {
                position: self.initial_position,
                velocity: 0.0,
                history: Vec::new(),
            }),
            speed: self.speed,
            limits: self.limits,
            timing: self.timing,
            mode: self.mode,
            error_config: self.error_config,
        }
    }
}

impl Default for MockStageBuilder {
    fn default() -> Self {
        Self::new()
    }
}
