//! Mock dual-axis (XY) stage.

use anyhow::Result;
use async_trait::async_trait;
use daq_core::capabilities::XYStageDevice;
use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::sleep;

use crate::common::{ErrorConfig, MockMode, TimingConfig};
use crate::mock_stage::StageLimits;

const DRIVER_TYPE: &str = "mock_xy_stage";

#[derive(Debug, Default)]
struct XYState {
    x: f64,
    y: f64,
    velocity: (f64, f64),
    history: Vec<(f64, f64)>,
}

/// Mock XY stage.
///
/// Both axes move together at `speed` along the longer of the two travels.
/// Optional limits apply to each axis independently.
pub struct MockXYStage {
    state: Mutex<XYState>,
    speed: f64,
    limits: Option<StageLimits>,
    timing: TimingConfig,
    mode: MockMode,
    error_config: ErrorConfig,
}

impl MockXYStage {
    /// Stage at the origin with instant motion.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(XYState::default()),
            speed: 5000.0,
            limits: None,
            timing: TimingConfig::stage(),
            mode: MockMode::Instant,
            error_config: ErrorConfig::none(),
        }
    }

    /// Set operational mode.
    pub fn with_mode(mut self, mode: MockMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set per-axis limits.
    pub fn with_limits(mut self, limits: StageLimits) -> Self {
        self.limits = Some(limits);
        self
    }

    /// Set error injection.
    pub fn with_error_config(mut self, config: ErrorConfig) -> Self {
        self.error_config = config;
        self
    }

    /// Completed moves, oldest first.
    pub fn history(&self) -> Vec<(f64, f64)> {
        self.state.lock().history.clone()
    }

    /// Velocity of the last continuous move.
    pub fn velocity(&self) -> (f64, f64) {
        self.state.lock().velocity
    }
}

impl Default for MockXYStage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl XYStageDevice for MockXYStage {
    async fn set_xy(&self, x: f64, y: f64) -> Result<()> {
        self.error_config.check_operation(DRIVER_TYPE, "move")?;

        let (x, y) = match &self.limits {
            Some(limits) => (limits.enforce(x)?, limits.enforce(y)?),
            None => (x, y),
        };

        let (dx, dy) = {
            let state = self.state.lock();
            (x - state.x, y - state.y)
        };
        tracing::debug!(x, y, "MockXYStage: moving");

        if self.mode.simulates_timing() && self.speed > 0.0 {
            let travel = dx.abs().max(dy.abs());
            sleep(Duration::from_secs_f64(travel / self.speed) + self.timing.settling()).await;
        }

        let mut state = self.state.lock();
        state.x = x;
        state.y = y;
        state.velocity = (0.0, 0.0);
        state.history.push((x, y));
        Ok(())
    }

    async fn xy(&self) -> Result<(f64, f64)> {
        self.error_config.check_operation(DRIVER_TYPE, "position")?;
        let state = self.state.lock();
        Ok((state.x, state.y))
    }

    async fn move_velocity(&self, vx: f64, vy: f64) -> Result<()> {
        self.error_config.check_operation(DRIVER_TYPE, "move_velocity")?;
        self.state.lock().velocity = (vx, vy);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::common::ErrorScenario;

    #[tokio::test]
    async fn test_xy_move_and_history() {
        let stage = MockXYStage::new();
        stage.set_xy(100.0, -50.0).await.unwrap();
        stage.set_xy(0.0, 0.0).await.unwrap();
        assert_eq!(stage.xy().await.unwrap(), (0.0, 0.0));
        assert_eq!(stage.history(), vec![(100.0, -50.0), (0.0, 0.0)]);
    }

    #[tokio::test]
    async fn test_xy_limits_per_axis() {
        let stage = MockXYStage::new().with_limits(StageLimits::clamp(-10.0, 10.0));
        stage.set_xy(20.0, -20.0).await.unwrap();
        assert_eq!(stage.xy().await.unwrap(), (10.0, -10.0));
    }

    #[tokio::test]
    async fn test_xy_velocity() {
        let stage = MockXYStage::new();
        stage.move_velocity(1.0, -1.0).await.unwrap();
        assert_eq!(stage.velocity(), (1.0, -1.0));
    }

    #[tokio::test]
    async fn test_xy_injected_timeout() {
        let stage = MockXYStage::new()
            .with_error_config(ErrorConfig::scenario(ErrorScenario::Timeout { operation: "move" }));
        assert!(stage.set_xy(1.0, 1.0).await.is_err());
        assert!(stage.history().is_empty());
    }
}
