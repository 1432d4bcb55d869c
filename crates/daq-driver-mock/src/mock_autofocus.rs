//! Mock autofocus that drives an attached focus stage to a known best plane.

use crate::common::{ErrorConfig, MockMode, MockRng, TimingConfig};
use anyhow::Result;
use async_trait::async_trait;
use daq_core::capabilities::{Autofocus, Movable};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::time::sleep;

const DRIVER_TYPE: &str = "mock_autofocus";

/// Mock autofocus.
///
/// When attached to a focus drive, `full_focus` moves it to `best_position`.
/// `focus_score` falls off with distance from that plane and carries a
/// little seeded noise.
pub struct MockAutofocus {
    focus: Option<Arc<dyn Movable>>,
    best_position: f64,
    calls: AtomicU32,
    rng: MockRng,
    timing: TimingConfig,
    mode: MockMode,
    error_config: ErrorConfig,
}

impl MockAutofocus {
    /// Autofocus with no attached drive; searches succeed without moving anything.
    pub fn new() -> Self {
        Self {
            focus: None,
            best_position: 0.0,
            calls: AtomicU32::new(0),
            rng: MockRng::new(Some(7)),
            timing: TimingConfig::autofocus(),
            mode: MockMode::Instant,
            error_config: ErrorConfig::none(),
        }
    }

    /// Attach a focus drive and the plane it should settle on.
    pub fn with_focus_drive(mut self, focus: Arc<dyn Movable>, best_position: f64) -> Self {
        self.focus = Some(focus);
        self.best_position = best_position;
        self
    }

    /// Set operational mode.
    pub fn with_mode(mut self, mode: MockMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set error injection.
    pub fn with_error_config(mut self, config: ErrorConfig) -> Self {
        self.error_config = config;
        self
    }

    /// Searches attempted so far, failed ones included.
    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockAutofocus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Autofocus for MockAutofocus {
    async fn full_focus(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.error_config.check_operation(DRIVER_TYPE, "full_focus")?;

        if self.mode.simulates_timing() {
            sleep(self.timing.settling()).await;
        }
        if let Some(focus) = &self.focus {
            focus.move_abs(self.best_position).await?;
        }
        tracing::debug!(best = self.best_position, "MockAutofocus: focus found");
        Ok(())
    }

    async fn focus_score(&self) -> Result<f64> {
        let distance = match &self.focus {
            Some(focus) => (focus.position().await? - self.best_position).abs(),
            None => 0.0,
        };
        Ok(1.0 / (1.0 + distance) + self.rng.noise(0.001))
    }
}
