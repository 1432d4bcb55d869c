//! Expansion of [`AcquisitionSettings`] into an ordered list of steps.
//!
//! The outer level combines time points and positions, the inner level
//! combines slices and channels. Each level nests one axis inside the other
//! according to its ordering flag; an unconfigured axis contributes a single
//! absent entry so the nesting collapses naturally.

use crate::settings::AcquisitionSettings;
use crate::step::{AcquisitionStep, AxisEntry};

/// Pure expansion of settings into steps.
#[derive(Debug, Clone, Copy)]
pub struct AcquisitionSequencer<'a> {
    settings: &'a AcquisitionSettings,
}

#[derive(Clone, Copy)]
struct TimePoint {
    index: usize,
    wait_ms: f64,
}

impl<'a> AcquisitionSequencer<'a> {
    /// Sequencer over `settings`.
    pub fn new(settings: &'a AcquisitionSettings) -> Self {
        Self { settings }
    }

    /// Generate every step, in execution order.
    pub fn generate(&self) -> Vec<AcquisitionStep> {
        let s = self.settings;
        let mut steps = Vec::with_capacity(s.num_frames());

        let times: Vec<Option<TimePoint>> = axis(&s.time_intervals_ms, |index, &wait_ms| {
            TimePoint { index, wait_ms }
        });
        let positions = axis(&s.positions, |index, p| AxisEntry::new(index, p.clone()));

        if s.positions_first {
            for position in &positions {
                for time in &times {
                    let wait_ms = time.map(|t| t.wait_ms);
                    self.sub_sequence(*time, wait_ms, position.as_ref(), &mut steps);
                }
            }
        } else {
            // One wait per time point, before its first position.
            for time in &times {
                for (i, position) in positions.iter().enumerate() {
                    let wait_ms = time.filter(|_| i == 0).map(|t| t.wait_ms);
                    self.sub_sequence(*time, wait_ms, position.as_ref(), &mut steps);
                }
            }
        }
        steps
    }

    /// Channel/slice steps under one (time, position) pair. `wait_ms` goes on
    /// the first of them.
    fn sub_sequence(
        &self,
        time: Option<TimePoint>,
        wait_ms: Option<f64>,
        position: Option<&AxisEntry<crate::settings::PositionBundle>>,
        out: &mut Vec<AcquisitionStep>,
    ) {
        let s = self.settings;
        let slices = axis(&s.slices, |index, &z| AxisEntry::new(index, z));
        let channels = axis(&s.channels, |index, c| AxisEntry::new(index, c.clone()));

        let first = out.len();
        let mut push = |slice: &Option<AxisEntry<f64>>, channel: &Option<AxisEntry<_>>| {
            out.push(AcquisitionStep {
                time: time.map(|t| t.index),
                wait_ms: None,
                position: position.cloned(),
                channel: channel.clone(),
                slice: slice.clone(),
            });
        };

        if s.channels_first {
            for slice in &slices {
                for channel in &channels {
                    push(slice, channel);
                }
            }
        } else {
            for channel in &channels {
                for slice in &slices {
                    push(slice, channel);
                }
            }
        }

        if let Some(step) = out.get_mut(first) {
            step.wait_ms = wait_ms;
        }
    }
}

/// `[Some(entry)..]` for a configured axis, `[None]` otherwise.
fn axis<T, E>(items: &[T], entry: impl Fn(usize, &T) -> E) -> Vec<Option<E>> {
    if items.is_empty() {
        vec![None]
    } else {
        items
            .iter()
            .enumerate()
            .map(|(i, item)| Some(entry(i, item)))
            .collect()
    }
}
