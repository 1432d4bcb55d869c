//! Error injection framework for mock devices.
//!
//! Lets tests make a stage move, a preset switch or a snap fail at a precise
//! call so the acquisition engine's abort path can be exercised. Failures are
//! reported as daq-core [`DriverError`]s.

use super::rng::MockRng;
use daq_core::error::{DriverError, DriverErrorKind};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// One way a mock device can fail.
#[derive(Debug, Clone)]
pub enum ErrorScenario {
    /// Succeed `count` times, then fail every further call of `operation`
    FailAfterN {
        /// Operation name, e.g. `"move"` or `"snap"`
        operation: &'static str,
        /// Successful calls before failures start
        count: u32,
    },
    /// Fail only the `call`-th call (1-based) of `operation`
    FailOnCall {
        /// Operation name
        operation: &'static str,
        /// Call number that fails
        call: u32,
    },
    /// Every call of `operation` times out
    Timeout {
        /// Operation name
        operation: &'static str,
    },
    /// First call of anything loses communication; all later calls fail too
    CommunicationLoss,
    /// First call of anything latches a hardware fault
    HardwareFault {
        /// Vendor fault code
        code: u32,
    },
}

#[derive(Default, Debug)]
struct ErrorState {
    /// Calls seen per operation
    operation_counts: HashMap<&'static str, u32>,
    communication_lost: bool,
    /// Latched fault code (0 = no fault)
    hardware_fault_code: u32,
}

/// Error injection configuration for mock devices.
///
/// Clones share state, so a test can keep a handle and inspect call counts
/// after giving the config to a device.
#[derive(Clone, Debug)]
pub struct ErrorConfig {
    /// Per-operation failure rate (0.0 to 1.0), `"*"` for all operations
    failure_rates: Arc<HashMap<&'static str, f64>>,
    scenarios: Arc<Vec<ErrorScenario>>,
    rng: Arc<MockRng>,
    state: Arc<Mutex<ErrorState>>,
}

impl ErrorConfig {
    fn build(rates: HashMap<&'static str, f64>, scenarios: Vec<ErrorScenario>, seed: Option<u64>) -> Self {
        Self {
            failure_rates: Arc::new(rates),
            scenarios: Arc::new(scenarios),
            rng: Arc::new(MockRng::new(seed)),
            state: Arc::new(Mutex::new(ErrorState::default())),
        }
    }

    /// Never fail.
    pub fn none() -> Self {
        Self::build(HashMap::new(), Vec::new(), None)
    }

    /// Fail any operation with probability `rate`, reproducibly for a given seed.
    pub fn random_failures_seeded(rate: f64, seed: Option<u64>) -> Self {
        Self::build(HashMap::from([("*", rate)]), Vec::new(), seed)
    }

    /// Single scenario.
    pub fn scenario(scenario: ErrorScenario) -> Self {
        Self::scenarios(vec![scenario])
    }

    /// Several scenarios, checked in order.
    pub fn scenarios(scenarios: Vec<ErrorScenario>) -> Self {
        Self::build(HashMap::new(), scenarios, None)
    }

    /// Custom failure rate per operation.
    pub fn with_rates(rates: HashMap<&'static str, f64>) -> Self {
        Self::build(rates, Vec::new(), None)
    }

    /// Count a call of `operation` and decide whether it fails.
    pub fn check_operation(
        &self,
        driver_type: &str,
        operation: &'static str,
    ) -> Result<(), DriverError> {
        let mut state = self.state.lock();

        let calls = {
            let counter = state.operation_counts.entry(operation).or_insert(0);
            *counter += 1;
            *counter
        };

        if state.communication_lost {
            return Err(DriverError::new(
                driver_type,
                DriverErrorKind::Communication,
                "Communication lost",
            ));
        }
        if state.hardware_fault_code != 0 {
            return Err(DriverError::new(
                driver_type,
                DriverErrorKind::Hardware,
                format!("Hardware fault: {}", state.hardware_fault_code),
            ));
        }

        for scenario in self.scenarios.iter() {
            match scenario {
                ErrorScenario::FailAfterN {
                    operation: op,
                    count,
                } if *op == operation && calls > *count => {
                    return Err(DriverError::new(
                        driver_type,
                        DriverErrorKind::Hardware,
                        format!("Injected '{operation}' failure after {count} calls"),
                    ));
                }
                ErrorScenario::FailOnCall {
                    operation: op,
                    call,
                } if *op == operation && calls == *call => {
                    return Err(DriverError::new(
                        driver_type,
                        DriverErrorKind::Hardware,
                        format!("Injected '{operation}' failure on call {call}"),
                    ));
                }
                ErrorScenario::Timeout { operation: op } if *op == operation => {
                    return Err(DriverError::new(
                        driver_type,
                        DriverErrorKind::Timeout,
                        format!("Operation '{operation}' timed out"),
                    ));
                }
                ErrorScenario::CommunicationLoss => {
                    state.communication_lost = true;
                    return Err(DriverError::new(
                        driver_type,
                        DriverErrorKind::Communication,
                        "Communication lost",
                    ));
                }
                ErrorScenario::HardwareFault { code } => {
                    state.hardware_fault_code = *code;
                    return Err(DriverError::new(
                        driver_type,
                        DriverErrorKind::Hardware,
                        format!("Hardware fault: {code}"),
                    ));
                }
                _ => {}
            }
        }

        let rate = self
            .failure_rates
            .get(operation)
            .or_else(|| self.failure_rates.get("*"))
            .copied()
            .unwrap_or(0.0);
        if self.rng.should_fail(rate) {
            return Err(DriverError::new(
                driver_type,
                DriverErrorKind::Hardware,
                format!("Random failure on operation '{operation}'"),
            ));
        }

        Ok(())
    }

    /// Calls of `operation` seen so far, failed ones included.
    pub fn operation_count(&self, operation: &str) -> u32 {
        self.state
            .lock()
            .operation_counts
            .get(operation)
            .copied()
            .unwrap_or(0)
    }

    /// Clear counters and latched faults.
    pub fn reset(&self) {
        *self.state.lock() = ErrorState::default();
    }
}

impl Default for ErrorConfig {
    fn default() -> Self {
        Self::none()
    }
}
