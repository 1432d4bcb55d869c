//! Mock state device (filter wheel, shutter, light path) with named properties.

use crate::common::{ErrorConfig, MockMode, TimingConfig};
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use daq_core::capabilities::Settable;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use tokio::time::sleep;

const DRIVER_TYPE: &str = "mock_state_device";

#[derive(Debug, Default)]
struct PropertyState {
    values: HashMap<String, Value>,
    /// Every accepted write, oldest first
    log: Vec<(String, Value)>,
}

/// Mock device with named properties.
///
/// Properties declared with [`MockStateDevice::with_property`] exist from the
/// start; writing an undeclared property fails unless the device was built
/// with [`MockStateDevice::accept_any`]. Properties restricted with
/// [`MockStateDevice::with_allowed`] reject values outside their list.
pub struct MockStateDevice {
    label: String,
    state: Mutex<PropertyState>,
    allowed: HashMap<String, Vec<Value>>,
    accept_any: bool,
    timing: TimingConfig,
    mode: MockMode,
    error_config: ErrorConfig,
}

impl MockStateDevice {
    /// Device without properties.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            state: Mutex::new(PropertyState::default()),
            allowed: HashMap::new(),
            accept_any: false,
            timing: TimingConfig::state_device(),
            mode: MockMode::Instant,
            error_config: ErrorConfig::none(),
        }
    }

    /// Declare a property with its initial value.
    pub fn with_property(self, name: impl Into<String>, initial: Value) -> Self {
        self.state.lock().values.insert(name.into(), initial);
        self
    }

    /// Restrict a property to a set of values.
    pub fn with_allowed(mut self, name: impl Into<String>, values: Vec<Value>) -> Self {
        self.allowed.insert(name.into(), values);
        self
    }

    /// Create properties on first write instead of rejecting them.
    pub fn accept_any(mut self) -> Self {
        self.accept_any = true;
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

    /// Device label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Accepted writes, oldest first.
    pub fn write_log(&self) -> Vec<(String, Value)> {
        self.state.lock().log.clone()
    }
}

#[async_trait]
impl Settable for MockStateDevice {
    async fn set_value(&self, name: &str, value: Value) -> Result<()> {
        self.error_config.check_operation(DRIVER_TYPE, "set_value")?;

        if let Some(allowed) = self.allowed.get(name) {
            if !allowed.contains(&value) {
                bail!("{}: value {} not allowed for '{}'", self.label, value, name);
            }
        }
        if !self.accept_any && !self.state.lock().values.contains_key(name) {
            bail!("{}: unknown property '{}'", self.label, name);
        }

        if self.mode.simulates_timing() {
            sleep(self.timing.settling()).await;
        }

        tracing::debug!(device = %self.label, property = name, %value, "MockStateDevice: set");
        let mut state = self.state.lock();
        state.values.insert(name.to_string(), value.clone());
        state.log.push((name.to_string(), value));
        Ok(())
    }

    async fn get_value(&self, name: &str) -> Result<Value> {
        self.error_config.check_operation(DRIVER_TYPE, "get_value")?;
        self.state
            .lock()
            .values
            .get(name)
            .cloned()
            .ok_or_else(|| anyhow!("{}: unknown property '{}'", self.label, name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_declared_property_roundtrip() {
        let wheel = MockStateDevice::new("Wheel").with_property("State", json!(0));
        wheel.set_value("State", json!(3)).await.unwrap();
        assert_eq!(wheel.get_value("State").await.unwrap(), json!(3));
        assert_eq!(wheel.write_log(), vec![("State".to_string(), json!(3))]);
    }

    #[tokio::test]
    async fn test_unknown_property_rejected() {
        let wheel = MockStateDevice::new("Wheel");
        assert!(wheel.set_value("State", json!(1)).await.is_err());
        assert!(wheel.get_value("State").await.is_err());

        let open = MockStateDevice::new("Any").accept_any();
        open.set_value("State", json!(1)).await.unwrap();
        assert_eq!(open.get_value("State").await.unwrap(), json!(1));
    }

    #[tokio::test]
    async fn test_allowed_values() {
        let shutter = MockStateDevice::new("Shutter")
            .with_property("State", json!("Closed"))
            .with_allowed("State", vec![json!("Open"), json!("Closed")]);
        shutter.set_value("State", json!("Open")).await.unwrap();
        assert!(shutter.set_value("State", json!("Ajar")).await.is_err());
        assert_eq!(shutter.get_value("State").await.unwrap(), json!("Open"));
    }
}
