//! Named configuration presets.
//!
//! A group (e.g. `"Channel"`) holds presets (e.g. `"DAPI"`, `"FITC"`); each
//! preset is an ordered list of device property writes. Presets are applied
//! through the [`Settable`](daq_core::capabilities::Settable) capability by
//! the [`DeviceRegistry`](crate::DeviceRegistry).
//!
//! # TOML format
//!
//! ```toml
//! [[Channel.DAPI]]
//! device = "Wheel"
//! property = "State"
//! value = 1
//!
//! [[Channel.DAPI]]
//! device = "Shutter"
//! property = "State"
//! value = "Open"
//! ```

use daq_core::DaqError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One property write of a preset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertySetting {
    /// Label of a registered device with the `Settable` capability.
    pub device: String,
    /// Property name on that device.
    pub property: String,
    /// Value to write.
    pub value: serde_json::Value,
}

impl PropertySetting {
    /// Create a property setting.
    pub fn new(
        device: impl Into<String>,
        property: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        Self {
            device: device.into(),
            property: property.into(),
            value: value.into(),
        }
    }
}

/// Group → preset → property writes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigPresets {
    groups: BTreeMap<String, BTreeMap<String, Vec<PropertySetting>>>,
}

impl ConfigPresets {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a table from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, DaqError> {
        toml::from_str(text)
            .map_err(|e| DaqError::Configuration(format!("Invalid preset table: {e}")))
    }

    /// Define (or replace) preset `name` of `group`.
    pub fn define(
        &mut self,
        group: impl Into<String>,
        name: impl Into<String>,
        settings: Vec<PropertySetting>,
    ) {
        self.groups
            .entry(group.into())
            .or_default()
            .insert(name.into(), settings);
    }

    /// Append one property write to preset `name` of `group`, creating it if needed.
    pub fn add_setting(
        &mut self,
        group: impl Into<String>,
        name: impl Into<String>,
        setting: PropertySetting,
    ) {
        self.groups
            .entry(group.into())
            .or_default()
            .entry(name.into())
            .or_default()
            .push(setting);
    }

    /// Property writes of preset `name` in `group`.
    pub fn preset(&self, group: &str, name: &str) -> Result<&[PropertySetting], DaqError> {
        let presets = self
            .groups
            .get(group)
            .ok_or_else(|| DaqError::Configuration(format!("Unknown config group '{group}'")))?;
        presets.get(name).map(Vec::as_slice).ok_or_else(|| {
            DaqError::Configuration(format!("Unknown preset '{name}' in group '{group}'"))
        })
    }

    /// True if `group` is defined.
    pub fn contains_group(&self, group: &str) -> bool {
        self.groups.contains_key(group)
    }

    /// Group names, sorted.
    pub fn groups(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    /// Preset names of `group`, sorted. Empty for an unknown group.
    pub fn presets(&self, group: &str) -> Vec<&str> {
        self.groups
            .get(group)
            .map(|p| p.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Every device label referenced by any preset.
    pub fn referenced_devices(&self) -> impl Iterator<Item = &str> {
        self.groups
            .values()
            .flat_map(|presets| presets.values())
            .flatten()
            .map(|s| s.device.as_str())
    }

    /// True if no group is defined.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}
