//! Device Registry for the acquisition hardware boundary
//!
//! The registry owns every device as a set of capability trait objects and the
//! shared [`CircularFrameBuffer`]. It implements [`HardwareBoundary`], so the
//! acquisition engine only ever talks to devices through it:
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                     DeviceRegistry                        │
//! │  roles: focus / camera / autofocus   presets   buffer     │
//! ├───────────────────────────────────────────────────────────┤
//! │                   Capability Traits                       │
//! │  Movable | XYStageDevice | Camera | Autofocus | Settable  │
//! │  SerialTransport                                          │
//! ├───────────────────────────────────────────────────────────┤
//! │              Drivers (mock or vendor adapters)            │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! Devices are registered during setup (`&mut self`); afterwards the registry
//! is shared behind an `Arc` and only the applied-preset map changes. No
//! registry lock is ever held across a device call.
//!
//! # Example Usage
//!
//! ```rust,ignore
//! let mut registry = DeviceRegistry::new(buffer);
//! registry.register("Z", DeviceComponents::new().movable(z))?;
//! registry.register("Camera", DeviceComponents::new().camera(camera))?;
//! registry.set_focus_device("Z")?;
//!
//! let hw: Arc<dyn HardwareBoundary> = Arc::new(registry);
//! hw.set_focus_position(12.0).await?;
//! ```

use crate::presets::ConfigPresets;
use anyhow::Result;
use async_trait::async_trait;
use daq_core::capabilities::{
    Autofocus, Camera, ConfigSwitchable, Movable, SerialTransport, Settable, SnappedImage,
    XYStageDevice,
};
use daq_core::{DaqError, HardwareBoundary, ImageShape, InsertOutcome, Metadata};
use daq_storage::CircularFrameBuffer;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::instrument;

/// Unique device label (e.g. "Z", "XY", "Camera").
pub type DeviceId = String;

/// Capabilities a device can have (for introspection)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Capability {
    /// Single-axis motion (focus drives, linear stages)
    Movable,
    /// Dual-axis motion
    XYStage,
    /// Snap plus exposure control
    Camera,
    /// Full autofocus search
    Autofocus,
    /// Named properties (filter wheels, shutters)
    Settable,
    /// Opaque serial byte stream
    Serial,
}

/// Capability trait objects a driver provides for one device.
///
/// Unset capabilities stay `None`; a device must provide at least one.
#[derive(Clone, Default)]
pub struct DeviceComponents {
    /// Single-axis motion
    pub movable: Option<Arc<dyn Movable>>,
    /// Dual-axis motion
    pub xy_stage: Option<Arc<dyn XYStageDevice>>,
    /// Camera
    pub camera: Option<Arc<dyn Camera>>,
    /// Autofocus
    pub autofocus: Option<Arc<dyn Autofocus>>,
    /// Named properties
    pub settable: Option<Arc<dyn Settable>>,
    /// Serial port
    pub serial: Option<Arc<dyn SerialTransport>>,
}

impl DeviceComponents {
    /// No capabilities.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add single-axis motion.
    pub fn movable(mut self, device: Arc<dyn Movable>) -> Self {
        self.movable = Some(device);
        self
    }

    /// Add dual-axis motion.
    pub fn xy_stage(mut self, device: Arc<dyn XYStageDevice>) -> Self {
        self.xy_stage = Some(device);
        self
    }

    /// Add camera.
    pub fn camera(mut self, device: Arc<dyn Camera>) -> Self {
        self.camera = Some(device);
        self
    }

    /// Add autofocus.
    pub fn autofocus(mut self, device: Arc<dyn Autofocus>) -> Self {
        self.autofocus = Some(device);
        self
    }

    /// Add named properties.
    pub fn settable(mut self, device: Arc<dyn Settable>) -> Self {
        self.settable = Some(device);
        self
    }

    /// Add serial transport.
    pub fn serial(mut self, device: Arc<dyn SerialTransport>) -> Self {
        self.serial = Some(device);
        self
    }

    /// Capabilities present, in declaration order.
    pub fn capabilities(&self) -> Vec<Capability> {
        let mut caps = Vec::new();
        if self.movable.is_some() {
            caps.push(Capability::Movable);
        }
        if self.xy_stage.is_some() {
            caps.push(Capability::XYStage);
        }
        if self.camera.is_some() {
            caps.push(Capability::Camera);
        }
        if self.autofocus.is_some() {
            caps.push(Capability::Autofocus);
        }
        if self.settable.is_some() {
            caps.push(Capability::Settable);
        }
        if self.serial.is_some() {
            caps.push(Capability::Serial);
        }
        caps
    }
}

/// Information about a registered device (returned by list operations)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Device label
    pub id: DeviceId,
    /// Capabilities this device supports
    pub capabilities: Vec<Capability>,
}

/// Device labels currently playing the core roles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoreRoles {
    /// Focus drive used for slices
    pub focus: Option<DeviceId>,
    /// Camera used for snaps and exposure
    pub camera: Option<DeviceId>,
    /// Autofocus used when the acquisition asks for it
    pub autofocus: Option<DeviceId>,
}

/// Central registry for hardware device management
pub struct DeviceRegistry {
    devices: BTreeMap<DeviceId, DeviceComponents>,
    roles: CoreRoles,
    presets: ConfigPresets,
    /// Preset applied last, per group
    applied: Mutex<HashMap<String, String>>,
    buffer: Arc<CircularFrameBuffer>,
}

impl DeviceRegistry {
    /// Empty registry inserting into `buffer`.
    pub fn new(buffer: Arc<CircularFrameBuffer>) -> Self {
        Self {
            devices: BTreeMap::new(),
            roles: CoreRoles::default(),
            presets: ConfigPresets::new(),
            applied: Mutex::new(HashMap::new()),
            buffer,
        }
    }

    /// Shared frame buffer, for consumers.
    pub fn buffer(&self) -> Arc<CircularFrameBuffer> {
        Arc::clone(&self.buffer)
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Register a device under `id`.
    ///
    /// The first registered camera and autofocus become the current ones.
    /// The focus device is always chosen explicitly with
    /// [`set_focus_device`](Self::set_focus_device).
    pub fn register(
        &mut self,
        id: impl Into<DeviceId>,
        components: DeviceComponents,
    ) -> Result<(), DaqError> {
        let id = id.into();
        if id.is_empty() {
            return Err(DaqError::Configuration("Device label cannot be empty".into()));
        }
        if self.devices.contains_key(&id) {
            return Err(DaqError::Configuration(format!(
                "Device '{id}' is already registered"
            )));
        }
        let capabilities = components.capabilities();
        if capabilities.is_empty() {
            return Err(DaqError::Configuration(format!(
                "Device '{id}' provides no capabilities"
            )));
        }

        if components.camera.is_some() && self.roles.camera.is_none() {
            self.roles.camera = Some(id.clone());
        }
        if components.autofocus.is_some() && self.roles.autofocus.is_none() {
            self.roles.autofocus = Some(id.clone());
        }
        tracing::info!(device = %id, ?capabilities, "Registered device");
        self.devices.insert(id, components);
        Ok(())
    }

    /// Remove a device. Roles pointing at it are cleared.
    ///
    /// # Returns
    /// true if device was found and removed, false if not found
    pub fn unregister(&mut self, id: &str) -> bool {
        let removed = self.devices.remove(id).is_some();
        if removed {
            for role in [
                &mut self.roles.focus,
                &mut self.roles.camera,
                &mut self.roles.autofocus,
            ] {
                if role.as_deref() == Some(id) {
                    *role = None;
                }
            }
        }
        removed
    }

    /// Use `id` as the focus drive.
    pub fn set_focus_device(&mut self, id: &str) -> Result<(), DaqError> {
        self.movable(id)?;
        self.roles.focus = Some(id.to_string());
        Ok(())
    }

    /// Use `id` as the current camera.
    pub fn set_camera_device(&mut self, id: &str) -> Result<(), DaqError> {
        self.camera(id)?;
        self.roles.camera = Some(id.to_string());
        Ok(())
    }

    /// Use `id` as the autofocus device.
    pub fn set_autofocus_device(&mut self, id: &str) -> Result<(), DaqError> {
        self.autofocus(id)?;
        self.roles.autofocus = Some(id.to_string());
        Ok(())
    }

    /// Install the preset table.
    ///
    /// Every device the table references must already be registered with the
    /// `Settable` capability.
    pub fn set_presets(&mut self, presets: ConfigPresets) -> Result<(), DaqError> {
        for device in presets.referenced_devices() {
            self.settable(device)?;
        }
        self.presets = presets;
        self.applied.lock().clear();
        Ok(())
    }

    /// Installed preset table.
    pub fn presets(&self) -> &ConfigPresets {
        &self.presets
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// List all registered devices, sorted by label.
    pub fn list_devices(&self) -> Vec<DeviceInfo> {
        self.devices
            .iter()
            .map(|(id, d)| DeviceInfo {
                id: id.clone(),
                capabilities: d.capabilities(),
            })
            .collect()
    }

    /// Labels of every device supporting `capability`.
    pub fn devices_with_capability(&self, capability: Capability) -> Vec<DeviceId> {
        self.devices
            .iter()
            .filter(|(_, d)| d.capabilities().contains(&capability))
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Current role assignments.
    pub fn roles(&self) -> &CoreRoles {
        &self.roles
    }

    /// Check if a device is registered
    pub fn contains(&self, id: &str) -> bool {
        self.devices.contains_key(id)
    }

    /// Get count of registered devices
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Check if registry is empty
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    // =========================================================================
    // Capability Access
    // =========================================================================

    fn lookup<T: ?Sized>(
        &self,
        id: &str,
        role: &'static str,
        pick: impl Fn(&DeviceComponents) -> Option<&Arc<T>>,
    ) -> Result<Arc<T>, DaqError> {
        self.devices
            .get(id)
            .and_then(pick)
            .cloned()
            .ok_or_else(|| DaqError::DeviceNotFound {
                role,
                label: id.to_string(),
            })
    }

    fn role_label<'a>(
        label: &'a Option<DeviceId>,
        role: &'static str,
    ) -> Result<&'a str, DaqError> {
        label.as_deref().ok_or(DaqError::DeviceNotFound {
            role,
            label: String::new(),
        })
    }

    /// Get a device as Movable
    pub fn movable(&self, id: &str) -> Result<Arc<dyn Movable>, DaqError> {
        self.lookup(id, "stage", |d| d.movable.as_ref())
    }

    /// Get a device as XYStageDevice
    pub fn xy_stage(&self, id: &str) -> Result<Arc<dyn XYStageDevice>, DaqError> {
        self.lookup(id, "xy stage", |d| d.xy_stage.as_ref())
    }

    /// Get a device as Camera
    pub fn camera(&self, id: &str) -> Result<Arc<dyn Camera>, DaqError> {
        self.lookup(id, "camera", |d| d.camera.as_ref())
    }

    /// Get a device as Autofocus
    pub fn autofocus(&self, id: &str) -> Result<Arc<dyn Autofocus>, DaqError> {
        self.lookup(id, "autofocus", |d| d.autofocus.as_ref())
    }

    /// Get a device as Settable
    pub fn settable(&self, id: &str) -> Result<Arc<dyn Settable>, DaqError> {
        self.lookup(id, "settable", |d| d.settable.as_ref())
    }

    /// Get a device as SerialTransport
    pub fn serial_port(&self, id: &str) -> Result<Arc<dyn SerialTransport>, DaqError> {
        self.lookup(id, "serial port", |d| d.serial.as_ref())
    }

    /// Current focus drive.
    pub fn focus_device(&self) -> Result<Arc<dyn Movable>, DaqError> {
        self.movable(Self::role_label(&self.roles.focus, "focus")?)
    }

    /// Current camera.
    pub fn camera_device(&self) -> Result<Arc<dyn Camera>, DaqError> {
        self.camera(Self::role_label(&self.roles.camera, "camera")?)
    }

    /// Current autofocus.
    pub fn autofocus_device(&self) -> Result<Arc<dyn Autofocus>, DaqError> {
        self.autofocus(Self::role_label(&self.roles.autofocus, "autofocus")?)
    }
}

// =============================================================================
// Configuration presets
// =============================================================================

#[async_trait]
impl ConfigSwitchable for DeviceRegistry {
    #[instrument(skip(self), err)]
    async fn set_config(&self, group: &str, name: &str) -> Result<()> {
        let writes: Vec<(Arc<dyn Settable>, String, serde_json::Value)> = self
            .presets
            .preset(group, name)?
            .iter()
            .map(|s| Ok((self.settable(&s.device)?, s.property.clone(), s.value.clone())))
            .collect::<Result<_, DaqError>>()?;

        for (device, property, value) in writes {
            device.set_value(&property, value).await?;
        }
        self.applied.lock().insert(group.to_string(), name.to_string());
        tracing::debug!(group, preset = name, "Applied config preset");
        Ok(())
    }

    async fn current_config(&self, group: &str) -> Result<String> {
        if !self.presets.contains_group(group) {
            return Err(DaqError::Configuration(format!("Unknown config group '{group}'")).into());
        }
        Ok(self.applied.lock().get(group).cloned().unwrap_or_default())
    }
}

// =============================================================================
// Hardware boundary
// =============================================================================

#[async_trait]
impl HardwareBoundary for DeviceRegistry {
    #[instrument(skip(self), err)]
    async fn set_stage_position(&self, stage: &str, position: f64) -> Result<()> {
        let device = self.movable(stage)?;
        device.move_abs(position).await?;
        device.wait_settled().await
    }

    async fn stage_position(&self, stage: &str) -> Result<f64> {
        self.movable(stage)?.position().await
    }

    async fn focus_position(&self) -> Result<f64> {
        self.focus_device()?.position().await
    }

    #[instrument(skip(self), err)]
    async fn set_focus_position(&self, position: f64) -> Result<()> {
        let focus = self.focus_device()?;
        focus.move_abs(position).await?;
        focus.wait_settled().await
    }

    async fn move_focus(&self, velocity: f64) -> Result<()> {
        self.focus_device()?.move_velocity(velocity).await
    }

    async fn xy_position(&self, stage: &str) -> Result<(f64, f64)> {
        self.xy_stage(stage)?.xy().await
    }

    #[instrument(skip(self), err)]
    async fn set_xy_position(&self, stage: &str, x: f64, y: f64) -> Result<()> {
        let device = self.xy_stage(stage)?;
        device.set_xy(x, y).await?;
        device.wait_settled().await
    }

    async fn move_xy_stage(&self, stage: &str, vx: f64, vy: f64) -> Result<()> {
        self.xy_stage(stage)?.move_velocity(vx, vy).await
    }

    async fn set_exposure(&self, ms: f64) -> Result<()> {
        self.camera_device()?.set_exposure(ms).await
    }

    async fn exposure(&self) -> Result<f64> {
        self.camera_device()?.get_exposure().await
    }

    async fn snap_image(&self) -> Result<SnappedImage> {
        self.camera_device()?.snap().await
    }

    #[instrument(skip(self), err)]
    async fn full_focus(&self) -> Result<()> {
        self.autofocus_device()?.full_focus().await
    }

    async fn set_config(&self, group: &str, name: &str) -> Result<()> {
        ConfigSwitchable::set_config(self, group, name).await
    }

    async fn current_config(&self, group: &str) -> Result<String> {
        ConfigSwitchable::current_config(self, group).await
    }

    async fn write_to_serial(&self, port: &str, data: &[u8]) -> Result<()> {
        self.serial_port(port)?.write(data).await
    }

    async fn read_from_serial(&self, port: &str, max: usize) -> Result<Vec<u8>> {
        self.serial_port(port)?.read(max).await
    }

    async fn purge_serial(&self, port: &str) -> Result<()> {
        self.serial_port(port)?.purge().await
    }

    async fn set_serial_command(&self, port: &str, command: &str, terminator: &str) -> Result<()> {
        self.serial_port(port)?
            .send_command(command, terminator)
            .await
    }

    async fn get_serial_answer(&self, port: &str, terminator: &str) -> Result<String> {
        self.serial_port(port)?.read_answer(terminator).await
    }

    fn insert_image(
        &self,
        source: &str,
        pixels: &[u8],
        shape: ImageShape,
        components: u32,
        metadata: Option<&Metadata>,
    ) -> Result<InsertOutcome, DaqError> {
        self.buffer
            .insert_image(source, pixels, shape, components, metadata)
    }

    fn insert_multi_channel(
        &self,
        source: &str,
        pixels: &[u8],
        channels: u32,
        shape: ImageShape,
        components: u32,
        metadata: Option<&Metadata>,
    ) -> Result<InsertOutcome, DaqError> {
        self.buffer
            .insert_multi_channel(source, pixels, channels, shape, components, metadata)
    }

    fn initialize_image_buffer(&self, channels: u32, shape: ImageShape) -> Result<(), DaqError> {
        self.buffer.initialize(channels, shape)
    }

    fn clear_image_buffer(&self) {
        self.buffer.clear();
    }
}
