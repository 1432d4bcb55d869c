//! Simulated microscope assembled from mock devices.
//!
//! The rig always has a camera, a focus drive (`"Z"`) and an autofocus unit.
//! Stages named by the acquisition's positions and devices named by the
//! preset table are created on demand so any configuration can be run
//! without hardware.

use crate::config::AppConfig;
use daq_core::{DaqError, HardwareBoundary, ImageShape};
use daq_driver_mock::{MockAutofocus, MockCamera, MockStage, MockStateDevice, MockXYStage};
use daq_hardware::{DeviceComponents, DeviceRegistry};
use daq_storage::CircularFrameBuffer;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Label of the focus drive.
pub const FOCUS_LABEL: &str = "Z";
/// Label of the autofocus unit.
pub const AUTOFOCUS_LABEL: &str = "Autofocus";

/// Registry of mock devices plus the buffer it inserts into.
pub struct MockRig {
    registry: Arc<DeviceRegistry>,
    buffer: Arc<CircularFrameBuffer>,
    camera: Arc<MockCamera>,
    focus: Arc<MockStage>,
    shape: ImageShape,
    channels: u32,
}

impl MockRig {
    /// Build the rig described by `config`.
    pub fn from_config(config: &AppConfig) -> Result<Self, DaqError> {
        let mode = config.hardware.mode;
        let buffer = Arc::new(CircularFrameBuffer::new(config.buffer.memory_mb));
        let mut registry = DeviceRegistry::new(Arc::clone(&buffer));

        let cam = &config.camera;
        let shape = ImageShape::new(cam.width, cam.height, cam.depth);
        let camera = Arc::new(
            MockCamera::builder()
                .label(cam.label.clone())
                .shape(shape)
                .components(cam.components)
                .channels(cam.channels)
                .exposure_ms(cam.exposure_ms)
                .mode(mode)
                .build(),
        );
        registry.register(cam.label.clone(), DeviceComponents::new().camera(camera.clone()))?;

        let focus_cfg = &config.hardware.focus;
        let focus = Arc::new(
            MockStage::builder()
                .initial_position(focus_cfg.initial_position)
                .speed(focus_cfg.speed_um_per_sec)
                .mode(mode)
                .build(),
        );
        registry.register(FOCUS_LABEL, DeviceComponents::new().movable(focus.clone()))?;
        registry.set_focus_device(FOCUS_LABEL)?;

        let autofocus = MockAutofocus::new()
            .with_focus_drive(focus.clone(), config.hardware.autofocus_best_position)
            .with_mode(mode);
        registry.register(
            AUTOFOCUS_LABEL,
            DeviceComponents::new().autofocus(Arc::new(autofocus)),
        )?;

        let mut stages = BTreeSet::new();
        let mut xy_stages = BTreeSet::new();
        for pos in &config.acquisition.positions {
            stages.extend(pos.stages.iter().map(|s| s.stage.as_str()));
            xy_stages.extend(pos.xy.iter().map(|c| c.stage.as_str()));
        }
        for label in stages {
            if !registry.contains(label) {
                debug!(stage = label, "Adding simulated stage");
                let stage = MockStage::builder().mode(mode).build();
                registry.register(label, DeviceComponents::new().movable(Arc::new(stage)))?;
            }
        }
        for label in xy_stages {
            if !registry.contains(label) {
                debug!(stage = label, "Adding simulated XY stage");
                let stage = MockXYStage::new().with_mode(mode);
                registry.register(label, DeviceComponents::new().xy_stage(Arc::new(stage)))?;
            }
        }

        let preset_devices: BTreeSet<&str> = config.presets.referenced_devices().collect();
        for label in preset_devices {
            if !registry.contains(label) {
                let device = MockStateDevice::new(label).accept_any().with_mode(mode);
                registry.register(label, DeviceComponents::new().settable(Arc::new(device)))?;
            }
        }
        registry.set_presets(config.presets.clone())?;

        info!(devices = registry.len(), ?mode, "Simulated rig ready");
        Ok(Self {
            registry: Arc::new(registry),
            buffer,
            camera,
            focus,
            shape,
            channels: cam.channels,
        })
    }

    /// The registry as the boundary the runner drives.
    pub fn hardware(&self) -> Arc<dyn HardwareBoundary> {
        self.registry.clone()
    }

    /// Device registry.
    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    /// Frame buffer the registry inserts into.
    pub fn buffer(&self) -> Arc<CircularFrameBuffer> {
        Arc::clone(&self.buffer)
    }

    /// Simulated camera.
    pub fn camera(&self) -> &MockCamera {
        &self.camera
    }

    /// Simulated focus drive.
    pub fn focus(&self) -> &MockStage {
        &self.focus
    }

    /// Size the buffer for the camera's images.
    pub fn initialize_buffer(&self) -> Result<(), DaqError> {
        self.registry
            .initialize_image_buffer(self.channels, self.shape)
    }
}
