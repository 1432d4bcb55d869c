//! Device registry behind the acquisition hardware boundary.
//!
//! [`DeviceRegistry`] holds capability trait objects by label, tracks which
//! devices play the focus, camera and autofocus roles, applies
//! [`ConfigPresets`] through `Settable` devices and forwards image inserts to
//! the shared frame buffer. It is the production [`HardwareBoundary`].

pub use daq_core::capabilities;
pub use daq_core::HardwareBoundary;

pub mod presets;
pub mod registry;

pub use presets::{ConfigPresets, PropertySetting};
pub use registry::{Capability, CoreRoles, DeviceComponents, DeviceId, DeviceInfo, DeviceRegistry};
