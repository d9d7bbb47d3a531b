//! # Device Core - Media Device List Reconciliation
//!
//! This crate keeps, for every media backend and data flow (capture,
//! playback, notify, video), three things in sync:
//!
//! - **active devices**: what the backend reports as plugged in right now
//! - **preferences**: every device the user has ever had, in preference order,
//!   persisted across runs
//! - **selection**: the most preferred device that is currently plugged in
//!
//! Hotplug notifications, user choices and periodic reads can arrive from
//! different threads; each flow is guarded by its own lock so a selection is
//! never computed from a half-updated list.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rvoip_device_core::{DataFlow, DeviceConfig, DeviceRegistry, NoNativeBackends};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = DeviceConfig::new().with_preferences_path("devices.json");
//!     let registry = Arc::new(DeviceRegistry::new(config)?);
//!     registry.initialize(&NoNativeBackends)?;
//!     registry.start_hotplug_listener()?;
//!
//!     for system in registry.systems() {
//!         println!("{}: {:?}", system.protocol(), system.selected_device(DataFlow::Capture));
//!     }
//!
//!     registry.teardown();
//!     Ok(())
//! }
//! ```
//!
//! ## Selection rules
//!
//! 1. The selected device is the first preference name with an active device;
//!    among same-named devices the name's UID order decides, else the first
//!    one enumerated.
//! 2. A `"none"` preference ahead of all active devices selects nothing.
//! 3. New devices go to the end of the preferences, except on a fresh list
//!    where wired devices go to the front.
//! 4. Choosing a device moves it to the front.

pub mod backend;
pub mod config;
pub mod device;
pub mod error;
pub mod events;
pub mod flow;
pub mod logging;
pub mod manager;
pub mod preferences;
pub mod registry;
pub mod store;
pub mod system;

// Re-export main types
pub use backend::{
    BackendFactory, BackendFeatures, BackendKind, DeviceBackend, DeviceSnapshot, HotplugNotifier, NoNativeBackends,
    NoneBackend, StaticBackend,
};
pub use config::DeviceConfig;
pub use device::{Device, DeviceAudioFormat, DeviceCapabilities, MediaLocator, MediaType, TransportType};
pub use error::{DeviceError, DeviceResult};
pub use events::{DeviceEvent, EventIterator, EventStream};
pub use flow::DataFlow;
pub use manager::{DeviceListManager, KnownDevice, LoadState, SelectionObserver};
pub use preferences::{DevicePreferences, SaveMode};
pub use registry::DeviceRegistry;
pub use store::{FilePreferenceStore, MemoryPreferenceStore, PreferenceStore};
pub use system::DeviceSystem;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
