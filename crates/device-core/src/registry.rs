//! Device registry
//!
//! Holds every registered [`DeviceSystem`]. There is no global state: the
//! embedder creates a registry, initializes it once with a
//! [`BackendFactory`], and tears it down at shutdown.
//!
//! Backends report device changes through a [`HotplugNotifier`]. The
//! listener task started by [`DeviceRegistry::start_hotplug_listener`] turns
//! each notification into a coalesced rescan of the reporting system. An
//! audio rescan also schedules a delayed video rescan, since webcams usually
//! carry a microphone too.

use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backend::{BackendFactory, BackendKind, DeviceBackend, HotplugNotifier, HotplugSignal, NoneBackend};
use crate::config::DeviceConfig;
use crate::device::MediaType;
use crate::error::{DeviceError, DeviceResult};
use crate::store::{FilePreferenceStore, MemoryPreferenceStore, PreferenceStore};
use crate::system::DeviceSystem;

pub struct DeviceRegistry {
    id: Uuid,
    config: DeviceConfig,
    store: Arc<dyn PreferenceStore>,
    systems: RwLock<Vec<Arc<DeviceSystem>>>,
    hotplug_tx: mpsc::UnboundedSender<HotplugSignal>,
    hotplug_rx: Mutex<Option<mpsc::UnboundedReceiver<HotplugSignal>>>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for DeviceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceRegistry")
            .field("id", &self.id)
            .field("systems", &*self.systems.read())
            .finish()
    }
}

impl DeviceRegistry {
    /// Create a registry, opening the preference file if one is configured
    pub fn new(config: DeviceConfig) -> DeviceResult<Self> {
        config.validate()?;

        let store: Arc<dyn PreferenceStore> = match &config.preferences_path {
            Some(path) => Arc::new(FilePreferenceStore::open(path)?),
            None => Arc::new(MemoryPreferenceStore::new()),
        };

        Ok(Self::with_store(config, store))
    }

    /// Create a registry persisting preferences in `store`
    pub fn with_store(config: DeviceConfig, store: Arc<dyn PreferenceStore>) -> Self {
        let (hotplug_tx, hotplug_rx) = mpsc::unbounded_channel();
        Self {
            id: Uuid::new_v4(),
            config,
            store,
            systems: RwLock::new(Vec::new()),
            hotplug_tx,
            hotplug_rx: Mutex::new(Some(hotplug_rx)),
            listener: Mutex::new(None),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn PreferenceStore> {
        &self.store
    }

    /// Register the host platform's device systems. Kinds the factory cannot
    /// build are skipped, as are systems failing their first enumeration.
    /// The None audio system is always available.
    pub fn initialize(&self, factory: &dyn BackendFactory) -> DeviceResult<()> {
        let mut kinds = Vec::new();
        if !self.config.disable_audio {
            kinds.extend(BackendKind::audio_for_platform());
        }
        if !self.config.disable_video {
            kinds.extend(BackendKind::video_for_platform());
        }

        info!("Initializing device registry {} with {:?}", self.id, kinds);

        for kind in kinds {
            if self.system(kind.protocol()).is_some() {
                debug!("{} already registered", kind);
                continue;
            }

            let backend = match factory.create(kind) {
                Some(backend) => backend,
                None if kind == BackendKind::None => Arc::new(NoneBackend) as Arc<dyn DeviceBackend>,
                None => {
                    warn!("No {} backend available, skipping", kind);
                    continue;
                }
            };

            if let Err(e) = self.register_backend(backend) {
                warn!("Failed to initialize {} device system: {}", kind, e);
            }
        }

        Ok(())
    }

    /// Create, initialize and register a device system for `backend`, then
    /// start its hotplug monitoring
    pub fn register_backend(&self, backend: Arc<dyn DeviceBackend>) -> DeviceResult<Arc<DeviceSystem>> {
        let kind = backend.kind();
        let system = Arc::new(DeviceSystem::new(
            backend,
            Arc::clone(&self.store),
            &self.config.property_namespace,
            self.config.event_channel_capacity,
        ));

        system.initialize()?;

        if kind.features().reinitialize {
            system.start_monitoring(HotplugNotifier::new(kind.protocol(), self.hotplug_tx.clone()))?;
        }

        let mut systems = self.systems.write();
        systems.retain(|s| s.kind() != kind);
        systems.push(Arc::clone(&system));

        info!("Registered {} device system", kind);
        Ok(system)
    }

    /// Every registered system in registration order
    pub fn systems(&self) -> Vec<Arc<DeviceSystem>> {
        self.systems.read().clone()
    }

    /// System whose devices use locator protocol `protocol`
    pub fn system(&self, protocol: &str) -> Option<Arc<DeviceSystem>> {
        self.systems.read().iter().find(|s| s.protocol() == protocol).cloned()
    }

    pub fn systems_for(&self, media_type: MediaType) -> Vec<Arc<DeviceSystem>> {
        self.systems
            .read()
            .iter()
            .filter(|s| s.media_type() == media_type)
            .cloned()
            .collect()
    }

    pub fn audio_system(&self, protocol: &str) -> DeviceResult<Arc<DeviceSystem>> {
        self.system(protocol)
            .filter(|s| s.media_type() == MediaType::Audio)
            .ok_or_else(|| DeviceError::SystemNotFound {
                protocol: protocol.to_string(),
            })
    }

    /// The first registered video system
    pub fn video_system(&self) -> Option<Arc<DeviceSystem>> {
        self.systems_for(MediaType::Video).into_iter().next()
    }

    /// Spawn the task turning hotplug notifications into rescans. Only the
    /// first call has an effect. Must be called from within a tokio runtime.
    pub fn start_hotplug_listener(self: &Arc<Self>) -> DeviceResult<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| DeviceError::internal(format!("No runtime for the hotplug listener: {}", e)))?;

        let Some(mut rx) = self.hotplug_rx.lock().take() else {
            debug!("Hotplug listener already started");
            return Ok(());
        };

        let registry: Weak<Self> = Arc::downgrade(self);
        let handle = runtime.spawn(async move {
            while let Some(signal) = rx.recv().await {
                let Some(registry) = registry.upgrade() else {
                    break;
                };
                if let Err(e) = registry.reinitialize(&signal.protocol) {
                    warn!("Ignoring hotplug notification from {}: {}", signal.protocol, e);
                }
            }
            debug!("Hotplug listener stopped");
        });

        *self.listener.lock() = Some(handle);
        Ok(())
    }

    /// Schedule a rescan of the system for `protocol`. An audio rescan also
    /// schedules a video rescan after the configured delay.
    pub fn reinitialize(&self, protocol: &str) -> DeviceResult<()> {
        let system = self.system(protocol).ok_or_else(|| DeviceError::SystemNotFound {
            protocol: protocol.to_string(),
        })?;

        debug!("Reinitializing {} devices", protocol);
        system.request_reinitialize(std::time::Duration::ZERO)?;

        if system.media_type() == MediaType::Audio {
            for video in self.systems_for(MediaType::Video) {
                video.request_reinitialize(self.config.video_rescan_delay())?;
            }
        }

        Ok(())
    }

    /// Stop monitoring and drop every system. The registry can be
    /// initialized again afterwards, but hotplug listening cannot restart.
    pub fn teardown(&self) {
        if let Some(listener) = self.listener.lock().take() {
            listener.abort();
        }

        let systems: Vec<Arc<DeviceSystem>> = self.systems.write().drain(..).collect();
        for system in &systems {
            system.stop_monitoring();
        }

        info!("Device registry {} torn down ({} systems)", self.id, systems.len());
    }
}

impl Drop for DeviceRegistry {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.get_mut().take() {
            listener.abort();
        }
    }
}
