//! Device system
//!
//! A [`DeviceSystem`] binds one [`DeviceBackend`] to one
//! [`DeviceListManager`] per flow the backend manages. An initialize pass
//! enumerates the backend, hands each manager its active list, reports added
//! and removed devices, then refreshes every flow's selection so listeners
//! learn about changes.
//!
//! Rescans are coalesced: while one is pending further requests are dropped.
//! The pending flag is cleared once the rescan holds the init lock, so all
//! requests made while an earlier pass runs collapse into a single pass.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::{Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backend::{BackendFeatures, BackendKind, DeviceBackend, HotplugNotifier};
use crate::device::{Device, MediaLocator, MediaType};
use crate::error::{DeviceError, DeviceResult};
use crate::events::{DeviceEvent, EventEmitter, EventStream};
use crate::flow::DataFlow;
use crate::manager::{DeviceListManager, KnownDevice, SelectionObserver};
use crate::store::PreferenceStore;

/// Turns manager selection changes into [`DeviceEvent::SelectionChanged`]
struct EventObserver {
    backend: String,
    events: EventEmitter,
}

impl SelectionObserver for EventObserver {
    fn selection_changed(&self, flow: DataFlow, old: Option<&Device>, new: Option<&Device>) {
        info!(
            "Selected {} {} device changed: {:?} -> {:?}",
            self.backend,
            flow,
            old.map(ToString::to_string),
            new.map(ToString::to_string)
        );

        self.events.emit(DeviceEvent::SelectionChanged {
            backend: self.backend.clone(),
            flow,
            old: old.cloned(),
            new: new.cloned(),
            at: Utc::now(),
        });
    }
}

/// Store key prefix of a backend, `"<namespace>.<protocol>"` or just the
/// protocol when the namespace is empty
pub fn property_prefix(namespace: &str, protocol: &str) -> String {
    if namespace.is_empty() {
        protocol.to_string()
    } else {
        format!("{}.{}", namespace, protocol)
    }
}

pub struct DeviceSystem {
    kind: BackendKind,
    backend: Arc<dyn DeviceBackend>,
    flows: Vec<DataFlow>,
    managers: HashMap<DataFlow, DeviceListManager>,
    events: EventEmitter,
    init_lock: Mutex<()>,
    rescan_pending: AtomicBool,
}

impl std::fmt::Debug for DeviceSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSystem")
            .field("kind", &self.kind)
            .field("flows", &self.flows)
            .field("rescan_pending", &self.rescan_pending.load(Ordering::SeqCst))
            .finish()
    }
}

impl DeviceSystem {
    /// Create a system for `backend`. Devices are not enumerated until
    /// [`initialize`](Self::initialize).
    pub fn new(
        backend: Arc<dyn DeviceBackend>,
        store: Arc<dyn PreferenceStore>,
        namespace: &str,
        event_capacity: usize,
    ) -> Self {
        let kind = backend.kind();
        let events = EventEmitter::new(event_capacity);
        let prefix = property_prefix(namespace, kind.protocol());
        let observer: Arc<dyn SelectionObserver> = Arc::new(EventObserver {
            backend: kind.protocol().to_string(),
            events: events.clone(),
        });

        let flows = kind.flows();
        let managers = flows
            .iter()
            .map(|&flow| {
                let manager = DeviceListManager::new(flow, &prefix, Arc::clone(&store))
                    .with_observer(Arc::clone(&observer));
                (flow, manager)
            })
            .collect();

        Self {
            kind,
            backend,
            flows,
            managers,
            events,
            init_lock: Mutex::new(()),
            rescan_pending: AtomicBool::new(false),
        }
    }

    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    /// Locator protocol of this system's devices
    pub fn protocol(&self) -> &'static str {
        self.kind.protocol()
    }

    pub fn media_type(&self) -> MediaType {
        self.kind.media_type()
    }

    pub fn features(&self) -> BackendFeatures {
        self.kind.features()
    }

    /// Managed flows in initialization order
    pub fn flows(&self) -> &[DataFlow] {
        &self.flows
    }

    pub fn backend(&self) -> &Arc<dyn DeviceBackend> {
        &self.backend
    }

    pub fn manager(&self, flow: DataFlow) -> Option<&DeviceListManager> {
        self.managers.get(&flow)
    }

    fn require_manager(&self, flow: DataFlow) -> DeviceResult<&DeviceListManager> {
        self.manager(flow).ok_or_else(|| {
            DeviceError::config(format!("{} does not manage {} devices", self.kind, flow))
        })
    }

    /// Enumerate the backend and reconcile every flow
    pub fn initialize(&self) -> DeviceResult<()> {
        let guard = self.init_lock.lock();
        self.initialize_locked(&guard)
    }

    fn initialize_locked(&self, _guard: &MutexGuard<'_, ()>) -> DeviceResult<()> {
        debug!("Initializing {} device system", self.kind);

        let before = self.current_devices();
        let snapshot = self.backend.enumerate()?.without_virtual();

        for flow in &self.flows {
            if let Some(manager) = self.managers.get(flow) {
                manager.set_active_devices(snapshot.devices_for(*flow).to_vec());
            }
        }

        let after = self.current_devices();
        let added: Vec<Device> = after.iter().filter(|d| !before.contains(d)).cloned().collect();
        let removed: Vec<Device> = before.iter().filter(|d| !after.contains(d)).cloned().collect();

        if !added.is_empty() || !removed.is_empty() {
            info!(
                "{} devices changed: {} added, {} removed",
                self.kind,
                added.len(),
                removed.len()
            );
            self.events.emit(DeviceEvent::DevicesChanged {
                backend: self.protocol().to_string(),
                added,
                removed,
                at: Utc::now(),
            });
        }

        for flow in &self.flows {
            if let Some(manager) = self.managers.get(flow) {
                manager.get_and_refresh_selected_device(true);
            }
        }

        Ok(())
    }

    /// Active devices across all flows, without duplicates
    fn current_devices(&self) -> Vec<Device> {
        let mut devices: Vec<Device> = Vec::new();
        for flow in &self.flows {
            if let Some(manager) = self.managers.get(flow) {
                for device in manager.active_devices() {
                    if !devices.contains(&device) {
                        devices.push(device);
                    }
                }
            }
        }
        devices
    }

    /// Schedule a rescan after `delay`.
    ///
    /// Returns `Ok(None)` when the backend cannot rescan or a rescan is
    /// already pending. Must be called from within a tokio runtime.
    pub fn request_reinitialize(
        self: &Arc<Self>,
        delay: Duration,
    ) -> DeviceResult<Option<JoinHandle<DeviceResult<()>>>> {
        if !self.features().reinitialize {
            debug!("{} does not support reinitialization", self.kind);
            return Ok(None);
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| DeviceError::internal(format!("No runtime to rescan {}: {}", self.kind, e)))?;

        if self.rescan_pending.swap(true, Ordering::SeqCst) {
            debug!("{} rescan already pending", self.kind);
            return Ok(None);
        }

        let system = Arc::clone(self);
        let handle = runtime.spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let kind = system.kind;
            let result = match tokio::task::spawn_blocking(move || system.rescan()).await {
                Ok(result) => result,
                Err(e) => Err(DeviceError::internal(format!("{} rescan task failed: {}", kind, e))),
            };

            if let Err(e) = &result {
                warn!("Failed to reinitialize {}: {}", kind, e);
            }
            result
        });

        Ok(Some(handle))
    }

    fn rescan(&self) -> DeviceResult<()> {
        let guard = self.init_lock.lock();
        // Requests made from here on need a pass of their own
        self.rescan_pending.store(false, Ordering::SeqCst);
        self.initialize_locked(&guard)
    }

    /// Whether a rescan is scheduled but has not started yet
    pub fn is_rescan_pending(&self) -> bool {
        self.rescan_pending.load(Ordering::SeqCst)
    }

    pub fn start_monitoring(&self, notifier: HotplugNotifier) -> DeviceResult<()> {
        self.backend.start_monitoring(notifier)
    }

    pub fn stop_monitoring(&self) {
        self.backend.stop_monitoring();
    }

    /// Active devices of a flow. Capture devices are limited to those able to
    /// deliver 16-bit linear audio.
    pub fn active_devices(&self, flow: DataFlow) -> Vec<Device> {
        let Some(manager) = self.manager(flow) else {
            return Vec::new();
        };

        let devices = manager.active_devices();
        if flow == DataFlow::Capture {
            devices.into_iter().filter(Device::supports_linear_16).collect()
        } else {
            devices
        }
    }

    /// Active device of a flow with exactly this locator
    pub fn device(&self, flow: DataFlow, locator: &MediaLocator) -> Option<Device> {
        self.manager(flow)?.device(locator)
    }

    pub fn selected_device(&self, flow: DataFlow) -> Option<Device> {
        self.manager(flow)?.selected_device()
    }

    /// Pin `device` as the preferred device of `flow`. Accepts the "none"
    /// sentinel and devices of this system's protocol.
    pub fn set_selected_device(&self, flow: DataFlow, device: &Device) -> DeviceResult<()> {
        let manager = self.require_manager(flow)?;

        let protocol = device.locator().and_then(MediaLocator::protocol);
        if !device.is_none_device() && protocol.is_some_and(|p| p != self.protocol()) {
            return Err(DeviceError::invalid_device(format!(
                "{} is not a {} device",
                device,
                self.protocol()
            )));
        }

        manager.set_selected_device(device);
        Ok(())
    }

    pub fn all_known_devices(&self, flow: DataFlow) -> Vec<KnownDevice> {
        self.manager(flow).map(DeviceListManager::all_known_devices).unwrap_or_default()
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<DeviceEvent> {
        self.events.subscribe()
    }

    pub fn event_stream(&self) -> EventStream {
        self.events.stream()
    }
}
