//! In-memory device backend
//!
//! Reports whatever snapshot it was last given. Used by tests and by
//! embedders that enumerate devices themselves and push the results in.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use super::{BackendKind, DeviceBackend, DeviceSnapshot, HotplugNotifier};
use crate::error::{DeviceError, DeviceResult};

#[derive(Debug)]
pub struct StaticBackend {
    kind: BackendKind,
    snapshot: Mutex<DeviceSnapshot>,
    failure: Mutex<Option<String>>,
    notifier: Mutex<Option<HotplugNotifier>>,
    enumerations: AtomicUsize,
    delay: Mutex<Duration>,
}

impl StaticBackend {
    pub fn new(kind: BackendKind, snapshot: DeviceSnapshot) -> Self {
        Self {
            kind,
            snapshot: Mutex::new(snapshot),
            failure: Mutex::new(None),
            notifier: Mutex::new(None),
            enumerations: AtomicUsize::new(0),
            delay: Mutex::new(Duration::ZERO),
        }
    }

    /// Replace the reported devices without telling anyone
    pub fn set_snapshot(&self, snapshot: DeviceSnapshot) {
        *self.snapshot.lock() = snapshot;
    }

    /// Replace the reported devices and raise a hotplug notification.
    /// Returns false if monitoring has not started or nobody listens.
    pub fn replug(&self, snapshot: DeviceSnapshot) -> bool {
        self.set_snapshot(snapshot);
        match &*self.notifier.lock() {
            Some(notifier) => notifier.notify(),
            None => false,
        }
    }

    /// Make enumerations fail with `message` until cleared with `None`
    pub fn set_failure(&self, message: Option<String>) {
        *self.failure.lock() = message;
    }

    /// Block every enumeration for `delay`, like a slow native driver
    pub fn set_enumeration_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    /// Number of enumeration passes run so far
    pub fn enumeration_count(&self) -> usize {
        self.enumerations.load(Ordering::SeqCst)
    }

    pub fn is_monitoring(&self) -> bool {
        self.notifier.lock().is_some()
    }
}

impl DeviceBackend for StaticBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn enumerate(&self) -> DeviceResult<DeviceSnapshot> {
        self.enumerations.fetch_add(1, Ordering::SeqCst);

        let delay = *self.delay.lock();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        if let Some(message) = self.failure.lock().clone() {
            return Err(DeviceError::enumeration(self.kind.protocol(), message));
        }

        Ok(self.snapshot.lock().clone().without_virtual())
    }

    fn start_monitoring(&self, notifier: HotplugNotifier) -> DeviceResult<()> {
        debug!("Monitoring {} devices", self.kind);
        *self.notifier.lock() = Some(notifier);
        Ok(())
    }

    fn stop_monitoring(&self) {
        self.notifier.lock().take();
    }
}
