//! Device List Manager
//!
//! A [`DeviceListManager`] owns, for one (backend, flow) pair:
//!
//! - the active device list: devices currently reported present,
//! - the preference list: every device name the user has ever had, ordered by
//!   preference, with per-name ordered UIDs,
//! - the selected device: the most preferred active device.
//!
//! # Locking
//!
//! All state sits behind one mutex per manager. Every operation that reads or
//! mutates the lists takes it for its whole duration, including the
//! synchronous preference store read/write, so hotplug callbacks, UI
//! selections and polling reads never see a half-updated list or compute a
//! selection from a stale one. Flows never share a lock, so there is no lock
//! ordering to respect. Selection changes are queued while the lock is held
//! and delivered after it is released, one thread at a time, so observers see
//! them in the order the selection changed and may call back into the manager.
//!
//! # Reconciliation
//!
//! Every read of the selection runs the full pipeline: load preferences if not
//! loaded yet, fold the active devices into the preference list, persist, then
//! pick the most preferred active device.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::device::{Device, MediaLocator, NONE_DEVICE_NAME};
use crate::flow::DataFlow;
use crate::logging::DEVICE_CHANGES_TARGET;
use crate::preferences::{format, DevicePreferences, SaveMode};
use crate::store::PreferenceStore;

/// Suffix of the current-format preference property
const LIST_PROPERTY_SUFFIX: &str = "_list2";
/// Suffix of the legacy preference property (read-only)
const LEGACY_LIST_PROPERTY_SUFFIX: &str = "_list";

/// Receives selection changes detected by a refresh
pub trait SelectionObserver: Send + Sync {
    /// Called after the selected device of `flow` changed from `old` to `new`
    fn selection_changed(&self, flow: DataFlow, old: Option<&Device>, new: Option<&Device>);
}

/// Whether preferences have been read from the store yet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Unloaded,
    Loaded,
}

/// One row of the known-devices presentation list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnownDevice {
    /// Display name, numbered ("Headset 2") when several active devices share a name
    pub name: String,
    /// UID of the matching active device, `None` when not plugged in
    pub uid: Option<String>,
}

/// `(previous, new)` selection
type SelectionChange = (Option<Device>, Option<Device>);

/// Selection changes waiting for the observer
#[derive(Debug, Default)]
struct PendingNotifications {
    queue: VecDeque<SelectionChange>,
    /// A thread is draining the queue
    delivering: bool,
}

#[derive(Debug)]
struct ManagerState {
    active: Vec<Device>,
    preferences: DevicePreferences,
    load_state: LoadState,
    selected: Option<Device>,
}

/// Active device list, preference ordering and selection for one flow
pub struct DeviceListManager {
    flow: DataFlow,
    property_key: String,
    legacy_property_key: String,
    store: Arc<dyn PreferenceStore>,
    observer: Option<Arc<dyn SelectionObserver>>,
    state: Mutex<ManagerState>,
    notifications: Mutex<PendingNotifications>,
}

impl std::fmt::Debug for DeviceListManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceListManager")
            .field("flow", &self.flow)
            .field("property_key", &self.property_key)
            .field("state", &*self.state.lock())
            .finish()
    }
}

impl DeviceListManager {
    /// Create a manager for `flow`.
    ///
    /// `property_prefix` is the store namespace of the owning backend, e.g.
    /// `"wasapi"`; preferences are kept under
    /// `"<prefix>.<flow>Device_list2"`.
    pub fn new(flow: DataFlow, property_prefix: &str, store: Arc<dyn PreferenceStore>) -> Self {
        let base = format!("{}.{}", property_prefix, flow.property_base());
        Self {
            flow,
            property_key: format!("{}{}", base, LIST_PROPERTY_SUFFIX),
            legacy_property_key: format!("{}{}", base, LEGACY_LIST_PROPERTY_SUFFIX),
            store,
            observer: None,
            state: Mutex::new(ManagerState {
                active: Vec::new(),
                preferences: DevicePreferences::new(),
                load_state: LoadState::Unloaded,
                selected: None,
            }),
            notifications: Mutex::new(PendingNotifications::default()),
        }
    }

    /// Set who is told about selection changes
    pub fn with_observer(mut self, observer: Arc<dyn SelectionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn flow(&self) -> DataFlow {
        self.flow
    }

    /// Store key of the current-format preference list
    pub fn property_key(&self) -> &str {
        &self.property_key
    }

    /// Store key of the legacy preference list
    pub fn legacy_property_key(&self) -> &str {
        &self.legacy_property_key
    }

    pub fn load_state(&self) -> LoadState {
        self.state.lock().load_state
    }

    /// Snapshot of the preference list
    pub fn preferences(&self) -> DevicePreferences {
        self.state.lock().preferences.clone()
    }

    /// Replace the active device list. `None` entries are dropped with a warning.
    pub fn set_active_devices<I>(&self, devices: I)
    where
        I: IntoIterator,
        I::Item: Into<Option<Device>>,
    {
        let mut state = self.state.lock();
        let previous = state.active.len();
        state.active.clear();

        for device in devices {
            match device.into() {
                Some(device) => state.active.push(device),
                None => warn!("Null {} device found in active device list, dropping it", self.flow),
            }
        }

        debug!(
            "Set {} active devices: {} -> {} devices",
            self.flow,
            previous,
            state.active.len()
        );
    }

    /// Copy of the active device list
    pub fn active_devices(&self) -> Vec<Device> {
        self.state.lock().active.clone()
    }

    /// Active device with exactly this locator
    pub fn device(&self, locator: &MediaLocator) -> Option<Device> {
        self.state
            .lock()
            .active
            .iter()
            .find(|device| device.locator() == Some(locator))
            .cloned()
    }

    /// Every known device name in preference order, for display. Active
    /// devices sharing a name are numbered; inactive names carry no UID.
    pub fn all_known_devices(&self) -> Vec<KnownDevice> {
        let mut guard = self.state.lock();
        self.ensure_preferences_loaded(&mut guard);
        let state = &*guard;
        let mut known: Vec<KnownDevice> = Vec::new();

        // Same key again keeps its position and takes the new UID
        let mut put = |name: String, uid: Option<String>| {
            match known.iter_mut().find(|k| k.name == name) {
                Some(existing) => existing.uid = uid,
                None => known.push(KnownDevice { name, uid }),
            }
        };

        for preference in state.preferences.names() {
            let matching: Vec<Option<&str>> = state
                .active
                .iter()
                .filter(|d| d.name() == preference)
                .map(Device::uid)
                .collect();

            for device in state.active.iter().filter(|d| d.name() == preference) {
                let name = if matching.len() > 1 {
                    let number = matching.iter().position(|uid| *uid == device.uid()).map_or(1, |i| i + 1);
                    format!("{} {}", preference, number)
                } else {
                    preference.clone()
                };
                put(name, device.uid().map(str::to_string));
            }

            if matching.is_empty() {
                put(preference.clone(), None);
            }
        }

        known
    }

    /// Make `device` the most preferred device of this flow and refresh the
    /// selection. Does nothing if it is already selected.
    pub fn set_selected_device(&self, device: &Device) {
        {
            let mut state = self.state.lock();
            if state.selected.as_ref() == Some(device) {
                return;
            }

            debug!("Setting the selected {} device to {}", self.flow, device);

            // Preferences must be in memory before pinning, or the next load
            // would replace them with only this device.
            self.ensure_preferences_loaded(&mut state);
            self.update_device_list(&mut state.preferences, device, SaveMode::PutAtStart);
            self.write_preferences(&state.preferences);

            let change = self.refresh_locked(&mut state);
            self.queue_notification(true, change);
        }

        self.deliver_notifications();
    }

    /// Currently selected device, recomputed from the current lists
    pub fn selected_device(&self) -> Option<Device> {
        self.get_and_refresh_selected_device(false)
    }

    /// Run the reconciliation pipeline and return the selected device.
    /// When `fire_change` is set and the selection differs from the previous
    /// one, the observer is told.
    pub fn get_and_refresh_selected_device(&self, fire_change: bool) -> Option<Device> {
        let selected = {
            let mut state = self.state.lock();
            let (previous, selected) = self.refresh_locked(&mut state);
            self.queue_notification(fire_change, (previous, selected.clone()));
            selected
        };

        self.deliver_notifications();
        selected
    }

    /// Must be called with the state lock held so the queue follows the
    /// order of selection changes
    fn queue_notification(&self, fire_change: bool, (previous, selected): SelectionChange) {
        if fire_change && previous != selected && self.observer.is_some() {
            self.notifications.lock().queue.push_back((previous, selected));
        }
    }

    /// Drain queued changes to the observer unless another thread already
    /// does. Called without the state lock.
    fn deliver_notifications(&self) {
        let Some(observer) = &self.observer else {
            return;
        };

        {
            let mut pending = self.notifications.lock();
            if pending.delivering || pending.queue.is_empty() {
                return;
            }
            pending.delivering = true;
        }

        loop {
            let (previous, selected) = {
                let mut pending = self.notifications.lock();
                match pending.queue.pop_front() {
                    Some(change) => change,
                    None => {
                        pending.delivering = false;
                        return;
                    }
                }
            };
            observer.selection_changed(self.flow, previous.as_ref(), selected.as_ref());
        }
    }

    fn refresh_locked(&self, state: &mut ManagerState) -> SelectionChange {
        debug!(
            target: DEVICE_CHANGES_TARGET,
            "Refreshing the selected {} device, was: {:?}",
            self.flow,
            state.selected.as_ref().map(ToString::to_string)
        );

        self.ensure_preferences_loaded(state);
        self.reorder_device_preferences(state);
        self.write_preferences(&state.preferences);
        let selected = self.preferred_device(state);

        debug!(
            target: DEVICE_CHANGES_TARGET,
            "Selected {} device now: {:?}",
            self.flow,
            selected.as_ref().map(ToString::to_string)
        );

        let previous = std::mem::replace(&mut state.selected, selected.clone());
        (previous, selected)
    }

    /// Read preferences from the store once. The current format wins; a
    /// legacy list is migrated only when no usable current list exists.
    fn ensure_preferences_loaded(&self, state: &mut ManagerState) {
        if state.load_state == LoadState::Loaded {
            return;
        }

        let current = self
            .store
            .get_property(&self.property_key)
            .and_then(|value| match format::parse_current(&value) {
                Some(entries) => {
                    debug!("Found {} device preferences {}", self.flow, value);
                    Some(entries)
                }
                None => {
                    warn!("Ignoring malformed {} device preferences {}", self.flow, value);
                    None
                }
            });

        match current {
            Some(entries) => state.preferences.apply_current(entries),
            None => {
                if let Some(value) = self.store.get_property(&self.legacy_property_key) {
                    match format::parse_legacy(&value) {
                        Some(names) => {
                            debug!("Found legacy format {} device preferences {}", self.flow, value);
                            let ManagerState { preferences, active, .. } = state;
                            preferences.apply_legacy(names, active);
                        }
                        None => warn!("Ignoring malformed legacy {} device preferences {}", self.flow, value),
                    }
                }
            }
        }

        state.load_state = LoadState::Loaded;
    }

    /// Fold the active devices into the preference list.
    ///
    /// Active devices are visited last to first so that, with put-at-start
    /// insertion, earlier ones end up in front. A known device keeps its rank;
    /// its UID goes to the front of the name's UID list only when the device
    /// outranks the current selection. An unknown device goes to the front
    /// only if the list was empty before this pass and it is not on a
    /// wireless transport (Bluetooth/AirPlay may be paired but out of range);
    /// otherwise it is appended.
    fn reorder_device_preferences(&self, state: &mut ManagerState) {
        let ManagerState {
            active,
            preferences,
            selected,
            ..
        } = state;

        debug!(target: DEVICE_CHANGES_TARGET, "Got {} {} active devices", active.len(), self.flow);

        // Checked once up front: the list grows while new devices are added
        let was_empty = preferences.is_empty();

        for device in active.iter().rev() {
            debug!(
                target: DEVICE_CHANGES_TARGET,
                "Examining {} device: {} UID: {:?}",
                self.flow,
                device.name(),
                device.uid()
            );

            let at_start = match preferences.rank(device.name()) {
                Some(rank) => {
                    let selected_rank = selected.as_ref().and_then(|s| preferences.rank(s.name()));
                    selected_rank.map_or(false, |selected_rank| rank < selected_rank)
                }
                None => {
                    debug!("{} device preferences do not contain: {}", self.flow, device.name());
                    was_empty && !device.transport_type().map_or(false, |t| t.is_wireless())
                }
            };

            let mode = if at_start {
                SaveMode::PutAtStartIfAbsent
            } else {
                SaveMode::PutAtEndIfAbsent
            };
            self.update_device_list(preferences, device, mode);
        }
    }

    /// The active device that ranks first in the preferences. A `"none"`
    /// entry ahead of every matching device means no device.
    fn preferred_device(&self, state: &ManagerState) -> Option<Device> {
        for preference in state.preferences.names() {
            debug!(target: DEVICE_CHANGES_TARGET, "Searching preferred devices with name {}", preference);

            if preference == NONE_DEVICE_NAME {
                debug!("Found a none device");
                return None;
            }

            let matching: Vec<&Device> = state.active.iter().filter(|d| d.name() == preference).collect();
            if matching.is_empty() {
                continue;
            }

            // UID list order decides between same-named devices
            for uid in state.preferences.uids(preference) {
                if let Some(device) = matching.iter().find(|d| d.uid() == Some(uid.as_str())) {
                    debug!(target: DEVICE_CHANGES_TARGET, "Found preferred device {}", device);
                    return Some((*device).clone());
                }
            }

            debug!(
                "No matching UID found for device {} - using first one found: {}",
                preference, matching[0]
            );
            return Some(matching[0].clone());
        }

        None
    }

    fn update_device_list(&self, preferences: &mut DevicePreferences, device: &Device, mode: SaveMode) {
        match device.uid() {
            Some(uid) if !device.name().is_empty() => preferences.update(device.name(), uid, mode),
            uid => warn!(
                "Null {} device identity. Device name: {:?} Device UID: {:?}",
                self.flow,
                device.name(),
                uid
            ),
        }
    }

    fn write_preferences(&self, preferences: &DevicePreferences) {
        if let Err(e) = self
            .store
            .set_property(&self.property_key, &preferences.to_preference_string())
        {
            warn!("Failed to persist {} device preferences: {}", self.flow, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::TransportType;
    use crate::store::MemoryPreferenceStore;
    use tracing_test::traced_test;

    fn device(name: &str, uid: &str) -> Device {
        Device::new(name, MediaLocator::new("wasapi", &format!("#{}", uid))).with_uid(uid)
    }

    fn manager() -> (DeviceListManager, Arc<MemoryPreferenceStore>) {
        let store = Arc::new(MemoryPreferenceStore::new());
        (DeviceListManager::new(DataFlow::Capture, "wasapi", store.clone()), store)
    }

    #[test]
    fn test_property_keys() {
        let (manager, _) = manager();
        assert_eq!(manager.property_key(), "wasapi.captureDevice_list2");
        assert_eq!(manager.legacy_property_key(), "wasapi.captureDevice_list");
    }

    #[traced_test]
    #[test]
    fn test_null_entries_dropped_with_warning() {
        let (manager, _) = manager();
        manager.set_active_devices(vec![None, Some(device("Mic", "m1"))]);
        assert_eq!(manager.active_devices(), vec![device("Mic", "m1")]);
        assert!(logs_contain("Null capture device found"));
    }

    #[test]
    fn test_device_lookup_by_locator() {
        let (manager, _) = manager();
        manager.set_active_devices(vec![device("Mic", "m1"), device("Headset", "h1")]);

        let found = manager.device(&MediaLocator::new("wasapi", "#h1")).unwrap();
        assert_eq!(found.name(), "Headset");
        assert!(manager.device(&MediaLocator::new("wasapi", "#nope")).is_none());
    }

    #[test]
    fn test_load_state_transitions_once() {
        let (manager, _) = manager();
        assert_eq!(manager.load_state(), LoadState::Unloaded);
        manager.selected_device();
        assert_eq!(manager.load_state(), LoadState::Loaded);
    }

    #[test]
    fn test_device_without_uid_is_never_stored() {
        let (manager, store) = manager();
        let anonymous = Device::new("Anonymous", MediaLocator::new("wasapi", "#anon"));
        manager.set_active_devices(vec![anonymous]);

        assert_eq!(manager.selected_device(), None);
        assert_eq!(store.get_property("wasapi.captureDevice_list2").as_deref(), Some(r#"[""]"#));
    }

    #[test]
    fn test_selected_rank_lower_puts_new_uid_first() {
        let store = Arc::new(MemoryPreferenceStore::with_properties([(
            "wasapi.captureDevice_list2",
            r#"["name:Headset uid:h1", "name:Speakerphone uid:s1"]"#,
        )]));
        let manager = DeviceListManager::new(DataFlow::Capture, "wasapi", store);

        manager.set_active_devices(vec![device("Speakerphone", "s1")]);
        assert_eq!(manager.selected_device().unwrap().name(), "Speakerphone");

        // A second Headset with an unseen UID outranks the selection, so its
        // UID lands in front of the known one
        manager.set_active_devices(vec![device("Speakerphone", "s1"), device("Headset", "h2")]);
        assert_eq!(manager.selected_device().unwrap().uid(), Some("h2"));
        assert_eq!(manager.preferences().uids("Headset"), ["h2", "h1"]);
    }

    #[test]
    fn test_airplay_not_promoted() {
        let (manager, _) = manager();
        manager.set_active_devices(vec![
            device("TV", "tv").with_transport_type(TransportType::AirPlay),
            device("Desk Mic", "d1").with_transport_type(TransportType::Usb),
        ]);
        manager.selected_device();
        assert_eq!(manager.preferences().names(), ["Desk Mic", "TV"]);
    }
}
