//! User preference ordering of known devices
//!
//! Preferences are kept per data flow as an ordered list of device names
//! (most preferred first) plus, for each name, an ordered list of UIDs used to
//! tell apart several attached devices that share a name.

pub mod format;

use std::collections::HashMap;

use tracing::{debug, error};

use crate::device::Device;

pub use format::PreferenceEntry;

/// UID stored for a device whose real UIDs are unknown (e.g. a legacy
/// preference for a device that is not plugged in). Keeps the entry, and so
/// its rank, in the persisted list.
pub const UID_PLACEHOLDER: &str = "1234";

/// Where [`DevicePreferences::update`] puts a device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveMode {
    /// Move to the front, even if already known
    PutAtStart,
    /// Put at the front only if not already known
    PutAtStartIfAbsent,
    /// Put at the end only if not already known
    PutAtEndIfAbsent,
}

impl SaveMode {
    /// Inserts go to the front of the name and UID lists rather than the end
    pub fn at_start(&self) -> bool {
        matches!(self, SaveMode::PutAtStart | SaveMode::PutAtStartIfAbsent)
    }

    /// Entries already present keep their position
    pub fn preserve_order(&self) -> bool {
        matches!(self, SaveMode::PutAtStartIfAbsent | SaveMode::PutAtEndIfAbsent)
    }
}

/// Ordered device names and per-name ordered UIDs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DevicePreferences {
    names: Vec<String>,
    uids: HashMap<String, Vec<String>>,
}

impl DevicePreferences {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Device names, most preferred first
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Known UIDs for a name, most preferred first. Empty if unknown.
    pub fn uids(&self, name: &str) -> &[String] {
        self.uids.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// Rank of a name, 0 being the most preferred
    pub fn rank(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Insert or move a `(name, uid)` pair according to `mode`
    pub fn update(&mut self, name: &str, uid: &str, mode: SaveMode) {
        if !self.contains(name) || !mode.preserve_order() {
            debug!(
                "Putting device {}:{} {} of preferences",
                name,
                uid,
                if mode.at_start() { "at start" } else { "at end" }
            );
            self.names.retain(|n| n != name);
            if mode.at_start() {
                self.names.insert(0, name.to_string());
            } else {
                self.names.push(name.to_string());
            }
        }

        let uids = self.uids.entry(name.to_string()).or_default();
        if !uids.iter().any(|u| u == uid) || !mode.preserve_order() {
            uids.retain(|u| u != uid);
            if mode.at_start() {
                uids.insert(0, uid.to_string());
            } else {
                uids.push(uid.to_string());
            }
        }
    }

    /// Replace the name order with a parsed current-format list. UIDs are
    /// merged into what is already known.
    pub fn apply_current(&mut self, entries: Vec<PreferenceEntry>) {
        self.names.clear();

        for entry in entries {
            if !self.contains(&entry.name) {
                debug!("Add device: {}", entry.name);
                self.names.push(entry.name.clone());
            }

            let uids = self.uids.entry(entry.name).or_default();
            for uid in entry.uids {
                if !uids.contains(&uid) {
                    debug!("    UID: {}", uid);
                    uids.push(uid);
                }
            }
        }
    }

    /// Replace the name order with a legacy name list. UIDs come from the
    /// currently active devices; names with no active device get the
    /// placeholder UID so their rank survives the next write.
    pub fn apply_legacy(&mut self, names: Vec<String>, active: &[Device]) {
        self.names.clear();

        for name in names {
            if self.contains(&name) {
                debug!("Removing duplicate device from config: {}", name);
                continue;
            }
            self.names.push(name.clone());

            for device in active.iter().filter(|d| d.name() == name) {
                if let Some(uid) = device.uid() {
                    debug!("Adding uid {} to device {}", uid, name);
                    self.uids.entry(name.clone()).or_default().push(uid.to_string());
                }
            }

            self.uids
                .entry(name)
                .or_insert_with(|| vec![UID_PLACEHOLDER.to_string()]);
        }

        self.rename_to_device_names(active);
    }

    /// Very old preference lists stored model identifiers rather than names.
    /// Rewrite those to the active device's name, or drop them when the name
    /// is already listed.
    pub fn rename_to_device_names(&mut self, active: &[Device]) {
        for device in active {
            let name = device.name();
            let id = device.model_identifier();

            if name == id {
                continue;
            }

            while let Some(id_index) = self.rank(id) {
                match self.rank(name) {
                    None => self.names[id_index] = name.to_string(),
                    Some(_) => {
                        self.names.remove(id_index);
                    }
                }
            }
        }
    }

    /// UIDs of a name joined for persistence, or the placeholder
    fn uid_preference_string(&self, name: &str) -> String {
        match self.uids.get(name) {
            Some(uids) if !uids.is_empty() => format::join_uids(uids),
            _ => {
                error!("No configured UIDs for {} using dummy UID", name);
                UID_PLACEHOLDER.to_string()
            }
        }
    }

    /// Serialize to the current persisted format
    pub fn to_preference_string(&self) -> String {
        format::serialize(
            self.names
                .iter()
                .map(|name| (name.as_str(), self.uid_preference_string(name))),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MediaLocator;

    fn device(name: &str, uid: &str) -> Device {
        Device::new(name, MediaLocator::new("wasapi", &format!("#{}", uid))).with_uid(uid)
    }

    #[test]
    fn test_put_at_start_moves_existing() {
        let mut prefs = DevicePreferences::new();
        prefs.update("A", "a1", SaveMode::PutAtEndIfAbsent);
        prefs.update("B", "b1", SaveMode::PutAtEndIfAbsent);
        assert_eq!(prefs.names(), ["A", "B"]);

        prefs.update("B", "b1", SaveMode::PutAtStart);
        assert_eq!(prefs.names(), ["B", "A"]);
    }

    #[test]
    fn test_if_absent_preserves_order() {
        let mut prefs = DevicePreferences::new();
        prefs.update("A", "a1", SaveMode::PutAtEndIfAbsent);
        prefs.update("B", "b1", SaveMode::PutAtEndIfAbsent);

        prefs.update("B", "b2", SaveMode::PutAtStartIfAbsent);
        assert_eq!(prefs.names(), ["A", "B"]);
        // The new UID still goes to the front of B's UID list
        assert_eq!(prefs.uids("B"), ["b2", "b1"]);

        prefs.update("B", "b1", SaveMode::PutAtStartIfAbsent);
        assert_eq!(prefs.uids("B"), ["b2", "b1"]);

        prefs.update("B", "b1", SaveMode::PutAtStart);
        assert_eq!(prefs.uids("B"), ["b1", "b2"]);
    }

    #[test]
    fn test_apply_current_merges_uids() {
        let mut prefs = DevicePreferences::new();
        prefs.update("Old", "o1", SaveMode::PutAtEndIfAbsent);
        prefs.apply_current(format::parse_current(r#"["name:A uid:a2;a1", "name:A uid:a3", "name:B uid:b1"]"#).unwrap());

        assert_eq!(prefs.names(), ["A", "B"]);
        assert_eq!(prefs.uids("A"), ["a2", "a1", "a3"]);
        assert_eq!(prefs.rank("Old"), None);
    }

    #[test]
    fn test_apply_legacy_collapses_and_fills_uids() {
        let mut prefs = DevicePreferences::new();
        let active = vec![device("DeviceB", "b-live")];
        prefs.apply_legacy(vec!["DeviceA".into(), "DeviceB".into(), "DeviceA".into()], &active);

        assert_eq!(prefs.names(), ["DeviceA", "DeviceB"]);
        assert_eq!(prefs.uids("DeviceA"), [UID_PLACEHOLDER]);
        assert_eq!(prefs.uids("DeviceB"), ["b-live"]);
    }

    #[test]
    fn test_rename_model_identifiers_to_names() {
        let mut prefs = DevicePreferences::new();
        let active = vec![
            device("Headset", "h1").with_model_identifier("HS-MODEL"),
            device("Speakers", "s1").with_model_identifier("SPK-MODEL"),
        ];
        prefs.apply_legacy(vec!["HS-MODEL".into(), "Speakers".into(), "SPK-MODEL".into()], &active);

        // HS-MODEL is renamed in place; SPK-MODEL is dropped as Speakers is listed
        assert_eq!(prefs.names(), ["Headset", "Speakers"]);
    }

    #[test]
    fn test_preference_string_uses_placeholder_for_missing_uids() {
        let mut prefs = DevicePreferences::new();
        prefs.apply_current(vec![PreferenceEntry {
            name: "Mic".into(),
            uids: vec![],
        }]);
        assert_eq!(prefs.to_preference_string(), r#"["name:Mic uid:1234"]"#);
    }

    #[test]
    fn test_save_mode_flags() {
        assert!(SaveMode::PutAtStart.at_start());
        assert!(!SaveMode::PutAtStart.preserve_order());
        assert!(SaveMode::PutAtStartIfAbsent.at_start());
        assert!(SaveMode::PutAtStartIfAbsent.preserve_order());
        assert!(!SaveMode::PutAtEndIfAbsent.at_start());
        assert!(SaveMode::PutAtEndIfAbsent.preserve_order());
    }
}
