//! Preference storage
//!
//! Device list managers persist their preference lists through the
//! [`PreferenceStore`] trait, a plain string key/value service. Two
//! implementations are provided: an in-memory store (tests, embedders that
//! persist elsewhere) and a JSON file store.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::error::{DeviceError, DeviceResult};

/// String property service used to persist device preferences.
///
/// Calls are synchronous and expected to be fast (memory or local disk); they
/// run while a device list manager holds its lock.
pub trait PreferenceStore: Send + Sync + fmt::Debug {
    /// Read a property, `None` when unset
    fn get_property(&self, key: &str) -> Option<String>;

    /// Write a property
    fn set_property(&self, key: &str, value: &str) -> DeviceResult<()>;

    /// Remove a property
    fn remove_property(&self, key: &str) -> DeviceResult<()>;
}

/// In-memory property store
#[derive(Debug, Default)]
pub struct MemoryPreferenceStore {
    properties: DashMap<String, String>,
}

impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with properties
    pub fn with_properties<I, K, V>(properties: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let store = Self::new();
        for (key, value) in properties {
            store.properties.insert(key.into(), value.into());
        }
        store
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }
}

impl PreferenceStore for MemoryPreferenceStore {
    fn get_property(&self, key: &str) -> Option<String> {
        self.properties.get(key).map(|value| value.clone())
    }

    fn set_property(&self, key: &str, value: &str) -> DeviceResult<()> {
        self.properties.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_property(&self, key: &str) -> DeviceResult<()> {
        self.properties.remove(key);
        Ok(())
    }
}

/// Property store backed by a JSON object on disk.
///
/// The whole file is loaded on open and rewritten on every change. Writes go
/// to a sibling temporary file first and are then renamed over the target.
pub struct FilePreferenceStore {
    path: PathBuf,
    properties: RwLock<BTreeMap<String, String>>,
}

impl fmt::Debug for FilePreferenceStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilePreferenceStore")
            .field("path", &self.path)
            .field("properties", &self.properties.read().len())
            .finish()
    }
}

impl FilePreferenceStore {
    /// Open a store, starting empty if the file does not exist yet
    pub fn open(path: impl Into<PathBuf>) -> DeviceResult<Self> {
        let path = path.into();
        let properties = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&content)?
            }
        } else {
            debug!("No preference file at {}, starting empty", path.display());
            BTreeMap::new()
        };

        Ok(Self {
            path,
            properties: RwLock::new(properties),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, properties: &BTreeMap<String, String>) -> DeviceResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let content = serde_json::to_string_pretty(properties)?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl PreferenceStore for FilePreferenceStore {
    fn get_property(&self, key: &str) -> Option<String> {
        self.properties.read().get(key).cloned()
    }

    fn set_property(&self, key: &str, value: &str) -> DeviceResult<()> {
        let mut properties = self.properties.write();
        if properties.get(key).map(String::as_str) == Some(value) {
            return Ok(());
        }
        properties.insert(key.to_string(), value.to_string());
        self.flush(&properties).map_err(|e| {
            warn!("Failed to write preference file {}: {}", self.path.display(), e);
            DeviceError::store(key, e.to_string())
        })
    }

    fn remove_property(&self, key: &str) -> DeviceResult<()> {
        let mut properties = self.properties.write();
        if properties.remove(key).is_some() {
            self.flush(&properties)
                .map_err(|e| DeviceError::store(key, e.to_string()))?;
        }
        Ok(())
    }
}
