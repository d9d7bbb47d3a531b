//! Error types for the device core
//!
//! The reconciliation engine itself never fails: malformed preferences,
//! invalid devices and store write failures are all recovered locally and
//! logged. These errors come from the layers around it (backend enumeration,
//! file-backed preference storage, configuration loading, registry lookups).

use thiserror::Error;

/// Result type for device core operations
pub type DeviceResult<T> = Result<T, DeviceError>;

/// Errors that can occur around device management
#[derive(Debug, Error)]
pub enum DeviceError {
    /// A backend failed to enumerate its devices
    #[error("Device enumeration failed for backend {backend}: {message}")]
    Enumeration { backend: String, message: String },

    /// The preference store could not read or write a property
    #[error("Preference store error for key {key}: {message}")]
    Store { key: String, message: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML configuration parse error
    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Configuration error
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// No device system registered for a locator protocol
    #[error("No device system registered for protocol: {protocol}")]
    SystemNotFound { protocol: String },

    /// A device description was rejected
    #[error("Invalid device: {reason}")]
    InvalidDevice { reason: String },

    /// Internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DeviceError {
    /// Create an enumeration error
    pub fn enumeration(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Enumeration {
            backend: backend.into(),
            message: message.into(),
        }
    }

    /// Create a preference store error
    pub fn store(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Store {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an invalid device error
    pub fn invalid_device(reason: impl Into<String>) -> Self {
        Self::InvalidDevice {
            reason: reason.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}
