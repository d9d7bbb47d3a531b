//! Device value type
//!
//! A [`Device`] describes one physical or logical media device as reported by
//! an enumeration backend. Instances are built fresh on every enumeration
//! pass; the device list managers only ever reorder and filter them.
//!
//! Two devices are equal when their locator protocols match and their
//! identifiers (UID when present, name otherwise) match. The hash is derived
//! from the identifier alone, which keeps it consistent with equality.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// Reserved name (and locator protocol) of the explicit "no device" choice
pub const NONE_DEVICE_NAME: &str = "none";

/// Media type handled by a device system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaType {
    /// Audio capture and playback devices
    Audio,
    /// Video capture devices
    Video,
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaType::Audio => write!(f, "audio"),
            MediaType::Video => write!(f, "video"),
        }
    }
}

/// How a device is attached to the host
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportType {
    /// USB attached
    Usb,
    /// Bluetooth, may be paired but out of range
    Bluetooth,
    /// AirPlay, may be advertised but unreachable
    AirPlay,
    /// Software-only device; never offered to the user
    Virtual,
    /// Any other transport reported by the backend
    Other(String),
}

impl TransportType {
    /// Transport string as reported by native backends
    pub fn as_str(&self) -> &str {
        match self {
            TransportType::Usb => "USB",
            TransportType::Bluetooth => "Bluetooth",
            TransportType::AirPlay => "AirPlay",
            TransportType::Virtual => "Virtual",
            TransportType::Other(other) => other,
        }
    }

    /// Whether a device on this transport may be present but unusable, so
    /// must not be auto-promoted just for appearing
    pub fn is_wireless(&self) -> bool {
        matches!(self, TransportType::Bluetooth | TransportType::AirPlay)
    }
}

impl From<&str> for TransportType {
    fn from(value: &str) -> Self {
        match value {
            "USB" => TransportType::Usb,
            "Bluetooth" => TransportType::Bluetooth,
            "AirPlay" => TransportType::AirPlay,
            "Virtual" => TransportType::Virtual,
            other => TransportType::Other(other.to_string()),
        }
    }
}

impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Locator of a device, `"<protocol>:<remainder>"` (e.g. `"wasapi:#{0.0.1}"`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MediaLocator(String);

impl MediaLocator {
    /// Build a locator from a protocol and a protocol-specific remainder
    pub fn new(protocol: &str, remainder: &str) -> Self {
        Self(format!("{}:{}", protocol, remainder))
    }

    /// The protocol part, if the locator has one
    pub fn protocol(&self) -> Option<&str> {
        self.0.split_once(':').map(|(protocol, _)| protocol)
    }

    /// The full locator string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MediaLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One audio format a device can deliver; `None` fields are unspecified
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceAudioFormat {
    /// Linear PCM (as opposed to a compressed encoding)
    pub linear: bool,
    /// Sample rate in Hz
    pub sample_rate: Option<u32>,
    /// Bits per sample
    pub bits_per_sample: Option<u16>,
    /// Channel count
    pub channels: Option<u16>,
}

impl DeviceAudioFormat {
    /// Linear 16-bit PCM at the given rate and channel count
    pub fn linear_16(sample_rate: u32, channels: u16) -> Self {
        Self {
            linear: true,
            sample_rate: Some(sample_rate),
            bits_per_sample: Some(16),
            channels: Some(channels),
        }
    }

    /// Whether this format can serve a 16-bit linear capture pipeline
    pub fn matches_linear_16(&self) -> bool {
        self.linear && self.bits_per_sample.map_or(true, |bits| bits == 16)
    }
}

/// One video format a capture device can deliver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceVideoFormat {
    pub width: u32,
    pub height: u32,
}

/// Flow-specific capability descriptor. Opaque to the reconciliation engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum DeviceCapabilities {
    /// The backend did not describe the device's formats
    #[default]
    Unspecified,
    /// Audio formats supported by the device
    Audio(Vec<DeviceAudioFormat>),
    /// Video formats supported by the device
    Video(Vec<DeviceVideoFormat>),
}

/// A media device reported by an enumeration backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    name: String,
    locator: Option<MediaLocator>,
    uid: Option<String>,
    transport_type: Option<TransportType>,
    model_identifier: Option<String>,
    capabilities: DeviceCapabilities,
}

impl Device {
    /// Create a device with a display name and locator
    pub fn new(name: impl Into<String>, locator: MediaLocator) -> Self {
        Self {
            name: name.into(),
            locator: Some(locator),
            uid: None,
            transport_type: None,
            model_identifier: None,
            capabilities: DeviceCapabilities::Unspecified,
        }
    }

    /// The sentinel for an explicit "no device" selection
    pub fn none() -> Self {
        Self::new(NONE_DEVICE_NAME, MediaLocator::new(NONE_DEVICE_NAME, ""))
            .with_uid(NONE_DEVICE_NAME)
    }

    /// Set the unique hardware/interface identifier
    pub fn with_uid(mut self, uid: impl Into<String>) -> Self {
        self.uid = Some(uid.into());
        self
    }

    /// Set the transport type
    pub fn with_transport_type(mut self, transport_type: TransportType) -> Self {
        self.transport_type = Some(transport_type);
        self
    }

    /// Set the persistent hardware model identifier
    pub fn with_model_identifier(mut self, model_identifier: impl Into<String>) -> Self {
        self.model_identifier = Some(model_identifier.into());
        self
    }

    /// Set the capability descriptor
    pub fn with_capabilities(mut self, capabilities: DeviceCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Display name. Not guaranteed to be unique.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn locator(&self) -> Option<&MediaLocator> {
        self.locator.as_ref()
    }

    pub fn uid(&self) -> Option<&str> {
        self.uid.as_deref()
    }

    pub fn transport_type(&self) -> Option<&TransportType> {
        self.transport_type.as_ref()
    }

    pub fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    /// UID if present, else the name
    pub fn identifier(&self) -> &str {
        self.uid.as_deref().unwrap_or(&self.name)
    }

    /// Model identifier, falling back to the name
    pub fn model_identifier(&self) -> &str {
        self.model_identifier.as_deref().unwrap_or(&self.name)
    }

    pub fn is_same_transport_type(&self, transport_type: &TransportType) -> bool {
        self.transport_type.as_ref() == Some(transport_type)
    }

    /// Whether this is the "none" sentinel
    pub fn is_none_device(&self) -> bool {
        self.name == NONE_DEVICE_NAME
    }

    /// Whether this device can deliver 16-bit linear audio. Devices whose
    /// formats were not described are given the benefit of the doubt.
    pub fn supports_linear_16(&self) -> bool {
        match &self.capabilities {
            DeviceCapabilities::Unspecified => true,
            DeviceCapabilities::Audio(formats) => formats.iter().any(DeviceAudioFormat::matches_linear_16),
            DeviceCapabilities::Video(_) => false,
        }
    }

    /// Presentation-only name: the contents of the first parenthesised group,
    /// e.g. `"Microphone (USB Headset)"` gives `"USB Headset"`. Names without
    /// parentheses are returned whole.
    pub fn name_without_device_type(&self) -> &str {
        if let Some(open) = self.name.find('(') {
            if let Some(len) = self.name[open + 1..].find(')') {
                return &self.name[open + 1..open + 1 + len];
            }
        }
        &self.name
    }

    fn locator_protocol(&self) -> Option<&str> {
        self.locator.as_ref().and_then(MediaLocator::protocol)
    }
}

impl PartialEq for Device {
    fn eq(&self, other: &Self) -> bool {
        match (&self.locator, &other.locator) {
            (None, None) => {}
            (Some(_), None) | (None, Some(_)) => return false,
            (Some(_), Some(_)) => {
                if self.locator_protocol() != other.locator_protocol() {
                    return false;
                }
            }
        }
        self.identifier() == other.identifier()
    }
}

impl Eq for Device {}

impl Hash for Device {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identifier().hash(state);
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.uid.as_deref().unwrap_or("-"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn wasapi(name: &str, uid: &str) -> Device {
        Device::new(name, MediaLocator::new("wasapi", &format!("#{}", uid))).with_uid(uid)
    }

    #[test]
    fn test_identifier_prefers_uid() {
        let with_uid = wasapi("Headset", "u1");
        assert_eq!(with_uid.identifier(), "u1");

        let without_uid = Device::new("Headset", MediaLocator::new("wasapi", "#Headset"));
        assert_eq!(without_uid.identifier(), "Headset");
    }

    #[test]
    fn test_equality_uses_protocol_and_identifier() {
        // Same UID, different locator remainders: still the same device
        let a = wasapi("Headset", "u1");
        let b = Device::new("Renamed", MediaLocator::new("wasapi", "#other")).with_uid("u1");
        assert_eq!(a, b);

        // Same UID on another backend is a different device
        let c = Device::new("Headset", MediaLocator::new("maccoreaudio", "#u1")).with_uid("u1");
        assert_ne!(a, c);

        assert_ne!(a, wasapi("Headset", "u2"));
    }

    #[test]
    fn test_hash_consistent_with_eq() {
        let mut set = HashSet::new();
        set.insert(wasapi("Headset", "u1"));
        set.insert(Device::new("Other name", MediaLocator::new("wasapi", "#x")).with_uid("u1"));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_model_identifier_falls_back_to_name() {
        let device = wasapi("Built-in Microphone", "u1");
        assert_eq!(device.model_identifier(), "Built-in Microphone");
        let device = device.with_model_identifier("AppleHDA:12");
        assert_eq!(device.model_identifier(), "AppleHDA:12");
    }

    #[test]
    fn test_name_without_device_type() {
        assert_eq!(wasapi("Microphone (USB Headset)", "u").name_without_device_type(), "USB Headset");
        assert_eq!(wasapi("Speakers", "u").name_without_device_type(), "Speakers");
        assert_eq!(wasapi("Broken (name", "u").name_without_device_type(), "Broken (name");
    }

    #[test]
    fn test_transport_type_parsing() {
        assert_eq!(TransportType::from("USB"), TransportType::Usb);
        assert_eq!(TransportType::from("AirPlay"), TransportType::AirPlay);
        assert_eq!(TransportType::from("Thunderbolt"), TransportType::Other("Thunderbolt".into()));
        assert!(TransportType::Bluetooth.is_wireless());
        assert!(!TransportType::Usb.is_wireless());
    }

    #[test]
    fn test_linear_16_support() {
        let plain = wasapi("Mic", "u");
        assert!(plain.supports_linear_16());

        let pcm = wasapi("Mic", "u").with_capabilities(DeviceCapabilities::Audio(vec![
            DeviceAudioFormat::linear_16(48000, 1),
        ]));
        assert!(pcm.supports_linear_16());

        let float = wasapi("Mic", "u").with_capabilities(DeviceCapabilities::Audio(vec![DeviceAudioFormat {
            linear: true,
            sample_rate: Some(48000),
            bits_per_sample: Some(32),
            channels: Some(2),
        }]));
        assert!(!float.supports_linear_16());
    }

    #[test]
    fn test_none_device() {
        let none = Device::none();
        assert!(none.is_none_device());
        assert_eq!(none.locator().and_then(|l| l.protocol()), Some(NONE_DEVICE_NAME));
    }
}
