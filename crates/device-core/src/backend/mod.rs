//! Device enumeration backends
//!
//! A [`DeviceBackend`] is the native side of a device system: it enumerates
//! the devices currently present and tells the registry when they change.
//! Native implementations (WASAPI, CoreAudio, DirectShow, AVFoundation) are
//! provided by the embedder through a [`BackendFactory`]; this crate ships the
//! built-in [`NoneBackend`] and the in-memory [`StaticBackend`].
//!
//! Platform selection follows the host OS:
//!
//! | Media | Windows | macOS | always |
//! |---|---|---|---|
//! | audio | `Wasapi` | `CoreAudio` | `None` |
//! | video | `DirectShow` | `AvFoundation` | |

pub mod none_impl;
pub mod static_impl;

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::trace;

use crate::device::{Device, MediaType, TransportType};
use crate::error::DeviceResult;
use crate::flow::DataFlow;

pub use none_impl::NoneBackend;
pub use static_impl::StaticBackend;

/// Capabilities of a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BackendFeatures {
    /// Devices can be rescanned after initialization (hotplug support)
    pub reinitialize: bool,
    /// The backend manages playback and notify devices, not only capture
    pub notify_and_playback_devices: bool,
}

impl BackendFeatures {
    pub const NONE: BackendFeatures = BackendFeatures {
        reinitialize: false,
        notify_and_playback_devices: false,
    };

    pub const REINITIALIZE: BackendFeatures = BackendFeatures {
        reinitialize: true,
        notify_and_playback_devices: false,
    };

    pub const FULL_AUDIO: BackendFeatures = BackendFeatures {
        reinitialize: true,
        notify_and_playback_devices: true,
    };
}

/// Known device backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// macOS audio
    CoreAudio,
    /// Windows audio
    Wasapi,
    /// Windows video
    DirectShow,
    /// macOS video
    AvFoundation,
    /// Audio system without devices
    None,
}

impl BackendKind {
    /// Locator protocol of devices from this backend, also used as the
    /// backend segment of preference property keys
    pub fn protocol(&self) -> &'static str {
        match self {
            BackendKind::CoreAudio => "maccoreaudio",
            BackendKind::Wasapi => "wasapi",
            BackendKind::DirectShow => "directshow",
            BackendKind::AvFoundation => "avfoundation",
            BackendKind::None => "none",
        }
    }

    pub fn media_type(&self) -> MediaType {
        match self {
            BackendKind::DirectShow | BackendKind::AvFoundation => MediaType::Video,
            _ => MediaType::Audio,
        }
    }

    pub fn features(&self) -> BackendFeatures {
        match self {
            BackendKind::CoreAudio | BackendKind::Wasapi => BackendFeatures::FULL_AUDIO,
            BackendKind::DirectShow | BackendKind::AvFoundation => BackendFeatures::REINITIALIZE,
            BackendKind::None => BackendFeatures::NONE,
        }
    }

    /// Flows a device system of this kind manages
    pub fn flows(&self) -> Vec<DataFlow> {
        match self.media_type() {
            MediaType::Video => vec![DataFlow::Video],
            MediaType::Audio if self.features().notify_and_playback_devices => DataFlow::AUDIO.to_vec(),
            MediaType::Audio => vec![DataFlow::Capture],
        }
    }

    /// Audio backends for the host platform, in registration order
    pub fn audio_for_platform() -> Vec<BackendKind> {
        let mut kinds = Vec::new();
        if cfg!(target_os = "windows") {
            kinds.push(BackendKind::Wasapi);
        }
        if cfg!(target_os = "macos") {
            kinds.push(BackendKind::CoreAudio);
        }
        kinds.push(BackendKind::None);
        kinds
    }

    /// Video backends for the host platform
    pub fn video_for_platform() -> Vec<BackendKind> {
        let mut kinds = Vec::new();
        if cfg!(target_os = "macos") {
            kinds.push(BackendKind::AvFoundation);
        }
        if cfg!(target_os = "windows") {
            kinds.push(BackendKind::DirectShow);
        }
        kinds
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.protocol())
    }
}

/// Devices reported by one enumeration pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceSnapshot {
    pub capture: Vec<Device>,
    /// Output devices; shared by the playback and notify flows
    pub playback: Vec<Device>,
    pub video: Vec<Device>,
}

impl DeviceSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capture(mut self, devices: Vec<Device>) -> Self {
        self.capture = devices;
        self
    }

    pub fn with_playback(mut self, devices: Vec<Device>) -> Self {
        self.playback = devices;
        self
    }

    pub fn with_video(mut self, devices: Vec<Device>) -> Self {
        self.video = devices;
        self
    }

    /// Drop software-only devices, which are never offered to the user
    pub fn without_virtual(mut self) -> Self {
        for devices in [&mut self.capture, &mut self.playback, &mut self.video] {
            devices.retain(|d| !d.is_same_transport_type(&TransportType::Virtual));
        }
        self
    }

    /// Devices feeding a flow's active list
    pub fn devices_for(&self, flow: DataFlow) -> &[Device] {
        match flow {
            DataFlow::Capture => &self.capture,
            DataFlow::Notify | DataFlow::Playback => &self.playback,
            DataFlow::Video => &self.video,
        }
    }
}

/// A backend asking for a rescan of its devices
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HotplugSignal {
    /// Locator protocol of the backend whose devices changed
    pub protocol: String,
}

/// Handle given to a backend to report device changes. Cheap to clone and
/// safe to use from native callback threads.
#[derive(Debug, Clone)]
pub struct HotplugNotifier {
    protocol: String,
    sender: mpsc::UnboundedSender<HotplugSignal>,
}

impl HotplugNotifier {
    pub fn new(protocol: impl Into<String>, sender: mpsc::UnboundedSender<HotplugSignal>) -> Self {
        Self {
            protocol: protocol.into(),
            sender,
        }
    }

    /// Report that devices were added or removed. Returns false once nobody
    /// is listening anymore.
    pub fn notify(&self) -> bool {
        trace!("Hotplug notification from {}", self.protocol);
        self.sender
            .send(HotplugSignal {
                protocol: self.protocol.clone(),
            })
            .is_ok()
    }
}

/// Native device enumeration provider
pub trait DeviceBackend: Send + Sync + fmt::Debug {
    fn kind(&self) -> BackendKind;

    /// Enumerate the devices currently present
    fn enumerate(&self) -> DeviceResult<DeviceSnapshot>;

    /// Start reporting device changes through `notifier`
    fn start_monitoring(&self, notifier: HotplugNotifier) -> DeviceResult<()> {
        let _ = notifier;
        Ok(())
    }

    /// Stop reporting device changes
    fn stop_monitoring(&self) {}
}

/// Builds native backends. Returns `None` for kinds it cannot provide.
pub trait BackendFactory: Send + Sync {
    fn create(&self, kind: BackendKind) -> Option<Arc<dyn DeviceBackend>>;
}

impl<F> BackendFactory for F
where
    F: Fn(BackendKind) -> Option<Arc<dyn DeviceBackend>> + Send + Sync,
{
    fn create(&self, kind: BackendKind) -> Option<Arc<dyn DeviceBackend>> {
        self(kind)
    }
}

/// Factory providing no native backend; only the built-in None audio system
/// gets registered
#[derive(Debug, Clone, Copy, Default)]
pub struct NoNativeBackends;

impl BackendFactory for NoNativeBackends {
    fn create(&self, _kind: BackendKind) -> Option<Arc<dyn DeviceBackend>> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MediaLocator;

    #[test]
    fn test_kind_flows_follow_features() {
        assert_eq!(BackendKind::Wasapi.flows(), DataFlow::AUDIO.to_vec());
        assert_eq!(BackendKind::None.flows(), vec![DataFlow::Capture]);
        assert_eq!(BackendKind::AvFoundation.flows(), vec![DataFlow::Video]);
        assert!(!BackendKind::None.features().reinitialize);
        assert!(BackendKind::DirectShow.features().reinitialize);
    }

    #[test]
    fn test_platform_selection_always_has_none_audio() {
        let audio = BackendKind::audio_for_platform();
        assert_eq!(audio.last(), Some(&BackendKind::None));
        assert!(BackendKind::video_for_platform().iter().all(|k| k.media_type() == MediaType::Video));
    }

    #[test]
    fn test_snapshot_drops_virtual_and_shares_playback() {
        let speaker = Device::new("Speakers", MediaLocator::new("wasapi", "#s")).with_uid("s");
        let loopback = Device::new("Loopback", MediaLocator::new("wasapi", "#l"))
            .with_uid("l")
            .with_transport_type(TransportType::Virtual);

        let snapshot = DeviceSnapshot::new()
            .with_playback(vec![speaker.clone(), loopback])
            .without_virtual();

        assert_eq!(snapshot.devices_for(DataFlow::Playback), [speaker.clone()]);
        assert_eq!(snapshot.devices_for(DataFlow::Notify), [speaker]);
    }

    #[tokio::test]
    async fn test_notifier_reports_protocol() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let notifier = HotplugNotifier::new("wasapi", tx);
        assert!(notifier.notify());
        assert_eq!(rx.recv().await.unwrap().protocol, "wasapi");

        drop(rx);
        assert!(!notifier.notify());
    }
}
