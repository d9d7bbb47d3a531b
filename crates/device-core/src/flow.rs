//! Data flows managed by a device system

use std::fmt;

use serde::{Deserialize, Serialize};

/// Direction/purpose of a device list. Each flow has its own
/// [`DeviceListManager`](crate::manager::DeviceListManager).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataFlow {
    /// Microphones
    Capture,
    /// Device used to sound notifications (ring, alerts)
    Notify,
    /// Call audio output
    Playback,
    /// Cameras
    Video,
}

impl DataFlow {
    /// Audio flows in initialization order
    pub const AUDIO: [DataFlow; 3] = [DataFlow::Capture, DataFlow::Notify, DataFlow::Playback];

    /// Base name of this flow's properties, e.g. `captureDevice`
    pub fn property_base(&self) -> &'static str {
        match self {
            DataFlow::Capture => "captureDevice",
            DataFlow::Notify => "notifyDevice",
            DataFlow::Playback => "playbackDevice",
            DataFlow::Video => "videoDevice",
        }
    }
}

impl fmt::Display for DataFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataFlow::Capture => "capture",
            DataFlow::Notify => "notify",
            DataFlow::Playback => "playback",
            DataFlow::Video => "video",
        };
        f.write_str(name)
    }
}
