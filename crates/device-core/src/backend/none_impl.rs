//! Audio backend without devices
//!
//! Always registered, so that "no audio" is a selectable audio system even on
//! hosts without a native backend.

use super::{BackendKind, DeviceBackend, DeviceSnapshot};
use crate::error::DeviceResult;

#[derive(Debug, Clone, Copy, Default)]
pub struct NoneBackend;

impl DeviceBackend for NoneBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::None
    }

    fn enumerate(&self) -> DeviceResult<DeviceSnapshot> {
        Ok(DeviceSnapshot::new())
    }
}
