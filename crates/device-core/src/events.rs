//! Device events delivered to UI and call layers

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::trace;

use crate::device::Device;
use crate::flow::DataFlow;

/// Events emitted by a device system
#[derive(Debug, Clone)]
pub enum DeviceEvent {
    /// The selected device of a flow changed during a refresh
    SelectionChanged {
        /// Locator protocol of the emitting backend
        backend: String,
        flow: DataFlow,
        /// Previously selected device
        old: Option<Device>,
        /// Newly selected device
        new: Option<Device>,
        at: DateTime<Utc>,
    },

    /// A rescan found devices added or removed
    DevicesChanged {
        backend: String,
        added: Vec<Device>,
        removed: Vec<Device>,
        at: DateTime<Utc>,
    },
}

impl DeviceEvent {
    /// Locator protocol of the backend that emitted the event
    pub fn backend(&self) -> &str {
        match self {
            DeviceEvent::SelectionChanged { backend, .. } | DeviceEvent::DevicesChanged { backend, .. } => backend,
        }
    }
}

/// Event stream type
pub type EventStream = BroadcastStream<DeviceEvent>;

/// Simple event iterator that doesn't require StreamExt
pub struct EventIterator {
    stream: EventStream,
}

impl EventIterator {
    pub fn new(stream: EventStream) -> Self {
        Self { stream }
    }

    /// Next event. Lagged notifications are skipped; `None` once the
    /// emitter is gone.
    pub async fn next(&mut self) -> Option<DeviceEvent> {
        use tokio_stream::StreamExt;
        while let Some(item) = self.stream.next().await {
            if let Ok(event) = item {
                return Some(event);
            }
        }
        None
    }
}

/// Broadcast sender shared by a device system and its managers
#[derive(Debug, Clone)]
pub struct EventEmitter {
    sender: broadcast::Sender<DeviceEvent>,
}

impl EventEmitter {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Emit an event. Having no subscribers is fine.
    pub fn emit(&self, event: DeviceEvent) {
        if self.sender.send(event).is_err() {
            trace!("No device event subscribers");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.sender.subscribe()
    }

    pub fn stream(&self) -> EventStream {
        BroadcastStream::new(self.sender.subscribe())
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MediaLocator;

    #[tokio::test]
    async fn test_emit_without_subscribers_is_silent() {
        let emitter = EventEmitter::new(4);
        assert_eq!(emitter.subscriber_count(), 0);
        emitter.emit(DeviceEvent::DevicesChanged {
            backend: "none".into(),
            added: vec![],
            removed: vec![],
            at: Utc::now(),
        });
    }

    #[tokio::test]
    async fn test_iterator_receives_events() {
        let emitter = EventEmitter::new(4);
        let mut events = EventIterator::new(emitter.stream());

        let mic = Device::new("Mic", MediaLocator::new("wasapi", "#m")).with_uid("m");
        emitter.emit(DeviceEvent::SelectionChanged {
            backend: "wasapi".into(),
            flow: DataFlow::Capture,
            old: None,
            new: Some(mic.clone()),
            at: Utc::now(),
        });

        match events.next().await {
            Some(DeviceEvent::SelectionChanged { flow, new, .. }) => {
                assert_eq!(flow, DataFlow::Capture);
                assert_eq!(new, Some(mic));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
