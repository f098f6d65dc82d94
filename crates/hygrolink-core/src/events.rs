//! Hub event bus.
//!
//! Every discovery, session transition and payload outcome the hub processes
//! is broadcast as a [`HubEvent`]. Events are serializable so front ends can
//! print them as JSON lines.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::broadcast;

use hygrolink_types::{PeripheralHandle, SensorReading};

use crate::session::GattSessionState;

/// Default capacity of the event channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 100;

/// Events emitted by the sensor hub.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new event types
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum HubEvent {
    /// Discovery started.
    ScanStarted,
    /// A new peripheral entered the discovery set.
    DeviceDiscovered { device: PeripheralHandle },
    /// Discovery stopped.
    ScanFinished { devices: usize },
    /// The active session changed state.
    SessionStateChanged {
        device: PeripheralHandle,
        state: GattSessionState,
    },
    /// A reading was decoded and stored.
    Reading {
        device: PeripheralHandle,
        reading: SensorReading,
        #[serde(with = "time::serde::rfc3339")]
        received_at: OffsetDateTime,
    },
    /// A payload failed to decode; the stored reading is unchanged.
    PayloadRejected {
        device: PeripheralHandle,
        raw: String,
        error: String,
    },
}

/// Sender for hub events.
pub type EventSender = broadcast::Sender<HubEvent>;

/// Receiver for hub events.
pub type EventReceiver = broadcast::Receiver<HubEvent>;

/// Fan-out of hub events to any number of subscribers.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    sender: EventSender,
}

impl EventDispatcher {
    /// Create a dispatcher whose subscribers buffer up to `capacity` events.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events.
    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Send an event.
    pub fn send(&self, event: HubEvent) {
        // No subscribers is fine.
        let _ = self.sender.send(event);
    }

    /// Get the number of active receivers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}
