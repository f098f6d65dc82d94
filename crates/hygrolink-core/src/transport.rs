//! The BLE transport seam.
//!
//! [`BleTransport`] is the capability surface consumed from the platform.
//! Every request is fire-and-report: the method returns once the platform
//! has accepted the request, and the outcome arrives later as a
//! [`TransportEvent`] pushed through a [`TransportEventSender`] into the
//! hub's inbox. Transports may push events from any thread; the hub
//! processes them one at a time.

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use hygrolink_types::PeripheralHandle;

use crate::error::TransportError;
use crate::inbox::Inbound;

/// Reference to a characteristic within a discovered service.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CharacteristicRef {
    /// UUID of the owning service.
    pub service: Uuid,
    /// UUID of the characteristic.
    pub uuid: Uuid,
}

/// One entry of a peripheral's service table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInfo {
    /// Service UUID.
    pub uuid: Uuid,
    /// Characteristics in the order the platform reported them.
    pub characteristics: Vec<CharacteristicRef>,
}

impl ServiceInfo {
    /// Build a service entry from a list of characteristic UUIDs.
    pub fn new(uuid: Uuid, characteristics: impl IntoIterator<Item = Uuid>) -> Self {
        Self {
            uuid,
            characteristics: characteristics
                .into_iter()
                .map(|c| CharacteristicRef {
                    service: uuid,
                    uuid: c,
                })
                .collect(),
        }
    }
}

/// Asynchronous notifications from the platform transport.
///
/// Session-scoped events carry the identifier of the peripheral they concern.
/// The hub drops events for any peripheral other than the current session's,
/// and the link-down that completes a teardown of the same peripheral.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Discovery has started.
    DiscoveryStarted,
    /// A peripheral advertisement was seen.
    DeviceFound(PeripheralHandle),
    /// Discovery has stopped (cancelled or timed out by the platform).
    DiscoveryFinished,
    /// The GATT link came up or went down.
    ConnectionStateChanged {
        /// Peripheral identifier.
        peripheral: String,
        /// `true` for link up, `false` for link down.
        connected: bool,
    },
    /// The service table is available.
    ServicesDiscovered {
        /// Peripheral identifier.
        peripheral: String,
        /// Services in platform order.
        services: Vec<ServiceInfo>,
    },
    /// A subscribed characteristic pushed a value.
    CharacteristicChanged {
        /// Peripheral identifier.
        peripheral: String,
        /// The characteristic that changed.
        characteristic: Uuid,
        /// Raw notification bytes.
        value: Vec<u8>,
    },
    /// A previously accepted request failed.
    OperationFailed {
        /// Peripheral identifier, `None` for adapter-level operations.
        peripheral: Option<String>,
        /// What failed and why.
        error: TransportError,
    },
}

/// Sender half used by transports to push [`TransportEvent`]s into the hub.
#[derive(Debug, Clone)]
pub struct TransportEventSender {
    tx: mpsc::UnboundedSender<Inbound>,
}

impl TransportEventSender {
    pub(crate) fn new(tx: mpsc::UnboundedSender<Inbound>) -> Self {
        Self { tx }
    }

    /// Push an event. Returns `false` once the hub has shut down.
    pub fn send(&self, event: TransportEvent) -> bool {
        self.tx.send(Inbound::Transport(event)).is_ok()
    }

    /// Check whether the hub has shut down.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Capability surface consumed from the platform's BLE stack.
///
/// Implementations must not block: long-running work (connecting, service
/// discovery) is started and reported back through the event sender.
#[async_trait]
pub trait BleTransport: Send + Sync {
    /// Whether the adapter is powered on.
    ///
    /// The default implementation reports a powered adapter.
    async fn adapter_powered(&self) -> Result<bool, TransportError> {
        Ok(true)
    }

    /// Begin device discovery.
    async fn start_discovery(&self) -> Result<(), TransportError>;

    /// Stop device discovery.
    async fn cancel_discovery(&self) -> Result<(), TransportError>;

    /// Whether discovery is currently running.
    async fn is_discovering(&self) -> bool;

    /// Request a GATT connection to `peripheral`.
    async fn connect(&self, peripheral: &PeripheralHandle) -> Result<(), TransportError>;

    /// Tear down the GATT connection to `peripheral`.
    async fn disconnect(&self, peripheral: &PeripheralHandle) -> Result<(), TransportError>;

    /// Request the service table of a connected peripheral.
    async fn discover_services(&self, peripheral: &PeripheralHandle)
    -> Result<(), TransportError>;

    /// Turn notification delivery for `characteristic` on or off.
    async fn enable_notification(
        &self,
        peripheral: &PeripheralHandle,
        characteristic: &CharacteristicRef,
        enable: bool,
    ) -> Result<(), TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use hygrolink_types::uuids::{SENSOR_DATA, SENSOR_SERVICE};

    #[test]
    fn test_service_info_new() {
        let service = ServiceInfo::new(SENSOR_SERVICE, [SENSOR_DATA]);
        assert_eq!(service.uuid, SENSOR_SERVICE);
        assert_eq!(
            service.characteristics,
            vec![CharacteristicRef {
                service: SENSOR_SERVICE,
                uuid: SENSOR_DATA,
            }]
        );
    }

    #[test]
    fn test_sender_reports_closed_inbox() {
        let (tx, rx) = mpsc::unbounded_channel();
        let sender = TransportEventSender::new(tx);
        assert!(sender.send(TransportEvent::DiscoveryStarted));

        drop(rx);
        assert!(sender.is_closed());
        assert!(!sender.send(TransportEvent::DiscoveryFinished));
    }
}
