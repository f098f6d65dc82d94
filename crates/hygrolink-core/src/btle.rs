//! btleplug-backed [`BleTransport`].
//!
//! A pump task translates the adapter's `CentralEvent` stream into
//! [`TransportEvent`]s. Connects, service discovery and subscriptions run in
//! spawned tasks that report their completion the same way, so no trait
//! method waits on the peripheral.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use btleplug::api::{Central, CentralEvent, CentralState, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::{Stream, StreamExt};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use hygrolink_types::PeripheralHandle;

use crate::error::{DeviceNotFoundReason, Error, Result, TransportError, TransportOperation};
use crate::transport::{
    BleTransport, CharacteristicRef, ServiceInfo, TransportEvent, TransportEventSender,
};

/// Get the first available Bluetooth adapter.
pub async fn get_adapter() -> Result<Adapter> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;

    adapters
        .into_iter()
        .next()
        .ok_or(Error::DeviceNotFound(DeviceNotFoundReason::NoAdapter))
}

/// Format a peripheral ID as a string.
///
/// btleplug only exposes the inner value through `Debug`, wrapped as
/// `PeripheralId(...)`.
pub fn format_peripheral_id(id: &PeripheralId) -> String {
    strip_id_wrapper(&format!("{:?}", id)).to_string()
}

fn strip_id_wrapper(debug: &str) -> &str {
    debug
        .trim_start_matches("PeripheralId(")
        .trim_end_matches(')')
}

/// Pick the identifier for a peripheral.
///
/// CoreBluetooth reports an all-zero address, so the platform ID is used
/// there. Everywhere else the Bluetooth address is the identifier.
pub fn create_identifier(address: &str, peripheral_id: &PeripheralId) -> String {
    choose_identifier(address, || format_peripheral_id(peripheral_id))
}

fn choose_identifier(address: &str, platform_id: impl FnOnce() -> String) -> String {
    if address == "00:00:00:00:00:00" {
        platform_id()
    } else {
        address.to_string()
    }
}

struct Shared {
    events: TransportEventSender,
    discovering: AtomicBool,
    peripherals: RwLock<HashMap<String, Peripheral>>,
    notifications: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl Shared {
    fn report(&self, event: TransportEvent) {
        if !self.events.send(event) {
            debug!("Hub inbox closed, dropping transport event");
        }
    }

    fn report_failure(&self, peripheral: &str, error: TransportError) {
        warn!(peripheral, error = %error, "Transport request failed");
        self.report(TransportEvent::OperationFailed {
            peripheral: Some(peripheral.to_string()),
            error,
        });
    }

    async fn identifier_of(&self, id: &PeripheralId) -> Option<String> {
        self.peripherals
            .read()
            .await
            .iter()
            .find(|(_, p)| p.id() == *id)
            .map(|(identifier, _)| identifier.clone())
    }

    async fn stop_notifications(&self, peripheral: &str) {
        if let Some(handle) = self.notifications.lock().await.remove(peripheral) {
            handle.abort();
        }
    }
}

/// A [`BleTransport`] over the platform Bluetooth stack.
pub struct BtleTransport {
    adapter: Adapter,
    shared: Arc<Shared>,
    pump: JoinHandle<()>,
}

impl std::fmt::Debug for BtleTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BtleTransport")
            .field("discovering", &self.shared.discovering.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl BtleTransport {
    /// Open the first adapter and start forwarding its events.
    pub async fn new(events: TransportEventSender) -> Result<Self> {
        let adapter = get_adapter().await?;
        Self::with_adapter(adapter, events).await
    }

    /// Use a specific adapter.
    pub async fn with_adapter(adapter: Adapter, events: TransportEventSender) -> Result<Self> {
        let stream = adapter.events().await?;
        let shared = Arc::new(Shared {
            events,
            discovering: AtomicBool::new(false),
            peripherals: RwLock::new(HashMap::new()),
            notifications: Mutex::new(HashMap::new()),
        });
        let pump = tokio::spawn(pump(adapter.clone(), stream, Arc::clone(&shared)));
        Ok(Self {
            adapter,
            shared,
            pump,
        })
    }

    async fn lookup(
        &self,
        identifier: &str,
        operation: TransportOperation,
    ) -> std::result::Result<Peripheral, TransportError> {
        self.shared
            .peripherals
            .read()
            .await
            .get(identifier)
            .cloned()
            .ok_or_else(|| TransportError::new(operation, format!("unknown peripheral {identifier}")))
    }
}

impl Drop for BtleTransport {
    fn drop(&mut self) {
        self.pump.abort();
        if let Ok(mut handles) = self.shared.notifications.try_lock() {
            for (_, handle) in handles.drain() {
                handle.abort();
            }
        }
    }
}

async fn pump(
    adapter: Adapter,
    mut stream: Pin<Box<dyn Stream<Item = CentralEvent> + Send>>,
    shared: Arc<Shared>,
) {
    while let Some(event) = stream.next().await {
        if shared.events.is_closed() {
            break;
        }
        match event {
            CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => {
                if !shared.discovering.load(Ordering::SeqCst) {
                    continue;
                }
                let peripheral = match adapter.peripheral(&id).await {
                    Ok(p) => p,
                    Err(e) => {
                        debug!("Failed to resolve peripheral {:?}: {}", id, e);
                        continue;
                    }
                };
                let handle = describe(&peripheral).await;
                shared
                    .peripherals
                    .write()
                    .await
                    .insert(handle.id.clone(), peripheral);
                shared.report(TransportEvent::DeviceFound(handle));
            }
            CentralEvent::DeviceDisconnected(id) => {
                if let Some(identifier) = shared.identifier_of(&id).await {
                    shared.stop_notifications(&identifier).await;
                    shared.report(TransportEvent::ConnectionStateChanged {
                        peripheral: identifier,
                        connected: false,
                    });
                }
            }
            CentralEvent::StateUpdate(state) => {
                debug!("Adapter state changed: {:?}", state);
            }
            _ => {}
        }
    }
    debug!("Adapter event stream ended");
}

async fn describe(peripheral: &Peripheral) -> PeripheralHandle {
    let properties = peripheral.properties().await.ok().flatten();
    let id = properties
        .as_ref()
        .map(|p| create_identifier(&p.address.to_string(), &peripheral.id()))
        .unwrap_or_else(|| format_peripheral_id(&peripheral.id()));
    PeripheralHandle {
        id,
        name: properties.and_then(|p| p.local_name),
    }
}

fn service_table(peripheral: &Peripheral) -> Vec<ServiceInfo> {
    peripheral
        .services()
        .into_iter()
        .map(|service| ServiceInfo {
            uuid: service.uuid,
            characteristics: service
                .characteristics
                .iter()
                .map(|c| CharacteristicRef {
                    service: c.service_uuid,
                    uuid: c.uuid,
                })
                .collect(),
        })
        .collect()
}

#[async_trait]
impl BleTransport for BtleTransport {
    async fn adapter_powered(&self) -> std::result::Result<bool, TransportError> {
        let state = self
            .adapter
            .adapter_state()
            .await
            .map_err(|e| TransportError::from_btleplug(TransportOperation::AdapterState, &e))?;
        // CoreBluetooth reports Unknown until its manager settles.
        Ok(state != CentralState::PoweredOff)
    }

    #[tracing::instrument(level = "debug", skip_all)]
    async fn start_discovery(&self) -> std::result::Result<(), TransportError> {
        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(|e| TransportError::from_btleplug(TransportOperation::StartDiscovery, &e))?;
        self.shared.discovering.store(true, Ordering::SeqCst);
        self.shared.report(TransportEvent::DiscoveryStarted);
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip_all)]
    async fn cancel_discovery(&self) -> std::result::Result<(), TransportError> {
        self.adapter
            .stop_scan()
            .await
            .map_err(|e| TransportError::from_btleplug(TransportOperation::CancelDiscovery, &e))?;
        if self.shared.discovering.swap(false, Ordering::SeqCst) {
            self.shared.report(TransportEvent::DiscoveryFinished);
        }
        Ok(())
    }

    async fn is_discovering(&self) -> bool {
        self.shared.discovering.load(Ordering::SeqCst)
    }

    #[tracing::instrument(level = "info", skip_all, fields(peripheral = %peripheral.id))]
    async fn connect(&self, peripheral: &PeripheralHandle) -> std::result::Result<(), TransportError> {
        let target = self.lookup(&peripheral.id, TransportOperation::Connect).await?;
        let shared = Arc::clone(&self.shared);
        let identifier = peripheral.id.clone();

        tokio::spawn(async move {
            info!("Connecting to {}", identifier);
            match target.connect().await {
                Ok(()) => shared.report(TransportEvent::ConnectionStateChanged {
                    peripheral: identifier,
                    connected: true,
                }),
                Err(e) => shared.report_failure(
                    &identifier,
                    TransportError::from_btleplug(TransportOperation::Connect, &e),
                ),
            }
        });
        Ok(())
    }

    #[tracing::instrument(level = "info", skip_all, fields(peripheral = %peripheral.id))]
    async fn disconnect(&self, peripheral: &PeripheralHandle) -> std::result::Result<(), TransportError> {
        let target = self.lookup(&peripheral.id, TransportOperation::Disconnect).await?;
        self.shared.stop_notifications(&peripheral.id).await;

        let shared = Arc::clone(&self.shared);
        let identifier = peripheral.id.clone();
        tokio::spawn(async move {
            if let Err(e) = target.disconnect().await {
                shared.report_failure(
                    &identifier,
                    TransportError::from_btleplug(TransportOperation::Disconnect, &e),
                );
            }
        });
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip_all, fields(peripheral = %peripheral.id))]
    async fn discover_services(
        &self,
        peripheral: &PeripheralHandle,
    ) -> std::result::Result<(), TransportError> {
        let target = self
            .lookup(&peripheral.id, TransportOperation::DiscoverServices)
            .await?;
        let shared = Arc::clone(&self.shared);
        let identifier = peripheral.id.clone();

        tokio::spawn(async move {
            match target.discover_services().await {
                Ok(()) => {
                    let services = service_table(&target);
                    debug!("Found {} services", services.len());
                    shared.report(TransportEvent::ServicesDiscovered {
                        peripheral: identifier,
                        services,
                    });
                }
                Err(e) => shared.report_failure(
                    &identifier,
                    TransportError::from_btleplug(TransportOperation::DiscoverServices, &e),
                ),
            }
        });
        Ok(())
    }

    #[tracing::instrument(
        level = "debug",
        skip_all,
        fields(peripheral = %peripheral.id, characteristic = %characteristic.uuid, enable)
    )]
    async fn enable_notification(
        &self,
        peripheral: &PeripheralHandle,
        characteristic: &CharacteristicRef,
        enable: bool,
    ) -> std::result::Result<(), TransportError> {
        let target = self
            .lookup(&peripheral.id, TransportOperation::EnableNotification)
            .await?;
        let Some(found) = target
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == characteristic.uuid && c.service_uuid == characteristic.service)
        else {
            return Err(TransportError::new(
                TransportOperation::EnableNotification,
                format!("characteristic {} not found", characteristic.uuid),
            ));
        };

        self.shared.stop_notifications(&peripheral.id).await;
        let shared = Arc::clone(&self.shared);
        let identifier = peripheral.id.clone();

        if !enable {
            tokio::spawn(async move {
                if let Err(e) = target.unsubscribe(&found).await {
                    shared.report_failure(
                        &identifier,
                        TransportError::from_btleplug(TransportOperation::EnableNotification, &e),
                    );
                }
            });
            return Ok(());
        }

        let forwarder = tokio::spawn(async move {
            if let Err(e) = target.subscribe(&found).await {
                shared.report_failure(
                    &identifier,
                    TransportError::from_btleplug(TransportOperation::EnableNotification, &e),
                );
                return;
            }
            let mut stream = match target.notifications().await {
                Ok(stream) => stream,
                Err(e) => {
                    shared.report_failure(
                        &identifier,
                        TransportError::from_btleplug(TransportOperation::ReceiveNotification, &e),
                    );
                    return;
                }
            };
            while let Some(notification) = stream.next().await {
                if notification.uuid != found.uuid {
                    continue;
                }
                shared.report(TransportEvent::CharacteristicChanged {
                    peripheral: identifier.clone(),
                    characteristic: notification.uuid,
                    value: notification.value,
                });
            }
            debug!("Notification stream for {} ended", identifier);
        });
        self.shared
            .notifications
            .lock()
            .await
            .insert(peripheral.id.clone(), forwarder);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_prefers_address() {
        let id = choose_identifier("AA:BB:CC:DD:EE:FF", || unreachable!());
        assert_eq!(id, "AA:BB:CC:DD:EE:FF");
    }

    #[test]
    fn test_identifier_falls_back_on_zero_address() {
        let id = choose_identifier("00:00:00:00:00:00", || {
            "3F2504E0-4F89-11D3-9A0C-0305E82C3301".to_string()
        });
        assert_eq!(id, "3F2504E0-4F89-11D3-9A0C-0305E82C3301");
    }

    #[test]
    fn test_strip_id_wrapper() {
        assert_eq!(
            strip_id_wrapper("PeripheralId(AA:BB:CC:DD:EE:FF)"),
            "AA:BB:CC:DD:EE:FF"
        );
        assert_eq!(strip_id_wrapper("hci0/dev_AA"), "hci0/dev_AA");
    }
}
