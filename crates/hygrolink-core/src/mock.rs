//! Mock transport for testing.
//!
//! [`MockTransport`] implements [`BleTransport`] without hardware. It records
//! every request, can be told to fail specific operations, and lets tests
//! push any [`TransportEvent`] into the hub with [`MockTransport::emit`].
//!
//! Discovery start and cancel report `DiscoveryStarted` / `DiscoveryFinished`
//! like a real adapter. Session completions (link up, service table,
//! notifications) are only produced when a test emits them, unless
//! [`MockTransport::auto_respond`] is enabled.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use uuid::Uuid;

use hygrolink_types::uuids::{SENSOR_DATA, SENSOR_SERVICE};
use hygrolink_types::{PeripheralHandle, SensorReading, codec};

use crate::error::{TransportError, TransportOperation};
use crate::transport::{
    BleTransport, CharacteristicRef, ServiceInfo, TransportEvent, TransportEventSender,
};

/// A request received by a [`MockTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    /// `start_discovery`
    StartDiscovery,
    /// `cancel_discovery`
    CancelDiscovery,
    /// `connect`
    Connect(String),
    /// `disconnect`
    Disconnect(String),
    /// `discover_services`
    DiscoverServices(String),
    /// `enable_notification`
    EnableNotification {
        /// Peripheral identifier.
        peripheral: String,
        /// Characteristic UUID.
        characteristic: Uuid,
        /// Requested notification state.
        enable: bool,
    },
}

/// A scriptable [`BleTransport`].
pub struct MockTransport {
    events: TransportEventSender,
    calls: Mutex<Vec<TransportCall>>,
    failures: Mutex<HashMap<TransportOperation, String>>,
    responses: Mutex<Option<Vec<ServiceInfo>>>,
    powered: AtomicBool,
    discovering: AtomicBool,
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("powered", &self.powered.load(Ordering::Relaxed))
            .field("discovering", &self.discovering.load(Ordering::Relaxed))
            .field("calls", &lock(&self.calls).len())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockTransport {
    /// Create a powered, idle mock transport.
    pub fn new(events: TransportEventSender) -> Self {
        Self {
            events,
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
            responses: Mutex::new(None),
            powered: AtomicBool::new(true),
            discovering: AtomicBool::new(false),
        }
    }

    /// Answer `connect` with link up, `disconnect` with link down and
    /// `discover_services` with `services`.
    #[must_use]
    pub fn auto_respond(self, services: Vec<ServiceInfo>) -> Self {
        *lock(&self.responses) = Some(services);
        self
    }

    /// The service table of a stock sensor: one sensor service with the
    /// sensor data characteristic.
    pub fn sensor_services() -> Vec<ServiceInfo> {
        vec![ServiceInfo::new(SENSOR_SERVICE, [SENSOR_DATA])]
    }

    /// Requests received so far, in order.
    pub fn calls(&self) -> Vec<TransportCall> {
        lock(&self.calls).clone()
    }

    /// Forget recorded requests.
    pub fn clear_calls(&self) {
        lock(&self.calls).clear();
    }

    /// Make every request of kind `operation` fail with `reason`.
    pub fn fail(&self, operation: TransportOperation, reason: impl Into<String>) {
        lock(&self.failures).insert(operation, reason.into());
    }

    /// Stop failing `operation`.
    pub fn clear_failure(&self, operation: TransportOperation) {
        lock(&self.failures).remove(&operation);
    }

    /// Set whether the adapter reports itself powered.
    pub fn set_powered(&self, powered: bool) {
        self.powered.store(powered, Ordering::SeqCst);
    }

    /// Push an event into the hub inbox. Returns `false` once the hub is gone.
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.events.send(event)
    }

    /// Emit a discovery result.
    pub fn emit_device(&self, handle: PeripheralHandle) -> bool {
        self.emit(TransportEvent::DeviceFound(handle))
    }

    /// Emit a link state change.
    pub fn emit_link(&self, peripheral: &str, connected: bool) -> bool {
        self.emit(TransportEvent::ConnectionStateChanged {
            peripheral: peripheral.to_string(),
            connected,
        })
    }

    /// Emit a service table.
    pub fn emit_services(&self, peripheral: &str, services: Vec<ServiceInfo>) -> bool {
        self.emit(TransportEvent::ServicesDiscovered {
            peripheral: peripheral.to_string(),
            services,
        })
    }

    /// Emit a raw notification on the sensor data characteristic.
    pub fn emit_payload(&self, peripheral: &str, payload: &[u8]) -> bool {
        self.emit(TransportEvent::CharacteristicChanged {
            peripheral: peripheral.to_string(),
            characteristic: SENSOR_DATA,
            value: payload.to_vec(),
        })
    }

    /// Emit a reading in wire form on the sensor data characteristic.
    pub fn emit_reading(&self, peripheral: &str, reading: &SensorReading) -> bool {
        self.emit_payload(peripheral, codec::encode(reading).as_bytes())
    }

    fn record(
        &self,
        call: TransportCall,
        operation: TransportOperation,
    ) -> Result<(), TransportError> {
        lock(&self.calls).push(call);
        match lock(&self.failures).get(&operation) {
            Some(reason) => Err(TransportError::new(operation, reason.clone())),
            None => Ok(()),
        }
    }

    fn responses(&self) -> Option<Vec<ServiceInfo>> {
        lock(&self.responses).clone()
    }
}

#[async_trait]
impl BleTransport for MockTransport {
    async fn adapter_powered(&self) -> Result<bool, TransportError> {
        Ok(self.powered.load(Ordering::SeqCst))
    }

    async fn start_discovery(&self) -> Result<(), TransportError> {
        self.record(TransportCall::StartDiscovery, TransportOperation::StartDiscovery)?;
        self.discovering.store(true, Ordering::SeqCst);
        self.emit(TransportEvent::DiscoveryStarted);
        Ok(())
    }

    async fn cancel_discovery(&self) -> Result<(), TransportError> {
        self.record(TransportCall::CancelDiscovery, TransportOperation::CancelDiscovery)?;
        if self.discovering.swap(false, Ordering::SeqCst) {
            self.emit(TransportEvent::DiscoveryFinished);
        }
        Ok(())
    }

    async fn is_discovering(&self) -> bool {
        self.discovering.load(Ordering::SeqCst)
    }

    async fn connect(&self, peripheral: &PeripheralHandle) -> Result<(), TransportError> {
        self.record(
            TransportCall::Connect(peripheral.id.clone()),
            TransportOperation::Connect,
        )?;
        if self.responses().is_some() {
            self.emit_link(&peripheral.id, true);
        }
        Ok(())
    }

    async fn disconnect(&self, peripheral: &PeripheralHandle) -> Result<(), TransportError> {
        self.record(
            TransportCall::Disconnect(peripheral.id.clone()),
            TransportOperation::Disconnect,
        )?;
        if self.responses().is_some() {
            self.emit_link(&peripheral.id, false);
        }
        Ok(())
    }

    async fn discover_services(&self, peripheral: &PeripheralHandle) -> Result<(), TransportError> {
        self.record(
            TransportCall::DiscoverServices(peripheral.id.clone()),
            TransportOperation::DiscoverServices,
        )?;
        if let Some(services) = self.responses() {
            self.emit_services(&peripheral.id, services);
        }
        Ok(())
    }

    async fn enable_notification(
        &self,
        peripheral: &PeripheralHandle,
        characteristic: &CharacteristicRef,
        enable: bool,
    ) -> Result<(), TransportError> {
        self.record(
            TransportCall::EnableNotification {
                peripheral: peripheral.id.clone(),
                characteristic: characteristic.uuid,
                enable,
            },
            TransportOperation::EnableNotification,
        )
    }
}
