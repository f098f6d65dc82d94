//! GATT session state machine.
//!
//! A [`GattSession`] drives one connect, discover-services, enable-notify,
//! receive, disconnect lifecycle for a single peripheral. It performs no I/O:
//! each input returns the [`SessionAction`]s the caller must carry out
//! against the transport, and completions are fed back in as
//! [`SessionEvent`]s.
//!
//! ```text
//! Idle --connect--> Connecting --link up--> Connected --> DiscoveringServices
//!   DiscoveringServices --services ready--> NotifyEnabled | Stalled
//!   NotifyEnabled --data--> NotifyEnabled
//!   any non-terminal --link down / disconnect()--> Disconnected
//!   any non-terminal --transport failure--> Failed
//! ```

use core::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use hygrolink_types::{DecodeError, PeripheralHandle, SensorReading, codec};

use crate::discovery::DiscoverySet;
use crate::error::{Error, Result, TransportError, TransportOperation};
use crate::transport::{CharacteristicRef, ServiceInfo};
use hygrolink_types::uuids::SENSOR_SERVICE;

/// Options for a GATT session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Service whose first characteristic carries the sensor notifications.
    pub service_uuid: Uuid,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            service_uuid: SENSOR_SERVICE,
        }
    }
}

impl SessionOptions {
    /// Create new session options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the target service UUID.
    #[must_use]
    pub fn service_uuid(mut self, uuid: Uuid) -> Self {
        self.service_uuid = uuid;
        self
    }

    /// Validate the options.
    pub fn validate(&self) -> Result<()> {
        if self.service_uuid.is_nil() {
            return Err(Error::invalid_config("service UUID must not be nil"));
        }
        Ok(())
    }
}

/// Why a session stopped short of enabling notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StallReason {
    /// The target service is not in the service table.
    ServiceMissing,
    /// The target service exposes no characteristics.
    NoCharacteristics,
}

impl fmt::Display for StallReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ServiceMissing => write!(f, "sensor service not found"),
            Self::NoCharacteristics => write!(f, "sensor service has no characteristics"),
        }
    }
}

/// State of a [`GattSession`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum GattSessionState {
    /// Constructed, no request issued yet.
    Idle,
    /// Connect requested, waiting for the link.
    Connecting,
    /// Link is up.
    Connected,
    /// Service table requested.
    DiscoveringServices,
    /// Notifications enabled on the sensor characteristic.
    NotifyEnabled,
    /// Service table arrived without a usable sensor characteristic.
    Stalled(StallReason),
    /// Link lost or torn down.
    Disconnected,
    /// A transport request failed.
    Failed(TransportError),
}

impl GattSessionState {
    /// Whether no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Disconnected | Self::Failed(_))
    }

    /// Whether the GATT link is up in this state.
    pub fn has_link(&self) -> bool {
        matches!(
            self,
            Self::Connected | Self::DiscoveringServices | Self::NotifyEnabled | Self::Stalled(_)
        )
    }
}

impl fmt::Display for GattSessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::DiscoveringServices => write!(f, "discovering services"),
            Self::NotifyEnabled => write!(f, "receiving"),
            Self::Stalled(reason) => write!(f, "stalled ({})", reason),
            Self::Disconnected => write!(f, "disconnected"),
            Self::Failed(err) => write!(f, "failed ({})", err),
        }
    }
}

/// Transport completion fed into a session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The link came up.
    LinkUp,
    /// The link went down.
    LinkDown,
    /// The service table arrived.
    ServicesReady(Vec<ServiceInfo>),
    /// A subscribed characteristic pushed a value.
    DataReceived {
        /// Characteristic that changed.
        characteristic: Uuid,
        /// Raw payload.
        value: Vec<u8>,
    },
    /// A request failed.
    TransportFailed(TransportError),
}

/// Work requested by a session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionAction {
    /// Request a connection.
    Connect(PeripheralHandle),
    /// Request the service table.
    DiscoverServices,
    /// Turn notifications on or off.
    EnableNotification(CharacteristicRef, bool),
    /// Tear down the link.
    Disconnect,
    /// A reading decoded successfully.
    Publish(SensorReading),
    /// A payload failed to decode and was dropped.
    Reject {
        /// Payload as text (lossy for non-UTF-8 bytes).
        raw: String,
        /// Why it was rejected.
        error: DecodeError,
    },
}

/// One GATT client session against a single peripheral.
#[derive(Debug)]
pub struct GattSession {
    options: SessionOptions,
    state: GattSessionState,
    peripheral: Option<PeripheralHandle>,
    characteristic: Option<CharacteristicRef>,
    transitions: Vec<(GattSessionState, GattSessionState)>,
    readings: u64,
    rejected: u64,
}

impl GattSession {
    /// Create an idle session.
    pub fn new(options: SessionOptions) -> Self {
        Self {
            options,
            state: GattSessionState::Idle,
            peripheral: None,
            characteristic: None,
            transitions: Vec::new(),
            readings: 0,
            rejected: 0,
        }
    }

    /// Current state.
    pub fn state(&self) -> &GattSessionState {
        &self.state
    }

    /// The peripheral this session targets, once connected.
    pub fn peripheral(&self) -> Option<&PeripheralHandle> {
        self.peripheral.as_ref()
    }

    /// The characteristic notifications were enabled on.
    pub fn characteristic(&self) -> Option<&CharacteristicRef> {
        self.characteristic.as_ref()
    }

    /// Number of readings published.
    pub fn readings(&self) -> u64 {
        self.readings
    }

    /// Number of payloads rejected.
    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    /// Drain the `(from, to)` transitions recorded since the last call.
    pub fn take_transitions(&mut self) -> Vec<(GattSessionState, GattSessionState)> {
        std::mem::take(&mut self.transitions)
    }

    /// Begin connecting to `peripheral`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidTransition`] unless the session is `Idle`.
    /// - [`Error::DeviceNotFound`] if `peripheral` is not in `devices`.
    pub fn connect(
        &mut self,
        peripheral: &PeripheralHandle,
        devices: &DiscoverySet,
    ) -> Result<Vec<SessionAction>> {
        if self.state != GattSessionState::Idle {
            return Err(Error::InvalidTransition {
                state: self.state.to_string(),
                operation: "connect",
            });
        }
        let Some(known) = devices.get(&peripheral.id) else {
            return Err(Error::not_discovered(&peripheral.id));
        };

        self.peripheral = Some(known.clone());
        self.transition(GattSessionState::Connecting);
        Ok(vec![SessionAction::Connect(known.clone())])
    }

    /// Tear the session down. Idempotent once disconnected.
    pub fn disconnect(&mut self) -> Vec<SessionAction> {
        let mut actions = Vec::new();
        match &self.state {
            GattSessionState::Disconnected => return actions,
            GattSessionState::Idle => {}
            GattSessionState::NotifyEnabled => {
                if let Some(characteristic) = self.characteristic.clone() {
                    actions.push(SessionAction::EnableNotification(characteristic, false));
                }
                actions.push(SessionAction::Disconnect);
            }
            _ => actions.push(SessionAction::Disconnect),
        }
        self.transition(GattSessionState::Disconnected);
        actions
    }

    /// Feed a transport completion into the session.
    pub fn handle(&mut self, event: SessionEvent) -> Vec<SessionAction> {
        match event {
            SessionEvent::LinkUp => self.on_link_up(),
            SessionEvent::LinkDown => {
                if !matches!(self.state, GattSessionState::Idle) && !self.state.is_terminal() {
                    self.transition(GattSessionState::Disconnected);
                }
                Vec::new()
            }
            SessionEvent::ServicesReady(services) => self.on_services(&services),
            SessionEvent::DataReceived {
                characteristic,
                value,
            } => self.on_data(characteristic, &value),
            SessionEvent::TransportFailed(error) => {
                if error.operation == TransportOperation::ReceiveNotification {
                    warn!("Notification delivery error: {}", error);
                } else if !self.state.is_terminal() {
                    self.transition(GattSessionState::Failed(error));
                }
                Vec::new()
            }
        }
    }

    fn on_link_up(&mut self) -> Vec<SessionAction> {
        if self.state != GattSessionState::Connecting {
            debug!(state = %self.state, "Ignoring link up");
            return Vec::new();
        }
        self.transition(GattSessionState::Connected);
        self.transition(GattSessionState::DiscoveringServices);
        vec![SessionAction::DiscoverServices]
    }

    fn on_services(&mut self, services: &[ServiceInfo]) -> Vec<SessionAction> {
        if self.state != GattSessionState::DiscoveringServices {
            debug!(state = %self.state, "Ignoring service table");
            return Vec::new();
        }

        let Some(service) = services
            .iter()
            .find(|s| s.uuid == self.options.service_uuid)
        else {
            warn!(service = %self.options.service_uuid, "Sensor service not found");
            self.transition(GattSessionState::Stalled(StallReason::ServiceMissing));
            return Vec::new();
        };
        let Some(characteristic) = service.characteristics.first().cloned() else {
            warn!(service = %service.uuid, "Sensor service has no characteristics");
            self.transition(GattSessionState::Stalled(StallReason::NoCharacteristics));
            return Vec::new();
        };

        debug!(characteristic = %characteristic.uuid, "Enabling notifications");
        self.characteristic = Some(characteristic.clone());
        self.transition(GattSessionState::NotifyEnabled);
        vec![SessionAction::EnableNotification(characteristic, true)]
    }

    fn on_data(&mut self, characteristic: Uuid, value: &[u8]) -> Vec<SessionAction> {
        if self.state != GattSessionState::NotifyEnabled {
            return Vec::new();
        }
        if self.characteristic.as_ref().map(|c| c.uuid) != Some(characteristic) {
            debug!(%characteristic, "Ignoring notification from another characteristic");
            return Vec::new();
        }

        match codec::decode_bytes(value) {
            Ok(reading) => {
                self.readings += 1;
                vec![SessionAction::Publish(reading)]
            }
            Err(error) => {
                let raw = String::from_utf8_lossy(value).into_owned();
                warn!(raw = %raw, error = %error, "Discarding malformed payload");
                self.rejected += 1;
                vec![SessionAction::Reject { raw, error }]
            }
        }
    }

    fn transition(&mut self, to: GattSessionState) {
        let from = std::mem::replace(&mut self.state, to.clone());
        debug!(from = %from, to = %to, "Session transition");
        self.transitions.push((from, to));
    }
}
