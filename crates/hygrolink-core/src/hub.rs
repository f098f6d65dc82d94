//! The sensor hub actor.
//!
//! [`SensorHub`] owns the transport, the [`ScanController`], the current
//! [`GattSession`] and the [`SensorState`], and processes one inbox message
//! at a time: presentation commands, transport events and scan deadlines.
//! Front ends talk to it through a cloneable [`HubHandle`].
//!
//! # Example
//!
//! ```no_run
//! use hygrolink_core::{HubConfig, SensorHub};
//!
//! #[tokio::main]
//! async fn main() -> hygrolink_core::Result<()> {
//!     let hub = SensorHub::with_bluetooth(HubConfig::default()).await?;
//!     hub.start_scan().await?;
//!     tokio::time::sleep(std::time::Duration::from_secs(10)).await;
//!
//!     for device in hub.device_list().await? {
//!         println!("{}", device);
//!     }
//!     hub.shutdown().await?;
//!     Ok(())
//! }
//! ```

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use hygrolink_types::{PeripheralHandle, SensorReading};

use crate::btle::BtleTransport;
use crate::error::{DeviceNotFoundReason, Error, Result, TransportError};
use crate::events::{DEFAULT_EVENT_CAPACITY, EventDispatcher, EventReceiver, HubEvent};
use crate::inbox::{Command, HubInbox, Inbound, inbox};
use crate::scan::{ScanController, ScanDeadline, ScanOptions};
use crate::session::{GattSession, GattSessionState, SessionAction, SessionEvent, SessionOptions};
use crate::state::SensorState;
use crate::transport::{BleTransport, TransportEvent};

/// Configuration for a [`SensorHub`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubConfig {
    /// Scan behaviour.
    pub scan: ScanOptions,
    /// GATT session behaviour.
    pub session: SessionOptions,
    /// Buffer size of each event subscriber.
    pub event_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            scan: ScanOptions::default(),
            session: SessionOptions::default(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl HubConfig {
    /// Create a configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the scan options.
    #[must_use]
    pub fn scan(mut self, scan: ScanOptions) -> Self {
        self.scan = scan;
        self
    }

    /// Set the session options.
    #[must_use]
    pub fn session(mut self, session: SessionOptions) -> Self {
        self.session = session;
        self
    }

    /// Set the event buffer size.
    #[must_use]
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        self.scan.validate()?;
        self.session.validate()?;
        if self.event_capacity == 0 {
            return Err(Error::invalid_config("event_capacity must be > 0"));
        }
        Ok(())
    }
}

/// The actor behind a [`HubHandle`].
pub struct SensorHub {
    transport: Arc<dyn BleTransport>,
    config: HubConfig,
    scan: ScanController,
    session: Option<GattSession>,
    selected: Option<PeripheralHandle>,
    state: SensorState,
    session_state: watch::Sender<Option<GattSessionState>>,
    /// Peripherals whose link was up when their session was torn down and
    /// whose link-down has not arrived yet.
    pending_teardown: HashSet<String>,
    events: EventDispatcher,
    rx: mpsc::UnboundedReceiver<Inbound>,
}

impl SensorHub {
    /// Start a hub task driving `transport`.
    ///
    /// `inbox` must be the one whose event sender was given to `transport`.
    pub fn spawn(
        transport: Arc<dyn BleTransport>,
        inbox: HubInbox,
        config: HubConfig,
    ) -> Result<HubHandle> {
        config.validate()?;

        let HubInbox { tx, rx } = inbox;
        let state = SensorState::new();
        let session_state = watch::Sender::new(None);
        let events = EventDispatcher::new(config.event_capacity);

        let handle = HubHandle {
            tx: tx.clone(),
            events: events.clone(),
            reading: state.watch_reading(),
            devices: state.watch_devices(),
            session: session_state.subscribe(),
        };
        let hub = SensorHub {
            transport,
            scan: ScanController::new(config.scan.clone(), tx),
            config,
            session: None,
            selected: None,
            state,
            session_state,
            pending_teardown: HashSet::new(),
            events,
            rx,
        };
        tokio::spawn(hub.run());
        Ok(handle)
    }

    /// Open the first Bluetooth adapter and start a hub on it.
    pub async fn with_bluetooth(config: HubConfig) -> Result<HubHandle> {
        let (events, inbox) = inbox();
        let transport = BtleTransport::new(events).await?;
        Self::spawn(Arc::new(transport), inbox, config)
    }

    async fn run(mut self) {
        debug!("Sensor hub started");
        while let Some(message) = self.rx.recv().await {
            match message {
                Inbound::Command(Command::Shutdown { reply }) => {
                    self.teardown().await;
                    let _ = reply.send(());
                    break;
                }
                Inbound::Command(command) => self.on_command(command).await,
                Inbound::Transport(event) => self.on_transport(event).await,
                Inbound::Deadline(deadline) => self.on_deadline(deadline).await,
            }
        }
        debug!("Sensor hub stopped");
    }

    async fn on_command(&mut self, command: Command) {
        match command {
            Command::StartScan { duration, reply } => {
                let _ = reply.send(self.start_scan(duration).await);
            }
            Command::SelectDevice { handle, reply } => {
                let _ = reply.send(self.select_device(handle));
            }
            Command::ConnectSelected { reply } => {
                let _ = reply.send(self.connect_selected().await);
            }
            Command::DisconnectCurrent { reply } => {
                self.disconnect_current().await;
                let _ = reply.send(());
            }
            Command::CurrentReading { reply } => {
                let _ = reply.send(self.state.current_reading());
            }
            Command::DeviceList { reply } => {
                let _ = reply.send(self.state.device_list());
            }
            Command::SessionState { reply } => {
                let _ = reply.send(self.session.as_ref().map(|s| s.state().clone()));
            }
            Command::Selected { reply } => {
                let _ = reply.send(self.selected.clone());
            }
            Command::Shutdown { reply } => {
                self.teardown().await;
                let _ = reply.send(());
            }
        }
    }

    async fn start_scan(&mut self, duration: Option<Duration>) -> Result<()> {
        match self.transport.adapter_powered().await {
            Ok(true) => {}
            Ok(false) => return Err(Error::AdapterUnavailable),
            Err(e) => warn!("Could not read adapter state: {}", e),
        }
        self.scan
            .start_scan(self.transport.as_ref(), self.state.devices_mut(), duration)
            .await?;
        self.state.publish_devices();
        Ok(())
    }

    fn select_device(&mut self, handle: PeripheralHandle) -> Result<()> {
        let Some(known) = self.state.devices().get(&handle.id) else {
            return Err(Error::not_discovered(handle.id));
        };
        info!("Selected {}", known);
        self.selected = Some(known.clone());
        Ok(())
    }

    async fn connect_selected(&mut self) -> Result<PeripheralHandle> {
        let selected = self
            .selected
            .clone()
            .ok_or(Error::DeviceNotFound(DeviceNotFoundReason::NothingSelected))?;

        let mut session = GattSession::new(self.config.session.clone());
        let actions = session.connect(&selected, self.state.devices())?;

        if let Some(mut previous) = self.session.take() {
            if !previous.state().is_terminal() {
                debug!("Tearing down previous session");
                self.tear_down(&mut previous).await;
            }
        }

        info!("Connecting to {}", selected);
        self.run_actions(&mut session, actions).await;
        self.session = Some(session);
        self.sync_session_state();
        Ok(selected)
    }

    async fn disconnect_current(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        self.tear_down(&mut session).await;
        self.session = Some(session);
        self.sync_session_state();
    }

    /// Disconnect `session`. If its link was up, the platform's link-down
    /// for that peripheral is still to come and must not reach a later
    /// session to the same device.
    async fn tear_down(&mut self, session: &mut GattSession) {
        if session.state().has_link() {
            if let Some(peripheral) = session.peripheral() {
                self.pending_teardown.insert(peripheral.id.clone());
            }
        }
        let actions = session.disconnect();
        self.run_actions(session, actions).await;
    }

    async fn teardown(&mut self) {
        info!("Shutting down sensor hub");
        if let Err(e) = self.scan.stop(self.transport.as_ref()).await {
            warn!("Failed to stop discovery: {}", e);
        }
        self.disconnect_current().await;
    }

    async fn on_deadline(&mut self, deadline: ScanDeadline) {
        if let Err(e) = self.scan.on_deadline(self.transport.as_ref(), deadline).await {
            warn!("Failed to stop discovery at scan deadline: {}", e);
        }
    }

    async fn on_transport(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::DiscoveryStarted => {
                self.scan.on_started();
                self.events.send(HubEvent::ScanStarted);
            }
            TransportEvent::DeviceFound(handle) => {
                let devices = self.state.devices_mut();
                if self.scan.on_device_found(devices, handle.clone()) {
                    debug!("Discovered {}", handle);
                    let device = self.state.devices().get(&handle.id).cloned().unwrap_or(handle);
                    self.events.send(HubEvent::DeviceDiscovered { device });
                }
                self.state.publish_devices();
            }
            TransportEvent::DiscoveryFinished => {
                self.scan.on_finished();
                let devices = self.state.devices().len();
                info!("Scan finished, {} device(s) found", devices);
                self.events.send(HubEvent::ScanFinished { devices });
            }
            TransportEvent::ConnectionStateChanged {
                peripheral,
                connected,
            } => {
                let torn_down = self.pending_teardown.remove(&peripheral);
                if torn_down && !connected {
                    debug!(peripheral, "Link down from a torn-down session, dropping");
                    return;
                }
                let event = if connected {
                    SessionEvent::LinkUp
                } else {
                    SessionEvent::LinkDown
                };
                self.feed_session(&peripheral, event).await;
            }
            TransportEvent::ServicesDiscovered {
                peripheral,
                services,
            } => {
                self.feed_session(&peripheral, SessionEvent::ServicesReady(services))
                    .await;
            }
            TransportEvent::CharacteristicChanged {
                peripheral,
                characteristic,
                value,
            } => {
                self.feed_session(
                    &peripheral,
                    SessionEvent::DataReceived {
                        characteristic,
                        value,
                    },
                )
                .await;
            }
            TransportEvent::OperationFailed {
                peripheral: Some(peripheral),
                error,
            } => {
                self.feed_session(&peripheral, SessionEvent::TransportFailed(error))
                    .await;
            }
            TransportEvent::OperationFailed {
                peripheral: None,
                error,
            } => {
                warn!("Adapter error: {}", error);
            }
        }
    }

    /// Route a session-scoped event to the current session if it targets
    /// the same peripheral.
    async fn feed_session(&mut self, peripheral: &str, event: SessionEvent) {
        let Some(mut session) = self.session.take() else {
            debug!(peripheral, "No session, dropping event");
            return;
        };
        if session.peripheral().map(|p| p.id.as_str()) != Some(peripheral) {
            debug!(peripheral, "Event for an abandoned session, dropping");
            self.session = Some(session);
            return;
        }

        let actions = session.handle(event);
        self.run_actions(&mut session, actions).await;
        self.session = Some(session);
        self.sync_session_state();
    }

    /// Carry out session actions in order. A request the transport refuses
    /// is fed back into the session as a failure.
    async fn run_actions(&mut self, session: &mut GattSession, actions: Vec<SessionAction>) {
        let mut queue: VecDeque<SessionAction> = actions.into();
        while let Some(action) = queue.pop_front() {
            let Some(peripheral) = session.peripheral().cloned() else {
                break;
            };
            let outcome: std::result::Result<(), TransportError> = match action {
                SessionAction::Connect(target) => self.transport.connect(&target).await,
                SessionAction::DiscoverServices => {
                    self.transport.discover_services(&peripheral).await
                }
                SessionAction::EnableNotification(characteristic, enable) => {
                    self.transport
                        .enable_notification(&peripheral, &characteristic, enable)
                        .await
                }
                SessionAction::Disconnect => {
                    let result = self.transport.disconnect(&peripheral).await;
                    if result.is_err() {
                        self.pending_teardown.remove(&peripheral.id);
                    }
                    result
                }
                SessionAction::Publish(reading) => {
                    self.publish(&peripheral, reading);
                    Ok(())
                }
                SessionAction::Reject { raw, error } => {
                    self.events.send(HubEvent::PayloadRejected {
                        device: peripheral.clone(),
                        raw,
                        error: error.to_string(),
                    });
                    Ok(())
                }
            };
            if let Err(error) = outcome {
                warn!("{}", error);
                queue.extend(session.handle(SessionEvent::TransportFailed(error)));
            }
        }
        self.broadcast_transitions(session);
    }

    fn publish(&self, peripheral: &PeripheralHandle, reading: SensorReading) {
        debug!(
            temperature = reading.temperature,
            humidity = reading.humidity,
            "Reading received"
        );
        self.state.update_reading(reading);
        self.events.send(HubEvent::Reading {
            device: peripheral.clone(),
            reading,
            received_at: OffsetDateTime::now_utc(),
        });
    }

    fn broadcast_transitions(&self, session: &mut GattSession) {
        let Some(device) = session.peripheral().cloned() else {
            session.take_transitions();
            return;
        };
        for (_, state) in session.take_transitions() {
            self.events.send(HubEvent::SessionStateChanged {
                device: device.clone(),
                state,
            });
        }
    }

    fn sync_session_state(&self) {
        let current = self.session.as_ref().map(|s| s.state().clone());
        self.session_state.send_if_modified(|state| {
            if *state == current {
                return false;
            }
            *state = current;
            true
        });
    }
}

/// Cloneable front-end handle to a running [`SensorHub`].
#[derive(Debug, Clone)]
pub struct HubHandle {
    tx: mpsc::UnboundedSender<Inbound>,
    events: EventDispatcher,
    reading: watch::Receiver<SensorReading>,
    devices: watch::Receiver<Vec<PeripheralHandle>>,
    session: watch::Receiver<Option<GattSessionState>>,
}

impl HubHandle {
    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(Inbound::Command(build(reply)))
            .map_err(|_| Error::HubClosed)?;
        response.await.map_err(|_| Error::HubClosed)
    }

    /// Start a scan with the configured duration, restarting any scan in
    /// progress.
    pub async fn start_scan(&self) -> Result<()> {
        self.request(|reply| Command::StartScan {
            duration: None,
            reply,
        })
        .await?
    }

    /// Start a scan that runs for `duration`.
    pub async fn start_scan_for(&self, duration: Duration) -> Result<()> {
        self.request(|reply| Command::StartScan {
            duration: Some(duration),
            reply,
        })
        .await?
    }

    /// Choose the peripheral [`connect_selected`](Self::connect_selected)
    /// will use. It must be in the current device list.
    pub async fn select_device(&self, handle: PeripheralHandle) -> Result<()> {
        self.request(|reply| Command::SelectDevice { handle, reply })
            .await?
    }

    /// Start a session against the selected peripheral.
    ///
    /// A live previous session is disconnected first.
    pub async fn connect_selected(&self) -> Result<PeripheralHandle> {
        self.request(|reply| Command::ConnectSelected { reply })
            .await?
    }

    /// Disconnect the current session. Does nothing if there is none or it
    /// is already disconnected.
    pub async fn disconnect_current(&self) -> Result<()> {
        self.request(|reply| Command::DisconnectCurrent { reply })
            .await
    }

    /// The latest reading.
    pub async fn current_reading(&self) -> Result<SensorReading> {
        self.request(|reply| Command::CurrentReading { reply }).await
    }

    /// The discovered devices in first-seen order.
    pub async fn device_list(&self) -> Result<Vec<PeripheralHandle>> {
        self.request(|reply| Command::DeviceList { reply }).await
    }

    /// State of the current session, `None` before the first connect.
    pub async fn session_state(&self) -> Result<Option<GattSessionState>> {
        self.request(|reply| Command::SessionState { reply }).await
    }

    /// The selected peripheral.
    pub async fn selected(&self) -> Result<Option<PeripheralHandle>> {
        self.request(|reply| Command::Selected { reply }).await
    }

    /// Subscribe to hub events.
    pub fn subscribe(&self) -> EventReceiver {
        self.events.subscribe()
    }

    /// Observe the latest reading.
    pub fn watch_reading(&self) -> watch::Receiver<SensorReading> {
        self.reading.clone()
    }

    /// Observe the device list.
    pub fn watch_devices(&self) -> watch::Receiver<Vec<PeripheralHandle>> {
        self.devices.clone()
    }

    /// Observe the current session state.
    pub fn watch_session(&self) -> watch::Receiver<Option<GattSessionState>> {
        self.session.clone()
    }

    /// Stop discovery, disconnect the session and stop the hub.
    pub async fn shutdown(&self) -> Result<()> {
        self.request(|reply| Command::Shutdown { reply }).await
    }

    /// Whether the hub has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportOperation;
    use crate::mock::{MockTransport, TransportCall};
    use crate::session::StallReason;
    use hygrolink_types::uuids::SENSOR_DATA;

    fn spawn_hub(config: HubConfig) -> (Arc<MockTransport>, HubHandle) {
        let (events, inbox) = inbox();
        let mock = Arc::new(MockTransport::new(events));
        let hub = SensorHub::spawn(mock.clone(), inbox, config).unwrap();
        (mock, hub)
    }

    async fn discovered(mock: &MockTransport, hub: &HubHandle, ids: &[&str]) {
        hub.start_scan().await.unwrap();
        for id in ids {
            mock.emit_device(PeripheralHandle::new(*id));
        }
    }

    async fn notifying(mock: &MockTransport, hub: &HubHandle, id: &str) {
        discovered(mock, hub, &[id]).await;
        hub.select_device(PeripheralHandle::new(id)).await.unwrap();
        hub.connect_selected().await.unwrap();
        mock.emit_link(id, true);
        mock.emit_services(id, MockTransport::sensor_services());
        assert_eq!(
            hub.session_state().await.unwrap(),
            Some(GattSessionState::NotifyEnabled)
        );
    }

    #[test]
    fn test_hub_config_validate() {
        assert!(HubConfig::default().validate().is_ok());
        assert!(HubConfig::new().event_capacity(0).validate().is_err());
        assert!(
            HubConfig::new()
                .scan(ScanOptions::new().duration(Duration::ZERO))
                .validate()
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_spawn_rejects_invalid_config() {
        let (events, inbox) = inbox();
        let mock = Arc::new(MockTransport::new(events));
        let result = SensorHub::spawn(mock, inbox, HubConfig::new().event_capacity(0));
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_initial_state() {
        let (_mock, hub) = spawn_hub(HubConfig::default());
        assert_eq!(hub.current_reading().await.unwrap(), SensorReading::default());
        assert!(hub.device_list().await.unwrap().is_empty());
        assert_eq!(hub.session_state().await.unwrap(), None);
        assert_eq!(hub.selected().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_scan_deduplicates_devices() {
        let (mock, hub) = spawn_hub(HubConfig::default());
        discovered(&mock, &hub, &["A", "B", "A"]).await;

        let ids: Vec<_> = hub
            .device_list()
            .await
            .unwrap()
            .into_iter()
            .map(|h| h.id)
            .collect();
        assert_eq!(ids, ["A", "B"]);
    }

    #[tokio::test]
    async fn test_device_found_recorded_without_scan_command() {
        let (mock, hub) = spawn_hub(HubConfig::default());
        mock.emit_device(PeripheralHandle::new("A"));
        assert_eq!(hub.device_list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_scan_rejected_when_adapter_off() {
        let (mock, hub) = spawn_hub(HubConfig::default());
        mock.set_powered(false);
        assert!(matches!(
            hub.start_scan().await,
            Err(Error::AdapterUnavailable)
        ));
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn test_restart_scan_resets_devices() {
        let (mock, hub) = spawn_hub(HubConfig::default());
        discovered(&mock, &hub, &["A"]).await;
        hub.start_scan().await.unwrap();
        assert!(hub.device_list().await.unwrap().is_empty());
        assert_eq!(
            mock.calls(),
            vec![
                TransportCall::StartDiscovery,
                TransportCall::CancelDiscovery,
                TransportCall::StartDiscovery,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_times_out() {
        let (mock, hub) = spawn_hub(HubConfig::default());
        let mut events = hub.subscribe();
        hub.start_scan_for(Duration::from_secs(3)).await.unwrap();
        assert_eq!(events.recv().await.unwrap(), HubEvent::ScanStarted);

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(
            events.recv().await.unwrap(),
            HubEvent::ScanFinished { devices: 0 }
        );
        assert!(!mock.is_discovering().await);
    }

    #[tokio::test]
    async fn test_select_requires_discovered_device() {
        let (_mock, hub) = spawn_hub(HubConfig::default());
        let err = hub
            .select_device(PeripheralHandle::new("ZZ"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::DeviceNotFound(DeviceNotFoundReason::NotDiscovered { .. })
        ));
    }

    #[tokio::test]
    async fn test_connect_requires_selection() {
        let (_mock, hub) = spawn_hub(HubConfig::default());
        assert!(matches!(
            hub.connect_selected().await,
            Err(Error::DeviceNotFound(DeviceNotFoundReason::NothingSelected))
        ));
    }

    #[tokio::test]
    async fn test_connect_fails_when_selection_no_longer_discovered() {
        let (mock, hub) = spawn_hub(HubConfig::default());
        discovered(&mock, &hub, &["A"]).await;
        hub.select_device(PeripheralHandle::new("A")).await.unwrap();
        hub.start_scan().await.unwrap();

        assert!(matches!(
            hub.connect_selected().await,
            Err(Error::DeviceNotFound(DeviceNotFoundReason::NotDiscovered { .. }))
        ));
    }

    #[tokio::test]
    async fn test_full_session_publishes_reading() {
        let (mock, hub) = spawn_hub(HubConfig::default());
        notifying(&mock, &hub, "A").await;

        mock.emit_payload("A", b"21.5;48");
        assert_eq!(
            hub.current_reading().await.unwrap(),
            SensorReading::new(21.5, 48)
        );
        assert!(mock.calls().contains(&TransportCall::EnableNotification {
            peripheral: "A".to_string(),
            characteristic: SENSOR_DATA,
            enable: true,
        }));
    }

    #[tokio::test]
    async fn test_malformed_payload_keeps_reading() {
        let (mock, hub) = spawn_hub(HubConfig::default());
        notifying(&mock, &hub, "A").await;
        let mut events = hub.subscribe();

        mock.emit_payload("A", b"20.0;50");
        mock.emit_payload("A", b"garbage");
        assert_eq!(
            hub.current_reading().await.unwrap(),
            SensorReading::new(20.0, 50)
        );

        let mut rejected = None;
        while let Ok(event) = events.try_recv() {
            if let HubEvent::PayloadRejected { raw, .. } = event {
                rejected = Some(raw);
            }
        }
        assert_eq!(rejected.as_deref(), Some("garbage"));
    }

    #[tokio::test]
    async fn test_events_for_other_peripheral_ignored() {
        let (mock, hub) = spawn_hub(HubConfig::default());
        notifying(&mock, &hub, "A").await;

        mock.emit_payload("B", b"30.0;10");
        mock.emit_link("B", false);
        assert_eq!(hub.current_reading().await.unwrap(), SensorReading::default());
        assert_eq!(
            hub.session_state().await.unwrap(),
            Some(GattSessionState::NotifyEnabled)
        );
    }

    #[tokio::test]
    async fn test_missing_service_reports_stalled() {
        let (mock, hub) = spawn_hub(HubConfig::default());
        discovered(&mock, &hub, &["A"]).await;
        hub.select_device(PeripheralHandle::new("A")).await.unwrap();
        hub.connect_selected().await.unwrap();
        mock.emit_link("A", true);
        mock.emit_services("A", vec![]);

        assert_eq!(
            hub.session_state().await.unwrap(),
            Some(GattSessionState::Stalled(StallReason::ServiceMissing))
        );
    }

    #[tokio::test]
    async fn test_rejected_request_fails_session() {
        let (mock, hub) = spawn_hub(HubConfig::default());
        mock.fail(TransportOperation::Connect, "out of range");
        discovered(&mock, &hub, &["A"]).await;
        hub.select_device(PeripheralHandle::new("A")).await.unwrap();
        hub.connect_selected().await.unwrap();

        assert!(matches!(
            hub.session_state().await.unwrap(),
            Some(GattSessionState::Failed(TransportError {
                operation: TransportOperation::Connect,
                ..
            }))
        ));
    }

    #[tokio::test]
    async fn test_reported_failure_fails_session() {
        let (mock, hub) = spawn_hub(HubConfig::default());
        discovered(&mock, &hub, &["A"]).await;
        hub.select_device(PeripheralHandle::new("A")).await.unwrap();
        hub.connect_selected().await.unwrap();
        mock.emit_link("A", true);
        mock.emit(TransportEvent::OperationFailed {
            peripheral: Some("A".to_string()),
            error: TransportError::new(TransportOperation::DiscoverServices, "status 133"),
        });

        assert!(matches!(
            hub.session_state().await.unwrap(),
            Some(GattSessionState::Failed(_))
        ));
    }

    #[tokio::test]
    async fn test_new_connect_tears_down_previous_session() {
        let (mock, hub) = spawn_hub(HubConfig::new().scan(ScanOptions::new().reset_on_start(false)));
        notifying(&mock, &hub, "A").await;
        mock.emit_device(PeripheralHandle::new("B"));
        mock.clear_calls();

        hub.select_device(PeripheralHandle::new("B")).await.unwrap();
        hub.connect_selected().await.unwrap();

        let calls = mock.calls();
        assert_eq!(
            calls,
            vec![
                TransportCall::EnableNotification {
                    peripheral: "A".to_string(),
                    characteristic: SENSOR_DATA,
                    enable: false,
                },
                TransportCall::Disconnect("A".to_string()),
                TransportCall::Connect("B".to_string()),
            ]
        );

        // Late events from the old peripheral must not reach the new session.
        mock.emit_payload("A", b"99.0;99");
        assert_eq!(hub.current_reading().await.unwrap(), SensorReading::default());
        assert_eq!(
            hub.session_state().await.unwrap(),
            Some(GattSessionState::Connecting)
        );
    }

    #[tokio::test]
    async fn test_reconnect_same_device_ignores_teardown_link_down() {
        let (mock, hub) = spawn_hub(HubConfig::default());
        notifying(&mock, &hub, "A").await;
        mock.clear_calls();

        hub.connect_selected().await.unwrap();
        assert_eq!(
            mock.calls(),
            vec![
                TransportCall::EnableNotification {
                    peripheral: "A".to_string(),
                    characteristic: SENSOR_DATA,
                    enable: false,
                },
                TransportCall::Disconnect("A".to_string()),
                TransportCall::Connect("A".to_string()),
            ]
        );

        // The old link going down completes the teardown only.
        mock.emit_link("A", false);
        assert_eq!(
            hub.session_state().await.unwrap(),
            Some(GattSessionState::Connecting)
        );

        mock.emit_link("A", true);
        mock.emit_services("A", MockTransport::sensor_services());
        mock.emit_payload("A", b"17.5;55");
        assert_eq!(
            hub.session_state().await.unwrap(),
            Some(GattSessionState::NotifyEnabled)
        );
        assert_eq!(
            hub.current_reading().await.unwrap(),
            SensorReading::new(17.5, 55)
        );

        // A second link loss belongs to the new session.
        mock.emit_link("A", false);
        assert_eq!(
            hub.session_state().await.unwrap(),
            Some(GattSessionState::Disconnected)
        );
    }

    #[tokio::test]
    async fn test_disconnect_then_reconnect_same_device() {
        let (mock, hub) = spawn_hub(HubConfig::default());
        notifying(&mock, &hub, "A").await;

        hub.disconnect_current().await.unwrap();
        hub.connect_selected().await.unwrap();
        mock.emit_link("A", false);
        mock.emit_link("A", true);

        assert_eq!(
            hub.session_state().await.unwrap(),
            Some(GattSessionState::Connected)
        );
    }

    #[tokio::test]
    async fn test_failed_teardown_does_not_swallow_link_down() {
        let (mock, hub) = spawn_hub(HubConfig::default());
        notifying(&mock, &hub, "A").await;
        mock.fail(TransportOperation::Disconnect, "not connected");

        hub.connect_selected().await.unwrap();
        mock.emit_link("A", false);

        assert_eq!(
            hub.session_state().await.unwrap(),
            Some(GattSessionState::Disconnected)
        );
    }

    #[tokio::test]
    async fn test_teardown_of_unlinked_session_expects_no_link_down() {
        let (mock, hub) = spawn_hub(HubConfig::default());
        discovered(&mock, &hub, &["A"]).await;
        hub.select_device(PeripheralHandle::new("A")).await.unwrap();
        hub.connect_selected().await.unwrap();

        // Still connecting: the retry's link events all go to the new session.
        hub.connect_selected().await.unwrap();
        mock.emit_link("A", false);

        assert_eq!(
            hub.session_state().await.unwrap(),
            Some(GattSessionState::Disconnected)
        );
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let (mock, hub) = spawn_hub(HubConfig::default());
        hub.disconnect_current().await.unwrap();

        notifying(&mock, &hub, "A").await;
        hub.disconnect_current().await.unwrap();
        hub.disconnect_current().await.unwrap();

        let disconnects = mock
            .calls()
            .into_iter()
            .filter(|c| matches!(c, TransportCall::Disconnect(_)))
            .count();
        assert_eq!(disconnects, 1);
        assert_eq!(
            hub.session_state().await.unwrap(),
            Some(GattSessionState::Disconnected)
        );
    }

    #[tokio::test]
    async fn test_session_events_broadcast() {
        let (mock, hub) = spawn_hub(HubConfig::default());
        let mut events = hub.subscribe();
        notifying(&mock, &hub, "A").await;

        let mut states = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let HubEvent::SessionStateChanged { state, .. } = event {
                states.push(state);
            }
        }
        assert_eq!(
            states,
            vec![
                GattSessionState::Connecting,
                GattSessionState::Connected,
                GattSessionState::DiscoveringServices,
                GattSessionState::NotifyEnabled,
            ]
        );
    }

    #[tokio::test]
    async fn test_watchers_follow_state() {
        let (mock, hub) = spawn_hub(HubConfig::default());
        let mut reading = hub.watch_reading();
        let mut devices = hub.watch_devices();

        notifying(&mock, &hub, "A").await;
        assert!(devices.has_changed().unwrap());
        assert_eq!(devices.borrow_and_update().len(), 1);

        mock.emit_reading("A", &SensorReading::new(18.0, 40));
        reading.changed().await.unwrap();
        assert_eq!(*reading.borrow(), SensorReading::new(18.0, 40));
    }

    #[tokio::test]
    async fn test_shutdown_stops_hub() {
        let (mock, hub) = spawn_hub(HubConfig::default());
        notifying(&mock, &hub, "A").await;

        hub.shutdown().await.unwrap();
        assert!(!mock.is_discovering().await);
        assert!(mock.calls().contains(&TransportCall::Disconnect("A".to_string())));
        assert!(matches!(hub.device_list().await, Err(Error::HubClosed)));
    }
}
