//! The hub's single serialized inbox.
//!
//! Presentation commands, transport events and scan deadlines all travel
//! through one unbounded channel, so the hub observes them in arrival order
//! and never runs two transitions at once.

use tokio::sync::{mpsc, oneshot};

use hygrolink_types::{PeripheralHandle, SensorReading};

use crate::error::Result;
use crate::scan::ScanDeadline;
use crate::session::GattSessionState;
use crate::transport::{TransportEvent, TransportEventSender};

/// A message processed by the hub.
#[derive(Debug)]
pub(crate) enum Inbound {
    Command(Command),
    Transport(TransportEvent),
    Deadline(ScanDeadline),
}

/// Requests from a [`HubHandle`](crate::HubHandle), each with a reply slot.
#[derive(Debug)]
pub(crate) enum Command {
    StartScan {
        duration: Option<std::time::Duration>,
        reply: oneshot::Sender<Result<()>>,
    },
    SelectDevice {
        handle: PeripheralHandle,
        reply: oneshot::Sender<Result<()>>,
    },
    ConnectSelected {
        reply: oneshot::Sender<Result<PeripheralHandle>>,
    },
    DisconnectCurrent {
        reply: oneshot::Sender<()>,
    },
    CurrentReading {
        reply: oneshot::Sender<SensorReading>,
    },
    DeviceList {
        reply: oneshot::Sender<Vec<PeripheralHandle>>,
    },
    SessionState {
        reply: oneshot::Sender<Option<GattSessionState>>,
    },
    Selected {
        reply: oneshot::Sender<Option<PeripheralHandle>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Receiving side of the hub inbox, consumed by
/// [`SensorHub::spawn`](crate::SensorHub::spawn).
#[derive(Debug)]
pub struct HubInbox {
    pub(crate) tx: mpsc::UnboundedSender<Inbound>,
    pub(crate) rx: mpsc::UnboundedReceiver<Inbound>,
}

/// Create a hub inbox and the event sender a transport pushes into.
///
/// ```
/// let (events, inbox) = hygrolink_core::inbox();
/// assert!(!events.is_closed());
/// # drop(inbox);
/// ```
pub fn inbox() -> (TransportEventSender, HubInbox) {
    let (tx, rx) = mpsc::unbounded_channel();
    (TransportEventSender::new(tx.clone()), HubInbox { tx, rx })
}
