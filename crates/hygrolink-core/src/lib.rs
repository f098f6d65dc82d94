//! BLE discovery and GATT session engine for temperature/humidity sensors.
//!
//! This crate finds nearby sensors, connects to one as a GATT client,
//! subscribes to its sensor characteristic and decodes the
//! `"<temperature>;<humidity>"` notifications it pushes.
//!
//! # Features
//!
//! - **Discovery**: deduplicated, first-seen-ordered device list per scan
//! - **Scan timeout**: cancellable deadline, restart-on-start semantics
//! - **GATT session**: explicit state machine from connect to notifications
//! - **Observable state**: latest reading and device list via `watch` channels
//! - **Event bus**: serializable [`HubEvent`]s over `broadcast`
//! - **Testable transport**: [`MockTransport`] drives the whole stack without hardware
//!
//! # Architecture
//!
//! [`SensorHub`] is a single task that owns every state machine. Commands
//! from a [`HubHandle`], [`TransportEvent`]s from the platform and scan
//! deadlines all arrive through one inbox and are handled one at a time, so
//! no two transitions ever run concurrently even though the platform stack
//! calls back from its own threads.
//!
//! # Platform Differences
//!
//! - **macOS**: peripherals are identified by a CoreBluetooth UUID that is
//!   stable on one Mac but differs between Macs.
//! - **Linux/Windows**: peripherals are identified by their Bluetooth MAC
//!   address (e.g., `AA:BB:CC:DD:EE:FF`).
//!
//! # Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use hygrolink_core::{HubConfig, SensorHub};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let hub = SensorHub::with_bluetooth(HubConfig::default()).await?;
//!
//!     hub.start_scan().await?;
//!     tokio::time::sleep(Duration::from_secs(10)).await;
//!
//!     let devices = hub.device_list().await?;
//!     let first = devices.first().ok_or("no sensors found")?;
//!     hub.select_device(first.clone()).await?;
//!     hub.connect_selected().await?;
//!
//!     let mut reading = hub.watch_reading();
//!     reading.changed().await?;
//!     println!("{}", *reading.borrow());
//!     Ok(())
//! }
//! ```

pub mod btle;
pub mod discovery;
pub mod error;
pub mod events;
pub mod hub;
mod inbox;
pub mod mock;
pub mod scan;
pub mod session;
pub mod state;
pub mod transport;

pub use btle::{BtleTransport, create_identifier, format_peripheral_id, get_adapter};
pub use discovery::DiscoverySet;
pub use error::{
    DeviceNotFoundReason, Error, Result, TransportError, TransportOperation,
};
pub use events::{EventDispatcher, EventReceiver, EventSender, HubEvent};
pub use hub::{HubConfig, HubHandle, SensorHub};
pub use inbox::{HubInbox, inbox};
pub use mock::{MockTransport, TransportCall};
pub use scan::{ScanController, ScanOptions};
pub use session::{
    GattSession, GattSessionState, SessionAction, SessionEvent, SessionOptions, StallReason,
};
pub use state::SensorState;
pub use transport::{
    BleTransport, CharacteristicRef, ServiceInfo, TransportEvent, TransportEventSender,
};

// Re-export from hygrolink-types
pub use hygrolink_types::uuid as uuids;
pub use hygrolink_types::{DecodeError, PeripheralHandle, SensorReading, codec};
