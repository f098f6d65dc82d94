//! Error types for hygrolink-core.
//!
//! This module defines the errors surfaced to callers of the hub and the
//! state machines, and the [`TransportError`] reported by BLE transports.
//!
//! # Error Taxonomy
//!
//! | Error | Origin | Handling |
//! |-------|--------|----------|
//! | [`hygrolink_types::DecodeError`] | Malformed notification payload | Logged, payload discarded, previous reading kept |
//! | [`TransportError`] | Connect/discover/enable-notify failure reported by the platform | Session moves to `Failed(reason)` |
//! | Link loss | Disconnect notification from the platform | Session moves to `Disconnected`, never `Failed` |
//! | Missing sensor service or characteristic | Service table without a usable target | Session moves to `Stalled(reason)` |
//!
//! Nothing is retried automatically. The recovery action is to scan or
//! connect again.

use core::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when driving the sensor hub.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Bluetooth Low Energy error from the platform stack.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// Device not found or not selectable.
    #[error("Device not found: {0}")]
    DeviceNotFound(DeviceNotFoundReason),

    /// The Bluetooth adapter is present but powered off.
    #[error("Bluetooth adapter is powered off")]
    AdapterUnavailable,

    /// A transport request was rejected by the platform.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// An operation was requested in a state that does not accept it.
    #[error("Cannot {operation} while session is {state}")]
    InvalidTransition {
        /// Session state at the time of the request.
        state: String,
        /// The rejected operation.
        operation: &'static str,
    },

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The hub task has stopped and no longer accepts commands.
    #[error("Sensor hub is not running")]
    HubClosed,
}

/// Reason why a device was not found.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new reasons
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DeviceNotFoundReason {
    /// No Bluetooth adapter available.
    NoAdapter,
    /// The device is not in the current discovery set.
    NotDiscovered { identifier: String },
    /// `connect_selected` was called before any device was selected.
    NothingSelected,
}

impl fmt::Display for DeviceNotFoundReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoAdapter => write!(f, "no Bluetooth adapter available"),
            Self::NotDiscovered { identifier } => {
                write!(f, "device '{}' has not been discovered", identifier)
            }
            Self::NothingSelected => write!(f, "no device selected"),
        }
    }
}

/// Transport operation that produced a [`TransportError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportOperation {
    /// Starting device discovery.
    StartDiscovery,
    /// Cancelling device discovery.
    CancelDiscovery,
    /// Querying the adapter state.
    AdapterState,
    /// Establishing the GATT link.
    Connect,
    /// Tearing down the GATT link.
    Disconnect,
    /// Requesting the service table.
    DiscoverServices,
    /// Enabling or disabling characteristic notifications.
    EnableNotification,
    /// Delivering a characteristic notification.
    ReceiveNotification,
}

impl fmt::Display for TransportOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::StartDiscovery => "start discovery",
            Self::CancelDiscovery => "cancel discovery",
            Self::AdapterState => "read adapter state",
            Self::Connect => "connect",
            Self::Disconnect => "disconnect",
            Self::DiscoverServices => "discover services",
            Self::EnableNotification => "enable notification",
            Self::ReceiveNotification => "receive notification",
        };
        f.write_str(name)
    }
}

/// A failure reported by the BLE transport.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{operation} failed: {reason}")]
pub struct TransportError {
    /// The operation that failed.
    pub operation: TransportOperation,
    /// Platform-provided description.
    pub reason: String,
}

impl TransportError {
    /// Create a transport error for an operation.
    pub fn new(operation: TransportOperation, reason: impl Into<String>) -> Self {
        Self {
            operation,
            reason: reason.into(),
        }
    }

    /// Wrap a btleplug error.
    pub fn from_btleplug(operation: TransportOperation, err: &btleplug::Error) -> Self {
        Self::new(operation, err.to_string())
    }
}

impl Error {
    /// Create an error for a device missing from the discovery set.
    pub fn not_discovered(identifier: impl Into<String>) -> Self {
        Self::DeviceNotFound(DeviceNotFoundReason::NotDiscovered {
            identifier: identifier.into(),
        })
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }
}

/// Result type alias using hygrolink-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;
