//! Platform-agnostic types for BLE temperature/humidity sensors.
//!
//! This crate provides the data model shared by the native BLE stack
//! (hygrolink-core) and any presentation layer built on top of it.
//!
//! # Features
//!
//! - [`SensorReading`] and [`PeripheralHandle`] data types
//! - The `"<temperature>;<humidity>"` payload [`codec`]
//! - UUID constants for the sensor GATT service
//! - Error types for payload decoding
//!
//! # Example
//!
//! ```
//! use hygrolink_types::{codec, SensorReading};
//!
//! let reading = codec::decode("18.0;40").unwrap();
//! assert_eq!(reading, SensorReading::new(18.0, 40));
//! ```

pub mod codec;
pub mod error;
pub mod types;
pub mod uuid;

pub use codec::{decode, decode_bytes, encode};
pub use error::{DecodeError, DecodeResult, FieldKind};
pub use types::{PeripheralHandle, SensorReading};
pub use uuid as uuids;
