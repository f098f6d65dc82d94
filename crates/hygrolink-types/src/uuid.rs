//! Bluetooth UUIDs for the sensor peripheral.
//!
//! The sensor exposes its readings through a serial-bridge style GATT
//! service. Only the service UUID is significant: the session subscribes to
//! the first characteristic of that service, whatever its UUID.

use uuid::{Uuid, uuid};

/// Sensor data service.
pub const SENSOR_SERVICE: Uuid = uuid!("0000ffe0-0000-1000-8000-00805f9b34fb");

/// Notify characteristic commonly found first in [`SENSOR_SERVICE`].
///
/// Not used for lookup; provided for mock peripherals and diagnostics.
pub const SENSOR_DATA: Uuid = uuid!("0000ffe1-0000-1000-8000-00805f9b34fb");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sensor_service_uuid() {
        let expected = "0000ffe0-0000-1000-8000-00805f9b34fb";
        assert_eq!(SENSOR_SERVICE.to_string(), expected);
    }

    #[test]
    fn test_sensor_data_uuid() {
        let expected = "0000ffe1-0000-1000-8000-00805f9b34fb";
        assert_eq!(SENSOR_DATA.to_string(), expected);
    }

    #[test]
    fn test_uuids_are_distinct() {
        assert_ne!(SENSOR_SERVICE, SENSOR_DATA);
    }
}
