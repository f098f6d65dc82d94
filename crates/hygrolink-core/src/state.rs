//! Latest reading and discovered devices, observable by front ends.
//!
//! [`SensorState`] is owned by the hub. Front ends observe it through
//! `tokio::sync::watch` receivers, which always hold the latest value and
//! wake their owner on change.

use tokio::sync::watch;

use hygrolink_types::{PeripheralHandle, SensorReading};

use crate::discovery::DiscoverySet;

/// Latest known reading plus the active discovery set.
#[derive(Debug)]
pub struct SensorState {
    devices: DiscoverySet,
    reading: watch::Sender<SensorReading>,
    device_list: watch::Sender<Vec<PeripheralHandle>>,
}

impl Default for SensorState {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorState {
    /// Create state with a zero reading and no devices.
    pub fn new() -> Self {
        Self {
            devices: DiscoverySet::new(),
            reading: watch::Sender::new(SensorReading::default()),
            device_list: watch::Sender::new(Vec::new()),
        }
    }

    /// Store a new reading and notify observers.
    pub fn update_reading(&self, reading: SensorReading) {
        self.reading.send_replace(reading);
    }

    /// The latest reading.
    pub fn current_reading(&self) -> SensorReading {
        *self.reading.borrow()
    }

    /// The discovered devices in first-seen order.
    pub fn device_list(&self) -> Vec<PeripheralHandle> {
        self.devices.list()
    }

    /// Borrow the discovery set.
    pub fn devices(&self) -> &DiscoverySet {
        &self.devices
    }

    /// Mutably borrow the discovery set.
    ///
    /// Call [`publish_devices`](Self::publish_devices) after mutating.
    pub fn devices_mut(&mut self) -> &mut DiscoverySet {
        &mut self.devices
    }

    /// Push the device list to observers if it changed.
    pub fn publish_devices(&self) {
        let current = self.devices.as_slice();
        self.device_list.send_if_modified(|list| {
            let changed = list.as_slice() != current
                || list
                    .iter()
                    .zip(current)
                    .any(|(seen, now)| seen.name != now.name);
            if changed {
                *list = current.to_vec();
            }
            changed
        });
    }

    /// Observe the latest reading.
    pub fn watch_reading(&self) -> watch::Receiver<SensorReading> {
        self.reading.subscribe()
    }

    /// Observe the device list.
    pub fn watch_devices(&self) -> watch::Receiver<Vec<PeripheralHandle>> {
        self.device_list.subscribe()
    }
}
