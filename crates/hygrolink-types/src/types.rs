//! Core types for sensor data and discovered peripherals.

use core::fmt;
use core::hash::{Hash, Hasher};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A decoded temperature/humidity sample.
///
/// Readings are only ever produced by a successful payload decode. The
/// humidity value is carried as received: range clamping is left to whoever
/// renders it.
///
/// # Examples
///
/// ```
/// use hygrolink_types::SensorReading;
///
/// let reading = SensorReading::new(21.5, 48);
/// assert_eq!(reading.to_string(), "21.5;48");
/// assert_eq!(SensorReading::default(), SensorReading::new(0.0, 0));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SensorReading {
    /// Temperature in degrees Celsius.
    pub temperature: f32,
    /// Relative humidity in percent.
    pub humidity: i32,
}

impl SensorReading {
    /// Create a reading from its two fields.
    #[must_use]
    pub fn new(temperature: f32, humidity: i32) -> Self {
        Self {
            temperature,
            humidity,
        }
    }

    /// Temperature converted to degrees Fahrenheit.
    #[must_use]
    pub fn temperature_fahrenheit(&self) -> f32 {
        self.temperature * 9.0 / 5.0 + 32.0
    }

    /// Humidity clamped into the displayable `0..=100` range.
    #[must_use]
    pub fn humidity_clamped(&self) -> u8 {
        self.humidity.clamp(0, 100) as u8
    }
}

/// Formats the reading in its wire form, `"<temperature>;<humidity>"`.
impl fmt::Display for SensorReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{};{}", self.temperature, self.humidity)
    }
}

/// A discovered BLE peripheral.
///
/// Identity is the platform identifier only (the MAC address on Linux and
/// Windows, a CoreBluetooth UUID on macOS). The advertised name is optional
/// and never takes part in equality or hashing.
///
/// ```
/// use hygrolink_types::PeripheralHandle;
///
/// let a = PeripheralHandle::with_name("AA:BB:CC:DD:EE:FF", "Greenhouse");
/// let b = PeripheralHandle::new("AA:BB:CC:DD:EE:FF");
/// assert_eq!(a, b);
/// ```
#[derive(Debug, Clone, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PeripheralHandle {
    /// Platform device identifier.
    pub id: String,
    /// Advertised local name, if the peripheral exposes one.
    pub name: Option<String>,
}

impl PeripheralHandle {
    /// Create a handle without a name.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
        }
    }

    /// Create a handle with an advertised name.
    pub fn with_name(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: Some(name.into()),
        }
    }

    /// Label for lists: the name if present, otherwise the identifier.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    /// Check whether `query` designates this peripheral.
    ///
    /// Matches the identifier case-insensitively (with or without `:`
    /// separators), or the name case-insensitively.
    pub fn matches(&self, query: &str) -> bool {
        let query = query.to_lowercase();
        let id = self.id.to_lowercase();
        if id == query || id.replace(':', "") == query.replace(':', "") {
            return true;
        }
        self.name
            .as_ref()
            .is_some_and(|name| name.to_lowercase() == query)
    }
}

impl PartialEq for PeripheralHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Hash for PeripheralHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for PeripheralHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} ({})", name, self.id),
            None => write!(f, "{}", self.id),
        }
    }
}
