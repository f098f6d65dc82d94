//! Output formatting for readings and device lists.

use anyhow::Result;
use hygrolink_types::{PeripheralHandle, SensorReading};
use owo_colors::OwoColorize;
use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Options shared by every formatter.
#[derive(Debug, Clone, Copy, Default)]
pub struct FormatOptions {
    pub fahrenheit: bool,
    pub no_color: bool,
}

impl FormatOptions {
    pub fn new(fahrenheit: bool, no_color: bool) -> Self {
        Self {
            fahrenheit,
            no_color,
        }
    }

    /// Temperature in the selected unit, with its unit symbol.
    pub fn temperature(&self, reading: &SensorReading) -> (f32, &'static str) {
        if self.fahrenheit {
            (reading.temperature_fahrenheit(), "°F")
        } else {
            (reading.temperature, "°C")
        }
    }
}

#[derive(Serialize)]
struct ReadingJson<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    device: Option<&'a PeripheralHandle>,
    temperature: f32,
    unit: &'static str,
    humidity: i32,
    #[serde(
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    received_at: Option<OffsetDateTime>,
}

#[derive(Serialize)]
struct DeviceJson<'a> {
    id: &'a str,
    name: Option<&'a str>,
}

/// Format a reading as one line of text, e.g. `21.5 °C  48 %`.
///
/// Humidity is clamped to `0..=100` for display only.
pub fn format_reading_text(reading: &SensorReading, opts: &FormatOptions) -> String {
    let (temperature, unit) = opts.temperature(reading);
    let temperature = format!("{:.1} {}", temperature, unit);
    let humidity = format!("{} %", reading.humidity_clamped());
    if opts.no_color {
        format!("{}  {}", temperature, humidity)
    } else {
        format!("{}  {}", temperature.bold(), humidity.cyan())
    }
}

/// Format a reading as a timestamped watch line.
pub fn format_watch_line(
    reading: &SensorReading,
    received_at: OffsetDateTime,
    opts: &FormatOptions,
) -> String {
    let stamp = received_at
        .format(&Rfc3339)
        .unwrap_or_else(|_| received_at.to_string());
    let stamp = if opts.no_color {
        stamp
    } else {
        stamp.dimmed().to_string()
    };
    format!("[{}] {}", stamp, format_reading_text(reading, opts))
}

/// Format a reading as a single JSON object.
pub fn format_reading_json(
    reading: &SensorReading,
    device: Option<&PeripheralHandle>,
    received_at: Option<OffsetDateTime>,
    opts: &FormatOptions,
) -> Result<String> {
    let (temperature, unit) = opts.temperature(reading);
    let json = ReadingJson {
        device,
        temperature,
        unit,
        humidity: reading.humidity,
        received_at,
    };
    Ok(serde_json::to_string(&json)?)
}

/// Format the scan result as text.
pub fn format_devices_text(devices: &[PeripheralHandle], opts: &FormatOptions) -> String {
    if devices.is_empty() {
        return "No devices found.\n".to_string();
    }

    let mut out = format!("Found {} device(s):\n", devices.len());
    for device in devices {
        let name = device.name.as_deref().unwrap_or("(unnamed)");
        if opts.no_color {
            out.push_str(&format!("  {:<24} {}\n", name, device.id));
        } else {
            out.push_str(&format!("  {:<24} {}\n", name.green(), device.id.cyan()));
        }
    }
    out
}

/// Format the scan result as a JSON array.
pub fn format_devices_json(devices: &[PeripheralHandle]) -> Result<String> {
    let devices: Vec<_> = devices
        .iter()
        .map(|d| DeviceJson {
            id: &d.id,
            name: d.name.as_deref(),
        })
        .collect();
    Ok(serde_json::to_string_pretty(&devices)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    const PLAIN: FormatOptions = FormatOptions {
        fahrenheit: false,
        no_color: true,
    };

    #[test]
    fn test_reading_text_celsius() {
        let reading = SensorReading::new(21.5, 48);
        assert_eq!(format_reading_text(&reading, &PLAIN), "21.5 °C  48 %");
    }

    #[test]
    fn test_reading_text_fahrenheit() {
        let opts = FormatOptions::new(true, true);
        let reading = SensorReading::new(20.0, 50);
        assert_eq!(format_reading_text(&reading, &opts), "68.0 °F  50 %");
    }

    #[test]
    fn test_reading_text_clamps_humidity() {
        assert_eq!(
            format_reading_text(&SensorReading::new(5.0, 130), &PLAIN),
            "5.0 °C  100 %"
        );
        assert_eq!(
            format_reading_text(&SensorReading::new(5.0, -4), &PLAIN),
            "5.0 °C  0 %"
        );
    }

    #[test]
    fn test_watch_line_has_timestamp() {
        let line = format_watch_line(
            &SensorReading::new(18.0, 40),
            datetime!(2025-03-01 12:00:00 UTC),
            &PLAIN,
        );
        assert_eq!(line, "[2025-03-01T12:00:00Z] 18.0 °C  40 %");
    }

    #[test]
    fn test_reading_json_keeps_raw_humidity() {
        let json = format_reading_json(&SensorReading::new(21.5, 130), None, None, &PLAIN).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["temperature"], 21.5);
        assert_eq!(value["unit"], "°C");
        assert_eq!(value["humidity"], 130);
        assert!(value.get("device").is_none());
        assert!(value.get("received_at").is_none());
    }

    #[test]
    fn test_reading_json_with_device() {
        let device = PeripheralHandle::with_name("AA:BB:CC:DD:EE:FF", "Attic");
        let json = format_reading_json(
            &SensorReading::new(18.0, 40),
            Some(&device),
            Some(datetime!(2025-03-01 12:00:00 UTC)),
            &PLAIN,
        )
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["device"]["id"], "AA:BB:CC:DD:EE:FF");
        assert_eq!(value["received_at"], "2025-03-01T12:00:00Z");
    }

    #[test]
    fn test_devices_text() {
        let devices = [
            PeripheralHandle::with_name("AA:AA:AA:AA:AA:AA", "Attic"),
            PeripheralHandle::new("BB:BB:BB:BB:BB:BB"),
        ];
        let text = format_devices_text(&devices, &PLAIN);
        assert!(text.starts_with("Found 2 device(s):"));
        assert!(text.contains("Attic"));
        assert!(text.contains("(unnamed)"));
        assert!(text.find("AA:AA").unwrap() < text.find("BB:BB").unwrap());
        assert_eq!(format_devices_text(&[], &PLAIN), "No devices found.\n");
    }

    #[test]
    fn test_devices_json() {
        let devices = [PeripheralHandle::new("BB:BB:BB:BB:BB:BB")];
        let value: serde_json::Value =
            serde_json::from_str(&format_devices_json(&devices).unwrap()).unwrap();
        assert_eq!(value[0]["id"], "BB:BB:BB:BB:BB:BB");
        assert!(value[0]["name"].is_null());
    }
}
