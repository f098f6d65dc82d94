//! Sensor payload codec.
//!
//! The sensor firmware pushes its readings as a short ASCII string of the
//! form `"<temperature>;<humidity>"`, for example `"23.5;61"`. Field 0 is a
//! floating-point temperature in degrees Celsius, field 1 an integer
//! relative humidity. There is no framing, checksum or escaping.
//!
//! Decoding is a pure function of its input. Leading and trailing whitespace
//! around each field is ignored, so a trailing `\r\n` is accepted.

use core::str::FromStr;

use crate::error::{DecodeError, DecodeResult, FieldKind};
use crate::types::SensorReading;

/// Separator between payload fields.
pub const FIELD_SEPARATOR: char = ';';

/// Number of fields in a well-formed payload.
pub const FIELD_COUNT: usize = 2;

/// Decode a notification payload into a [`SensorReading`].
///
/// # Errors
///
/// - [`DecodeError::WrongFieldCount`] if the payload does not split into
///   exactly two fields.
/// - [`DecodeError::MalformedField`] if either field fails to parse.
///
/// # Examples
///
/// ```
/// use hygrolink_types::{codec, DecodeError, SensorReading};
///
/// assert_eq!(codec::decode("23.5;61"), Ok(SensorReading::new(23.5, 61)));
/// assert_eq!(codec::decode("23.5"), Err(DecodeError::WrongFieldCount { actual: 1 }));
/// assert!(matches!(codec::decode("abc;61"), Err(DecodeError::MalformedField { index: 0, .. })));
/// ```
pub fn decode(raw: &str) -> DecodeResult<SensorReading> {
    let fields: Vec<&str> = raw.split(FIELD_SEPARATOR).collect();
    if fields.len() != FIELD_COUNT {
        return Err(DecodeError::WrongFieldCount {
            actual: fields.len(),
        });
    }

    let temperature = parse_field::<f32>(fields[0], 0, FieldKind::Temperature)?;
    let humidity = parse_field::<i32>(fields[1], 1, FieldKind::Humidity)?;

    Ok(SensorReading {
        temperature,
        humidity,
    })
}

/// Decode raw notification bytes.
///
/// # Errors
///
/// Returns [`DecodeError::InvalidEncoding`] if the bytes are not UTF-8,
/// otherwise the same errors as [`decode`].
pub fn decode_bytes(raw: &[u8]) -> DecodeResult<SensorReading> {
    let text = core::str::from_utf8(raw).map_err(|_| DecodeError::InvalidEncoding)?;
    decode(text)
}

/// Encode a reading in wire form.
///
/// Used by mock peripherals and tests; `decode(&encode(r))` yields `r` for
/// any finite temperature.
pub fn encode(reading: &SensorReading) -> String {
    reading.to_string()
}

fn parse_field<T: FromStr>(field: &str, index: usize, kind: FieldKind) -> DecodeResult<T> {
    field
        .trim()
        .parse::<T>()
        .map_err(|_| DecodeError::MalformedField {
            index,
            kind,
            value: field.to_string(),
        })
}

impl FromStr for SensorReading {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode(s)
    }
}
