//! Error types for payload decoding in hygrolink-types.

use core::fmt;

use thiserror::Error;

/// Which field of a sensor payload failed to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Field 0, a floating-point temperature in degrees Celsius.
    Temperature,
    /// Field 1, an integer relative humidity percentage.
    Humidity,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::Temperature => write!(f, "temperature"),
            FieldKind::Humidity => write!(f, "humidity"),
        }
    }
}

/// Errors that can occur when decoding a sensor notification payload.
///
/// This error type is platform-agnostic and does not include
/// BLE-specific errors (those belong in hygrolink-core).
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum DecodeError {
    /// The payload did not split into exactly two `;`-separated fields.
    #[error("expected 2 ';'-separated fields, got {actual}")]
    WrongFieldCount {
        /// Number of fields the payload actually contained.
        actual: usize,
    },

    /// A field was present but did not parse as the expected number type.
    #[error("field {index} is not a valid {kind}: {value:?}")]
    MalformedField {
        /// Zero-based field position.
        index: usize,
        /// What the field was expected to hold.
        kind: FieldKind,
        /// The offending field text.
        value: String,
    },

    /// The notification bytes were not valid UTF-8.
    #[error("payload is not valid UTF-8")]
    InvalidEncoding,
}

/// Result type alias using hygrolink-types' DecodeError type.
pub type DecodeResult<T> = std::result::Result<T, DecodeError>;
