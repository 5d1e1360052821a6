//! Error types for address validation and payload framing.

use thiserror::Error;

/// Reasons a string was rejected as a hardware address.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum AddressError {
    /// The input was empty.
    #[error("address is empty")]
    Empty,

    /// The input does not have the 17 characters of `XX:XX:XX:XX:XX:XX`.
    #[error("address must be 17 characters long, got {0}")]
    Length(usize),

    /// A group separator was missing or was not `:`.
    #[error("expected ':' at position {position}, found {found:?}")]
    Delimiter {
        /// Zero-based character position.
        position: usize,
        /// The character found instead.
        found: char,
    },

    /// A character inside an octet was not a hexadecimal digit.
    #[error("non-hexadecimal character {found:?} at position {position}")]
    NonHex {
        /// Zero-based character position.
        position: usize,
        /// The offending character.
        found: char,
    },
}

/// What was wrong with a single record of a WiFi scan payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordFault {
    /// The record did not split into exactly two fields.
    FieldCount(usize),
    /// The signal field is not a signed 16-bit decimal integer.
    InvalidSignal(String),
}

impl std::fmt::Display for RecordFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FieldCount(n) => write!(f, "expected 2 fields, found {}", n),
            Self::InvalidSignal(raw) => write!(f, "invalid signal strength {:?}", raw),
        }
    }
}

/// Errors produced when decoding a WiFi scan payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum DecodeError {
    /// A record inside the terminated range is not `ssid\nrssi`.
    #[error("malformed record {index}: {fault}")]
    MalformedRecord {
        /// Zero-based index of the record in the payload.
        index: usize,
        /// What was wrong with it.
        fault: RecordFault,
    },

    /// The payload contains no record separator at all.
    #[error("payload has no record separator (0x19)")]
    MissingTerminator,
}

/// Errors produced when encoding a scan result into the wire format.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum EncodeError {
    /// An SSID contains one of the two framing bytes.
    #[error("SSID of record {index} contains reserved byte 0x{byte:02X}")]
    ReservedByte {
        /// Zero-based index of the record.
        index: usize,
        /// The reserved byte that was found.
        byte: u8,
    },
}

/// Umbrella error for everything this crate can reject.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// Invalid hardware address.
    #[error("invalid address: {0}")]
    Address(#[from] AddressError),

    /// Payload could not be decoded.
    #[error("invalid payload: {0}")]
    Decode(#[from] DecodeError),

    /// Scan result could not be encoded.
    #[error("cannot encode: {0}")]
    Encode(#[from] EncodeError),
}

/// Result type alias using ems-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
