//! Framing of the WiFi scan characteristic payload.
//!
//! The device answers a read of [`WIFI_SCAN_CHARACTERISTIC`](crate::uuid::WIFI_SCAN_CHARACTERISTIC)
//! with a flat byte string:
//!
//! ```text
//! ssid 0x0A rssi 0x19 ssid 0x0A rssi 0x19 ... [padding]
//! ```
//!
//! Records end with the record separator `0x19`; within a record the SSID and
//! the ASCII decimal signal strength are split by a line feed. Anything after
//! the last record separator is padding and is ignored.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{DecodeError, EncodeError, RecordFault};
use crate::types::{NetworkRecord, ScanResult};

/// Byte that terminates every record (ASCII "EM").
pub const RECORD_SEPARATOR: u8 = 0x19;

/// Byte that splits the SSID from the signal strength.
pub const FIELD_SEPARATOR: u8 = 0x0A;

/// Decode a raw characteristic value into a [`ScanResult`].
///
/// SSID bytes that are not valid UTF-8 are replaced with U+FFFD rather than
/// rejected.
///
/// # Errors
///
/// - [`DecodeError::MissingTerminator`] if `0x19` does not appear anywhere.
/// - [`DecodeError::MalformedRecord`] if a record before the last separator does
///   not have exactly two fields or its signal is not an `i16`.
///
/// # Examples
///
/// ```
/// use ems_types::codec::decode;
///
/// let result = decode(b"Home\n-45\x19Office\n-70\x19").unwrap();
/// assert_eq!(result.len(), 2);
/// assert_eq!(result.networks()[1].ssid(), "Office");
/// assert_eq!(result.networks()[1].rssi(), -70);
/// ```
pub fn decode(payload: &[u8]) -> Result<ScanResult, DecodeError> {
    let end = payload
        .iter()
        .rposition(|&b| b == RECORD_SEPARATOR)
        .ok_or(DecodeError::MissingTerminator)?;

    let body = &payload[..end];
    if body.is_empty() {
        return Ok(ScanResult::default());
    }

    body.split(|&b| b == RECORD_SEPARATOR)
        .enumerate()
        .map(|(index, record)| {
            decode_record(record).map_err(|fault| DecodeError::MalformedRecord { index, fault })
        })
        .collect()
}

fn decode_record(record: &[u8]) -> Result<NetworkRecord, RecordFault> {
    let fields: Vec<&[u8]> = record.split(|&b| b == FIELD_SEPARATOR).collect();
    let [ssid, rssi] = fields.as_slice() else {
        return Err(RecordFault::FieldCount(fields.len()));
    };

    let rssi_text = String::from_utf8_lossy(rssi);
    let rssi = rssi_text
        .parse::<i16>()
        .map_err(|_| RecordFault::InvalidSignal(rssi_text.clone().into_owned()))?;

    Ok(NetworkRecord::new(String::from_utf8_lossy(ssid), rssi))
}

/// Encode a [`ScanResult`] into the on-air framing.
///
/// Every record, including the last, is followed by `0x19`. An empty result
/// encodes to a lone separator so that it decodes back to an empty result.
///
/// # Errors
///
/// [`EncodeError::ReservedByte`] if an SSID contains either framing byte.
pub fn encode(result: &ScanResult) -> Result<Bytes, EncodeError> {
    if result.is_empty() {
        return Ok(Bytes::from_static(&[RECORD_SEPARATOR]));
    }

    let mut buf = BytesMut::with_capacity(result.iter().map(|n| n.ssid().len() + 8).sum());
    for (index, network) in result.iter().enumerate() {
        let ssid = network.ssid().as_bytes();
        if let Some(&byte) = ssid
            .iter()
            .find(|&&b| b == RECORD_SEPARATOR || b == FIELD_SEPARATOR)
        {
            return Err(EncodeError::ReservedByte { index, byte });
        }
        buf.put_slice(ssid);
        buf.put_u8(FIELD_SEPARATOR);
        buf.put_slice(network.rssi().to_string().as_bytes());
        buf.put_u8(RECORD_SEPARATOR);
    }
    Ok(buf.freeze())
}


/// Property tests for the codec.
#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn ssid_strategy() -> impl Strategy<Value = String> {
        // Any text without the two framing bytes.
        "[^\u{0A}\u{19}]{0,32}"
    }

    fn record_strategy() -> impl Strategy<Value = NetworkRecord> {
        (ssid_strategy(), any::<i16>()).prop_map(|(ssid, rssi)| NetworkRecord::new(ssid, rssi))
    }

    proptest! {
        /// Decoding arbitrary bytes never panics.
        #[test]
        fn decode_never_panics(data in proptest::collection::vec(any::<u8>(), 0..256)) {
            let _ = decode(&data);
        }

        /// encode then decode is the identity for encodable results.
        #[test]
        fn encode_decode_identity(records in proptest::collection::vec(record_strategy(), 0..16)) {
            let result = ScanResult::new(records);
            let bytes = encode(&result).unwrap();
            prop_assert_eq!(decode(&bytes).unwrap(), result);
        }

        /// Padding without a separator after the terminator is ignored.
        #[test]
        fn trailing_padding_ignored(
            records in proptest::collection::vec(record_strategy(), 0..8),
            padding in proptest::collection::vec(any::<u8>().prop_filter("no separator", |b| *b != RECORD_SEPARATOR), 0..32),
        ) {
            let result = ScanResult::new(records);
            let mut bytes = encode(&result).unwrap().to_vec();
            bytes.extend_from_slice(&padding);
            prop_assert_eq!(decode(&bytes).unwrap(), result);
        }

        /// Payloads without a separator are always rejected the same way.
        #[test]
        fn no_separator_is_missing_terminator(
            data in proptest::collection::vec(any::<u8>().prop_filter("no separator", |b| *b != RECORD_SEPARATOR), 0..64),
        ) {
            prop_assert_eq!(decode(&data), Err(DecodeError::MissingTerminator));
        }
    }
}
