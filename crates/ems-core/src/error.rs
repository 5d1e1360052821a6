//! Error types for ems-core.
//!
//! Two layers:
//!
//! - [`TransportError`] is the raw status a BLE operation finished with. It is
//!   what the connect policy inspects when deciding whether to retry.
//! - [`Error`] is what callers of the session and registry see. Transport
//!   statuses are wrapped with the lifecycle stage they occurred in.
//!
//! # Recovery
//!
//! | Error | Session afterwards | What to do |
//! |-------|--------------------|------------|
//! | [`Error::InvalidAddress`] | never created | fix the input |
//! | [`Error::ConnectFailed`] | `Failed` | connect again later |
//! | [`Error::DiscoveryFailed`] | `Failed` | connect again later |
//! | [`Error::UnsupportedDevice`] | `Failed` | wrong device, do not retry |
//! | [`Error::ReadFailed`] | `Ready` | read again |
//! | [`Error::Decode`] | `Ready` | read again; report if persistent |
//! | [`Error::SessionClosed`] | `Closed` | connect again |

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use ems_types::{AddressError, DecodeError, DeviceAddress};

/// Status a transport operation failed with.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum TransportError {
    /// The operation did not complete in time.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// No usable Bluetooth adapter (missing, powered off, or permission denied).
    #[error("Bluetooth adapter unavailable")]
    AdapterUnavailable,

    /// The peripheral was not seen by the adapter.
    #[error("device not found")]
    DeviceNotFound,

    /// The link dropped while the operation was in flight.
    #[error("device disconnected")]
    Disconnected,

    /// Any other error reported by the BLE stack.
    #[error("BLE error: {0}")]
    Ble(String),
}

impl TransportError {
    /// Whether another connect attempt could plausibly succeed.
    ///
    /// Everything except a missing adapter is treated as transient.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, TransportError::AdapterUnavailable)
    }
}

impl From<btleplug::Error> for TransportError {
    fn from(err: btleplug::Error) -> Self {
        match err {
            btleplug::Error::DeviceNotFound => TransportError::DeviceNotFound,
            btleplug::Error::NotConnected => TransportError::Disconnected,
            btleplug::Error::TimedOut(d) => TransportError::Timeout(d),
            btleplug::Error::PermissionDenied => TransportError::AdapterUnavailable,
            other => TransportError::Ble(other.to_string()),
        }
    }
}

/// Errors returned by sessions, the registry and the device store.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum Error {
    /// The address failed validation; no connection was attempted.
    #[error("Invalid address: {0}")]
    InvalidAddress(#[from] AddressError),

    /// Link establishment gave up.
    #[error("Connection failed after {attempts} attempt(s): {last_status}")]
    ConnectFailed {
        /// Attempts made, including the last one.
        attempts: u32,
        /// Status of the last attempt.
        last_status: TransportError,
    },

    /// The device does not expose the expected service or characteristic.
    #[error("Unsupported device: characteristic {characteristic} not found in service {service}")]
    UnsupportedDevice {
        /// Service that was looked for.
        service: Uuid,
        /// Characteristic that was looked for.
        characteristic: Uuid,
    },

    /// Service discovery itself failed or timed out.
    #[error("Service discovery failed: {status}")]
    DiscoveryFailed {
        /// Transport status.
        status: TransportError,
    },

    /// A characteristic read failed. The session stays usable.
    #[error("Read failed: {status}")]
    ReadFailed {
        /// Transport status.
        status: TransportError,
    },

    /// The payload could not be decoded. The session stays usable.
    #[error("Invalid payload: {0}")]
    Decode(#[from] DecodeError),

    /// No session is registered for this address.
    #[error("No session for {0}")]
    NotFound(DeviceAddress),

    /// The session was closed before or while the operation ran.
    #[error("Session closed")]
    SessionClosed,

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The device store could not be read or written.
    #[error("Device store error: {0}")]
    Store(String),

    /// No device address has been stored yet.
    #[error("No device has been paired yet")]
    NoStoredDevice,

    /// I/O error.
    #[error(transparent)]
    Io(Arc<std::io::Error>),
}

impl Error {
    /// Create a connect failure.
    pub fn connect_failed(attempts: u32, last_status: TransportError) -> Self {
        Self::ConnectFailed {
            attempts,
            last_status,
        }
    }

    /// Create an unsupported-device error for the WiFi scan characteristic.
    pub fn unsupported_device() -> Self {
        Self::UnsupportedDevice {
            service: ems_types::uuids::DEVICE_DATA_SERVICE,
            characteristic: ems_types::uuids::WIFI_SCAN_CHARACTERISTIC,
        }
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Create a store error.
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store(message.into())
    }

    /// Whether the session that produced this error is still usable.
    pub fn keeps_session(&self) -> bool {
        matches!(self, Error::ReadFailed { .. } | Error::Decode(_))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(Arc::new(err))
    }
}

impl From<ems_types::ParseError> for Error {
    fn from(err: ems_types::ParseError) -> Self {
        match err {
            ems_types::ParseError::Address(e) => Error::InvalidAddress(e),
            ems_types::ParseError::Decode(e) => Error::Decode(e),
            // Handle future ParseError variants (non_exhaustive)
            _ => Error::InvalidConfig(format!("Parse error: {}", err)),
        }
    }
}

/// Result type alias using ems-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use ems_types::RecordFault;

    #[test]
    fn test_error_display() {
        let err = Error::connect_failed(3, TransportError::Timeout(Duration::from_secs(15)));
        assert_eq!(
            err.to_string(),
            "Connection failed after 3 attempt(s): timed out after 15s"
        );

        let err = Error::unsupported_device();
        assert!(err.to_string().contains("0000ff02"));
        assert!(err.to_string().contains("0000181c"));

        let err = Error::ReadFailed {
            status: TransportError::Disconnected,
        };
        assert_eq!(err.to_string(), "Read failed: device disconnected");
    }

    #[test]
    fn test_transport_retryable() {
        assert!(TransportError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(TransportError::DeviceNotFound.is_retryable());
        assert!(TransportError::Disconnected.is_retryable());
        assert!(TransportError::Ble("busy".into()).is_retryable());
        assert!(!TransportError::AdapterUnavailable.is_retryable());
    }

    #[test]
    fn test_keeps_session() {
        assert!(
            Error::ReadFailed {
                status: TransportError::Disconnected
            }
            .keeps_session()
        );
        assert!(Error::Decode(DecodeError::MissingTerminator).keeps_session());
        assert!(!Error::SessionClosed.keeps_session());
        assert!(!Error::unsupported_device().keeps_session());
    }

    #[test]
    fn test_btleplug_error_conversion() {
        assert_eq!(
            TransportError::from(btleplug::Error::DeviceNotFound),
            TransportError::DeviceNotFound
        );
        assert_eq!(
            TransportError::from(btleplug::Error::NotConnected),
            TransportError::Disconnected
        );
        assert_eq!(
            TransportError::from(btleplug::Error::TimedOut(Duration::from_secs(2))),
            TransportError::Timeout(Duration::from_secs(2))
        );
        assert_eq!(
            TransportError::from(btleplug::Error::PermissionDenied),
            TransportError::AdapterUnavailable
        );
    }

    #[test]
    fn test_parse_error_conversion() {
        let err: Error = ems_types::ParseError::from(AddressError::Empty).into();
        assert!(matches!(err, Error::InvalidAddress(AddressError::Empty)));

        let decode = DecodeError::MalformedRecord {
            index: 0,
            fault: RecordFault::FieldCount(1),
        };
        let err: Error = ems_types::ParseError::from(decode.clone()).into();
        assert!(matches!(err, Error::Decode(e) if e == decode));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_error_is_clone() {
        let err = Error::NotFound("AA:BB:CC:DD:EE:FF".parse().unwrap());
        let cloned = err.clone();
        assert_eq!(err.to_string(), cloned.to_string());
    }
}
