//! Platform-agnostic types for the EMS companion device.
//!
//! This crate has no I/O. It provides the pieces that both the BLE lifecycle
//! code (`ems-core`) and front ends share:
//!
//! - [`DeviceAddress`] and its validator
//! - [`NetworkRecord`] / [`ScanResult`] for decoded WiFi scans
//! - the [`codec`] for the WiFi scan characteristic payload
//! - UUID constants for the device's GATT layout
//!
//! # Example
//!
//! ```
//! use ems_types::{DeviceAddress, codec};
//!
//! let addr: DeviceAddress = "a4:c1:38:00:11:22".parse().unwrap();
//! assert_eq!(addr.to_string(), "A4:C1:38:00:11:22");
//!
//! let scan = codec::decode(b"Home\n-45\x19").unwrap();
//! assert_eq!(scan.networks()[0].ssid(), "Home");
//! ```

pub mod address;
pub mod codec;
pub mod error;
pub mod types;
pub mod uuid;

pub use address::{DeviceAddress, validate};
pub use error::{AddressError, DecodeError, EncodeError, ParseError, ParseResult, RecordFault};
pub use types::{NetworkRecord, ScanResult, SignalQuality};
pub use uuid as uuids;
