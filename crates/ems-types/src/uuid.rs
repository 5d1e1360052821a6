//! Bluetooth UUIDs for the EMS companion device.
//!
//! The device exposes a single custom characteristic, inside the standard
//! User Data service, that returns the result of its last WiFi scan.

use uuid::{Uuid, uuid};

// --- Service UUIDs ---

/// Service that hosts the WiFi scan characteristic (User Data, 0x181C).
pub const DEVICE_DATA_SERVICE: Uuid = uuid!("0000181c-0000-1000-8000-00805f9b34fb");

// --- Characteristic UUIDs ---

/// WiFi scan result characteristic (read-only).
pub const WIFI_SCAN_CHARACTERISTIC: Uuid = uuid!("0000ff02-0000-1000-8000-00805f9b34fb");
