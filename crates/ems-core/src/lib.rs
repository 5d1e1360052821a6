//! BLE connection lifecycle for the EMS companion device.
//!
//! The companion device reports the WiFi networks it can see through a single
//! GATT characteristic. This crate owns everything between a user-supplied
//! address and a decoded [`ScanResult`]:
//!
//! - **Sessions**: one tokio task per device link, driven by the
//!   [`SessionState`] machine (connect with retry, service discovery, reads)
//! - **Registry**: at most one live session per address, plus pairing and
//!   discovery scans
//! - **Transports**: [`BleTransport`] on btleplug, [`MockTransport`] for tests
//! - **Events**: lifecycle events on a broadcast channel
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use ems_core::{BleTransport, SessionRegistry};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = SessionRegistry::new(Arc::new(BleTransport::new()));
//!
//!     let session = registry.connect("A4:C1:38:00:11:22").await?;
//!     let networks = session.read_networks().await?;
//!     for network in networks.iter() {
//!         println!("{network}");
//!     }
//!
//!     registry.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod ble;
pub mod error;
pub mod events;
pub mod mock;
pub mod policy;
pub mod registry;
pub mod session;
pub mod state;
pub mod store;
pub mod transport;

pub use ble::BleTransport;
pub use error::{Error, Result, TransportError};
pub use events::{DeviceEvent, DisconnectReason, EventDispatcher, EventReceiver, EventSender};
pub use mock::{MockDeviceConfig, MockTransport};
pub use policy::ConnectPolicy;
pub use registry::{RegistryConfig, SessionRegistry};
pub use session::SessionHandle;
pub use state::{SessionInput, SessionState};
pub use store::{DeviceStore, MemoryStore};
pub use transport::{
    CharacteristicHandle, DiscoveredDevice, Link, ServiceInfo, Transport, TransportResult,
};

// Re-export the shared types so front ends need only one dependency.
pub use ems_types::uuid as uuids;
pub use ems_types::{
    AddressError, DecodeError, DeviceAddress, NetworkRecord, ScanResult, SignalQuality, codec,
};
