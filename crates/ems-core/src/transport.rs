//! Transport abstraction between sessions and the platform BLE stack.
//!
//! A [`Transport`] opens [`Link`]s and runs discovery scans. Sessions are
//! written purely against these traits, so the state machine can be driven by
//! [`MockTransport`](crate::mock::MockTransport) in tests and by
//! [`BleTransport`](crate::ble::BleTransport) in production.
//!
//! Implementations do not apply timeouts or retries themselves; the session
//! wraps every call with the limits from its [`ConnectPolicy`](crate::ConnectPolicy).

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use ems_types::DeviceAddress;

use crate::error::TransportError;

/// Result of a transport operation.
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// A GATT service as reported by service discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInfo {
    /// Service UUID.
    pub uuid: Uuid,
    /// UUIDs of the characteristics in this service.
    pub characteristics: Vec<Uuid>,
}

impl ServiceInfo {
    pub fn new(uuid: Uuid, characteristics: impl IntoIterator<Item = Uuid>) -> Self {
        Self {
            uuid,
            characteristics: characteristics.into_iter().collect(),
        }
    }

    pub fn has_characteristic(&self, characteristic: Uuid) -> bool {
        self.characteristics.contains(&characteristic)
    }
}

/// Location of a characteristic, cached by a session once services resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CharacteristicHandle {
    pub service: Uuid,
    pub characteristic: Uuid,
}

impl CharacteristicHandle {
    /// The WiFi scan characteristic inside the device data service.
    pub const WIFI_SCAN: CharacteristicHandle = CharacteristicHandle {
        service: ems_types::uuids::DEVICE_DATA_SERVICE,
        characteristic: ems_types::uuids::WIFI_SCAN_CHARACTERISTIC,
    };

    /// Find this handle among discovered services.
    pub fn resolve(&self, services: &[ServiceInfo]) -> Option<CharacteristicHandle> {
        services
            .iter()
            .find(|s| s.uuid == self.service && s.has_characteristic(self.characteristic))
            .map(|_| *self)
    }
}

/// A device seen during a discovery scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredDevice {
    /// Advertised local name.
    pub name: Option<String>,
    /// Hardware address.
    pub address: DeviceAddress,
    /// RSSI at discovery time.
    pub rssi: Option<i16>,
    /// Whether the advertisement lists the device data service.
    pub advertises_service: bool,
}

/// Opens links to devices and scans for nearby ones.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Establish a link to `address`. One call is one connect attempt.
    async fn connect(&self, address: &DeviceAddress) -> TransportResult<Box<dyn Link>>;

    /// Scan for advertising devices for `duration`.
    async fn scan(&self, duration: Duration) -> TransportResult<Vec<DiscoveredDevice>>;
}

/// An established link to one device.
///
/// A link is owned by exactly one session task; `&mut self` keeps operations
/// on it sequential.
#[async_trait]
pub trait Link: Send {
    /// Enumerate GATT services and their characteristics.
    async fn discover_services(&mut self) -> TransportResult<Vec<ServiceInfo>>;

    /// Read the value of a characteristic.
    async fn read(&mut self, handle: &CharacteristicHandle) -> TransportResult<Vec<u8>>;

    /// Release the link. Called at most once per link.
    async fn close(&mut self) -> TransportResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use ems_types::uuids::{DEVICE_DATA_SERVICE, WIFI_SCAN_CHARACTERISTIC};

    #[test]
    fn test_resolve_wifi_scan() {
        let services = vec![
            ServiceInfo::new(uuid::uuid!("00001800-0000-1000-8000-00805f9b34fb"), []),
            ServiceInfo::new(DEVICE_DATA_SERVICE, [WIFI_SCAN_CHARACTERISTIC]),
        ];
        assert_eq!(
            CharacteristicHandle::WIFI_SCAN.resolve(&services),
            Some(CharacteristicHandle::WIFI_SCAN)
        );
    }

    #[test]
    fn test_resolve_missing_characteristic() {
        let services = vec![ServiceInfo::new(DEVICE_DATA_SERVICE, [])];
        assert_eq!(CharacteristicHandle::WIFI_SCAN.resolve(&services), None);
    }

    #[test]
    fn test_resolve_characteristic_in_wrong_service() {
        let other = uuid::uuid!("0000180a-0000-1000-8000-00805f9b34fb");
        let services = vec![ServiceInfo::new(other, [WIFI_SCAN_CHARACTERISTIC])];
        assert_eq!(CharacteristicHandle::WIFI_SCAN.resolve(&services), None);
    }
}
