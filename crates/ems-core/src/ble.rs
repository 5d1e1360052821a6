//! Production transport on top of btleplug.
//!
//! The adapter is looked up lazily on first use, so constructing a
//! [`BleTransport`] never fails; a missing adapter surfaces as
//! [`TransportError::AdapterUnavailable`] from the first connect or scan.
//!
//! Peripherals are matched by hardware address. Platforms that hide the
//! address (macOS reports `00:00:00:00:00:00`) never match.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{Central, Characteristic, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral};
use tokio::sync::OnceCell;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use uuid::Uuid;

use ems_types::DeviceAddress;
use ems_types::uuids::DEVICE_DATA_SERVICE;

use crate::error::TransportError;
use crate::transport::{
    CharacteristicHandle, DiscoveredDevice, Link, ServiceInfo, Transport, TransportResult,
};

/// How long `connect` scans for a peripheral the adapter has not seen yet.
pub const DEFAULT_LOOKUP_SCAN: Duration = Duration::from_secs(5);

/// Get the first available Bluetooth adapter.
pub async fn get_adapter() -> TransportResult<Adapter> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;

    adapters
        .into_iter()
        .next()
        .ok_or(TransportError::AdapterUnavailable)
}

/// [`Transport`] backed by the platform BLE stack.
#[derive(Debug)]
pub struct BleTransport {
    adapter: OnceCell<Adapter>,
    lookup_scan: Duration,
}

impl Default for BleTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl BleTransport {
    pub fn new() -> Self {
        Self {
            adapter: OnceCell::new(),
            lookup_scan: DEFAULT_LOOKUP_SCAN,
        }
    }

    /// Use an adapter that was already obtained.
    pub fn with_adapter(adapter: Adapter) -> Self {
        Self {
            adapter: OnceCell::new_with(Some(adapter)),
            lookup_scan: DEFAULT_LOOKUP_SCAN,
        }
    }

    /// Set how long `connect` scans for an unknown peripheral.
    #[must_use]
    pub fn lookup_scan(mut self, duration: Duration) -> Self {
        self.lookup_scan = duration;
        self
    }

    async fn adapter(&self) -> TransportResult<&Adapter> {
        self.adapter.get_or_try_init(get_adapter).await
    }

    /// Find a peripheral the adapter already knows about.
    async fn known_peripheral(
        adapter: &Adapter,
        address: &DeviceAddress,
    ) -> TransportResult<Option<Peripheral>> {
        for peripheral in adapter.peripherals().await? {
            if let Ok(Some(props)) = peripheral.properties().await
                && props.address.to_string().eq_ignore_ascii_case(address.as_str())
            {
                return Ok(Some(peripheral));
            }
        }
        Ok(None)
    }

    async fn find_peripheral(&self, address: &DeviceAddress) -> TransportResult<Peripheral> {
        let adapter = self.adapter().await?;

        if let Some(peripheral) = Self::known_peripheral(adapter, address).await? {
            debug!("peripheral already known to adapter");
            return Ok(peripheral);
        }

        debug!(duration = ?self.lookup_scan, "peripheral not cached, scanning");
        adapter.start_scan(ScanFilter::default()).await?;
        sleep(self.lookup_scan).await;
        adapter.stop_scan().await?;

        Self::known_peripheral(adapter, address)
            .await?
            .ok_or(TransportError::DeviceNotFound)
    }
}

#[async_trait]
impl Transport for BleTransport {
    #[tracing::instrument(level = "debug", skip_all, fields(address = %address))]
    async fn connect(&self, address: &DeviceAddress) -> TransportResult<Box<dyn Link>> {
        let peripheral = self.find_peripheral(address).await?;
        peripheral.connect().await?;
        info!("connected");

        Ok(Box::new(BleLink {
            peripheral,
            address: address.clone(),
            characteristics: HashMap::new(),
            connected: true,
        }))
    }

    async fn scan(&self, duration: Duration) -> TransportResult<Vec<DiscoveredDevice>> {
        let adapter = self.adapter().await?;
        info!(secs = duration.as_secs(), "starting BLE scan");

        adapter.start_scan(ScanFilter::default()).await?;
        sleep(duration).await;
        adapter.stop_scan().await?;

        let mut found = Vec::new();
        for peripheral in adapter.peripherals().await? {
            let props = match peripheral.properties().await {
                Ok(Some(props)) => props,
                Ok(None) => continue,
                Err(e) => {
                    debug!(error = %e, "skipping peripheral");
                    continue;
                }
            };

            let Ok(address) = props.address.to_string().parse::<DeviceAddress>() else {
                continue;
            };
            if address.is_unspecified() {
                continue;
            }

            found.push(DiscoveredDevice {
                name: props.local_name,
                address,
                rssi: props.rssi,
                advertises_service: props.services.contains(&DEVICE_DATA_SERVICE),
            });
        }

        info!(count = found.len(), "scan complete");
        Ok(found)
    }
}

/// A connected btleplug peripheral.
struct BleLink {
    peripheral: Peripheral,
    address: DeviceAddress,
    /// Keyed by (service, characteristic).
    characteristics: HashMap<(Uuid, Uuid), Characteristic>,
    connected: bool,
}

#[async_trait]
impl Link for BleLink {
    async fn discover_services(&mut self) -> TransportResult<Vec<ServiceInfo>> {
        self.peripheral.discover_services().await?;

        let services = self.peripheral.services();
        self.characteristics.clear();
        let mut infos = Vec::with_capacity(services.len());
        for service in services {
            debug!(service = %service.uuid, "service");
            for characteristic in &service.characteristics {
                self.characteristics.insert(
                    (service.uuid, characteristic.uuid),
                    characteristic.clone(),
                );
            }
            infos.push(ServiceInfo::new(
                service.uuid,
                service.characteristics.iter().map(|c| c.uuid),
            ));
        }
        Ok(infos)
    }

    async fn read(&mut self, handle: &CharacteristicHandle) -> TransportResult<Vec<u8>> {
        let characteristic = self
            .characteristics
            .get(&(handle.service, handle.characteristic))
            .ok_or_else(|| {
                TransportError::Ble(format!("characteristic {} not found", handle.characteristic))
            })?;
        Ok(self.peripheral.read(characteristic).await?)
    }

    async fn close(&mut self) -> TransportResult<()> {
        self.connected = false;
        self.peripheral.disconnect().await?;
        Ok(())
    }
}

impl Drop for BleLink {
    fn drop(&mut self) {
        if !self.connected {
            return;
        }
        warn!(address = %self.address, "link dropped without close, disconnecting in background");

        let peripheral = self.peripheral.clone();
        let address = self.address.clone();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(e) = peripheral.disconnect().await {
                    debug!(%address, error = %e, "background disconnect failed");
                }
            });
        }
    }
}
