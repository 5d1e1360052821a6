//! In-memory transport for testing.
//!
//! [`MockTransport`] implements [`Transport`] without any Bluetooth hardware.
//! Devices are registered per address with a [`MockDeviceConfig`].
//!
//! # Features
//!
//! - **Failure injection**: fail the next N connects or reads, or hide the
//!   WiFi scan service entirely
//! - **Latency simulation**: delay connects, discovery, reads and link
//!   teardown (works with paused tokio time)
//! - **Counters**: connect attempts, link releases, open links and the peak
//!   number of simultaneously open links per address
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use ems_core::{MockDeviceConfig, MockTransport, SessionRegistry};
//! use ems_types::{NetworkRecord, ScanResult};
//!
//! #[tokio::main]
//! async fn main() {
//!     let transport = Arc::new(MockTransport::new());
//!     let scan = ScanResult::new(vec![NetworkRecord::new("Home", -45)]);
//!     let address = "AA:BB:CC:DD:EE:FF".parse().unwrap();
//!     transport.add_device(address, MockDeviceConfig::with_scan(scan));
//!
//!     let registry = SessionRegistry::new(transport);
//!     let networks = registry.read_networks("AA:BB:CC:DD:EE:FF").await.unwrap();
//!     assert_eq!(networks.len(), 1);
//! }
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use uuid::uuid;

use ems_types::uuids::{DEVICE_DATA_SERVICE, WIFI_SCAN_CHARACTERISTIC};
use ems_types::{DeviceAddress, ScanResult, codec};

use crate::error::TransportError;
use crate::transport::{
    CharacteristicHandle, DiscoveredDevice, Link, ServiceInfo, Transport, TransportResult,
};

const GAP_SERVICE: uuid::Uuid = uuid!("00001800-0000-1000-8000-00805f9b34fb");

/// Behaviour of one simulated device.
#[derive(Debug, Clone)]
pub struct MockDeviceConfig {
    /// Advertised name.
    pub name: Option<String>,
    /// RSSI reported by discovery scans.
    pub rssi: i16,
    /// Raw value returned by reads of the WiFi scan characteristic.
    pub payload: Vec<u8>,
    /// Whether the device exposes the WiFi scan characteristic.
    pub has_scan_service: bool,
    /// Simulated connect latency.
    pub connect_latency: Duration,
    /// Simulated service discovery latency.
    pub discovery_latency: Duration,
    /// Simulated read latency.
    pub read_latency: Duration,
    /// Simulated time to tear a link down.
    pub close_latency: Duration,
    /// Number of connect attempts to fail before succeeding.
    pub connect_failures: u32,
    /// Status returned by failing connect attempts.
    pub connect_failure_status: TransportError,
    /// Number of reads to fail before succeeding.
    pub read_failures: u32,
}

impl Default for MockDeviceConfig {
    fn default() -> Self {
        Self {
            name: Some("EMS Mock".to_string()),
            rssi: -50,
            payload: vec![codec::RECORD_SEPARATOR],
            has_scan_service: true,
            connect_latency: Duration::ZERO,
            discovery_latency: Duration::ZERO,
            read_latency: Duration::ZERO,
            close_latency: Duration::ZERO,
            connect_failures: 0,
            connect_failure_status: TransportError::Ble("mock connect failure".to_string()),
            read_failures: 0,
        }
    }
}

impl MockDeviceConfig {
    /// A device whose reads return `scan`.
    ///
    /// If an SSID contains a framing byte the payload is left empty, which
    /// decodes as a missing terminator.
    pub fn with_scan(scan: ScanResult) -> Self {
        Self::default().scan(&scan)
    }

    /// A device whose reads return `payload` verbatim.
    pub fn with_payload(payload: impl Into<Vec<u8>>) -> Self {
        Self::default().payload(payload)
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Advertise without a local name.
    #[must_use]
    pub fn unnamed(mut self) -> Self {
        self.name = None;
        self
    }

    #[must_use]
    pub fn rssi(mut self, rssi: i16) -> Self {
        self.rssi = rssi;
        self
    }

    #[must_use]
    pub fn scan(mut self, scan: &ScanResult) -> Self {
        self.payload = codec::encode(scan).map(|b| b.to_vec()).unwrap_or_default();
        self
    }

    #[must_use]
    pub fn payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.payload = payload.into();
        self
    }

    /// Expose only generic services.
    #[must_use]
    pub fn without_scan_service(mut self) -> Self {
        self.has_scan_service = false;
        self
    }

    #[must_use]
    pub fn connect_latency(mut self, latency: Duration) -> Self {
        self.connect_latency = latency;
        self
    }

    #[must_use]
    pub fn discovery_latency(mut self, latency: Duration) -> Self {
        self.discovery_latency = latency;
        self
    }

    #[must_use]
    pub fn read_latency(mut self, latency: Duration) -> Self {
        self.read_latency = latency;
        self
    }

    /// Hold the link open for `latency` after a close is requested.
    #[must_use]
    pub fn close_latency(mut self, latency: Duration) -> Self {
        self.close_latency = latency;
        self
    }

    /// Fail the next `count` connect attempts.
    #[must_use]
    pub fn fail_connects(mut self, count: u32) -> Self {
        self.connect_failures = count;
        self
    }

    /// Status used by [`fail_connects`](Self::fail_connects).
    #[must_use]
    pub fn connect_failure_status(mut self, status: TransportError) -> Self {
        self.connect_failure_status = status;
        self
    }

    /// Fail the next `count` reads.
    #[must_use]
    pub fn fail_reads(mut self, count: u32) -> Self {
        self.read_failures = count;
        self
    }
}

/// Runtime state of one simulated device.
#[derive(Debug)]
struct MockDevice {
    config: Mutex<MockDeviceConfig>,
    remaining_connect_failures: AtomicU32,
    remaining_read_failures: AtomicU32,
    close_calls: AtomicU32,
    open_links: AtomicU32,
    max_open_links: AtomicU32,
}

impl MockDevice {
    fn new(config: MockDeviceConfig) -> Self {
        Self {
            remaining_connect_failures: AtomicU32::new(config.connect_failures),
            remaining_read_failures: AtomicU32::new(config.read_failures),
            config: Mutex::new(config),
            close_calls: AtomicU32::new(0),
            open_links: AtomicU32::new(0),
            max_open_links: AtomicU32::new(0),
        }
    }

    fn config(&self) -> MockDeviceConfig {
        self.config
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Consume one injected failure, if any remain.
    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// A mock transport for testing.
#[derive(Debug)]
pub struct MockTransport {
    devices: Mutex<HashMap<DeviceAddress, Arc<MockDevice>>>,
    connect_attempts: Mutex<HashMap<DeviceAddress, u32>>,
    adapter_available: AtomicBool,
    scan_calls: AtomicU32,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// Create a transport with no devices and a working adapter.
    pub fn new() -> Self {
        Self {
            devices: Mutex::new(HashMap::new()),
            connect_attempts: Mutex::new(HashMap::new()),
            adapter_available: AtomicBool::new(true),
            scan_calls: AtomicU32::new(0),
        }
    }

    /// Register (or replace) a device.
    pub fn add_device(&self, address: DeviceAddress, config: MockDeviceConfig) {
        self.devices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(address, Arc::new(MockDevice::new(config)));
    }

    /// Make a device disappear. Existing links keep working.
    pub fn remove_device(&self, address: &DeviceAddress) {
        self.devices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(address);
    }

    /// Simulate the adapter being switched off or on.
    pub fn set_adapter_available(&self, available: bool) {
        self.adapter_available.store(available, Ordering::SeqCst);
    }

    /// Change what subsequent reads return.
    pub fn set_payload(&self, address: &DeviceAddress, payload: impl Into<Vec<u8>>) {
        if let Some(device) = self.device(address) {
            device
                .config
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .payload = payload.into();
        }
    }

    /// Fail the next `count` reads on this device.
    pub fn fail_next_reads(&self, address: &DeviceAddress, count: u32) {
        if let Some(device) = self.device(address) {
            device.remaining_read_failures.store(count, Ordering::SeqCst);
        }
    }

    /// Connect attempts made for `address`, including failed ones.
    pub fn connect_attempts(&self, address: &DeviceAddress) -> u32 {
        self.connect_attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(address)
            .copied()
            .unwrap_or(0)
    }

    /// Number of links to `address` that were closed.
    pub fn close_calls(&self, address: &DeviceAddress) -> u32 {
        self.device(address)
            .map(|d| d.close_calls.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// Links to `address` that were opened and not yet closed.
    pub fn open_links(&self, address: &DeviceAddress) -> u32 {
        self.device(address)
            .map(|d| d.open_links.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// Highest number of links to `address` that were open at the same time.
    pub fn max_open_links(&self, address: &DeviceAddress) -> u32 {
        self.device(address)
            .map(|d| d.max_open_links.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// Number of discovery scans run.
    pub fn scan_calls(&self) -> u32 {
        self.scan_calls.load(Ordering::SeqCst)
    }

    fn device(&self, address: &DeviceAddress) -> Option<Arc<MockDevice>> {
        self.devices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(address)
            .cloned()
    }

    fn check_adapter(&self) -> TransportResult<()> {
        if self.adapter_available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(TransportError::AdapterUnavailable)
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self, address: &DeviceAddress) -> TransportResult<Box<dyn Link>> {
        *self
            .connect_attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(address.clone())
            .or_insert(0) += 1;

        self.check_adapter()?;
        let device = self.device(address).ok_or(TransportError::DeviceNotFound)?;
        let config = device.config();

        if !config.connect_latency.is_zero() {
            tokio::time::sleep(config.connect_latency).await;
        }

        if MockDevice::take_failure(&device.remaining_connect_failures) {
            return Err(config.connect_failure_status);
        }

        let open = device.open_links.fetch_add(1, Ordering::SeqCst) + 1;
        device.max_open_links.fetch_max(open, Ordering::SeqCst);
        Ok(Box::new(MockLink {
            device,
            closed: false,
        }))
    }

    async fn scan(&self, duration: Duration) -> TransportResult<Vec<DiscoveredDevice>> {
        self.scan_calls.fetch_add(1, Ordering::SeqCst);
        self.check_adapter()?;
        tokio::time::sleep(duration).await;

        let devices: Vec<(DeviceAddress, Arc<MockDevice>)> = self
            .devices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(a, d)| (a.clone(), Arc::clone(d)))
            .collect();

        let mut found: Vec<DiscoveredDevice> = devices
            .into_iter()
            .map(|(address, device)| {
                let config = device.config();
                DiscoveredDevice {
                    name: config.name,
                    address,
                    rssi: Some(config.rssi),
                    advertises_service: config.has_scan_service,
                }
            })
            .collect();
        found.sort_by(|a, b| a.address.cmp(&b.address));
        Ok(found)
    }
}

/// Link handed out by [`MockTransport`].
struct MockLink {
    device: Arc<MockDevice>,
    closed: bool,
}

impl MockLink {
    fn check_open(&self) -> TransportResult<()> {
        if self.closed {
            Err(TransportError::Disconnected)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Link for MockLink {
    async fn discover_services(&mut self) -> TransportResult<Vec<ServiceInfo>> {
        self.check_open()?;
        let config = self.device.config();
        if !config.discovery_latency.is_zero() {
            tokio::time::sleep(config.discovery_latency).await;
        }

        let mut services = vec![ServiceInfo::new(GAP_SERVICE, [])];
        if config.has_scan_service {
            services.push(ServiceInfo::new(
                DEVICE_DATA_SERVICE,
                [WIFI_SCAN_CHARACTERISTIC],
            ));
        }
        Ok(services)
    }

    async fn read(&mut self, handle: &CharacteristicHandle) -> TransportResult<Vec<u8>> {
        self.check_open()?;
        let config = self.device.config();
        if !config.read_latency.is_zero() {
            tokio::time::sleep(config.read_latency).await;
        }

        if *handle != CharacteristicHandle::WIFI_SCAN || !config.has_scan_service {
            return Err(TransportError::Ble(format!(
                "no characteristic {}",
                handle.characteristic
            )));
        }
        if MockDevice::take_failure(&self.device.remaining_read_failures) {
            return Err(TransportError::Ble("mock read failure".to_string()));
        }
        Ok(config.payload)
    }

    async fn close(&mut self) -> TransportResult<()> {
        let latency = self.device.config().close_latency;
        if !self.closed && !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if !self.closed {
            self.closed = true;
            self.device.open_links.fetch_sub(1, Ordering::SeqCst);
        }
        self.device.close_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ems_types::NetworkRecord;

    fn addr() -> DeviceAddress {
        "11:22:33:44:55:66".parse().unwrap()
    }

    #[tokio::test]
    async fn test_unknown_device() {
        let transport = MockTransport::new();
        let err = transport.connect(&addr()).await.err().unwrap();
        assert_eq!(err, TransportError::DeviceNotFound);
        assert_eq!(transport.connect_attempts(&addr()), 1);
    }

    #[tokio::test]
    async fn test_injected_connect_failures() {
        let transport = MockTransport::new();
        transport.add_device(
            addr(),
            MockDeviceConfig::default()
                .fail_connects(2)
                .connect_failure_status(TransportError::Disconnected),
        );

        for _ in 0..2 {
            let err = transport.connect(&addr()).await.err().unwrap();
            assert_eq!(err, TransportError::Disconnected);
        }
        assert!(transport.connect(&addr()).await.is_ok());
        assert_eq!(transport.connect_attempts(&addr()), 3);
        assert_eq!(transport.open_links(&addr()), 1);
    }

    #[tokio::test]
    async fn test_link_read_and_close() {
        let transport = MockTransport::new();
        let scan = ScanResult::new(vec![NetworkRecord::new("Home", -45)]);
        transport.add_device(addr(), MockDeviceConfig::with_scan(scan));

        let mut link = transport.connect(&addr()).await.unwrap();
        let services = link.discover_services().await.unwrap();
        assert!(CharacteristicHandle::WIFI_SCAN.resolve(&services).is_some());

        let payload = link.read(&CharacteristicHandle::WIFI_SCAN).await.unwrap();
        assert_eq!(payload, b"Home\n-45\x19");

        link.close().await.unwrap();
        assert_eq!(transport.open_links(&addr()), 0);
        assert_eq!(transport.close_calls(&addr()), 1);
        assert!(link.read(&CharacteristicHandle::WIFI_SCAN).await.is_err());
    }

    #[tokio::test]
    async fn test_adapter_unavailable() {
        let transport = MockTransport::new();
        transport.add_device(addr(), MockDeviceConfig::default());
        transport.set_adapter_available(false);

        let err = transport.connect(&addr()).await.err().unwrap();
        assert_eq!(err, TransportError::AdapterUnavailable);
        assert!(transport.scan(Duration::ZERO).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_lists_devices() {
        let transport = MockTransport::new();
        transport.add_device(addr(), MockDeviceConfig::default().name("Kitchen"));
        transport.add_device(
            "00:00:00:00:00:01".parse().unwrap(),
            MockDeviceConfig::default().unnamed().without_scan_service(),
        );

        let found = transport.scan(Duration::from_secs(5)).await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].name, None);
        assert!(!found[0].advertises_service);
        assert_eq!(found[1].name.as_deref(), Some("Kitchen"));
        assert_eq!(transport.scan_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_latency_keeps_link_open() {
        let transport = Arc::new(MockTransport::new());
        transport.add_device(
            addr(),
            MockDeviceConfig::default().close_latency(Duration::from_secs(2)),
        );

        let mut first = transport.connect(&addr()).await.unwrap();
        let closing = tokio::spawn(async move { first.close().await });

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(transport.open_links(&addr()), 1);

        let _second = transport.connect(&addr()).await.unwrap();
        assert_eq!(transport.max_open_links(&addr()), 2);

        closing.await.unwrap().unwrap();
        assert_eq!(transport.open_links(&addr()), 1);
    }

    #[test]
    fn test_with_scan_reserved_bytes_leaves_empty_payload() {
        let scan = ScanResult::new(vec![NetworkRecord::new("bad\nssid", -1)]);
        let config = MockDeviceConfig::with_scan(scan);
        assert!(config.payload.is_empty());
    }
}
