//! Process-wide map from device address to its live session.
//!
//! The registry enforces at most one non-terminal session per address. A
//! second `connect` for the same address returns the existing handle without
//! touching the transport; a session that has ended (closed or failed) is
//! replaced by a fresh one.
//!
//! A session that is being closed keeps its entry until its link is
//! released. A `connect` that finds such an entry waits for it to finish
//! before starting a new session, so two links to one device never overlap.
//!
//! The map lock is never held across I/O. Handles are cloned out under the
//! lock and awaited after it is released.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use ems_types::{DeviceAddress, ScanResult};

use crate::error::{Error, Result};
use crate::events::{DEFAULT_EVENT_CAPACITY, DeviceEvent, DisconnectReason, EventDispatcher, EventReceiver};
use crate::policy::ConnectPolicy;
use crate::session::{DEFAULT_QUEUE_CAPACITY, SessionHandle};
use crate::store::DeviceStore;
use crate::transport::{DiscoveredDevice, Transport};

/// Default discovery scan window.
pub const DEFAULT_SCAN_DURATION: Duration = Duration::from_secs(10);

/// Configuration for a [`SessionRegistry`].
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryConfig {
    /// Policy handed to every new session.
    pub policy: ConnectPolicy,
    /// Capacity of the event broadcast channel.
    pub event_capacity: usize,
    /// Depth of each session's command queue.
    pub queue_capacity: usize,
    /// Window used by [`SessionRegistry::scan`].
    pub scan_duration: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            policy: ConnectPolicy::default(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            scan_duration: DEFAULT_SCAN_DURATION,
        }
    }
}

impl RegistryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn policy(mut self, policy: ConnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    #[must_use]
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    #[must_use]
    pub fn scan_duration(mut self, duration: Duration) -> Self {
        self.scan_duration = duration;
        self
    }

    /// Check the configuration, including the policy.
    pub fn validate(&self) -> Result<()> {
        self.policy.validate()?;
        if self.event_capacity == 0 {
            return Err(Error::invalid_config("event_capacity must be at least 1"));
        }
        if self.queue_capacity == 0 {
            return Err(Error::invalid_config("queue_capacity must be at least 1"));
        }
        if self.scan_duration.is_zero() {
            return Err(Error::invalid_config("scan_duration must be non-zero"));
        }
        Ok(())
    }
}

/// Owns every connection session in the process.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<DeviceAddress, SessionHandle>>,
    transport: Arc<dyn Transport>,
    events: EventDispatcher,
    config: RegistryConfig,
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SessionRegistry {
    /// Create a registry with the default configuration.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::build(transport, RegistryConfig::default())
    }

    /// Create a registry with a custom configuration.
    pub fn with_config(transport: Arc<dyn Transport>, config: RegistryConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(transport, config))
    }

    fn build(transport: Arc<dyn Transport>, config: RegistryConfig) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            transport,
            events: EventDispatcher::new(config.event_capacity),
            config,
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Subscribe to session and discovery events.
    pub fn subscribe(&self) -> EventReceiver {
        self.events.subscribe()
    }

    /// Validate `address` and connect to it.
    ///
    /// An invalid address is rejected before the registry or the transport is
    /// touched.
    pub async fn connect(&self, address: &str) -> Result<SessionHandle> {
        let address = ems_types::validate(address)?;
        Ok(self.connect_address(address).await)
    }

    /// Return the live session for `address`, or start one.
    #[tracing::instrument(level = "info", skip_all, fields(address = %address))]
    pub async fn connect_address(&self, address: DeviceAddress) -> SessionHandle {
        let mut sessions = loop {
            let sessions = self.sessions.write().await;
            let Some(existing) = sessions.get(&address) else {
                break sessions;
            };

            let state = existing.state();
            if existing.is_live() {
                debug!(%state, session = existing.id(), "reusing live session");
                return existing.clone();
            }
            if existing.is_closing() {
                let closing = existing.clone();
                drop(sessions);
                debug!(session = closing.id(), "waiting for closing session to release its link");
                closing.wait_finished().await;
                continue;
            }
            debug!(%state, session = existing.id(), "replacing finished session");
            break sessions;
        };

        let handle = SessionHandle::spawn(
            address.clone(),
            Arc::clone(&self.transport),
            self.config.policy.clone(),
            self.events.clone(),
            self.config.queue_capacity,
        );
        info!(session = handle.id(), "session started");
        sessions.insert(address, handle.clone());
        handle
    }

    /// Look up the session for `address`.
    pub async fn get(&self, address: &str) -> Result<SessionHandle> {
        let address = ems_types::validate(address)?;
        self.sessions
            .read()
            .await
            .get(&address)
            .cloned()
            .ok_or(Error::NotFound(address))
    }

    /// Close the session for `address` and remove it. No-op if absent.
    ///
    /// The entry stays in the map until the link is released.
    #[tracing::instrument(level = "info", skip(self))]
    pub async fn close(&self, address: &str) -> Result<()> {
        let address = ems_types::validate(address)?;
        let Some(handle) = self.sessions.read().await.get(&address).cloned() else {
            debug!("no session to close");
            return Ok(());
        };

        handle.close().await;
        self.remove_if_same(&address, &handle).await;
        Ok(())
    }

    /// Remove the entry for `address` if it still holds `handle`.
    async fn remove_if_same(&self, address: &DeviceAddress, handle: &SessionHandle) {
        let mut sessions = self.sessions.write().await;
        if sessions.get(address) == Some(handle) {
            sessions.remove(address);
        }
    }

    /// Connect if needed and read the device's WiFi scan.
    pub async fn read_networks(&self, address: &str) -> Result<Arc<ScanResult>> {
        let handle = self.connect(address).await?;
        handle.read_networks().await
    }

    /// Close every session and empty the registry.
    #[tracing::instrument(level = "info", skip(self))]
    pub async fn shutdown(&self) {
        let handles: Vec<SessionHandle> = self.sessions.read().await.values().cloned().collect();

        info!(count = handles.len(), "closing all sessions");
        join_all(
            handles
                .iter()
                .map(|h| h.close_with(DisconnectReason::Shutdown)),
        )
        .await;

        self.sessions
            .write()
            .await
            .retain(|_, handle| !handles.contains(handle));
    }

    /// Connect to the address held in `store`.
    pub async fn connect_stored(&self, store: &dyn DeviceStore) -> Result<SessionHandle> {
        let address = store.load_address()?;
        Ok(self.connect_address(address).await)
    }

    /// First-time pairing: connect, wait until the device is ready, then
    /// persist its address.
    ///
    /// Nothing is stored if the device cannot be reached or does not expose
    /// the WiFi scan characteristic.
    #[tracing::instrument(level = "info", skip(self, store))]
    pub async fn pair(&self, address: &str, store: &dyn DeviceStore) -> Result<SessionHandle> {
        let handle = self.connect(address).await?;
        if let Err(err) = handle.wait_ready().await {
            warn!(error = %err, "pairing failed");
            return Err(err);
        }

        store.save(handle.address().as_str())?;
        info!("device paired");
        Ok(handle)
    }

    /// Scan for nearby devices that advertise a name.
    ///
    /// Each device found is also published as [`DeviceEvent::Discovered`].
    pub async fn scan(&self) -> Result<Vec<DiscoveredDevice>> {
        self.scan_for(self.config.scan_duration).await
    }

    /// Scan for named devices for `duration`.
    #[tracing::instrument(level = "info", skip(self))]
    pub async fn scan_for(&self, duration: Duration) -> Result<Vec<DiscoveredDevice>> {
        let found = self
            .transport
            .scan(duration)
            .await
            .map_err(|status| Error::DiscoveryFailed { status })?;

        let named: Vec<DiscoveredDevice> = found
            .into_iter()
            .filter(|d| d.name.as_deref().is_some_and(|n| !n.trim().is_empty()))
            .collect();

        for device in &named {
            self.events.send(DeviceEvent::Discovered {
                device: device.clone(),
            });
        }
        debug!(count = named.len(), "named devices found");
        Ok(named)
    }

    /// Addresses with a registry entry, live or not.
    pub async fn addresses(&self) -> Vec<DeviceAddress> {
        let mut addresses: Vec<_> = self.sessions.read().await.keys().cloned().collect();
        addresses.sort();
        addresses
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::mock::{MockDeviceConfig, MockTransport};
    use crate::state::SessionState;
    use crate::store::MemoryStore;

    const ADDR: &str = "AA:BB:CC:DD:EE:FF";

    fn addr() -> DeviceAddress {
        ADDR.parse().unwrap()
    }

    fn registry_with(config: MockDeviceConfig) -> (Arc<MockTransport>, SessionRegistry) {
        let transport = Arc::new(MockTransport::new());
        transport.add_device(addr(), config);
        let registry = SessionRegistry::new(Arc::clone(&transport) as Arc<dyn Transport>);
        (transport, registry)
    }

    #[test]
    fn test_config_validation() {
        assert!(RegistryConfig::default().validate().is_ok());
        assert!(RegistryConfig::new().event_capacity(0).validate().is_err());
        assert!(RegistryConfig::new().queue_capacity(0).validate().is_err());
        assert!(
            RegistryConfig::new()
                .scan_duration(Duration::ZERO)
                .validate()
                .is_err()
        );
        assert!(
            RegistryConfig::new()
                .policy(ConnectPolicy::default().max_attempts(0))
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_with_config_rejects_invalid() {
        let transport: Arc<dyn Transport> = Arc::new(MockTransport::new());
        let result = SessionRegistry::with_config(transport, RegistryConfig::new().queue_capacity(0));
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_address_never_reaches_transport() {
        let (transport, registry) = registry_with(MockDeviceConfig::default());

        let err = registry.connect("AA:BB:CC:DD:EE").await.unwrap_err();
        assert!(matches!(err, Error::InvalidAddress(_)));
        assert!(registry.is_empty().await);
        assert_eq!(transport.connect_attempts(&addr()), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_is_single_flight() {
        let (transport, registry) =
            registry_with(MockDeviceConfig::default().connect_latency(Duration::from_secs(1)));

        let a = registry.connect(ADDR).await.unwrap();
        let b = registry.connect("aa:bb:cc:dd:ee:ff").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(registry.len().await, 1);

        a.wait_ready().await.unwrap();
        assert_eq!(transport.connect_attempts(&addr()), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_entry_is_replaced() {
        let (transport, registry) = registry_with(MockDeviceConfig::default().fail_connects(3));

        let first = registry.connect(ADDR).await.unwrap();
        assert!(first.wait_ready().await.is_err());
        assert_eq!(first.state(), SessionState::Failed);

        let second = registry.connect(ADDR).await.unwrap();
        assert_ne!(first, second);
        second.wait_ready().await.unwrap();
        assert_eq!(transport.connect_attempts(&addr()), 4);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_and_close() {
        let (transport, registry) = registry_with(MockDeviceConfig::default());

        assert!(matches!(registry.get(ADDR).await, Err(Error::NotFound(_))));

        let handle = registry.connect(ADDR).await.unwrap();
        handle.wait_ready().await.unwrap();
        assert_eq!(registry.get(ADDR).await.unwrap(), handle);

        registry.close(ADDR).await.unwrap();
        assert_eq!(handle.state(), SessionState::Closed);
        assert!(registry.is_empty().await);
        assert_eq!(transport.close_calls(&addr()), 1);

        // Closing an absent entry is a no-op.
        registry.close(ADDR).await.unwrap();
        assert_eq!(transport.close_calls(&addr()), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pair_stores_after_ready() {
        let (_, registry) = registry_with(MockDeviceConfig::default());
        let store = MemoryStore::new();

        let handle = registry.pair("aa:bb:cc:dd:ee:ff", &store).await.unwrap();
        assert!(handle.state().is_ready());
        assert_eq!(store.load().unwrap().as_deref(), Some(ADDR));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pair_unsupported_device_stores_nothing() {
        let (_, registry) = registry_with(MockDeviceConfig::default().without_scan_service());
        let store = MemoryStore::new();

        let err = registry.pair(ADDR, &store).await.unwrap_err();
        assert!(matches!(err, Error::UnsupportedDevice { .. }));
        assert_eq!(store.load().unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_stored() {
        let (_, registry) = registry_with(MockDeviceConfig::default());

        let err = registry.connect_stored(&MemoryStore::new()).await.unwrap_err();
        assert!(matches!(err, Error::NoStoredDevice));

        let handle = registry
            .connect_stored(&MemoryStore::with_address(ADDR))
            .await
            .unwrap();
        assert_eq!(handle.address(), &addr());
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_lists_named_devices_and_emits_events() {
        let (transport, registry) = registry_with(MockDeviceConfig::default().name("EMS Hub"));
        transport.add_device(
            "00:11:22:33:44:55".parse().unwrap(),
            MockDeviceConfig::default().unnamed(),
        );
        let mut events = registry.subscribe();

        let found = registry.scan().await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name.as_deref(), Some("EMS Hub"));

        let event = events.try_recv().unwrap();
        assert_eq!(event.name(), "discovered");
        assert_eq!(event.address(), &addr());
        assert!(events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_without_adapter() {
        let (transport, registry) = registry_with(MockDeviceConfig::default());
        transport.set_adapter_available(false);

        let err = registry.scan().await.unwrap_err();
        assert!(matches!(err, Error::DiscoveryFailed { .. }));
    }
}
