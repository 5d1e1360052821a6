//! Session lifecycle events.
//!
//! Every state transition a session makes is published as a [`DeviceEvent`]
//! on a broadcast channel. Front ends subscribe through
//! [`SessionRegistry::subscribe`](crate::SessionRegistry::subscribe).

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::broadcast;

use ems_types::{DeviceAddress, ScanResult};

use crate::transport::DiscoveredDevice;

/// Events emitted by sessions and the registry.
///
/// All events are serializable for logging and IPC.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new event types
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum DeviceEvent {
    /// A device was seen during a discovery scan.
    Discovered { device: DiscoveredDevice },
    /// The link is up; service discovery starts next.
    Connected {
        address: DeviceAddress,
        session_id: u64,
        attempts: u32,
    },
    /// The WiFi scan characteristic was found; the session is ready.
    ServicesReady {
        address: DeviceAddress,
        session_id: u64,
    },
    /// The session was closed.
    Disconnected {
        address: DeviceAddress,
        session_id: u64,
        reason: DisconnectReason,
    },
    /// A read completed and a new scan result was published.
    ScanUpdated {
        address: DeviceAddress,
        session_id: u64,
        result: ScanResult,
        #[serde(with = "time::serde::rfc3339")]
        received_at: OffsetDateTime,
    },
    /// The session entered `Failed`.
    Failed {
        address: DeviceAddress,
        session_id: u64,
        error: String,
    },
}

impl DeviceEvent {
    /// Address the event concerns.
    pub fn address(&self) -> &DeviceAddress {
        match self {
            DeviceEvent::Discovered { device } => &device.address,
            DeviceEvent::Connected { address, .. }
            | DeviceEvent::ServicesReady { address, .. }
            | DeviceEvent::Disconnected { address, .. }
            | DeviceEvent::ScanUpdated { address, .. }
            | DeviceEvent::Failed { address, .. } => address,
        }
    }

    /// Session the event came from, if any.
    pub fn session_id(&self) -> Option<u64> {
        match self {
            DeviceEvent::Discovered { .. } => None,
            DeviceEvent::Connected { session_id, .. }
            | DeviceEvent::ServicesReady { session_id, .. }
            | DeviceEvent::Disconnected { session_id, .. }
            | DeviceEvent::ScanUpdated { session_id, .. }
            | DeviceEvent::Failed { session_id, .. } => Some(*session_id),
        }
    }

    /// Short event name, as used in the serialized `type` tag.
    pub fn name(&self) -> &'static str {
        match self {
            DeviceEvent::Discovered { .. } => "discovered",
            DeviceEvent::Connected { .. } => "connected",
            DeviceEvent::ServicesReady { .. } => "services_ready",
            DeviceEvent::Disconnected { .. } => "disconnected",
            DeviceEvent::ScanUpdated { .. } => "scan_updated",
            DeviceEvent::Failed { .. } => "failed",
        }
    }
}

/// Why a session was closed.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new reasons
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum DisconnectReason {
    /// Closed by the caller.
    UserRequested,
    /// Closed because the registry shut down.
    Shutdown,
    /// Every handle was dropped without an explicit close.
    Dropped,
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DisconnectReason::UserRequested => "user requested",
            DisconnectReason::Shutdown => "shutdown",
            DisconnectReason::Dropped => "dropped",
        };
        f.write_str(s)
    }
}

/// Sender for device events.
pub type EventSender = broadcast::Sender<DeviceEvent>;

/// Receiver for device events.
pub type EventReceiver = broadcast::Receiver<DeviceEvent>;

/// Default broadcast capacity.
pub const DEFAULT_EVENT_CAPACITY: usize = 100;

/// Event dispatcher for sending events to multiple receivers.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    sender: EventSender,
}

impl EventDispatcher {
    /// Create a new event dispatcher.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to events.
    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Send an event.
    pub fn send(&self, event: DeviceEvent) {
        // Ignore error if no receivers
        let _ = self.sender.send(event);
    }

    /// Get the number of active receivers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}
