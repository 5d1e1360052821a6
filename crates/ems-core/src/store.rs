//! Persistence seam for the paired device address.
//!
//! The core only ever needs to get and set one address string. Where it is
//! kept is up to the front end; the CLI keeps it in its TOML config file.

use std::sync::Mutex;

use ems_types::DeviceAddress;

use crate::error::{Error, Result};

/// Get/set storage for the paired device's address.
pub trait DeviceStore: Send + Sync {
    /// The stored address, if any. Not validated.
    fn load(&self) -> Result<Option<String>>;

    /// Replace the stored address.
    fn save(&self, address: &str) -> Result<()>;

    /// Forget the stored address.
    fn clear(&self) -> Result<()>;

    /// Load and validate the stored address.
    ///
    /// Returns [`Error::NoStoredDevice`] if nothing is stored and
    /// [`Error::InvalidAddress`] if the stored text is not an address.
    fn load_address(&self) -> Result<DeviceAddress> {
        let raw = self.load()?.ok_or(Error::NoStoredDevice)?;
        Ok(ems_types::validate(&raw)?)
    }
}

/// In-memory store, for tests and short-lived processes.
#[derive(Debug, Default)]
pub struct MemoryStore {
    address: Mutex<Option<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that already holds `address`.
    pub fn with_address(address: impl Into<String>) -> Self {
        Self {
            address: Mutex::new(Some(address.into())),
        }
    }
}

impl DeviceStore for MemoryStore {
    fn load(&self) -> Result<Option<String>> {
        let guard = self
            .address
            .lock()
            .map_err(|_| Error::store("memory store lock poisoned"))?;
        Ok(guard.clone())
    }

    fn save(&self, address: &str) -> Result<()> {
        let mut guard = self
            .address
            .lock()
            .map_err(|_| Error::store("memory store lock poisoned"))?;
        *guard = Some(address.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let mut guard = self
            .address
            .lock()
            .map_err(|_| Error::store("memory store lock poisoned"))?;
        *guard = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemoryStore::new();
        assert_eq!(store.load().unwrap(), None);

        store.save("AA:BB:CC:DD:EE:FF").unwrap();
        assert_eq!(store.load().unwrap().as_deref(), Some("AA:BB:CC:DD:EE:FF"));

        store.clear().unwrap();
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn test_load_address_validates() {
        let store = MemoryStore::with_address("aa:bb:cc:dd:ee:ff");
        assert_eq!(store.load_address().unwrap().as_str(), "AA:BB:CC:DD:EE:FF");

        let store = MemoryStore::with_address("not-a-mac");
        assert!(matches!(store.load_address(), Err(Error::InvalidAddress(_))));

        let store = MemoryStore::new();
        assert!(matches!(store.load_address(), Err(Error::NoStoredDevice)));
    }
}
