//! Command implementations for the CLI.

mod forget;
mod networks;
mod pair;
mod scan;

use std::sync::Arc;

use anyhow::Result;
use ems_core::{BleTransport, RegistryConfig, SessionRegistry};

use crate::config::Config;

pub use forget::cmd_forget;
pub use networks::cmd_networks;
pub use pair::cmd_pair;
pub use scan::cmd_scan;

/// Registry over the system Bluetooth adapter, using the config's retry settings.
fn ble_registry(config: &Config) -> Result<SessionRegistry> {
    let registry_config = RegistryConfig::new().policy(config.connection.policy()?);
    Ok(SessionRegistry::with_config(
        Arc::new(BleTransport::new()),
        registry_config,
    )?)
}
