//! Pair command implementation.

use std::path::Path;

use anyhow::{Context, Result};

use crate::config::{Config, ConfigStore, resolve_timeout};
use crate::format::FormatOptions;
use crate::style;
use crate::util::{describe_error, select_device_interactive, spinner_if};

pub async fn cmd_pair(
    address: Option<String>,
    timeout: Option<u64>,
    quiet: bool,
    opts: &FormatOptions,
    config: &Config,
    config_path: &Path,
) -> Result<()> {
    let registry = super::ble_registry(config)?;

    let (address, name) = match address {
        Some(address) => (address, None),
        None => select_device_interactive(&registry, quiet).await?,
    };

    let store = ConfigStore::new(config_path);
    let timeout = resolve_timeout(timeout, config);

    let spinner = spinner_if(!quiet, || style::connecting_spinner(&address));
    let result = tokio::time::timeout(timeout, registry.pair(&address, &store)).await;
    if let Some(sp) = spinner {
        sp.finish_and_clear();
    }

    let outcome = match result {
        Ok(Ok(handle)) => Ok(handle.address().clone()),
        Ok(Err(err)) => Err(describe_error(err)),
        Err(_) => Err(anyhow::anyhow!(
            "Pairing with {} timed out after {}s",
            address,
            timeout.as_secs()
        )),
    };
    registry.shutdown().await;

    let paired = match outcome {
        Ok(paired) => paired,
        Err(err) => return Err(err.context(format!("Failed to pair with {}", address))),
    };

    if name.is_some() {
        let mut saved = Config::load_from(config_path)?;
        saved.device_name = name.clone();
        saved
            .save_to(config_path)
            .context("Failed to save device name")?;
    }

    if !quiet {
        let label = match name.as_deref() {
            Some(name) => format!("{} ({})", name, paired),
            None => paired.to_string(),
        };
        println!(
            "{}",
            style::format_success(&format!("Paired with {}", label), opts.no_color)
        );
        println!("Config saved to {}", config_path.display());
    }

    Ok(())
}
