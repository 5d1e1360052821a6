//! Utility functions for CLI operations.

use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use dialoguer::{Select, theme::ColorfulTheme};
use ems_core::{DiscoveredDevice, Error, SessionRegistry, TransportError};
use indicatif::ProgressBar;

use crate::style;

/// Discovery window used when `pair` has to look for a device itself.
const PAIR_SCAN_SECS: u64 = 5;

/// Get device identifier, with helpful error message.
pub fn require_device(device: Option<String>) -> Result<String> {
    device.ok_or_else(|| {
        anyhow::anyhow!(
            "No device specified. Use --device <ADDRESS> or set EMS_DEVICE environment variable.\n\
             Run 'ems pair' to remember a device."
        )
    })
}

/// Spinner on stderr, only when it is a terminal and not in quiet mode.
pub fn spinner_if(enabled: bool, make: impl FnOnce() -> ProgressBar) -> Option<ProgressBar> {
    (enabled && io::stderr().is_terminal()).then(make)
}

/// Scan for named devices and let the user pick one.
///
/// Returns the address and advertised name.
pub async fn select_device_interactive(
    registry: &SessionRegistry,
    quiet: bool,
) -> Result<(String, Option<String>)> {
    if !io::stdin().is_terminal() || !io::stderr().is_terminal() {
        bail!(
            "No device specified. Pass the device address: ems pair <ADDRESS>\n\
             Run 'ems scan' to find nearby devices."
        );
    }

    let spinner = spinner_if(!quiet, || style::scanning_spinner(PAIR_SCAN_SECS));
    let result = registry
        .scan_for(Duration::from_secs(PAIR_SCAN_SECS))
        .await;
    if let Some(sp) = spinner {
        sp.finish_and_clear();
    }
    let devices = result.map_err(describe_error).context("Failed to scan for devices")?;

    if devices.is_empty() {
        bail!(
            "No EMS devices found nearby.\n\
             Make sure the device is powered on and in range."
        );
    }

    let index = if devices.len() == 1 {
        let dev = &devices[0];
        eprintln!(
            "Found 1 device: {} ({})",
            dev.name.as_deref().unwrap_or("Unknown"),
            dev.address
        );
        0
    } else {
        let items: Vec<String> = devices
            .iter()
            .map(|d| format!("{} ({})", d.name.as_deref().unwrap_or("Unknown"), d.address))
            .collect();

        Select::with_theme(&ColorfulTheme::default())
            .with_prompt("Select a device")
            .items(&items)
            .default(0)
            .interact()
            .context("Failed to get user selection")?
    };

    let chosen: &DiscoveredDevice = &devices[index];
    Ok((chosen.address.to_string(), chosen.name.clone()))
}

/// Wrap a core error with a hint about what the user can do.
pub fn describe_error(err: Error) -> anyhow::Error {
    let hint = match &err {
        Error::InvalidAddress(_) => Some("Addresses look like AA:BB:CC:DD:EE:FF."),
        Error::ConnectFailed {
            last_status: TransportError::AdapterUnavailable,
            ..
        }
        | Error::DiscoveryFailed {
            status: TransportError::AdapterUnavailable,
        } => Some("Check that Bluetooth is switched on and this program may use it."),
        Error::ConnectFailed { .. } => {
            Some("Make sure the device is powered on, in range and not connected elsewhere.")
        }
        Error::UnsupportedDevice { .. } => {
            Some("This device does not expose the EMS WiFi scan service.")
        }
        Error::NoStoredDevice => Some("Run 'ems pair <ADDRESS>' first."),
        _ => None,
    };

    match hint {
        Some(hint) => anyhow::anyhow!("{}\n\nTip: {}", err, hint),
        None => anyhow::Error::new(err),
    }
}

/// Write output to file or stdout
pub fn write_output(output: Option<&PathBuf>, content: &str) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, content)
                .with_context(|| format!("Failed to write to {}", path.display()))?;
        }
        None => {
            print!("{}", content);
            io::stdout().flush()?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_device_with_some() {
        let result = require_device(Some("AA:BB:CC:DD:EE:FF".to_string()));
        assert_eq!(result.unwrap(), "AA:BB:CC:DD:EE:FF");
    }

    #[test]
    fn test_require_device_with_none() {
        let err = require_device(None).unwrap_err().to_string();
        assert!(err.contains("No device specified"));
        assert!(err.contains("EMS_DEVICE"));
    }

    #[test]
    fn test_describe_error_adds_hint() {
        let err = describe_error(Error::NoStoredDevice);
        let text = err.to_string();
        assert!(text.starts_with("No device has been paired yet"));
        assert!(text.ends_with("Tip: Run 'ems pair <ADDRESS>' first."));

        let err = describe_error(Error::SessionClosed);
        assert_eq!(format!("{:#}", err), "Session closed");
    }

    #[test]
    fn test_write_output_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        write_output(Some(&path), "hello\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello\n");
    }
}
