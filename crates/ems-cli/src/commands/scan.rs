//! Scan command implementation.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::cli::OutputFormat;
use crate::config::Config;
use crate::format::{FormatOptions, format_scan_json, format_scan_text};
use crate::style;
use crate::util::{describe_error, spinner_if, write_output};

pub async fn cmd_scan(
    timeout: u64,
    all: bool,
    format: OutputFormat,
    output: Option<&PathBuf>,
    quiet: bool,
    opts: &FormatOptions,
    config: &Config,
) -> Result<()> {
    let registry = super::ble_registry(config)?;

    // Show spinner for text output (unless quiet)
    let spinner = spinner_if(!quiet && format == OutputFormat::Text, || {
        style::scanning_spinner(timeout)
    });

    let result = registry.scan_for(Duration::from_secs(timeout)).await;

    if let Some(sp) = spinner {
        sp.finish_and_clear();
    }

    let mut devices = result
        .map_err(describe_error)
        .context("Failed to scan for devices")?;
    if !all {
        devices.retain(|d| d.advertises_service);
    }
    tracing::debug!(count = devices.len(), all, "scan finished");

    let content = match format {
        OutputFormat::Json => format_scan_json(&devices, opts)?,
        OutputFormat::Text => format_scan_text(&devices, opts),
    };
    write_output(output, &content)?;

    if devices.is_empty() && !all && !quiet && format == OutputFormat::Text {
        eprintln!(
            "{}",
            style::format_info(
                "Devices that do not advertise the EMS service are hidden. Use --all to list them.",
                opts.no_color
            )
        );
    }

    Ok(())
}
