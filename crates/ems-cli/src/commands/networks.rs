//! Networks command implementation.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use ems_core::{DeviceAddress, EventReceiver};
use time::OffsetDateTime;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use crate::cli::OutputFormat;
use crate::config::{Config, DeviceSource, resolve_device, resolve_timeout};
use crate::format::{FormatOptions, format_event, format_networks_json, format_networks_text};
use crate::style;
use crate::util::{describe_error, require_device, spinner_if, write_output};

/// How long to keep printing trailing events after the sessions are closed.
const EVENT_DRAIN: Duration = Duration::from_millis(500);

#[allow(clippy::too_many_arguments)]
pub async fn cmd_networks(
    device: Option<String>,
    timeout: Option<u64>,
    format: OutputFormat,
    events: bool,
    output: Option<&PathBuf>,
    quiet: bool,
    opts: &FormatOptions,
    config: &Config,
) -> Result<()> {
    let resolved = resolve_device(device.as_deref(), config);
    let source = resolved.as_ref().map(|(_, source)| *source);
    let device = require_device(resolved.map(|(device, _)| device))?;
    let address: DeviceAddress = device
        .parse()
        .map_err(|e| describe_error(ems_core::Error::InvalidAddress(e)))?;

    // Only show the stored name for the paired device
    let name = match source {
        Some(DeviceSource::Paired) => config.device_name.clone(),
        _ => None,
    };

    let registry = super::ble_registry(config)?;
    let printer = events.then(|| spawn_event_printer(registry.subscribe()));

    let timeout = resolve_timeout(timeout, config);
    let spinner = spinner_if(!quiet && !events && format == OutputFormat::Text, || {
        style::connecting_spinner(address.as_str())
    });

    let result = tokio::select! {
        res = tokio::time::timeout(timeout, registry.read_networks(address.as_str())) => Some(res),
        _ = tokio::signal::ctrl_c() => None,
    };

    if let Some(sp) = spinner {
        sp.finish_and_clear();
    }
    registry.shutdown().await;
    drop(registry);

    if let Some(printer) = printer {
        // The task ends once every event sender is gone
        if tokio::time::timeout(EVENT_DRAIN, printer).await.is_err() {
            tracing::debug!("event printer still running after shutdown");
        }
    }

    let scan = match result {
        Some(Ok(Ok(scan))) => scan,
        Some(Ok(Err(err))) => {
            return Err(describe_error(err))
                .with_context(|| format!("Failed to read networks from {}", address));
        }
        Some(Err(_)) => bail!(
            "Timed out after {}s waiting for {}",
            timeout.as_secs(),
            address
        ),
        None => bail!("Interrupted"),
    };

    let content = match format {
        OutputFormat::Json => format_networks_json(
            &address,
            name.as_deref(),
            &scan,
            OffsetDateTime::now_utc(),
            opts,
        )?,
        OutputFormat::Text => format_networks_text(&address, name.as_deref(), &scan, opts),
    };
    write_output(output, &content)
}

fn spawn_event_printer(mut rx: EventReceiver) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => eprintln!("{}", format_event(&event)),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event printer fell behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}
