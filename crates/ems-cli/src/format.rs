//! Output formatting for text and JSON.

use anyhow::Result;
use ems_core::{DeviceAddress, DeviceEvent, DiscoveredDevice, NetworkRecord, ScanResult};
use owo_colors::OwoColorize;
use serde::Serialize;
use tabled::settings::Style;
use tabled::{Table, Tabled};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::style;

/// Formatting options for output.
#[derive(Debug, Clone, Copy, Default)]
pub struct FormatOptions {
    /// Disable colored output.
    pub no_color: bool,
    /// Use compact JSON output (no pretty-printing).
    pub compact: bool,
}

impl FormatOptions {
    pub fn new(no_color: bool, compact: bool) -> Self {
        Self { no_color, compact }
    }

    /// Serialize value to JSON string, respecting compact option.
    pub fn as_json<T: Serialize>(&self, value: &T) -> Result<String> {
        let json = if self.compact {
            serde_json::to_string(value)?
        } else {
            serde_json::to_string_pretty(value)?
        };
        Ok(json + "\n")
    }

    fn highlight(&self, text: &str) -> String {
        if self.no_color {
            text.to_string()
        } else {
            text.cyan().to_string()
        }
    }
}

// ============================================================================
// Discovery scan
// ============================================================================

#[must_use]
pub fn format_scan_text(devices: &[DiscoveredDevice], opts: &FormatOptions) -> String {
    if devices.is_empty() {
        return "No EMS devices found.\n".to_string();
    }

    #[derive(Tabled)]
    struct DeviceRow {
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Address")]
        address: String,
        #[tabled(rename = "Signal")]
        signal: String,
        #[tabled(rename = "EMS")]
        service: &'static str,
    }

    let rows: Vec<DeviceRow> = devices
        .iter()
        .map(|d| DeviceRow {
            name: opts.highlight(d.name.as_deref().unwrap_or("Unknown")),
            address: d.address.to_string(),
            signal: style::format_signal_bar(d.rssi, opts.no_color),
            service: if d.advertises_service { "yes" } else { "?" },
        })
        .collect();

    let mut table = Table::new(rows);
    table.with(Style::rounded());
    format!("Found {} device(s)\n\n{}\n", devices.len(), table)
}

pub fn format_scan_json(devices: &[DiscoveredDevice], opts: &FormatOptions) -> Result<String> {
    #[derive(Serialize)]
    struct ScanJson<'a> {
        count: usize,
        devices: &'a [DiscoveredDevice],
    }

    opts.as_json(&ScanJson {
        count: devices.len(),
        devices,
    })
}

// ============================================================================
// Networks
// ============================================================================

fn display_ssid(network: &NetworkRecord) -> &str {
    if network.is_hidden() {
        "(hidden)"
    } else {
        network.ssid()
    }
}

#[must_use]
pub fn format_networks_text(
    device: &DeviceAddress,
    name: Option<&str>,
    scan: &ScanResult,
    opts: &FormatOptions,
) -> String {
    let label = match name {
        Some(name) => format!("{} ({})", opts.highlight(name), device),
        None => opts.highlight(device.as_str()),
    };

    if scan.is_empty() {
        return format!("{} sees no WiFi networks.\n", label);
    }

    #[derive(Tabled)]
    struct NetworkRow {
        #[tabled(rename = "SSID")]
        ssid: String,
        #[tabled(rename = "Signal")]
        signal: String,
        #[tabled(rename = "Quality")]
        quality: String,
    }

    let mut networks: Vec<&NetworkRecord> = scan.iter().collect();
    networks.sort_by(|a, b| b.rssi().cmp(&a.rssi()));

    let rows: Vec<NetworkRow> = networks
        .into_iter()
        .map(|n| NetworkRow {
            ssid: display_ssid(n).to_string(),
            signal: style::format_signal_bar(Some(n.rssi()), opts.no_color),
            quality: style::format_quality(n.signal_quality(), opts.no_color),
        })
        .collect();

    let mut table = Table::new(rows);
    table.with(Style::rounded());
    format!(
        "{} sees {} network(s)\n\n{}\n",
        label,
        scan.len(),
        table
    )
}

pub fn format_networks_json(
    device: &DeviceAddress,
    name: Option<&str>,
    scan: &ScanResult,
    received_at: OffsetDateTime,
    opts: &FormatOptions,
) -> Result<String> {
    #[derive(Serialize)]
    struct NetworkJson<'a> {
        ssid: &'a str,
        rssi: i16,
        hidden: bool,
        quality: ems_core::SignalQuality,
    }

    #[derive(Serialize)]
    struct NetworksJson<'a> {
        device: &'a DeviceAddress,
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<&'a str>,
        received_at: String,
        count: usize,
        networks: Vec<NetworkJson<'a>>,
    }

    let result = NetworksJson {
        device,
        name,
        received_at: received_at.format(&Rfc3339)?,
        count: scan.len(),
        networks: scan
            .iter()
            .map(|n| NetworkJson {
                ssid: n.ssid(),
                rssi: n.rssi(),
                hidden: n.is_hidden(),
                quality: n.signal_quality(),
            })
            .collect(),
    };

    opts.as_json(&result)
}

// ============================================================================
// Events
// ============================================================================

/// One-line description of a session event, for `--events`.
#[must_use]
pub fn format_event(event: &DeviceEvent) -> String {
    let detail = match event {
        DeviceEvent::Discovered { device } => device.name.as_deref().unwrap_or("unnamed").to_string(),
        DeviceEvent::Connected { attempts, .. } => format!("after {} attempt(s)", attempts),
        DeviceEvent::ServicesReady { .. } => "WiFi scan characteristic found".to_string(),
        DeviceEvent::Disconnected { reason, .. } => reason.to_string(),
        DeviceEvent::ScanUpdated { result, .. } => format!("{} network(s)", result.len()),
        DeviceEvent::Failed { error, .. } => error.clone(),
        _ => String::new(),
    };

    let session = event
        .session_id()
        .map(|id| format!(" #{}", id))
        .unwrap_or_default();
    format!("[{}{}] {} {}", event.name(), session, event.address(), detail)
        .trim_end()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ems_core::DisconnectReason;

    fn plain() -> FormatOptions {
        FormatOptions::new(true, false)
    }

    fn addr() -> DeviceAddress {
        "AA:BB:CC:DD:EE:FF".parse().unwrap()
    }

    fn sample() -> ScanResult {
        ScanResult::new(vec![
            NetworkRecord::new("Office", -70),
            NetworkRecord::new("Home", -45),
            NetworkRecord::new("", -88),
        ])
    }

    #[test]
    fn test_networks_text_sorted_by_signal() {
        let text = format_networks_text(&addr(), Some("EMS Hub"), &sample(), &plain());
        assert!(text.starts_with("EMS Hub (AA:BB:CC:DD:EE:FF) sees 3 network(s)"));

        let home = text.find("Home").unwrap();
        let office = text.find("Office").unwrap();
        let hidden = text.find("(hidden)").unwrap();
        assert!(home < office && office < hidden);
        assert!(text.contains("excellent"));
    }

    #[test]
    fn test_networks_text_empty() {
        let text = format_networks_text(&addr(), None, &ScanResult::default(), &plain());
        assert_eq!(text, "AA:BB:CC:DD:EE:FF sees no WiFi networks.\n");
    }

    #[test]
    fn test_networks_json() {
        let json = format_networks_json(
            &addr(),
            None,
            &sample(),
            OffsetDateTime::UNIX_EPOCH,
            &FormatOptions::new(true, true),
        )
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["device"], "AA:BB:CC:DD:EE:FF");
        assert_eq!(value["count"], 3);
        assert_eq!(value["received_at"], "1970-01-01T00:00:00Z");
        assert!(value.get("name").is_none());
        assert_eq!(value["networks"][1]["ssid"], "Home");
        assert_eq!(value["networks"][1]["quality"], "excellent");
        assert_eq!(value["networks"][2]["hidden"], true);
        assert!(json.ends_with("}\n"));
        assert_eq!(json.lines().count(), 1);
    }

    #[test]
    fn test_scan_text_and_json() {
        let devices = vec![DiscoveredDevice {
            name: Some("EMS Hub".to_string()),
            address: addr(),
            rssi: Some(-52),
            advertises_service: true,
        }];

        let text = format_scan_text(&devices, &plain());
        assert!(text.starts_with("Found 1 device(s)"));
        assert!(text.contains("EMS Hub"));
        assert!(text.contains("AA:BB:CC:DD:EE:FF"));

        let json = format_scan_json(&devices, &plain()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["count"], 1);
        assert_eq!(value["devices"][0]["advertises_service"], true);

        assert_eq!(format_scan_text(&[], &plain()), "No EMS devices found.\n");
    }

    #[test]
    fn test_format_event() {
        let event = DeviceEvent::Disconnected {
            address: addr(),
            session_id: 4,
            reason: DisconnectReason::UserRequested,
        };
        assert_eq!(
            format_event(&event),
            "[disconnected #4] AA:BB:CC:DD:EE:FF user requested"
        );

        let event = DeviceEvent::ServicesReady {
            address: addr(),
            session_id: 4,
        };
        assert_eq!(
            format_event(&event),
            "[services_ready #4] AA:BB:CC:DD:EE:FF WiFi scan characteristic found"
        );
    }
}
