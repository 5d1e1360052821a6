//! Visual styling utilities for the CLI.
//!
//! Spinners for long-running BLE operations, signal bars and status
//! messages. Everything that colors output takes a `no_color` flag.

use std::time::Duration;

use ems_core::SignalQuality;
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;

// ============================================================================
// Spinners
// ============================================================================

/// Standard spinner tick characters (Braille dots animation)
const SPINNER_TICK_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

/// Standard spinner tick interval
const SPINNER_TICK_MS: u64 = 80;

fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars(SPINNER_TICK_CHARS)
}

fn spinner(message: String) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(spinner_style());
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(SPINNER_TICK_MS));
    pb
}

/// Create a spinner for discovery scans.
pub fn scanning_spinner(timeout_secs: u64) -> ProgressBar {
    spinner(format!("Scanning for EMS devices... ({}s)", timeout_secs))
}

/// Create a spinner for connecting to a device.
pub fn connecting_spinner(device: &str) -> ProgressBar {
    spinner(format!("Connecting to {}...", device))
}

// ============================================================================
// Signal strength
// ============================================================================

/// Four-segment signal bar for an RSSI value, e.g. `▂▄▆_ -62`.
pub fn format_signal_bar(rssi: Option<i16>, no_color: bool) -> String {
    let Some(rssi) = rssi else {
        return "N/A".to_string();
    };

    let quality = SignalQuality::from_rssi(rssi);
    let bar = signal_glyphs(quality);
    let text = format!("{} {:>4}", bar, rssi);
    if no_color {
        return text;
    }
    match quality {
        SignalQuality::Excellent | SignalQuality::Good => text.green().to_string(),
        SignalQuality::Fair => text.yellow().to_string(),
        SignalQuality::Poor => text.red().to_string(),
    }
}

fn signal_glyphs(quality: SignalQuality) -> String {
    const GLYPHS: [char; 4] = ['▂', '▄', '▆', '█'];
    let filled = usize::from(quality.bars()).min(GLYPHS.len());
    GLYPHS
        .iter()
        .enumerate()
        .map(|(i, g)| if i < filled { *g } else { '_' })
        .collect()
}

/// Quality label, colored by bucket.
pub fn format_quality(quality: SignalQuality, no_color: bool) -> String {
    if no_color {
        return quality.to_string();
    }
    match quality {
        SignalQuality::Excellent | SignalQuality::Good => quality.green().to_string(),
        SignalQuality::Fair => quality.yellow().to_string(),
        SignalQuality::Poor => quality.red().to_string(),
    }
}

// ============================================================================
// Status messages
// ============================================================================

/// Format a success message.
pub fn format_success(message: &str, no_color: bool) -> String {
    if no_color {
        format!("[OK] {}", message)
    } else {
        format!("{} {}", "[OK]".green(), message)
    }
}

/// Format an informational message.
pub fn format_info(message: &str, no_color: bool) -> String {
    if no_color {
        format!("[--] {}", message)
    } else {
        format!("{} {}", "[--]".cyan(), message)
    }
}

/// Format a warning message.
pub fn format_warning(message: &str, no_color: bool) -> String {
    if no_color {
        format!("[!!] {}", message)
    } else {
        format!("{} {}", "[!!]".yellow(), message)
    }
}
