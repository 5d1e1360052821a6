//! Command-line interface for the EMS companion device.
//!
//! The companion device reports the WiFi networks it can see over BLE. This
//! binary finds devices, remembers one, and prints what it sees.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `scan` | Scan for nearby named devices |
//! | `pair` | Connect to a device and remember its address |
//! | `networks` | Show the WiFi networks a device can see |
//! | `forget` | Forget the paired device |
//! | `completions` | Generate shell completions |
//!
//! # Configuration
//!
//! Settings live in `~/.config/ems/config.toml` (or platform equivalent):
//!
//! - `device`: Paired device address, written by `ems pair`
//! - `timeout`: Overall timeout for device commands, in seconds
//! - `[connection]`: `max_attempts`, `attempt_timeout_secs`, `backoff_ms`
//!
//! # Environment Variables
//!
//! - `EMS_DEVICE`: Device address (overridden by `--device`)
//! - `EMS_CONFIG`: Config file path (overridden by `--config`)
//! - `NO_COLOR`: Disable colored output when set
//! - `RUST_LOG`: Log filter when neither `--verbose` nor `--quiet` is given

mod cli;
mod commands;
mod config;
mod format;
mod style;
mod util;

use std::io;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use commands::{cmd_forget, cmd_networks, cmd_pair, cmd_scan};
use config::Config;
use format::FormatOptions;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Handle completions command early (before tracing init)
    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(shell, &mut cmd, "ems", &mut io::stdout());
        return Ok(());
    }

    let filter = if cli.quiet {
        EnvFilter::new("warn")
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let config = Config::load_or_default(&config_path);
    tracing::debug!("Using config file {}", config_path.display());

    let opts = FormatOptions::new(cli.no_color, cli.compact);
    let output = cli.output.as_ref();

    match cli.command {
        Commands::Scan {
            timeout,
            all,
            format,
        } => cmd_scan(timeout, all, format, output, cli.quiet, &opts, &config).await,
        Commands::Pair { address, timeout } => {
            cmd_pair(address, timeout, cli.quiet, &opts, &config, &config_path).await
        }
        Commands::Networks {
            device,
            format,
            events,
        } => {
            cmd_networks(
                device.device,
                device.timeout,
                format,
                events,
                output,
                cli.quiet,
                &opts,
                &config,
            )
            .await
        }
        Commands::Forget => cmd_forget(&config_path, &opts),
        Commands::Completions { .. } => {
            // Already handled above
            unreachable!()
        }
    }
}
