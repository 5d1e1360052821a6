//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Output format for commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Reusable device connection arguments
#[derive(Debug, Clone, Args)]
pub struct DeviceArgs {
    /// Device MAC address (AA:BB:CC:DD:EE:FF), or use EMS_DEVICE env var
    #[arg(short, long, env = "EMS_DEVICE")]
    pub device: Option<String>,

    /// Overall timeout in seconds (defaults to the config value, then 60)
    #[arg(short = 'T', long)]
    pub timeout: Option<u64>,
}

#[derive(Parser)]
#[command(name = "ems")]
#[command(author, version, about = "CLI for the EMS companion device", long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Use this config file instead of the default location
    #[arg(long, global = true, env = "EMS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Output compact JSON (no pretty-printing)
    #[arg(long, global = true)]
    pub compact: bool,

    /// Write output to file instead of stdout
    #[arg(short, long, global = true)]
    pub output: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan for nearby named devices
    Scan {
        /// Scan duration in seconds
        #[arg(short, long, default_value = "10")]
        timeout: u64,

        /// Also list devices that do not advertise the EMS service
        #[arg(short, long)]
        all: bool,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Pair with a device and remember it
    Pair {
        /// Device MAC address. Scans and prompts when omitted.
        address: Option<String>,

        /// Overall timeout in seconds
        #[arg(short = 'T', long)]
        timeout: Option<u64>,
    },

    /// Show the WiFi networks a device can see
    Networks {
        #[command(flatten)]
        device: DeviceArgs,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Print session events to stderr
        #[arg(long)]
        events: bool,
    },

    /// Forget the paired device
    Forget,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_networks_args() {
        let cli = Cli::try_parse_from([
            "ems",
            "networks",
            "--device",
            "AA:BB:CC:DD:EE:FF",
            "--format",
            "json",
            "-T",
            "20",
        ])
        .unwrap();

        match cli.command {
            Commands::Networks {
                device,
                format,
                events,
            } => {
                assert_eq!(device.device.as_deref(), Some("AA:BB:CC:DD:EE:FF"));
                assert_eq!(device.timeout, Some(20));
                assert_eq!(format, OutputFormat::Json);
                assert!(!events);
            }
            _ => panic!("expected networks"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["ems", "forget", "--quiet", "--config", "/tmp/ems.toml"])
            .unwrap();
        assert!(cli.quiet);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/ems.toml")));
        assert!(matches!(cli.command, Commands::Forget));
    }

    #[test]
    fn test_pair_address_is_optional() {
        let cli = Cli::try_parse_from(["ems", "pair"]).unwrap();
        assert!(matches!(cli.command, Commands::Pair { address: None, .. }));
    }

    #[test]
    fn test_scan_defaults() {
        let cli = Cli::try_parse_from(["ems", "scan"]).unwrap();
        match cli.command {
            Commands::Scan {
                timeout,
                all,
                format,
            } => {
                assert_eq!(timeout, 10);
                assert!(!all);
                assert_eq!(format, OutputFormat::Text);
            }
            _ => panic!("expected scan"),
        }
    }
}
