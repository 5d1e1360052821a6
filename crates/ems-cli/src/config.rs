//! Configuration file management.
//!
//! The config file doubles as the device store: pairing writes the device
//! address into `device`, `forget` clears it.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use ems_core::{ConnectPolicy, DeviceStore};
use serde::{Deserialize, Serialize};

/// Default overall timeout for device commands, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Configuration file structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Paired device address
    #[serde(default)]
    pub device: Option<String>,

    /// Advertised name of the paired device (for display)
    #[serde(default)]
    pub device_name: Option<String>,

    /// Overall command timeout in seconds
    #[serde(default)]
    pub timeout: Option<u64>,

    /// Connection retry settings
    #[serde(default)]
    pub connection: ConnectionConfig,
}

/// `[connection]` table. Unset fields keep the library defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Total connect attempts, including the first
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,

    /// Timeout for each connect attempt, in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempt_timeout_secs: Option<u64>,

    /// Pause between connect attempts, in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff_ms: Option<u64>,
}

impl ConnectionConfig {
    /// Build the connect policy, starting from the library defaults.
    pub fn policy(&self) -> Result<ConnectPolicy> {
        let mut policy = ConnectPolicy::default();
        if let Some(attempts) = self.max_attempts {
            policy = policy.max_attempts(attempts);
        }
        if let Some(secs) = self.attempt_timeout_secs {
            policy = policy.attempt_timeout(Duration::from_secs(secs));
        }
        if let Some(ms) = self.backoff_ms {
            policy = policy.backoff(Duration::from_millis(ms));
        }
        policy
            .validate()
            .context("Invalid [connection] settings in config")?;
        Ok(policy)
    }
}

impl Config {
    /// Get the default config file path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ems")
            .join("config.toml")
    }

    /// Load config from `path`. A missing file yields the default config.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))
    }

    /// Load config, warning and falling back to defaults if it is unreadable.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load_from(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {:#}", e);
                Self::default()
            }
        }
    }

    /// Save config to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        Ok(())
    }
}

/// Where a resolved device address came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceSource {
    /// `--device` or `EMS_DEVICE`.
    Explicit,
    /// The paired device in the config file.
    Paired,
}

/// Resolve the target device: flag or env first, then the paired device.
pub fn resolve_device(device: Option<&str>, config: &Config) -> Option<(String, DeviceSource)> {
    device
        .filter(|d| !d.trim().is_empty())
        .map(|d| (d.to_string(), DeviceSource::Explicit))
        .or_else(|| {
            config
                .device
                .clone()
                .map(|d| (d, DeviceSource::Paired))
        })
}

/// Resolve timeout: explicit value, then config, then the default.
pub fn resolve_timeout(cmd_timeout: Option<u64>, config: &Config) -> Duration {
    Duration::from_secs(
        cmd_timeout
            .or(config.timeout)
            .unwrap_or(DEFAULT_TIMEOUT_SECS),
    )
}

/// [`DeviceStore`] backed by the `device` key of a config file.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn update(&self, apply: impl FnOnce(&mut Config)) -> ems_core::Result<()> {
        let mut config = Config::load_from(&self.path).map_err(store_error)?;
        apply(&mut config);
        config.save_to(&self.path).map_err(store_error)
    }
}

fn store_error(err: anyhow::Error) -> ems_core::Error {
    ems_core::Error::store(format!("{:#}", err))
}

impl DeviceStore for ConfigStore {
    fn load(&self) -> ems_core::Result<Option<String>> {
        Ok(Config::load_from(&self.path).map_err(store_error)?.device)
    }

    fn save(&self, address: &str) -> ems_core::Result<()> {
        self.update(|config| {
            if config.device.as_deref() != Some(address) {
                config.device_name = None;
            }
            config.device = Some(address.to_string());
        })
    }

    fn clear(&self) -> ems_core::Result<()> {
        self.update(|config| {
            config.device = None;
            config.device_name = None;
        })
    }
}
