//! Forget command implementation.

use std::path::Path;

use anyhow::Result;
use ems_core::DeviceStore;

use crate::config::ConfigStore;
use crate::format::FormatOptions;
use crate::style;

pub fn cmd_forget(config_path: &Path, opts: &FormatOptions) -> Result<()> {
    let store = ConfigStore::new(config_path);

    let Some(device) = store.load()? else {
        println!(
            "{}",
            style::format_info("No device is paired.", opts.no_color)
        );
        return Ok(());
    };

    store.clear()?;
    println!(
        "{}",
        style::format_success(&format!("Forgot {}", device), opts.no_color)
    );
    Ok(())
}
