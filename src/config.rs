//! Process configuration.
//!
//! Looked up at `--config`, then `./config/config.yaml`, then
//! `<config dir>/chrome-debug-bridge/config.yaml`. A missing file means defaults.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use cdp_adapter::CdpConfig;
use chrome_debug_adapter::AdapterConfig;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub log_level: String,
    /// Log destination. Stdout carries the protocol, so logs go to stderr when unset.
    pub log_file: Option<PathBuf>,
    pub connect_timeout_ms: u64,
    pub discovery_timeout_ms: u64,
    pub set_breakpoints_timeout_ms: u64,
    pub pause_overlay_message: Option<String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        let adapter = AdapterConfig::default();
        Self {
            log_level: "info".to_string(),
            log_file: None,
            connect_timeout_ms: adapter.cdp.connect_timeout_ms,
            discovery_timeout_ms: adapter.cdp.discovery_timeout_ms,
            set_breakpoints_timeout_ms: adapter.set_breakpoints_timeout_ms,
            pause_overlay_message: adapter.pause_overlay_message,
        }
    }
}

impl BridgeConfig {
    pub fn adapter_config(&self) -> AdapterConfig {
        AdapterConfig {
            cdp: CdpConfig {
                connect_timeout_ms: self.connect_timeout_ms,
                discovery_timeout_ms: self.discovery_timeout_ms,
            },
            set_breakpoints_timeout_ms: self.set_breakpoints_timeout_ms,
            pause_overlay_message: self.pause_overlay_message.clone(),
            ..AdapterConfig::default()
        }
    }
}

pub struct LoadedConfig {
    pub config: BridgeConfig,
    pub path: PathBuf,
}

pub fn default_config_path() -> Result<PathBuf> {
    let local = PathBuf::from("config/config.yaml");
    if local.exists() {
        return Ok(local);
    }
    let mut path = dirs::config_dir().context("Failed to get config directory")?;
    path.push("chrome-debug-bridge");
    path.push("config.yaml");
    Ok(path)
}

pub async fn load_config(config_path: Option<&Path>) -> Result<LoadedConfig> {
    let path = match config_path {
        Some(path) => path.to_path_buf(),
        None => default_config_path()?,
    };

    if !path.exists() {
        // logging is not installed yet; the caller reports this once it is
        return Ok(LoadedConfig {
            config: BridgeConfig::default(),
            path,
        });
    }

    let content = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: BridgeConfig = serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    Ok(LoadedConfig { config, path })
}

impl LoadedConfig {
    pub fn report(&self) {
        if self.path.exists() {
            info!(target: "dap-server", path = %self.path.display(), "Loaded configuration");
        } else {
            warn!(target: "dap-server", path = %self.path.display(), "Config file not found, using defaults");
        }
    }
}
