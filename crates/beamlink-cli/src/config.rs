//! CLI configuration file handling.
//!
//! A TOML file supplies defaults; command-line flags override it. A missing
//! file is not an error, it just means defaults.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use beamlink_discovery::SERVICE_TYPE;

/// Persistent CLI configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Device name shown to peers.
    pub device_name: String,
    /// Stable peer id. Empty generates one per run.
    pub device_id: String,
    /// Monitor name advertised over mDNS.
    pub monitor_name: String,
    /// DNS-SD service type.
    pub service_type: String,
    /// Transfer listen port (0 = ephemeral).
    pub listen_port: u16,
    /// Where received files land.
    pub download_dir: PathBuf,
    /// Where node state (preferred peer) lives.
    pub state_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let download_dir = dirs::download_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("beamlink");
        let state_dir = dirs::config_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("beamlink");
        Self {
            device_name: hostname_or_default(),
            device_id: String::new(),
            monitor_name: "Main Display".to_owned(),
            service_type: SERVICE_TYPE.to_owned(),
            listen_port: 0,
            download_dir,
            state_dir,
        }
    }
}

impl Config {
    /// Load from a TOML file, falling back to defaults when it is absent.
    ///
    /// # Errors
    ///
    /// Returns an error when the file exists but cannot be read or parsed.
    pub fn load(path: &str) -> Result<Self> {
        let path = expand_tilde(path);
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
    }

    /// Path of the persisted preferred-peer descriptor.
    #[must_use]
    pub fn preferred_peer_path(&self) -> PathBuf {
        self.state_dir.join("preferred-peer.json")
    }
}

/// Expand a leading `~/` against the home directory.
fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    Path::new(path).to_path_buf()
}

fn hostname_or_default() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "beamlink".to_owned())
}
