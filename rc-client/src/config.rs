//! Client configuration
//!
//! Loaded from a TOML file; every field has a default so a partial (or
//! missing) file still yields a usable configuration. The core only reads
//! the configuration, it never writes it back.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Broadcasting endpoint and registration parameters
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Simulator host
    pub host: String,
    /// Broadcasting UDP port (as set in the simulator's broadcasting.json)
    pub port: u16,
    /// Name shown in the simulator for this client
    pub display_name: String,
    /// Password for a read-only connection
    pub connection_password: String,
    /// Password enabling commands (focus, camera, replay)
    pub command_password: String,
    /// Interval of realtime updates requested from the simulator
    pub update_interval_ms: i32,
    /// How long to wait for the registration result
    pub handshake_timeout_ms: u64,
    /// Default log filter when `RUST_LOG` is not set
    pub log_level: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9000,
            display_name: "Race Control".to_string(),
            connection_password: "asd".to_string(),
            command_password: String::new(),
            update_interval_ms: 250,
            handshake_timeout_ms: 2000,
            log_level: "info".to_string(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = Self::from_toml_str(&contents)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(config)
    }

    /// Load `path`, or the per-user default file if `path` is `None`.
    ///
    /// A missing default file falls back to [`ClientConfig::default`];
    /// a missing explicit file is an error.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::load(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    /// Parse and validate TOML
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: ClientConfig = toml::from_str(contents).context("Failed to parse TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// `<config dir>/race-control/client.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("race-control").join("client.toml"))
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            bail!("host must not be empty");
        }
        if self.port == 0 {
            bail!("port must not be 0");
        }
        if self.update_interval_ms <= 0 {
            bail!(
                "update_interval_ms must be positive, got {}",
                self.update_interval_ms
            );
        }
        Ok(())
    }

    /// `host:port` for address resolution
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Update interval as sent in the handshake, at least 1 ms
    pub fn update_interval(&self) -> u32 {
        u32::try_from(self.update_interval_ms.max(1)).unwrap_or(1)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}
