use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub switcher: SwitcherSettings,
    pub gateway: GatewaySettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwitcherSettings {
    /// Rows shown per page of the switcher overlay.
    pub page_size: usize,
    /// Open the overlay only after a short delay, so quick switches never
    /// flash it on screen.
    pub faster_switch: bool,
    pub open_delay_ms: u64,
}

impl Default for SwitcherSettings {
    fn default() -> Self {
        Self {
            page_size: 8,
            faster_switch: false,
            open_delay_ms: 150,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewaySettings {
    /// How long a transiently failing accessibility call keeps retrying
    /// before it is abandoned.
    pub query_timeout_ms: u64,
    pub retry_interval_ms: u64,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            query_timeout_ms: 5000,
            retry_interval_ms: 10,
        }
    }
}

impl SwitcherSettings {
    pub fn open_delay(&self) -> Duration { Duration::from_millis(self.open_delay_ms) }
}

impl GatewaySettings {
    pub fn query_timeout(&self) -> Duration { Duration::from_millis(self.query_timeout_ms) }

    pub fn retry_interval(&self) -> Duration { Duration::from_millis(self.retry_interval_ms) }
}

pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("carousel").join("config.toml"))
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Config> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing config at {}", path.display()))
    }

    /// Reads the default config location, falling back to defaults if the
    /// file is missing or malformed. A malformed file is logged, not fatal.
    pub fn load_or_default() -> Config {
        let Some(path) = config_path() else {
            return Config::default();
        };
        if !path.exists() {
            return Config::default();
        }
        match Config::load(&path) {
            Ok(config) => config,
            Err(err) => {
                warn!("falling back to default config: {err:#}");
                Config::default()
            }
        }
    }
}
