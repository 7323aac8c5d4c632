use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Stream host used when no configuration overrides it
pub const DEFAULT_HOST: &str = "hooks-testnet-v3-debugstream.xrpl-labs.com";

/// Config file looked for in the working directory when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "hookscope.toml";

/// Endpoint configuration for the debug stream and its history service
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StreamConfig {
    /// Host serving both the live stream and the recent-log endpoint
    pub host: String,

    /// Optional proxy that forwards `{ "url": ... }` POST bodies upstream,
    /// for deployments where the history endpoint sits behind one
    pub proxy: Option<String>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            proxy: None,
        }
    }
}

impl StreamConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Load from an explicit path, or fall back to `hookscope.toml` in the
    /// working directory and then to defaults when that file is absent
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::load(default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// WebSocket endpoint the per-account stream path is appended to
    pub fn stream_endpoint(&self) -> String {
        format!("wss://{}", self.host)
    }

    /// Base of the recent-log history endpoint
    pub fn recent_endpoint(&self) -> String {
        format!("https://{}/recent", self.host)
    }
}
