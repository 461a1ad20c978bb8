use relay_backends::{default_backends, BackendConfig};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use tracing::info;

/// Top-level `relay.toml`.
#[derive(Debug, Default, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    /// `None` when the file has no `[[backends]]` table at all.
    #[serde(default)]
    pub backends: Option<Vec<BackendConfig>>,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct GatewayConfig {
    /// Capacity of each session's client channel.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    #[serde(default = "default_cors_origin")]
    pub cors_allow_origin: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
            cors_allow_origin: default_cors_origin(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    3001
}
fn default_channel_capacity() -> usize {
    32
}
fn default_cors_origin() -> String {
    "*".to_string()
}

impl RelayConfig {
    /// Read the config at `path`. A missing file yields the built-in defaults.
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        match tokio::fs::read_to_string(path).await {
            Ok(raw) => Self::from_toml(&raw).map_err(|e| {
                anyhow::anyhow!("Failed to parse config file '{}': {e}", path.display())
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No config file found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "Failed to read config file '{}': {e}",
                path.display()
            )),
        }
    }

    pub fn from_toml(raw: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Let a `PORT` value override `[server] port`.
    pub fn apply_port_override(&mut self, port: Option<String>) -> anyhow::Result<()> {
        if let Some(raw) = port.filter(|p| !p.trim().is_empty()) {
            self.server.port = raw
                .trim()
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid PORT value '{raw}': {e}"))?;
        }
        Ok(())
    }

    /// The backend rotation: the configured list, or the defaults when none is given.
    ///
    /// An explicitly empty list and duplicate names are rejected.
    pub fn backends(&self) -> anyhow::Result<Vec<BackendConfig>> {
        let backends = match &self.backends {
            None => return Ok(default_backends()),
            Some(list) => list.clone(),
        };
        if backends.is_empty() {
            anyhow::bail!("At least one [[backends]] entry is required");
        }
        let mut seen = HashSet::new();
        for backend in &backends {
            if !seen.insert(backend.name.as_str()) {
                anyhow::bail!("Duplicate backend name '{}'", backend.name);
            }
        }
        Ok(backends)
    }
}
