use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};

const DEFAULT_HTTP_ADDR: &str = "127.0.0.1:9200";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub fleet: FleetSettings,
    #[serde(default)]
    pub client: ClientConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    pub http_addr: String,
    pub log_level: String,
    /// JSON inventory file backing the node repository.
    pub inventory_file: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        let inventory = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("fleet")
            .join("inventory.json");
        Self {
            http_addr: DEFAULT_HTTP_ADDR.to_string(),
            log_level: "info".to_string(),
            inventory_file: inventory.to_string_lossy().to_string(),
        }
    }
}

/// Knobs consumed by the domain layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetSettings {
    /// Platform assigned by the node edit path when none is submitted.
    pub default_platform: String,
    /// Group name for nodes with neither a manual nor a computed group.
    pub unknown_group_label: String,
}

impl Default for FleetSettings {
    fn default() -> Self {
        Self {
            default_platform: "suse-12.3".to_string(),
            unknown_group_label: "unknown".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub url: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: format!("http://{DEFAULT_HTTP_ADDR}"),
        }
    }
}

impl Config {
    pub fn path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("could not determine config directory")?;
        Ok(config_dir.join("fleet").join("config.yaml"))
    }

    /// Defaults, then the YAML file, then `FLEET_*` environment variables
    /// (`FLEET_DAEMON__HTTP_ADDR` → `daemon.http_addr`).
    pub fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path))
            .merge(Env::prefixed("FLEET_").split("__"))
    }
}

/// Load configuration from `path`, or the default location.
pub fn load(path: Option<&str>) -> Result<Config> {
    let path = match path {
        Some(p) => PathBuf::from(p),
        None => Config::path()?,
    };
    Config::figment(&path)
        .extract()
        .with_context(|| format!("loading config from {}", path.display()))
}
