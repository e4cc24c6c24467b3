use serde::Deserialize;
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;

/// Process settings. Not to be confused with the persisted container
/// document handled by `containers::store`.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default = "default_config_path")]
    pub config_path: String,

    #[serde(default = "default_workspace_dir")]
    pub workspace_dir: String,

    #[serde(default = "default_assets_dir")]
    pub assets_dir: String,

    #[serde(default = "default_image")]
    pub image: String,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    /// Engine endpoint; the local defaults (and `DOCKER_HOST`) apply when unset.
    #[serde(default)]
    pub docker_host: Option<String>,
}

// Partial config for layering
#[derive(Deserialize, Default, Debug)]
struct PartialServerConfig {
    port: Option<u16>,
    bind_address: Option<String>,
    config_path: Option<String>,
    workspace_dir: Option<String>,
    assets_dir: Option<String>,
    image: Option<String>,
    log_dir: Option<String>,
    docker_host: Option<String>,
}

fn default_port() -> u16 {
    8080
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_config_path() -> String {
    "./config.json".to_string()
}

fn default_workspace_dir() -> String {
    "workspace".to_string()
}

fn default_assets_dir() -> String {
    "assets".to_string()
}

fn default_image() -> String {
    "zak1ck/minecraft:java8".to_string()
}

fn default_log_dir() -> String {
    "logs".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        merge(PartialServerConfig::default(), PartialServerConfig::default())
    }
}

fn merge(env_config: PartialServerConfig, file_config: PartialServerConfig) -> ServerConfig {
    ServerConfig {
        port: env_config.port.or(file_config.port).unwrap_or_else(default_port),
        bind_address: env_config
            .bind_address
            .or(file_config.bind_address)
            .unwrap_or_else(default_bind_address),
        config_path: env_config
            .config_path
            .or(file_config.config_path)
            .unwrap_or_else(default_config_path),
        workspace_dir: env_config
            .workspace_dir
            .or(file_config.workspace_dir)
            .unwrap_or_else(default_workspace_dir),
        assets_dir: env_config
            .assets_dir
            .or(file_config.assets_dir)
            .unwrap_or_else(default_assets_dir),
        image: env_config.image.or(file_config.image).unwrap_or_else(default_image),
        log_dir: env_config
            .log_dir
            .or(file_config.log_dir)
            .unwrap_or_else(default_log_dir),
        docker_host: env_config.docker_host.or(file_config.docker_host),
    }
}

fn parse_file(path: &Path) -> Result<PartialServerConfig, String> {
    if !path.exists() {
        return Ok(PartialServerConfig::default());
    }
    let contents = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config file at {path:?}: {e}"))?;
    toml::from_str(&contents)
        .map_err(|e| format!("Failed to parse TOML from config file at {path:?}: {e}"))
}

// Plain `PORT`, as set by most hosting environments.
fn port_from_env(value: Option<String>) -> Result<Option<u16>, String> {
    value
        .map(|v| v.parse().map_err(|e| format!("Invalid PORT '{v}': {e}")))
        .transpose()
}

impl ServerConfig {
    /// Loads settings from an optional TOML file, then lets `CRAFTY_*`
    /// environment variables (including those from `.env`) override them.
    pub fn load(config_path: Option<&str>) -> Result<Self, String> {
        dotenv::dotenv().ok();

        // 1. Load from file (optional)
        let file_config = match config_path {
            Some(path_str) => parse_file(Path::new(path_str))?,
            None => PartialServerConfig::default(),
        };

        // 2. Load from environment variables
        let mut env_config: PartialServerConfig = envy::prefixed("CRAFTY_")
            .from_env::<PartialServerConfig>()
            .map_err(|e| format!("Failed to load config from environment: {e}"))?;
        if env_config.port.is_none() {
            env_config.port = port_from_env(std::env::var("PORT").ok())?;
        }

        // 3. Merge: environment overrides file
        Ok(merge(env_config, file_config))
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, String> {
        let ip: IpAddr = self
            .bind_address
            .parse()
            .map_err(|e| format!("Invalid bind address '{}': {e}", self.bind_address))?;
        Ok(SocketAddr::new(ip, self.port))
    }
}
