//! Turns a creation request into the engine's container and host configuration.

use bollard::models::{ContainerCreateBody, HostConfig, PortBinding};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// Port the game server listens on inside the container.
pub const GAME_PORT: &str = "25565/tcp";
/// Where the image expects its world and server files.
pub const DATA_DIR: &str = "/minecraft/data";
/// Label key carrying the game version.
pub const VERSION_LABEL: &str = "crafty";

/// A request to create one game-server container.
#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateRequest {
    pub name: String,
    #[serde(default)]
    pub version: String,
    pub port: String,
    #[serde(default)]
    pub difficulty: u8,
    #[serde(default)]
    pub seed: String,
    #[serde(rename = "forgeVersion", default)]
    pub forge_version: String,
}

/// Everything the engine needs to create the container.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerSpec {
    pub image: String,
    pub env: Vec<String>,
    pub labels: HashMap<String, String>,
    pub host_config: HostConfig,
}

impl ContainerSpec {
    pub fn into_create_body(self) -> ContainerCreateBody {
        ContainerCreateBody {
            image: Some(self.image),
            env: Some(self.env),
            labels: Some(self.labels),
            host_config: Some(self.host_config),
            ..ContainerCreateBody::default()
        }
    }
}

/// Builds the container spec for `request`, bind mounting `workspace_path`.
pub fn build(request: &CreateRequest, workspace_path: &Path, image: &str) -> ContainerSpec {
    let mut env = vec![format!("DIFFICULTY={}", request.difficulty)];
    if !request.version.is_empty() {
        env.push(format!("VERSION={}", request.version));
    }
    if !request.forge_version.is_empty() {
        env.push(format!("FORGE_VERSION={}", request.forge_version));
    }
    if !request.seed.is_empty() {
        env.push(format!("SEED={}", request.seed));
    }
    // The server refuses to start until the EULA is accepted.
    env.push("EULA=yes".to_string());

    let labels = HashMap::from([(VERSION_LABEL.to_string(), request.version.clone())]);

    let port_bindings = HashMap::from([(
        GAME_PORT.to_string(),
        Some(vec![PortBinding {
            host_ip: Some("0.0.0.0".to_string()),
            host_port: Some(request.port.clone()),
        }]),
    )]);

    let host_config = HostConfig {
        port_bindings: Some(port_bindings),
        binds: Some(vec![format!("{}:{DATA_DIR}", workspace_path.display())]),
        privileged: Some(false),
        publish_all_ports: Some(false),
        ..HostConfig::default()
    };

    ContainerSpec {
        image: image.to_string(),
        env,
        labels,
        host_config,
    }
}
