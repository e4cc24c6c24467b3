use async_trait::async_trait;
use bollard::{
    errors::Error as BollardError,
    models::ContainerInspectResponse,
    query_parameters::{
        CreateContainerOptionsBuilder, InspectContainerOptions, RemoveContainerOptionsBuilder,
        RestartContainerOptionsBuilder, StartContainerOptions, StopContainerOptionsBuilder,
    },
    Docker, API_DEFAULT_VERSION,
};
use thiserror::Error;
use tracing::debug;

use crate::containers::runtime_config::{ContainerSpec, GAME_PORT};

const DOCKER_TIMEOUT_SECS: u64 = 120;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("No such container: {0}")]
    NotFound(String),
    #[error("Failed to connect to engine: {0}")]
    Connect(String),
    #[error("{0}")]
    Api(String),
}

/// Live view of one container as reported by the engine.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainerDetails {
    pub running: bool,
    pub paused: bool,
    pub restarting: bool,
    /// Host ports published for the game port.
    pub ports: Vec<String>,
    /// Full inspect document, passed through to API callers.
    pub raw: serde_json::Value,
}

/// The operations the registry needs from a container engine.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Creates the container and returns its engine id.
    async fn create_container(&self, name: &str, spec: ContainerSpec) -> Result<String, EngineError>;

    async fn inspect_container(&self, name: &str) -> Result<ContainerDetails, EngineError>;

    async fn start_container(&self, name: &str) -> Result<(), EngineError>;

    /// Stops the container, killing it after `grace_secs`.
    async fn stop_container(&self, name: &str, grace_secs: i32) -> Result<(), EngineError>;

    async fn restart_container(&self, name: &str, grace_secs: i32) -> Result<(), EngineError>;

    async fn remove_container(&self, name: &str) -> Result<(), EngineError>;
}

/// [`ContainerEngine`] backed by the Docker Engine API.
pub struct DockerEngine {
    docker: Docker,
}

impl DockerEngine {
    /// Connects to `host` (`unix://...` or `tcp://...`), or to the local
    /// defaults (which honour `DOCKER_HOST`) when no host is given.
    pub fn connect(host: Option<&str>) -> Result<Self, EngineError> {
        let docker = match host {
            None => Docker::connect_with_local_defaults(),
            Some(h) if h.starts_with("unix://") => {
                Docker::connect_with_socket(h, DOCKER_TIMEOUT_SECS, API_DEFAULT_VERSION)
            }
            Some(h) => Docker::connect_with_http(h, DOCKER_TIMEOUT_SECS, API_DEFAULT_VERSION),
        }
        .map_err(|e| EngineError::Connect(e.to_string()))?;
        Ok(Self { docker })
    }
}

fn map_error(name: &str, error: BollardError) -> EngineError {
    match error {
        BollardError::DockerResponseServerError { status_code: 404, .. } => {
            EngineError::NotFound(name.to_string())
        }
        other => EngineError::Api(other.to_string()),
    }
}

fn details_from_inspect(inspect: ContainerInspectResponse) -> ContainerDetails {
    let (running, paused, restarting) = inspect
        .state
        .as_ref()
        .map(|s| {
            (
                s.running.unwrap_or(false),
                s.paused.unwrap_or(false),
                s.restarting.unwrap_or(false),
            )
        })
        .unwrap_or_default();

    let ports = inspect
        .network_settings
        .as_ref()
        .and_then(|n| n.ports.as_ref())
        .and_then(|p| p.get(GAME_PORT))
        .and_then(|b| b.as_ref())
        .map(|bindings| {
            bindings
                .iter()
                .filter_map(|b| b.host_port.clone())
                .collect()
        })
        .unwrap_or_default();

    let raw = serde_json::to_value(&inspect).unwrap_or(serde_json::Value::Null);

    ContainerDetails {
        running,
        paused,
        restarting,
        ports,
        raw,
    }
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn create_container(&self, name: &str, spec: ContainerSpec) -> Result<String, EngineError> {
        let options = CreateContainerOptionsBuilder::new().name(name).build();
        let response = self
            .docker
            .create_container(Some(options), spec.into_create_body())
            .await
            .map_err(|e| map_error(name, e))?;
        for warning in &response.warnings {
            debug!(container = %name, warning = %warning, "Engine warning on create.");
        }
        Ok(response.id)
    }

    async fn inspect_container(&self, name: &str) -> Result<ContainerDetails, EngineError> {
        let inspect = self
            .docker
            .inspect_container(name, None::<InspectContainerOptions>)
            .await
            .map_err(|e| map_error(name, e))?;
        Ok(details_from_inspect(inspect))
    }

    async fn start_container(&self, name: &str) -> Result<(), EngineError> {
        self.docker
            .start_container(name, None::<StartContainerOptions>)
            .await
            .map_err(|e| map_error(name, e))
    }

    async fn stop_container(&self, name: &str, grace_secs: i32) -> Result<(), EngineError> {
        let options = StopContainerOptionsBuilder::new().t(grace_secs).build();
        self.docker
            .stop_container(name, Some(options))
            .await
            .map_err(|e| map_error(name, e))
    }

    async fn restart_container(&self, name: &str, grace_secs: i32) -> Result<(), EngineError> {
        let options = RestartContainerOptionsBuilder::new().t(grace_secs).build();
        self.docker
            .restart_container(name, Some(options))
            .await
            .map_err(|e| map_error(name, e))
    }

    async fn remove_container(&self, name: &str) -> Result<(), EngineError> {
        let options = RemoveContainerOptionsBuilder::new().build();
        self.docker
            .remove_container(name, Some(options))
            .await
            .map_err(|e| map_error(name, e))
    }
}
