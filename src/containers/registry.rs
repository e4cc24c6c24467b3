use bollard::models::HostConfig;
use futures_util::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::containers::engine::{ContainerDetails, ContainerEngine, EngineError};
use crate::containers::runtime_config::{self, CreateRequest};
use crate::containers::store::{ConfigStore, ContainerRecord};
use crate::error::{ManagerError, Result};
use crate::workspace::manager::{validate_container_name, WorkspaceManager};

/// Seconds the engine waits for the server to exit on stop before killing it.
pub const STOP_GRACE_SECS: i32 = 10;
/// Seconds the engine waits on restart before killing the old process.
pub const RESTART_GRACE_SECS: i32 = 5;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    Running,
    Paused,
    Restarting,
    Stopped,
}

impl ContainerState {
    /// Classifies live flags, checked in the order running, paused, restarting.
    pub fn classify(details: &ContainerDetails) -> Self {
        if details.running {
            ContainerState::Running
        } else if details.paused {
            ContainerState::Paused
        } else if details.restarting {
            ContainerState::Restarting
        } else {
            ContainerState::Stopped
        }
    }
}

/// A declared container joined with its live state.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContainerView {
    pub name: String,
    pub state: ContainerState,
    pub version: String,
    pub forge_version: String,
    pub ports: Vec<String>,
    pub host_config: String,
}

#[derive(Debug, Default)]
pub struct ContainerListing {
    pub containers: Vec<ContainerView>,
    /// Declared containers whose live inspection failed.
    pub failures: Vec<(String, ManagerError)>,
}

/// Drives container lifecycle against the engine and keeps the declarations
/// in the [`ConfigStore`] in step with create and remove.
pub struct ContainerRegistry {
    store: Arc<ConfigStore>,
    engine: Arc<dyn ContainerEngine>,
    workspace: Arc<WorkspaceManager>,
    image: String,
}

fn validate_port(port: &str) -> Result<()> {
    match port.parse::<u16>() {
        Ok(p) if p > 0 => Ok(()),
        _ => Err(ManagerError::Validation(format!("invalid port '{port}'"))),
    }
}

impl ContainerRegistry {
    pub fn new(
        store: Arc<ConfigStore>,
        engine: Arc<dyn ContainerEngine>,
        workspace: Arc<WorkspaceManager>,
        image: impl Into<String>,
    ) -> Self {
        Self {
            store,
            engine,
            workspace,
            image: image.into(),
        }
    }

    /// Supported game versions, in configured order.
    pub async fn versions(&self) -> Vec<String> {
        self.store.snapshot().await.versions
    }

    /// Lists every declared container with its live state. Containers the
    /// engine cannot inspect are reported in `failures` instead.
    pub async fn list(&self) -> ContainerListing {
        let config = self.store.snapshot().await;
        let inspections = join_all(
            config
                .containers
                .keys()
                .map(|name| self.engine.inspect_container(name)),
        )
        .await;

        let mut listing = ContainerListing::default();
        for ((name, record), inspection) in config.containers.into_iter().zip(inspections) {
            match inspection {
                Ok(details) => listing.containers.push(ContainerView {
                    state: ContainerState::classify(&details),
                    ports: details.ports,
                    version: record.version,
                    forge_version: record.forge_version,
                    host_config: record.host_config,
                    name,
                }),
                Err(e) => {
                    warn!(container = %name, error = %e, "Skipping container, inspection failed.");
                    listing.failures.push((name, e.into()));
                }
            }
        }
        listing
    }

    /// Declares and creates a container, returning the engine id.
    ///
    /// The declaration is flushed before the engine call and is left in
    /// place if that call fails.
    pub async fn create(&self, request: CreateRequest) -> Result<String> {
        validate_container_name(&request.name)?;
        validate_port(&request.port)?;
        if request.difficulty > 3 {
            return Err(ManagerError::Validation(format!(
                "invalid difficulty {}",
                request.difficulty
            )));
        }
        let name = request.name.clone();
        if self.store.snapshot().await.containers.contains_key(&name) {
            return Err(ManagerError::AlreadyExists(name));
        }

        let workspace_path = self.workspace.ensure_root(&name).await?;
        let spec = runtime_config::build(&request, &workspace_path, &self.image);
        let record = ContainerRecord {
            version: request.version.clone(),
            port: request.port.clone(),
            forge_version: request.forge_version.clone(),
            host_config: serde_json::to_string(&spec.host_config)?,
        };

        self.store
            .update(|cfg| {
                if cfg.containers.contains_key(&name) {
                    return Err(ManagerError::AlreadyExists(name.clone()));
                }
                cfg.containers.insert(name.clone(), record);
                Ok(())
            })
            .await?;
        info!(container = %name, version = %request.version, port = %request.port, "Declared container.");

        let id = self.engine.create_container(&name, spec).await.map_err(|e| {
            error!(container = %name, error = %e, "Engine failed to create declared container.");
            ManagerError::from(e)
        })?;
        info!(container = %name, id = %id, "Created container.");
        Ok(id)
    }

    pub async fn inspect(&self, name: &str) -> Result<ContainerDetails> {
        validate_container_name(name)?;
        Ok(self.engine.inspect_container(name).await?)
    }

    /// Starts the container as the engine has it. The declared host
    /// configuration is only checked and logged, never reapplied.
    pub async fn start(&self, name: &str) -> Result<()> {
        validate_container_name(name)?;
        if let Some(record) = self.store.snapshot().await.containers.get(name) {
            match serde_json::from_str::<HostConfig>(&record.host_config) {
                Ok(host_config) => {
                    debug!(container = %name, binds = ?host_config.binds, "Declared host configuration.")
                }
                Err(e) => {
                    warn!(container = %name, error = %e, "Declared host configuration is unreadable.")
                }
            }
        }
        self.engine.start_container(name).await?;
        info!(container = %name, "Started container.");
        Ok(())
    }

    pub async fn stop(&self, name: &str) -> Result<()> {
        validate_container_name(name)?;
        self.engine.stop_container(name, STOP_GRACE_SECS).await?;
        info!(container = %name, "Stopped container.");
        Ok(())
    }

    pub async fn restart(&self, name: &str) -> Result<()> {
        validate_container_name(name)?;
        self.engine.restart_container(name, RESTART_GRACE_SECS).await?;
        info!(container = %name, "Restarted container.");
        Ok(())
    }

    /// Removes the container, then its declaration, then its workspace.
    ///
    /// A container the engine no longer knows is treated as already removed,
    /// so the call can be repeated to clean up leftovers. Failures after the
    /// engine removal are reported as [`ManagerError::PartialFailure`].
    pub async fn remove(&self, name: &str) -> Result<()> {
        validate_container_name(name)?;
        let engine_removed = match self.engine.remove_container(name).await {
            Ok(()) => true,
            Err(EngineError::NotFound(_)) => {
                warn!(container = %name, "Engine has no such container, cleaning up leftovers.");
                false
            }
            Err(e) => return Err(e.into()),
        };
        let partial = |stage: &'static str, e: ManagerError| {
            if engine_removed {
                ManagerError::PartialFailure {
                    name: name.to_string(),
                    stage,
                    message: e.to_string(),
                }
            } else {
                e
            }
        };

        let declared = self.store.snapshot().await.containers.contains_key(name);
        if declared {
            self.store
                .update(|cfg| {
                    cfg.containers.remove(name);
                    Ok(())
                })
                .await
                .map_err(|e| partial("drop declaration", e))?;
        }

        let had_workspace = self
            .workspace
            .remove_root(name)
            .await
            .map_err(|e| partial("remove workspace", e))?;

        if !engine_removed && !declared && !had_workspace {
            return Err(ManagerError::NotFound(format!("container '{name}'")));
        }
        info!(container = %name, "Removed container.");
        Ok(())
    }
}
