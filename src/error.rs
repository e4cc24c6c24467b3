//! Error types shared by the container registry and the workspace manager.

use thiserror::Error;

use crate::containers::engine::EngineError;

pub type Result<T> = std::result::Result<T, ManagerError>;

/// Coarse classification of a [`ManagerError`], used by the web layer and by
/// callers that only care about the failure class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    PathEscape,
    Engine,
    Io,
    PartialFailure,
}

#[derive(Error, Debug)]
pub enum ManagerError {
    #[error("Invalid input: {0}")]
    Validation(String),
    #[error("Container already exists: {0}")]
    AlreadyExists(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Path escapes workspace: {0}")]
    PathEscape(String),
    #[error("Engine error: {0}")]
    Engine(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// The engine-side action succeeded but a follow-up step did not.
    #[error("Partial failure on {name} during {stage}: {message}")]
    PartialFailure {
        name: String,
        stage: &'static str,
        message: String,
    },
}

impl ManagerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ManagerError::Validation(_) | ManagerError::AlreadyExists(_) => ErrorKind::Validation,
            ManagerError::NotFound(_) => ErrorKind::NotFound,
            ManagerError::PathEscape(_) => ErrorKind::PathEscape,
            ManagerError::Engine(_) => ErrorKind::Engine,
            ManagerError::Io(_) | ManagerError::Serialization(_) => ErrorKind::Io,
            ManagerError::PartialFailure { .. } => ErrorKind::PartialFailure,
        }
    }

    /// Maps an I/O error on a workspace path, turning a missing path into `NotFound`.
    pub(crate) fn from_path_io(err: std::io::Error, display_path: &str) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            ManagerError::NotFound(format!("path '{display_path}'"))
        } else {
            ManagerError::Io(err)
        }
    }
}

impl From<EngineError> for ManagerError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::NotFound(name) => ManagerError::NotFound(format!("container '{name}'")),
            other => ManagerError::Engine(other.to_string()),
        }
    }
}
