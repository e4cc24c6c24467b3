use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tokio::task;
use tracing::{debug, info};

use crate::error::{ManagerError, Result};

/// Declared configuration of one container, keyed by its name in [`Config::containers`].
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerRecord {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub port: String,
    #[serde(rename = "forgeVersion", default)]
    pub forge_version: String,
    /// Engine host configuration as JSON, kept so the container can be recreated.
    #[serde(default)]
    pub host_config: String,
}

/// The persisted document. `accounts` and `versions` are operator managed;
/// lifecycle operations only ever touch `containers`.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    #[serde(default, deserialize_with = "null_as_default")]
    pub accounts: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub containers: BTreeMap<String, ContainerRecord>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub versions: Vec<String>,
}

// Older config files carry `null` for empty maps and lists.
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Single writer of the persisted [`Config`].
///
/// The in-memory copy sits behind one async mutex so that every
/// read-modify-flush sequence runs to completion before the next starts.
pub struct ConfigStore {
    path: PathBuf,
    current: Mutex<Config>,
}

impl ConfigStore {
    /// Loads the document at `path` (or an empty one on first run) and wraps it.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let config = Self::load(&path).await?;
        info!(
            path = ?path,
            containers = config.containers.len(),
            versions = config.versions.len(),
            "Loaded container configuration."
        );
        Ok(Self {
            path,
            current: Mutex::new(config),
        })
    }

    /// Reads the document from disk. A missing file is not an error.
    pub async fn load(path: &Path) -> Result<Config> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = ?path, "No configuration file yet, starting empty.");
                Ok(Config::default())
            }
            Err(e) => Err(ManagerError::Io(e)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn snapshot(&self) -> Config {
        self.current.lock().await.clone()
    }

    /// HTTP credentials, user name to password. Empty means no authentication.
    pub async fn accounts(&self) -> BTreeMap<String, String> {
        self.current.lock().await.accounts.clone()
    }

    /// Replaces the whole document on disk.
    ///
    /// The bytes go to a temporary file next to the target which is then
    /// renamed over it, so readers never observe a half-written document.
    pub async fn flush(&self, config: &Config) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(config)?;
        let path = self.path.clone();
        task::spawn_blocking(move || write_atomically(&path, &bytes))
            .await
            .map_err(|e| ManagerError::Io(std::io::Error::other(e)))??;
        debug!(path = ?self.path, "Flushed configuration.");
        Ok(())
    }

    /// Applies `mutate` to a copy of the document and flushes it, holding the
    /// store lock for the whole sequence. The in-memory document only changes
    /// once the flush has succeeded.
    pub async fn update<F, T>(&self, mutate: F) -> Result<T>
    where
        F: FnOnce(&mut Config) -> Result<T>,
    {
        let mut guard = self.current.lock().await;
        let mut draft = guard.clone();
        let out = mutate(&mut draft)?;
        self.flush(&draft).await?;
        *guard = draft;
        Ok(out)
    }
}

fn write_atomically(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
