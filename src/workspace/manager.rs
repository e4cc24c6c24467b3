use bytes::Bytes;
use serde::Serialize;
use std::path::{Component, Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::task;
use tracing::{debug, info, warn};

use crate::error::{ManagerError, Result};
use crate::workspace::archive;

/// One entry of a workspace directory listing.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceEntry {
    pub name: String,
    /// Path relative to the container's workspace root, `/` separated.
    pub path: String,
    pub is_dir: bool,
}

/// A file received for upload.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub bytes: Bytes,
}

#[derive(Debug, Default)]
pub struct UploadReport {
    pub written: Vec<WorkspaceEntry>,
    /// Files that could not be stored, with the reason.
    pub failures: Vec<(String, ManagerError)>,
}

/// Result of a download request.
#[derive(Debug)]
pub enum Download {
    /// A regular file, opened and rewound for streaming.
    File {
        file_name: String,
        content_type: String,
        size: u64,
        file: tokio::fs::File,
    },
    /// Zip archive of a directory, spooled to a rewound temporary file.
    Archive {
        file_name: String,
        file: std::fs::File,
    },
}

/// A caller-supplied path after confinement checks.
#[derive(Debug, Clone)]
struct Resolved {
    root: PathBuf,
    absolute: PathBuf,
    relative: String,
}

/// Checks a container name the way the engine does
/// (`[a-zA-Z0-9][a-zA-Z0-9_.-]+`), which also makes it a safe directory name.
pub fn validate_container_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            first.is_ascii_alphanumeric()
                && name.len() >= 2
                && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(ManagerError::Validation(format!(
            "invalid container name '{name}'"
        )))
    }
}

/// Lexically normalizes `relative`, refusing anything that could leave the root.
fn normalize_relative(relative: &str) -> Result<Vec<String>> {
    let mut parts = Vec::new();
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(ManagerError::PathEscape(relative.to_string()));
            }
        }
    }
    Ok(parts)
}

fn join_relative(base: &str, name: &str) -> String {
    if base.is_empty() {
        name.to_string()
    } else {
        format!("{base}/{name}")
    }
}

/// Bytes inspected when guessing whether a file is text.
const SNIFF_LEN: usize = 512;

/// Sniffs a content type from the file extension, falling back to a
/// text/binary guess on the leading bytes.
pub fn sniff_content_type(path: &Path, prefix: &[u8]) -> String {
    if let Some(mime) = mime_guess::from_path(path).first() {
        return mime.essence_str().to_string();
    }
    let sample = &prefix[..prefix.len().min(SNIFF_LEN)];
    match std::str::from_utf8(sample) {
        Ok(_) => "text/plain; charset=utf-8".to_string(),
        // A multi-byte character cut off by the sample boundary.
        Err(e) if e.error_len().is_none() => "text/plain; charset=utf-8".to_string(),
        Err(_) => "application/octet-stream".to_string(),
    }
}

/// File operations over the per-container workspace directories under one root.
pub struct WorkspaceManager {
    root: PathBuf,
}

impl WorkspaceManager {
    pub fn new(root: impl AsRef<Path>) -> std::io::Result<Self> {
        Ok(Self {
            root: std::path::absolute(root)?,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute workspace directory of `name`.
    pub fn container_root(&self, name: &str) -> Result<PathBuf> {
        validate_container_name(name)?;
        Ok(self.root.join(name))
    }

    /// Creates the workspace directory of `name` (and its parents) if needed.
    pub async fn ensure_root(&self, name: &str) -> Result<PathBuf> {
        let path = self.container_root(name)?;
        tokio::fs::create_dir_all(&path).await?;
        Ok(path)
    }

    /// Removes the workspace directory of `name`. Returns whether it existed.
    pub async fn remove_root(&self, name: &str) -> Result<bool> {
        let path = self.container_root(name)?;
        match tokio::fs::remove_dir_all(&path).await {
            Ok(()) => {
                info!(container = %name, path = ?path, "Removed workspace directory.");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(ManagerError::Io(e)),
        }
    }

    fn locate(&self, name: &str, relative: &str) -> Result<Resolved> {
        let root = self.container_root(name)?;
        let parts = normalize_relative(relative)?;
        let mut absolute = root.clone();
        absolute.extend(&parts);
        Ok(Resolved {
            root,
            absolute,
            relative: parts.join("/"),
        })
    }

    async fn resolve(&self, name: &str, relative: &str) -> Result<Resolved> {
        let resolved = self.locate(name, relative)?;
        confine(&resolved.root, &resolved.absolute, relative).await?;
        Ok(resolved)
    }

    // Like `resolve`, but the final component is taken as-is, so a symlink
    // names the link itself rather than its target.
    async fn resolve_entry(&self, name: &str, relative: &str) -> Result<Resolved> {
        let resolved = self.locate(name, relative)?;
        let parent = match resolved.absolute.parent() {
            Some(parent) if !resolved.relative.is_empty() => parent,
            _ => resolved.absolute.as_path(),
        };
        confine(&resolved.root, parent, relative).await?;
        Ok(resolved)
    }

    /// Lists the directory at `relative`, hiding reserved server jars.
    /// Directories come first, then files, each sorted by name.
    pub async fn list(&self, name: &str, relative: &str) -> Result<Vec<WorkspaceEntry>> {
        let resolved = self.resolve(name, relative).await?;
        let meta = tokio::fs::metadata(&resolved.absolute)
            .await
            .map_err(|e| ManagerError::from_path_io(e, relative))?;
        if !meta.is_dir() {
            return Err(ManagerError::Validation(format!(
                "'{relative}' is not a directory"
            )));
        }

        let mut read_dir = tokio::fs::read_dir(&resolved.absolute).await?;
        let mut entries = Vec::new();
        while let Some(entry) = read_dir.next_entry().await? {
            let entry_name = entry.file_name().to_string_lossy().into_owned();
            if archive::is_reserved(&entry_name) {
                continue;
            }
            let is_dir = match tokio::fs::metadata(entry.path()).await {
                Ok(meta) => meta.is_dir(),
                // Dangling symlink.
                Err(_) => false,
            };
            entries.push(WorkspaceEntry {
                path: join_relative(&resolved.relative, &entry_name),
                name: entry_name,
                is_dir,
            });
        }
        entries.sort_by(|a, b| b.is_dir.cmp(&a.is_dir).then_with(|| a.name.cmp(&b.name)));
        Ok(entries)
    }

    /// Creates `new_name` (and any parents) under `relative`. Succeeds if it already exists.
    pub async fn make_directory(
        &self,
        name: &str,
        relative: &str,
        new_name: &str,
    ) -> Result<WorkspaceEntry> {
        if normalize_relative(new_name)?.is_empty() {
            return Err(ManagerError::Validation(
                "directory name must not be empty".to_string(),
            ));
        }
        let target = join_relative(relative, new_name);
        let resolved = self.resolve(name, &target).await?;
        tokio::fs::create_dir_all(&resolved.absolute).await?;
        info!(container = %name, path = %resolved.relative, "Created directory.");

        let entry_name = resolved
            .absolute
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(WorkspaceEntry {
            name: entry_name,
            path: resolved.relative,
            is_dir: true,
        })
    }

    /// Removes the file or directory tree at `relative`. A symlink is
    /// unlinked, never followed.
    pub async fn delete(&self, name: &str, relative: &str) -> Result<()> {
        let resolved = self.resolve_entry(name, relative).await?;
        if resolved.relative.is_empty() {
            return Err(ManagerError::Validation(
                "refusing to delete the workspace root".to_string(),
            ));
        }
        let meta = tokio::fs::symlink_metadata(&resolved.absolute)
            .await
            .map_err(|e| ManagerError::from_path_io(e, relative))?;
        if meta.is_dir() && !meta.file_type().is_symlink() {
            tokio::fs::remove_dir_all(&resolved.absolute).await?;
        } else {
            tokio::fs::remove_file(&resolved.absolute).await?;
        }
        info!(container = %name, path = %resolved.relative, "Deleted workspace entry.");
        Ok(())
    }

    /// Stores `files` in the directory at `relative`, creating it if needed
    /// and overwriting existing files. A file that fails is recorded in the
    /// report and the rest of the batch carries on.
    pub async fn upload(
        &self,
        name: &str,
        relative: &str,
        files: Vec<UploadedFile>,
    ) -> Result<UploadReport> {
        let resolved = self.resolve(name, relative).await?;
        tokio::fs::create_dir_all(&resolved.absolute).await?;

        let mut report = UploadReport::default();
        for file in files {
            match self.store_upload(&resolved, &file).await {
                Ok(entry) => report.written.push(entry),
                Err(e) => {
                    warn!(container = %name, file = %file.file_name, error = %e, "Failed to store uploaded file.");
                    report.failures.push((file.file_name, e));
                }
            }
        }
        info!(
            container = %name,
            path = %resolved.relative,
            written = report.written.len(),
            failed = report.failures.len(),
            "Upload finished."
        );
        Ok(report)
    }

    async fn store_upload(&self, dir: &Resolved, file: &UploadedFile) -> Result<WorkspaceEntry> {
        // Browsers may send a full client path; only the final component counts.
        let base = Path::new(&file.file_name)
            .components()
            .next_back()
            .and_then(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .ok_or_else(|| ManagerError::Validation(format!("invalid file name '{}'", file.file_name)))?;

        let target = dir.absolute.join(&base);
        confine(&dir.root, &target, &file.file_name).await?;
        // Writes never go through a link, even one that stays in the workspace.
        match tokio::fs::symlink_metadata(&target).await {
            Ok(meta) if meta.file_type().is_symlink() => {
                warn!(path = ?target, "Refusing to write through a symlink.");
                return Err(ManagerError::PathEscape(file.file_name.clone()));
            }
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(ManagerError::Io(e)),
        }
        tokio::fs::write(&target, &file.bytes).await?;
        debug!(path = ?target, size = file.bytes.len(), "Stored uploaded file.");

        Ok(WorkspaceEntry {
            path: join_relative(&dir.relative, &base),
            name: base,
            is_dir: false,
        })
    }

    /// Returns the file at `relative`, or a zip archive if it is a directory.
    pub async fn download(&self, name: &str, relative: &str) -> Result<Download> {
        let resolved = self.resolve(name, relative).await?;
        let meta = tokio::fs::metadata(&resolved.absolute)
            .await
            .map_err(|e| ManagerError::from_path_io(e, relative))?;
        let base_name = resolved
            .absolute
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| name.to_string());

        if meta.is_dir() {
            let dir = resolved.absolute.clone();
            let file = task::spawn_blocking(move || archive::archive_to_tempfile(&dir))
                .await
                .map_err(|e| ManagerError::Io(std::io::Error::other(e)))??;
            info!(container = %name, path = %resolved.relative, "Archived directory for download.");
            Ok(Download::Archive {
                file_name: format!("{base_name}.zip"),
                file,
            })
        } else {
            let mut file = tokio::fs::File::open(&resolved.absolute)
                .await
                .map_err(|e| ManagerError::from_path_io(e, relative))?;
            let mut prefix = Vec::with_capacity(SNIFF_LEN);
            (&mut file).take(SNIFF_LEN as u64).read_to_end(&mut prefix).await?;
            file.seek(std::io::SeekFrom::Start(0)).await?;
            Ok(Download::File {
                file_name: base_name,
                content_type: sniff_content_type(&resolved.absolute, &prefix),
                size: meta.len(),
                file,
            })
        }
    }
}

/// Checks that `candidate` stays under `root` once symlinks are resolved.
///
/// The deepest existing ancestor of `candidate` is canonicalized, so paths
/// that do not exist yet (mkdir, upload targets) are covered too. A dangling
/// symlink on the way is rejected, since writing through it would create its
/// target wherever that points.
async fn confine(root: &Path, candidate: &Path, shown: &str) -> Result<()> {
    let canonical_root = match tokio::fs::canonicalize(root).await {
        Ok(path) => path,
        // Nothing under a missing root can point elsewhere.
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(ManagerError::Io(e)),
    };

    for ancestor in candidate.ancestors() {
        if !ancestor.starts_with(root) {
            break;
        }
        match tokio::fs::canonicalize(ancestor).await {
            Ok(real) => {
                return if real.starts_with(&canonical_root) {
                    Ok(())
                } else {
                    warn!(path = %shown, resolved = ?real, "Rejected path leaving the workspace.");
                    Err(ManagerError::PathEscape(shown.to_string()))
                };
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if tokio::fs::symlink_metadata(ancestor).await.is_ok() {
                    warn!(path = %shown, link = ?ancestor, "Rejected path through a dangling symlink.");
                    return Err(ManagerError::PathEscape(shown.to_string()));
                }
            }
            Err(e) => return Err(ManagerError::Io(e)),
        }
    }
    Ok(())
}
