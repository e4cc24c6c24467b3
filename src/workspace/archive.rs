//! Zip archiving of workspace directories for download.

use std::fs::{self, File};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::Path;
use tracing::{debug, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

const RESERVED_PREFIX: &str = "minecraft_";
const RESERVED_SUFFIX: &str = ".jar";

/// True for the server jars the image drops into the data directory
/// (`minecraft_*.jar`). They are hidden from listings and archives.
pub fn is_reserved(file_name: &str) -> bool {
    file_name.len() >= RESERVED_PREFIX.len() + RESERVED_SUFFIX.len()
        && file_name.starts_with(RESERVED_PREFIX)
        && file_name.ends_with(RESERVED_SUFFIX)
}

fn zip_err(e: zip::result::ZipError) -> io::Error {
    io::Error::other(e)
}

/// Writes `dir` as a zip archive into `writer` and returns the writer.
///
/// Every entry lives under a top-level folder named after `dir`, so the
/// archive unpacks into a directory of the same name. Entries that cannot be
/// read are logged and skipped; symlinks are never followed.
pub fn archive_directory<W: Write + Seek>(dir: &Path, writer: W) -> io::Result<W> {
    let root_name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "directory has no name"))?;

    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o755);

    let mut zip = ZipWriter::new(writer);
    zip.add_directory(format!("{root_name}/"), options)
        .map_err(zip_err)?;
    add_entries(&mut zip, sorted_entries(dir)?, &root_name, options)?;
    zip.finish().map_err(zip_err)
}

/// Archives `dir` into an anonymous temporary file, rewound to the start.
pub fn archive_to_tempfile(dir: &Path) -> io::Result<File> {
    let mut file = archive_directory(dir, tempfile::tempfile()?)?;
    file.seek(SeekFrom::Start(0))?;
    Ok(file)
}

// Entries of `dir` sorted by name. Entries that fail mid-listing are skipped.
fn sorted_entries(dir: &Path) -> io::Result<Vec<fs::DirEntry>> {
    let mut entries: Vec<fs::DirEntry> = fs::read_dir(dir)?
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(path = ?dir, error = %e, "Can't read directory entry, skipping.");
                None
            }
        })
        .collect();
    entries.sort_by_key(|e| e.file_name());
    Ok(entries)
}

fn add_entries<W: Write + Seek>(
    zip: &mut ZipWriter<W>,
    entries: Vec<fs::DirEntry>,
    prefix: &str,
    options: SimpleFileOptions,
) -> io::Result<()> {
    for entry in entries {
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_reserved(&name) {
            debug!(file = %name, "Leaving reserved file out of archive.");
            continue;
        }

        let path = entry.path();
        let meta = match fs::symlink_metadata(&path) {
            Ok(meta) => meta,
            Err(e) => {
                warn!(path = ?path, error = %e, "Can't stat file, skipping.");
                continue;
            }
        };
        let zip_path = format!("{prefix}/{name}");

        if meta.file_type().is_symlink() {
            warn!(path = ?path, "Skipping symlink in archive.");
        } else if meta.is_dir() {
            zip.add_directory(format!("{zip_path}/"), options)
                .map_err(zip_err)?;
            match sorted_entries(&path) {
                Ok(children) => add_entries(zip, children, &zip_path, options)?,
                Err(e) => warn!(path = ?path, error = %e, "Can't read directory, skipping its contents."),
            }
        } else {
            let mut file = match File::open(&path) {
                Ok(file) => file,
                Err(e) => {
                    warn!(path = ?path, error = %e, "Can't open file, skipping.");
                    continue;
                }
            };
            zip.start_file(zip_path, options).map_err(zip_err)?;
            io::copy(&mut file, zip)?;
        }
    }
    Ok(())
}
