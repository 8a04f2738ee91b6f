//! Atomic file operations for generated artifacts and the source table.
//!
//! Writes go through:
//! 1. Write to a temp file with a unique PID+TID suffix
//! 2. fsync so the data reaches disk
//! 3. Optional backup of the previous content
//! 4. Atomic rename over the target

use crate::config::ArtifactConfig;
use crate::{InvgenError, Result};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process;
use std::thread;
use tracing::{debug, warn};

/// Read a file's bytes, or `None` if it doesn't exist.
pub fn read_if_exists(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(InvgenError::Io {
            message: format!("Failed to read {}", path.display()),
            path: Some(path.to_path_buf()),
            source: Some(e),
        }),
    }
}

/// Backup path used when `keep_backup` is set.
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".");
    name.push(ArtifactConfig::BACKUP_EXTENSION);
    path.with_file_name(name)
}

/// Replace `path` with `contents` atomically.
///
/// The parent directory is created if needed. A reader sees either the old
/// file or the complete new one, never a partial write.
pub fn atomic_write(path: &Path, contents: &[u8], keep_backup: bool) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| InvgenError::Io {
                message: format!("Failed to create directory {}", parent.display()),
                path: Some(parent.to_path_buf()),
                source: Some(e),
            })?;
        }
    }

    let temp_path = temp_path_for(path);

    {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)
            .map_err(|e| InvgenError::Io {
                message: format!("Failed to create temp file {}", temp_path.display()),
                path: Some(temp_path.clone()),
                source: Some(e),
            })?;

        let staged = file
            .write_all(contents)
            .and_then(|_| file.flush())
            .and_then(|_| file.sync_all());
        if let Err(e) = staged {
            let _ = fs::remove_file(&temp_path);
            return Err(InvgenError::Io {
                message: format!("Failed to write temp file {}", temp_path.display()),
                path: Some(temp_path.clone()),
                source: Some(e),
            });
        }
    }

    if keep_backup && path.exists() {
        let backup = backup_path(path);
        if let Err(e) = fs::copy(path, &backup) {
            // Backup failure is not fatal
            warn!("Failed to create backup {}: {}", backup.display(), e);
        } else {
            debug!("Created backup: {}", backup.display());
        }
    }

    if let Err(e) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(InvgenError::Io {
            message: format!(
                "Failed to rename {} to {}",
                temp_path.display(),
                path.display()
            ),
            path: Some(path.to_path_buf()),
            source: Some(e),
        });
    }

    debug!("Atomically wrote {}", path.display());
    Ok(())
}

/// Delete a file, returning whether it existed.
pub fn remove_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!("Removed {}", path.display());
            Ok(true)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(InvgenError::Io {
            message: format!("Failed to remove {}", path.display()),
            path: Some(path.to_path_buf()),
            source: Some(e),
        }),
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(format!(".{}.{}.tmp", process::id(), thread_id()));
    path.with_file_name(name)
}

/// Get a unique thread identifier.
fn thread_id() -> u64 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    let mut hasher = DefaultHasher::new();
    format!("{:?}", thread::current().id()).hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_atomic_write_and_read() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("web01.yml");

        atomic_write(&path, b"status: active\n", false).unwrap();
        assert_eq!(
            read_if_exists(&path).unwrap().as_deref(),
            Some(&b"status: active\n"[..])
        );
    }

    #[test]
    fn test_atomic_write_creates_backup() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("hosts.csv");

        atomic_write(&path, b"first", true).unwrap();
        atomic_write(&path, b"second", true).unwrap();

        let backup = backup_path(&path);
        assert_eq!(backup, temp_dir.path().join("hosts.csv.bak"));
        assert_eq!(fs::read(&backup).unwrap(), b"first");
        assert_eq!(fs::read(&path).unwrap(), b"second");
    }

    #[test]
    fn test_atomic_write_creates_directories() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("dir").join("x.yml");

        atomic_write(&path, b"---\n", false).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("prod.yml");
        atomic_write(&path, b"a", false).unwrap();
        atomic_write(&path, b"b", false).unwrap();

        let names: Vec<_> = fs::read_dir(temp_dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["prod.yml".to_string()]);
    }

    #[test]
    fn test_read_and_remove_nonexistent() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nope.yml");
        assert!(read_if_exists(&path).unwrap().is_none());
        assert!(!remove_if_exists(&path).unwrap());
    }
}
