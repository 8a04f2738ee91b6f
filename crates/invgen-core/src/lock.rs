//! Scoped cross-process lock around the source table.
//!
//! The lock is taken on a sidecar `<source>.lock` file rather than the source
//! itself, because the source is replaced by rename on every rewrite and a lock
//! on the old inode would no longer exclude anyone.

use crate::config::LockConfig;
use crate::{InvgenError, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Exclusive advisory lock, released when dropped.
#[derive(Debug)]
pub struct SourceLock {
    file: File,
    path: PathBuf,
}

impl SourceLock {
    /// Sidecar lock path for a source file.
    pub fn lock_path_for(source: &Path) -> PathBuf {
        let mut name = source
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".");
        name.push(LockConfig::LOCK_SUFFIX);
        source.with_file_name(name)
    }

    /// Acquire the lock guarding `source`, waiting up to `timeout`.
    pub fn acquire(source: &Path, timeout: Duration) -> Result<Self> {
        let path = Self::lock_path_for(source);
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                return Err(InvgenError::FileNotFound(parent.to_path_buf()));
            }
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| InvgenError::Io {
                message: format!("Failed to open lock file {}", path.display()),
                path: Some(path.clone()),
                source: Some(e),
            })?;

        let started = Instant::now();
        let mut attempts: u32 = 0;
        loop {
            attempts += 1;
            match FileExt::try_lock_exclusive(&file) {
                Ok(()) => {
                    debug!(
                        "Acquired lock {} after {} attempt(s)",
                        path.display(),
                        attempts
                    );
                    return Ok(Self { file, path });
                }
                Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                    if started.elapsed() >= timeout {
                        warn!(
                            "Gave up waiting for lock {} after {:?}",
                            path.display(),
                            timeout
                        );
                        return Err(InvgenError::LockTimeout { path, timeout });
                    }
                    thread::sleep(LockConfig::POLL_INTERVAL);
                }
                Err(e) => {
                    return Err(InvgenError::Io {
                        message: format!("Failed to lock {}", path.display()),
                        path: Some(path),
                        source: Some(e),
                    });
                }
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SourceLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!("Failed to release lock {}: {}", self.path.display(), e);
        } else {
            debug!("Released lock {}", self.path.display());
        }
    }
}
