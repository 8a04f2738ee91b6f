//! On-disk artifact layout.
//!
//! Maps environment names and host keys onto file paths. Every component that
//! touches generated files goes through this type so the naming convention is
//! defined once.

use crate::config::{ArtifactConfig, InventoryConfig};
use crate::groups::{group_name, GroupKind};
use crate::{InvgenError, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Characters replaced when a host key becomes a file name.
const UNSAFE_FILE_CHARS: &[char] = &['/', '\\', ':'];

/// Directory layout of the generated inventory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLayout {
    pub inventory_dir: PathBuf,
    pub host_vars_dir: PathBuf,
    pub group_vars_dir: PathBuf,
}

impl ArtifactLayout {
    pub fn from_config(config: &InventoryConfig) -> Self {
        Self {
            inventory_dir: config.inventory_dir.clone(),
            host_vars_dir: config.host_vars_dir.clone(),
            group_vars_dir: config.group_vars_dir.clone(),
        }
    }

    /// Replace the inventory and/or host-vars directories.
    pub fn with_output_dirs(
        mut self,
        inventory_dir: Option<PathBuf>,
        host_vars_dir: Option<PathBuf>,
    ) -> Self {
        if let Some(dir) = inventory_dir {
            self.inventory_dir = dir;
        }
        if let Some(dir) = host_vars_dir {
            self.host_vars_dir = dir;
        }
        self
    }

    /// `<inventory_dir>/<environment>.yml`
    pub fn inventory_file(&self, environment: &str) -> PathBuf {
        self.inventory_dir.join(Self::file_name(environment))
    }

    /// File name used for a host key.
    pub fn host_vars_file_name(key: &str) -> String {
        Self::file_name(key)
    }

    /// `<host_vars_dir>/<key>.yml`
    pub fn host_vars_file(&self, key: &str) -> PathBuf {
        self.host_vars_dir.join(Self::host_vars_file_name(key))
    }

    /// `<group_vars_dir>/env_<environment>.yml`
    pub fn group_vars_file(&self, environment: &str) -> PathBuf {
        let stem = group_name(GroupKind::Environment, environment);
        debug_assert!(stem.starts_with(ArtifactConfig::ENV_GROUP_VARS_PREFIX));
        self.group_vars_dir
            .join(format!("{}.{}", stem, ArtifactConfig::FILE_EXTENSION))
    }

    /// Every `*.yml` file currently in the host-vars directory, keyed by file name.
    ///
    /// A missing directory is treated as empty.
    pub fn host_vars_files(&self) -> Result<BTreeMap<String, PathBuf>> {
        list_yaml_files(&self.host_vars_dir)
    }

    fn file_name(stem: &str) -> String {
        let safe: String = stem
            .chars()
            .map(|c| if UNSAFE_FILE_CHARS.contains(&c) { '-' } else { c })
            .collect();
        format!("{}.{}", safe, ArtifactConfig::FILE_EXTENSION)
    }
}

fn list_yaml_files(dir: &Path) -> Result<BTreeMap<String, PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(e) => return Err(InvgenError::io_with_path(e, dir)),
    };

    let suffix = format!(".{}", ArtifactConfig::FILE_EXTENSION);
    let mut files = BTreeMap::new();
    for entry in entries {
        let entry = entry.map_err(|e| InvgenError::io_with_path(e, dir))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if name.ends_with(&suffix) {
            files.insert(name, path);
        }
    }
    Ok(files)
}
