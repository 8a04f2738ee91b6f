//! Engine configuration.
//!
//! [`InventoryConfig`] is an immutable value loaded once per invocation and
//! passed by reference into every component. Fixed tunables live in the
//! constant structs below.

use crate::model::IdentityKey;
use crate::{InvgenError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Cross-process lock tunables.
pub struct LockConfig;

impl LockConfig {
    pub const POLL_INTERVAL: Duration = Duration::from_millis(100);
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
    pub const LOCK_SUFFIX: &'static str = "lock";
}

/// Artifact naming and header text.
pub struct ArtifactConfig;

impl ArtifactConfig {
    pub const FILE_EXTENSION: &'static str = "yml";
    pub const GENERATED_HEADER: &'static str = "AUTO-GENERATED FILE - DO NOT EDIT MANUALLY";
    pub const ENV_GROUP_VARS_PREFIX: &'static str = "env_";
    pub const BACKUP_EXTENSION: &'static str = "bak";
    pub const UNKNOWN_PATCH_WINDOW: &'static str = "TBD";
}

/// Health scoring weights and decay rates.
pub struct HealthConfig;

impl HealthConfig {
    pub const COVERAGE_WEIGHT: f64 = 0.35;
    pub const ORPHAN_WEIGHT: f64 = 0.20;
    pub const VALIDATION_WEIGHT: f64 = 0.20;
    pub const EXPIRED_WEIGHT: f64 = 0.15;
    pub const GROUP_VARS_WEIGHT: f64 = 0.10;

    pub const ORPHAN_DECAY: f64 = 0.25;
    pub const VALIDATION_DECAY: f64 = 0.5;
    pub const EXPIRED_DECAY: f64 = 0.5;

    pub const MAX_EXAMPLES: usize = 5;
}

/// Environment variable overrides, applied after the config file.
pub struct EnvOverrides;

impl EnvOverrides {
    pub const SOURCE_FILE: &'static str = "INVGEN_SOURCE_FILE";
    pub const IDENTITY_KEY: &'static str = "INVGEN_IDENTITY_KEY";
}

/// Immutable configuration threaded through every component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InventoryConfig {
    pub source_file: PathBuf,
    pub inventory_dir: PathBuf,
    pub host_vars_dir: PathBuf,
    pub group_vars_dir: PathBuf,
    /// Allowed values of the `environment` column.
    pub environments: Vec<String>,
    pub identity_key: IdentityKey,
    /// Decommission grace period in days, per environment.
    pub grace_periods: BTreeMap<String, u32>,
    pub default_grace_days: u32,
    /// Patch window text keyed by batch group name (`batch_1`, ...).
    pub patch_windows: BTreeMap<String, String>,
    /// Nest product groups under the environment group.
    pub nest_products: bool,
    pub lock_timeout_secs: u64,
    /// Keep a `.bak` copy of the source table when lifecycle rewrites it.
    pub keep_source_backup: bool,
    /// Warn when one environment holds more hosts than this.
    pub large_environment_warning: usize,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        let grace_periods = [
            ("production", 90),
            ("acceptance", 30),
            ("test", 14),
            ("development", 7),
        ]
        .into_iter()
        .map(|(env, days)| (env.to_string(), days))
        .collect();

        let patch_windows = [
            ("batch_1", "Saturday 02:00-04:00 UTC"),
            ("batch_2", "Saturday 04:00-06:00 UTC"),
            ("batch_3", "Saturday 06:00-08:00 UTC"),
        ]
        .into_iter()
        .map(|(batch, window)| (batch.to_string(), window.to_string()))
        .collect();

        Self {
            source_file: PathBuf::from("inventory_source/hosts.csv"),
            inventory_dir: PathBuf::from("inventory"),
            host_vars_dir: PathBuf::from("inventory/host_vars"),
            group_vars_dir: PathBuf::from("inventory/group_vars"),
            environments: vec![
                "production".to_string(),
                "development".to_string(),
                "test".to_string(),
                "acceptance".to_string(),
            ],
            identity_key: IdentityKey::Hostname,
            grace_periods,
            default_grace_days: 30,
            patch_windows,
            nest_products: false,
            lock_timeout_secs: LockConfig::DEFAULT_TIMEOUT_SECS,
            keep_source_backup: true,
            large_environment_warning: 1000,
        }
    }
}

impl InventoryConfig {
    /// Load a YAML config file. Relative paths resolve against its directory.
    pub fn load(path: &Path) -> Result<Self> {
        let text =
            std::fs::read_to_string(path).map_err(|e| InvgenError::io_with_path(e, path))?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        debug!("Loading configuration from {}", path.display());
        Self::from_yaml_str(&text, base)
    }

    /// Parse YAML config text. Keys that are absent keep their defaults.
    pub fn from_yaml_str(text: &str, base_dir: &Path) -> Result<Self> {
        let config: InventoryConfig = if text.trim().is_empty() {
            InventoryConfig::default()
        } else {
            serde_yaml::from_str(text).map_err(|e| InvgenError::Config {
                message: format!("invalid configuration: {}", e),
            })?
        };
        let config = config.with_base_dir(base_dir);
        config.validate()?;
        Ok(config)
    }

    /// Resolve every relative path against `base_dir`.
    pub fn with_base_dir(mut self, base_dir: &Path) -> Self {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base_dir.join(&*p);
            }
        };
        resolve(&mut self.source_file);
        resolve(&mut self.inventory_dir);
        resolve(&mut self.host_vars_dir);
        resolve(&mut self.group_vars_dir);
        self
    }

    /// Apply overrides from a variable lookup (normally `std::env::var`).
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(source) = lookup(EnvOverrides::SOURCE_FILE) {
            debug!("{} overrides source file: {}", EnvOverrides::SOURCE_FILE, source);
            self.source_file = PathBuf::from(source);
        }
        if let Some(key) = lookup(EnvOverrides::IDENTITY_KEY) {
            self.identity_key = key
                .parse()
                .map_err(|message| InvgenError::Config { message })?;
        }
        Ok(self)
    }

    /// Apply overrides from the process environment.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    /// Check internal consistency.
    pub fn validate(&self) -> Result<()> {
        if self.environments.is_empty() {
            return Err(InvgenError::Config {
                message: "at least one environment must be configured".to_string(),
            });
        }
        let mut seen = BTreeSet::new();
        for env in &self.environments {
            if env.trim().is_empty() {
                return Err(InvgenError::Config {
                    message: "environment names cannot be empty".to_string(),
                });
            }
            if !seen.insert(env.as_str()) {
                return Err(InvgenError::Config {
                    message: format!("environment '{}' is listed twice", env),
                });
            }
        }
        if self.lock_timeout_secs == 0 {
            return Err(InvgenError::Config {
                message: "lock_timeout_secs must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    pub fn is_known_environment(&self, environment: &str) -> bool {
        self.environments.iter().any(|e| e == environment)
    }

    /// Grace period for an environment, falling back to `default_grace_days`.
    pub fn grace_days(&self, environment: &str) -> u32 {
        self.grace_periods
            .get(environment)
            .copied()
            .unwrap_or(self.default_grace_days)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }

    /// Patch window for a batch number, or `TBD` when none is configured.
    pub fn patching_window(&self, batch_number: u32) -> String {
        self.patch_windows
            .get(&format!("batch_{}", batch_number))
            .cloned()
            .unwrap_or_else(|| ArtifactConfig::UNKNOWN_PATCH_WINDOW.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = InventoryConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.grace_days("production"), 90);
        assert_eq!(config.grace_days("development"), 7);
        assert_eq!(config.grace_days("staging"), 30);
        assert_eq!(config.identity_key, IdentityKey::Hostname);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = "environments: [prod, dev]\ngrace_periods:\n  prod: 60\nidentity_key: cname\n";
        let config = InventoryConfig::from_yaml_str(yaml, Path::new("/srv/inv")).unwrap();
        assert_eq!(config.environments, vec!["prod", "dev"]);
        assert_eq!(config.grace_days("prod"), 60);
        assert_eq!(config.grace_days("dev"), 30);
        assert_eq!(config.identity_key, IdentityKey::CanonicalName);
        assert_eq!(
            config.source_file,
            PathBuf::from("/srv/inv/inventory_source/hosts.csv")
        );
    }

    #[test]
    fn test_duplicate_environment_rejected() {
        let yaml = "environments: [prod, prod]\n";
        let err = InventoryConfig::from_yaml_str(yaml, Path::new(".")).unwrap_err();
        assert!(matches!(err, InvgenError::Config { .. }));
    }

    #[test]
    fn test_overrides() {
        let config = InventoryConfig::default()
            .with_overrides(|name| match name {
                "INVGEN_SOURCE_FILE" => Some("/tmp/other.csv".to_string()),
                "INVGEN_IDENTITY_KEY" => Some("canonical_name".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.source_file, PathBuf::from("/tmp/other.csv"));
        assert_eq!(config.identity_key, IdentityKey::CanonicalName);

        let bad = InventoryConfig::default().with_overrides(|name| {
            (name == "INVGEN_IDENTITY_KEY").then(|| "serial".to_string())
        });
        assert!(bad.is_err());
    }

    #[test]
    fn test_patching_window_lookup() {
        let config = InventoryConfig::default();
        assert_eq!(config.patching_window(1), "Saturday 02:00-04:00 UTC");
        assert_eq!(config.patching_window(9), "TBD");
    }
}
