//! Inventory health scoring.
//!
//! The score is a weighted sum of independent factors, each normalized to
//! `[0, 1]` first. Alongside the number the report lists what pulled it down
//! and what to do about it.

use crate::config::{HealthConfig, InventoryConfig};
use crate::layout::ArtifactLayout;
use crate::lifecycle::LifecycleManager;
use crate::loader::{LoadOutcome, SourceTable};
use crate::Result;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::debug;

/// Qualitative health band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthBand {
    Critical,
    Poor,
    Fair,
    Good,
    Excellent,
}

impl HealthBand {
    /// Band for a score in `[0, 100]`.
    pub fn from_score(score: f64) -> Self {
        match score {
            s if s >= 95.0 => HealthBand::Excellent,
            s if s >= 85.0 => HealthBand::Good,
            s if s >= 70.0 => HealthBand::Fair,
            s if s >= 50.0 => HealthBand::Poor,
            _ => HealthBand::Critical,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthBand::Critical => "CRITICAL",
            HealthBand::Poor => "POOR",
            HealthBand::Fair => "FAIR",
            HealthBand::Good => "GOOD",
            HealthBand::Excellent => "EXCELLENT",
        }
    }
}

impl std::fmt::Display for HealthBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthFactorKind {
    HostVarsCoverage,
    OrphanedFiles,
    ValidationErrors,
    ExpiredHosts,
    GroupVarsPresence,
}

impl HealthFactorKind {
    pub fn weight(&self) -> f64 {
        match self {
            HealthFactorKind::HostVarsCoverage => HealthConfig::COVERAGE_WEIGHT,
            HealthFactorKind::OrphanedFiles => HealthConfig::ORPHAN_WEIGHT,
            HealthFactorKind::ValidationErrors => HealthConfig::VALIDATION_WEIGHT,
            HealthFactorKind::ExpiredHosts => HealthConfig::EXPIRED_WEIGHT,
            HealthFactorKind::GroupVarsPresence => HealthConfig::GROUP_VARS_WEIGHT,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            HealthFactorKind::HostVarsCoverage => "host_vars coverage",
            HealthFactorKind::OrphanedFiles => "orphaned host_vars files",
            HealthFactorKind::ValidationErrors => "validation errors",
            HealthFactorKind::ExpiredHosts => "expired hosts awaiting cleanup",
            HealthFactorKind::GroupVarsPresence => "environment group_vars",
        }
    }
}

/// One weighted factor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthFactor {
    pub kind: HealthFactorKind,
    pub weight: f64,
    /// Normalized value in `[0, 1]`.
    pub value: f64,
}

impl HealthFactor {
    fn new(kind: HealthFactorKind, value: f64) -> Self {
        Self {
            kind,
            weight: kind.weight(),
            value: value.clamp(0.0, 1.0),
        }
    }

    /// Points contributed to the 0-100 score.
    pub fn contribution(&self) -> f64 {
        self.weight * self.value * 100.0
    }
}

/// Something that lowered the score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Deficiency {
    pub factor: HealthFactorKind,
    pub count: usize,
    /// Up to a handful of affected names.
    pub examples: Vec<String>,
    pub message: String,
}

/// Raw counts behind the factors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HealthCounts {
    pub total_records: usize,
    pub active_hosts: usize,
    pub decommissioned_hosts: usize,
    pub host_vars_ok: usize,
    pub validation_errors: usize,
    pub validation_warnings: usize,
    pub orphaned_files: usize,
    pub expired_hosts: usize,
    pub group_vars_expected: usize,
    pub group_vars_present: usize,
}

/// Full health check result.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub score: f64,
    pub band: HealthBand,
    pub checked_on: NaiveDate,
    pub factors: Vec<HealthFactor>,
    pub deficiencies: Vec<Deficiency>,
    pub recommendations: Vec<String>,
    pub counts: HealthCounts,
}

impl HealthReport {
    pub fn is_below(&self, threshold: f64) -> bool {
        self.score < threshold
    }
}

/// Coverage fraction; full coverage when nothing is expected.
pub fn coverage_factor(present: usize, expected: usize) -> f64 {
    if expected == 0 {
        1.0
    } else {
        present as f64 / expected as f64
    }
}

pub fn orphan_factor(orphans: usize) -> f64 {
    decay(orphans, HealthConfig::ORPHAN_DECAY)
}

pub fn validation_factor(errors: usize) -> f64 {
    decay(errors, HealthConfig::VALIDATION_DECAY)
}

pub fn expired_factor(expired: usize) -> f64 {
    decay(expired, HealthConfig::EXPIRED_DECAY)
}

fn decay(count: usize, rate: f64) -> f64 {
    1.0 / (1.0 + rate * count as f64)
}

fn examples<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    items
        .into_iter()
        .take(HealthConfig::MAX_EXAMPLES)
        .map(Into::into)
        .collect()
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// Whether a host-vars file exists and parses as a YAML mapping.
fn host_vars_well_formed(path: &Path) -> bool {
    match std::fs::read_to_string(path) {
        Ok(text) => serde_yaml::from_str::<serde_yaml::Value>(&text)
            .map(|v| v.is_mapping())
            .unwrap_or(false),
        Err(_) => false,
    }
}

/// Scores the current record set against the artifact layout on disk.
pub struct HealthScorer<'a> {
    config: &'a InventoryConfig,
    layout: ArtifactLayout,
    today: Option<NaiveDate>,
}

impl<'a> HealthScorer<'a> {
    pub fn new(config: &'a InventoryConfig, layout: ArtifactLayout) -> Self {
        Self {
            config,
            layout,
            today: None,
        }
    }

    /// Pin the reference date used for expiry.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    pub fn score(&self, table: &SourceTable, outcome: &LoadOutcome) -> Result<HealthReport> {
        let mut lifecycle = LifecycleManager::new(self.config, self.layout.clone());
        if let Some(today) = self.today {
            lifecycle = lifecycle.with_today(today);
        }
        let records = &outcome.records;
        let mut deficiencies = Vec::new();
        let mut recommendations = Vec::new();

        // Coverage
        let active_keys: BTreeSet<&str> = records.active().map(|r| r.key.as_str()).collect();
        let missing: Vec<&str> = active_keys
            .iter()
            .copied()
            .filter(|key| !host_vars_well_formed(&self.layout.host_vars_file(key)))
            .collect();
        let host_vars_ok = active_keys.len() - missing.len();
        if !missing.is_empty() {
            deficiencies.push(Deficiency {
                factor: HealthFactorKind::HostVarsCoverage,
                count: missing.len(),
                examples: examples(missing.iter().copied()),
                message: format!(
                    "{} active host(s) have a missing or unreadable host_vars file",
                    missing.len()
                ),
            });
            recommendations.push("Run 'invgen generate' to rebuild host_vars files".to_string());
        }

        // Orphans
        let known_keys = table.identity_keys(self.config.identity_key);
        let orphans = lifecycle.find_orphans(&known_keys)?;
        if !orphans.is_empty() {
            deficiencies.push(Deficiency {
                factor: HealthFactorKind::OrphanedFiles,
                count: orphans.len(),
                examples: examples(orphans.iter().map(|p| file_name(p))),
                message: format!(
                    "{} host_vars file(s) have no matching source row",
                    orphans.len()
                ),
            });
            recommendations
                .push("Run 'invgen lifecycle cleanup' to remove orphaned files".to_string());
        }

        // Validation
        let report = &outcome.report;
        if !report.is_valid() {
            deficiencies.push(Deficiency {
                factor: HealthFactorKind::ValidationErrors,
                count: report.error_count(),
                examples: examples(report.errors.iter().map(|i| i.to_string())),
                message: format!("source has {}", report.summary()),
            });
            recommendations
                .push("Run 'invgen validate' and fix the reported rows".to_string());
        }

        // Expired
        let expired = lifecycle.list_expired(records, None);
        if !expired.is_empty() {
            deficiencies.push(Deficiency {
                factor: HealthFactorKind::ExpiredHosts,
                count: expired.len(),
                examples: examples(expired.iter().map(|h| h.key.clone())),
                message: format!(
                    "{} decommissioned host(s) are past their grace period",
                    expired.len()
                ),
            });
            recommendations.push(
                "Run 'invgen lifecycle cleanup' to remove expired hosts".to_string(),
            );
        }

        // Group vars
        let expected_envs: BTreeSet<&str> =
            records.active().map(|r| r.environment.as_str()).collect();
        let missing_group_vars: Vec<String> = expected_envs
            .iter()
            .map(|env| self.layout.group_vars_file(env))
            .filter(|path| !path.exists())
            .map(|path| file_name(&path))
            .collect();
        let group_vars_present = expected_envs.len() - missing_group_vars.len();
        if !missing_group_vars.is_empty() {
            deficiencies.push(Deficiency {
                factor: HealthFactorKind::GroupVarsPresence,
                count: missing_group_vars.len(),
                examples: examples(missing_group_vars.iter().cloned()),
                message: format!(
                    "{} environment group_vars file(s) are missing",
                    missing_group_vars.len()
                ),
            });
            recommendations.push(format!(
                "Create the missing files under {}",
                self.layout.group_vars_dir.display()
            ));
        }

        let factors = vec![
            HealthFactor::new(
                HealthFactorKind::HostVarsCoverage,
                coverage_factor(host_vars_ok, active_keys.len()),
            ),
            HealthFactor::new(HealthFactorKind::OrphanedFiles, orphan_factor(orphans.len())),
            HealthFactor::new(
                HealthFactorKind::ValidationErrors,
                validation_factor(report.error_count()),
            ),
            HealthFactor::new(HealthFactorKind::ExpiredHosts, expired_factor(expired.len())),
            HealthFactor::new(
                HealthFactorKind::GroupVarsPresence,
                coverage_factor(group_vars_present, expected_envs.len()),
            ),
        ];

        let raw: f64 = factors.iter().map(HealthFactor::contribution).sum();
        let score = ((raw * 10.0).round() / 10.0).clamp(0.0, 100.0);
        let band = HealthBand::from_score(score);
        debug!("Health score {} ({})", score, band);

        Ok(HealthReport {
            score,
            band,
            checked_on: lifecycle.today(),
            factors,
            deficiencies,
            recommendations,
            counts: HealthCounts {
                total_records: records.len(),
                active_hosts: records.active().count(),
                decommissioned_hosts: records.decommissioned().count(),
                host_vars_ok,
                validation_errors: report.error_count(),
                validation_warnings: report.warnings.len(),
                orphaned_files: orphans.len(),
                expired_hosts: expired.len(),
                group_vars_expected: expected_envs.len(),
                group_vars_present,
            },
        })
    }
}
