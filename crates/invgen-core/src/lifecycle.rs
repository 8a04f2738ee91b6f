//! Host end-of-life management.
//!
//! A record moves `Active -> DecommissionedPending -> DecommissionedExpired ->
//! Removed`. Only two operations drive transitions: marking hosts for
//! decommission and cleaning up hosts whose grace period has run out.
//! Cleanup also removes orphaned host-vars files that no source row accounts
//! for.

use crate::config::InventoryConfig;
use crate::layout::ArtifactLayout;
use crate::loader::SourceTable;
use crate::model::{HostStatus, RecognizedField, Record, RecordSet};
use crate::writer::atomic::remove_if_exists;
use crate::Result;
use chrono::{Days, Local, NaiveDate};
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::LazyLock;
use tracing::{debug, info, warn};

/// Characters stripped from a decommission reason before it is logged.
static REASON_DISALLOWED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9 _-]").unwrap());

/// Lifecycle state of one host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Active,
    /// Decommissioned with no date, or still inside the grace period.
    DecommissionedPending,
    /// Decommissioned and past the grace period; eligible for cleanup.
    DecommissionedExpired,
    /// No longer in the source table.
    Removed,
}

/// A decommissioned host past its grace period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExpiredHost {
    pub key: String,
    pub environment: String,
    pub row: usize,
    pub decommission_date: NaiveDate,
    pub expiry_date: NaiveDate,
    pub days_expired: i64,
    pub grace_days: u32,
    pub host_vars_present: bool,
}

/// Input for [`LifecycleManager::mark_decommission`].
#[derive(Debug, Clone)]
pub struct DecommissionRequest {
    pub keys: Vec<String>,
    pub date: NaiveDate,
    pub reason: Option<String>,
    pub dry_run: bool,
}

/// Outcome for one requested key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecommissionResult {
    pub key: String,
    /// Environments in which the host was (or would be) marked.
    pub environments: Vec<String>,
    pub rows: Vec<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DecommissionResult {
    fn failed(key: &str, message: String) -> Self {
        Self {
            key: key.to_string(),
            environments: Vec::new(),
            rows: Vec::new(),
            error: Some(message),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Per-key results of a mark-decommission run.
#[derive(Debug, Clone, Serialize)]
pub struct DecommissionReport {
    pub date: NaiveDate,
    pub reason: String,
    pub dry_run: bool,
    pub source_rewritten: bool,
    pub results: Vec<DecommissionResult>,
}

impl DecommissionReport {
    pub fn marked_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_ok()).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &DecommissionResult> {
        self.results.iter().filter(|r| !r.is_ok())
    }
}

/// Options for [`LifecycleManager::cleanup`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CleanupOptions {
    pub dry_run: bool,
    /// Grace period used for every environment instead of the configured table.
    pub grace_override: Option<u32>,
    /// Remove at most this many expired hosts, oldest first.
    pub max_hosts: Option<usize>,
}

/// What a cleanup run removed (or would remove, for a dry run).
#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanupReport {
    pub dry_run: bool,
    pub removed_hosts: Vec<ExpiredHost>,
    /// Expired hosts left in place because of `max_hosts`.
    pub deferred_hosts: Vec<ExpiredHost>,
    pub deleted_host_vars: Vec<PathBuf>,
    pub orphaned_files: Vec<PathBuf>,
    pub source_rewritten: bool,
    pub errors: Vec<String>,
}

impl CleanupReport {
    /// Hosts plus orphan files removed; zero means nothing to do.
    pub fn total_removals(&self) -> usize {
        self.removed_hosts.len() + self.orphaned_files.len()
    }
}

/// Computes lifecycle state and applies lifecycle transitions.
pub struct LifecycleManager<'a> {
    config: &'a InventoryConfig,
    layout: ArtifactLayout,
    today: NaiveDate,
}

impl<'a> LifecycleManager<'a> {
    pub fn new(config: &'a InventoryConfig, layout: ArtifactLayout) -> Self {
        Self {
            config,
            layout,
            today: Local::now().date_naive(),
        }
    }

    /// Pin the reference date.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn today(&self) -> NaiveDate {
        self.today
    }

    fn grace_for(&self, environment: &str, grace_override: Option<u32>) -> u32 {
        grace_override.unwrap_or_else(|| self.config.grace_days(environment))
    }

    fn expiry_date(date: NaiveDate, grace_days: u32) -> NaiveDate {
        date.checked_add_days(Days::new(u64::from(grace_days)))
            .unwrap_or(NaiveDate::MAX)
    }

    /// State of one record.
    pub fn state_of(&self, record: &Record, grace_override: Option<u32>) -> LifecycleState {
        if record.is_active() {
            return LifecycleState::Active;
        }
        match record.decommission_date {
            None => LifecycleState::DecommissionedPending,
            Some(date) => {
                let grace = self.grace_for(&record.environment, grace_override);
                if Self::expiry_date(date, grace) <= self.today {
                    LifecycleState::DecommissionedExpired
                } else {
                    LifecycleState::DecommissionedPending
                }
            }
        }
    }

    /// State of a key in an environment; `Removed` when no record exists.
    pub fn state_of_key(&self, records: &RecordSet, key: &str, environment: &str) -> LifecycleState {
        records
            .find_by_key(key)
            .find(|r| r.environment == environment)
            .map_or(LifecycleState::Removed, |r| self.state_of(r, None))
    }

    /// Every decommissioned record past its grace period, oldest first.
    pub fn list_expired(&self, records: &RecordSet, grace_override: Option<u32>) -> Vec<ExpiredHost> {
        let mut expired: Vec<ExpiredHost> = records
            .decommissioned()
            .filter(|r| self.state_of(r, grace_override) == LifecycleState::DecommissionedExpired)
            .filter_map(|r| {
                let date = r.decommission_date?;
                let grace_days = self.grace_for(&r.environment, grace_override);
                let expiry_date = Self::expiry_date(date, grace_days);
                Some(ExpiredHost {
                    key: r.key.clone(),
                    environment: r.environment.clone(),
                    row: r.row,
                    decommission_date: date,
                    expiry_date,
                    days_expired: (self.today - expiry_date).num_days(),
                    grace_days,
                    host_vars_present: self.layout.host_vars_file(&r.key).exists(),
                })
            })
            .collect();
        expired.sort_by(|a, b| {
            (a.decommission_date, &a.environment, &a.key).cmp(&(
                b.decommission_date,
                &b.environment,
                &b.key,
            ))
        });
        debug!("{} expired host(s) as of {}", expired.len(), self.today);
        expired
    }

    /// Host-vars files whose name matches no key in `known_keys`.
    pub fn find_orphans(&self, known_keys: &BTreeSet<String>) -> Result<Vec<PathBuf>> {
        let expected: BTreeSet<String> = known_keys
            .iter()
            .map(|k| ArtifactLayout::host_vars_file_name(k))
            .collect();
        Ok(self
            .layout
            .host_vars_files()?
            .into_iter()
            .filter(|(name, _)| !expected.contains(name))
            .map(|(_, path)| path)
            .collect())
    }

    /// Mark active hosts as decommissioned on `request.date`.
    ///
    /// Each key is handled on its own: an unknown key, an already
    /// decommissioned host or a past date fails that key only. The source
    /// table is rewritten once, and only when something was marked outside a
    /// dry run.
    pub fn mark_decommission(
        &self,
        table: &mut SourceTable,
        records: &RecordSet,
        request: &DecommissionRequest,
    ) -> Result<DecommissionReport> {
        let reason = sanitize_reason(request.reason.as_deref().unwrap_or_default());
        let mut seen = BTreeSet::new();
        let mut results = Vec::new();
        let mut changes: Vec<usize> = Vec::new();

        for key in &request.keys {
            let key = key.trim();
            if !seen.insert(key.to_string()) {
                continue;
            }
            if request.date < self.today {
                results.push(DecommissionResult::failed(
                    key,
                    format!(
                        "decommission date {} is before today ({})",
                        request.date, self.today
                    ),
                ));
                continue;
            }

            let matches: Vec<&Record> = records.find_by_key(key).collect();
            let active: Vec<&Record> = matches.iter().copied().filter(|r| r.is_active()).collect();
            if matches.is_empty() {
                results.push(DecommissionResult::failed(
                    key,
                    "host not found in source".to_string(),
                ));
                continue;
            }
            if active.is_empty() {
                results.push(DecommissionResult::failed(
                    key,
                    "host is already decommissioned".to_string(),
                ));
                continue;
            }

            for record in &active {
                info!(
                    "{}Decommissioning {} ({}) as of {}. Reason: {}",
                    if request.dry_run { "[DRY RUN] " } else { "" },
                    record.key,
                    record.environment,
                    request.date,
                    if reason.is_empty() { "-" } else { reason.as_str() }
                );
                changes.push(record.row);
            }
            results.push(DecommissionResult {
                key: key.to_string(),
                environments: active.iter().map(|r| r.environment.clone()).collect(),
                rows: active.iter().map(|r| r.row).collect(),
                error: None,
            });
        }

        for failure in results.iter().filter(|r| !r.is_ok()) {
            warn!(
                "Cannot decommission {}: {}",
                failure.key,
                failure.error.as_deref().unwrap_or_default()
            );
        }

        let mut source_rewritten = false;
        if !request.dry_run && !changes.is_empty() {
            let status_column = table.ensure_field(RecognizedField::Status);
            let date_column = table.ensure_field(RecognizedField::DecommissionDate);
            let date_text = request.date.format("%Y-%m-%d").to_string();
            for row in &changes {
                table.set_cell(*row, status_column, HostStatus::Decommissioned.as_str());
                table.set_cell(*row, date_column, &date_text);
            }
            table.write(self.config.keep_source_backup)?;
            source_rewritten = true;
        }

        Ok(DecommissionReport {
            date: request.date,
            reason,
            dry_run: request.dry_run,
            source_rewritten,
            results,
        })
    }

    /// Remove expired hosts and orphaned host-vars files.
    ///
    /// The source is rewritten before any file is deleted, so an interrupted
    /// run can only leave files behind, never rows pointing at deleted files.
    /// File deletion failures are collected and do not stop the run.
    pub fn cleanup(
        &self,
        table: &mut SourceTable,
        records: &RecordSet,
        options: &CleanupOptions,
    ) -> Result<CleanupReport> {
        let mut expired = self.list_expired(records, options.grace_override);
        let deferred = match options.max_hosts {
            Some(limit) if expired.len() > limit => expired.split_off(limit),
            _ => Vec::new(),
        };
        if !deferred.is_empty() {
            info!(
                "Limiting cleanup to {} host(s); {} deferred",
                expired.len(),
                deferred.len()
            );
        }

        let removed_rows: BTreeSet<usize> = expired.iter().map(|h| h.row).collect();
        let remaining_keys: BTreeSet<String> = table
            .rows()
            .iter()
            .filter(|row| !removed_rows.contains(&row.number))
            .filter_map(|row| table.row_identity(row, self.config.identity_key))
            .map(str::to_string)
            .collect();

        let mut deleted_host_vars = Vec::new();
        for host in &expired {
            let path = self.layout.host_vars_file(&host.key);
            if remaining_keys.contains(&host.key) {
                debug!("Keeping {}: key still used by another row", path.display());
            } else if path.exists() && !deleted_host_vars.contains(&path) {
                deleted_host_vars.push(path);
            }
        }

        let orphaned_files: Vec<PathBuf> = self
            .find_orphans(&remaining_keys)?
            .into_iter()
            .filter(|p| !deleted_host_vars.contains(p))
            .collect();

        let mut report = CleanupReport {
            dry_run: options.dry_run,
            removed_hosts: expired,
            deferred_hosts: deferred,
            deleted_host_vars,
            orphaned_files,
            source_rewritten: false,
            errors: Vec::new(),
        };

        if options.dry_run {
            info!(
                "[DRY RUN] Would remove {} expired host(s) and {} orphaned file(s)",
                report.removed_hosts.len(),
                report.orphaned_files.len()
            );
            return Ok(report);
        }

        if !removed_rows.is_empty() {
            table.remove_rows(&removed_rows);
            table.write(self.config.keep_source_backup)?;
            report.source_rewritten = true;
        }

        for path in report
            .deleted_host_vars
            .iter()
            .chain(report.orphaned_files.iter())
        {
            if let Err(e) = remove_if_exists(path) {
                warn!("{}", e);
                report.errors.push(e.to_string());
            }
        }

        info!(
            "Cleanup removed {} expired host(s) and {} orphaned file(s)",
            report.removed_hosts.len(),
            report.orphaned_files.len()
        );
        Ok(report)
    }
}

/// Keep only `[a-zA-Z0-9 _-]` from a free-text reason.
pub fn sanitize_reason(reason: &str) -> String {
    REASON_DISALLOWED.replace_all(reason, "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::Validator;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 6, 1).unwrap()
    }

    fn days_ago(days: u64) -> String {
        today()
            .checked_sub_days(Days::new(days))
            .unwrap()
            .format("%Y-%m-%d")
            .to_string()
    }

    struct Fixture {
        _dir: TempDir,
        config: InventoryConfig,
        layout: ArtifactLayout,
    }

    impl Fixture {
        fn new(csv: &str) -> Self {
            let dir = TempDir::new().unwrap();
            let config = InventoryConfig::default().with_base_dir(dir.path());
            fs::create_dir_all(config.source_file.parent().unwrap()).unwrap();
            fs::write(&config.source_file, csv).unwrap();
            let layout = ArtifactLayout::from_config(&config);
            Self {
                _dir: dir,
                config,
                layout,
            }
        }

        fn load(&self) -> (SourceTable, RecordSet) {
            let table = SourceTable::read(&self.config.source_file).unwrap();
            let outcome = Validator::new(&self.config).validate(&table);
            assert!(outcome.report.is_valid(), "{:?}", outcome.report.errors);
            (table, outcome.records)
        }

        fn manager(&self) -> LifecycleManager<'_> {
            LifecycleManager::new(&self.config, self.layout.clone()).with_today(today())
        }

        fn touch_host_vars(&self, key: &str) -> PathBuf {
            fs::create_dir_all(&self.layout.host_vars_dir).unwrap();
            let path = self.layout.host_vars_file(key);
            fs::write(&path, "---\n").unwrap();
            path
        }
    }

    #[test]
    fn test_states() {
        let fixture = Fixture::new(&format!(
            "hostname,environment,status,decommission_date\n\
             web01,production,active,\n\
             web02,production,decommissioned,\n\
             web03,production,decommissioned,{}\n\
             web04,production,decommissioned,{}\n\
             web05,production,decommissioned,{}\n",
            days_ago(10),
            days_ago(90),
            days_ago(100)
        ));
        let (_, records) = fixture.load();
        let manager = fixture.manager();
        let state = |key: &str| manager.state_of_key(&records, key, "production");

        assert_eq!(state("web01"), LifecycleState::Active);
        assert_eq!(state("web02"), LifecycleState::DecommissionedPending);
        assert_eq!(state("web03"), LifecycleState::DecommissionedPending);
        assert_eq!(state("web04"), LifecycleState::DecommissionedExpired);
        assert_eq!(state("web05"), LifecycleState::DecommissionedExpired);
        assert_eq!(state("web99"), LifecycleState::Removed);
    }

    #[test]
    fn test_list_expired_uses_grace_table_and_override() {
        let fixture = Fixture::new(&format!(
            "hostname,environment,status,decommission_date\n\
             prod01,production,decommissioned,{}\n\
             dev01,development,decommissioned,{}\n",
            days_ago(30),
            days_ago(30)
        ));
        let (_, records) = fixture.load();
        let manager = fixture.manager();

        let expired = manager.list_expired(&records, None);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].key, "dev01");
        assert_eq!(expired[0].grace_days, 7);
        assert_eq!(expired[0].days_expired, 23);

        assert_eq!(manager.list_expired(&records, Some(0)).len(), 2);
    }

    #[test]
    fn test_cleanup_removes_expired_and_is_idempotent() {
        let fixture = Fixture::new(&format!(
            "hostname,environment,status,decommission_date,owner\n\
             web01,production,active,,ops\n\
             old01,production,decommissioned,{},ops\n",
            days_ago(100)
        ));
        let web_vars = fixture.touch_host_vars("web01");
        let old_vars = fixture.touch_host_vars("old01");
        let ghost_vars = fixture.touch_host_vars("ghost01");

        let (mut table, records) = fixture.load();
        let report = fixture
            .manager()
            .cleanup(&mut table, &records, &CleanupOptions::default())
            .unwrap();
        assert_eq!(report.removed_hosts.len(), 1);
        assert_eq!(report.deleted_host_vars, vec![old_vars.clone()]);
        assert_eq!(report.orphaned_files, vec![ghost_vars.clone()]);
        assert!(report.source_rewritten);
        assert!(web_vars.exists());
        assert!(!old_vars.exists());
        assert!(!ghost_vars.exists());

        let text = fs::read_to_string(&fixture.config.source_file).unwrap();
        assert!(!text.contains("old01"));
        assert!(text.contains("web01,production,active,,ops"));

        let (mut table, records) = fixture.load();
        let again = fixture
            .manager()
            .cleanup(&mut table, &records, &CleanupOptions::default())
            .unwrap();
        assert_eq!(again.total_removals(), 0);
        assert!(!again.source_rewritten);
    }

    #[test]
    fn test_cleanup_dry_run_changes_nothing() {
        let fixture = Fixture::new(&format!(
            "hostname,environment,status,decommission_date\nold01,test,decommissioned,{}\n",
            days_ago(100)
        ));
        let old_vars = fixture.touch_host_vars("old01");
        let before = fs::read(&fixture.config.source_file).unwrap();

        let (mut table, records) = fixture.load();
        let options = CleanupOptions {
            dry_run: true,
            ..CleanupOptions::default()
        };
        let report = fixture.manager().cleanup(&mut table, &records, &options).unwrap();
        assert_eq!(report.removed_hosts.len(), 1);
        assert!(old_vars.exists());
        assert_eq!(fs::read(&fixture.config.source_file).unwrap(), before);
    }

    #[test]
    fn test_cleanup_max_hosts_takes_oldest() {
        let fixture = Fixture::new(&format!(
            "hostname,environment,status,decommission_date\n\
             a01,test,decommissioned,{}\n\
             b01,test,decommissioned,{}\n",
            days_ago(20),
            days_ago(40)
        ));
        let (mut table, records) = fixture.load();
        let options = CleanupOptions {
            max_hosts: Some(1),
            ..CleanupOptions::default()
        };
        let report = fixture.manager().cleanup(&mut table, &records, &options).unwrap();
        assert_eq!(report.removed_hosts[0].key, "b01");
        assert_eq!(report.deferred_hosts[0].key, "a01");
    }

    #[test]
    fn test_shared_key_keeps_host_vars() {
        let fixture = Fixture::new(&format!(
            "hostname,environment,status,decommission_date\n\
             web01,production,active,\n\
             web01,test,decommissioned,{}\n",
            days_ago(100)
        ));
        let vars = fixture.touch_host_vars("web01");
        let (mut table, records) = fixture.load();
        let report = fixture
            .manager()
            .cleanup(&mut table, &records, &CleanupOptions::default())
            .unwrap();
        assert_eq!(report.removed_hosts.len(), 1);
        assert!(report.deleted_host_vars.is_empty());
        assert!(vars.exists());
    }

    #[test]
    fn test_mark_decommission_per_key_outcomes() {
        let fixture = Fixture::new(
            "hostname,environment,status\n\
             web01,production,active\n\
             web02,production,decommissioned\n",
        );
        let (mut table, records) = fixture.load();
        let request = DecommissionRequest {
            keys: vec!["web01".into(), "web02".into(), "nope".into()],
            date: today(),
            reason: Some("EOL; replaced by web11!".into()),
            dry_run: false,
        };
        let report = fixture
            .manager()
            .mark_decommission(&mut table, &records, &request)
            .unwrap();

        assert_eq!(report.reason, "EOL replaced by web11");
        assert_eq!(report.marked_count(), 1);
        assert_eq!(report.failures().count(), 2);
        assert!(report.source_rewritten);

        let text = fs::read_to_string(&fixture.config.source_file).unwrap();
        assert!(text.starts_with("hostname,environment,status,decommission_date\n"));
        assert!(text.contains("web01,production,decommissioned,2026-06-01"));
        assert!(Path::new(&format!("{}.bak", fixture.config.source_file.display())).exists());
    }

    #[test]
    fn test_mark_decommission_rejects_past_date_and_dry_run_writes_nothing() {
        let fixture = Fixture::new("hostname,environment,status\nweb01,production,active\n");
        let before = fs::read(&fixture.config.source_file).unwrap();
        let (mut table, records) = fixture.load();

        let past = DecommissionRequest {
            keys: vec!["web01".into()],
            date: today().pred_opt().unwrap(),
            reason: None,
            dry_run: false,
        };
        let report = fixture
            .manager()
            .mark_decommission(&mut table, &records, &past)
            .unwrap();
        assert_eq!(report.marked_count(), 0);
        assert!(!report.source_rewritten);

        let preview = DecommissionRequest {
            date: today(),
            dry_run: true,
            ..past
        };
        let report = fixture
            .manager()
            .mark_decommission(&mut table, &records, &preview)
            .unwrap();
        assert_eq!(report.marked_count(), 1);
        assert!(!report.source_rewritten);
        assert_eq!(fs::read(&fixture.config.source_file).unwrap(), before);
    }

    #[test]
    fn test_sanitize_reason() {
        assert_eq!(sanitize_reason("  hw <failure> #42 "), "hw failure 42");
        assert_eq!(sanitize_reason(""), "");
    }
}
