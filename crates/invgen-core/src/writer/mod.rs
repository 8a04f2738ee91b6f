//! Artifact writer.
//!
//! Generation is split into a pure planning step, which renders every target
//! and compares it with what is on disk, and an apply step that performs the
//! planned creates, updates and deletes. Dry runs stop after planning.

pub mod atomic;
pub mod render;

use crate::config::InventoryConfig;
use crate::groups::GroupGraph;
use crate::layout::ArtifactLayout;
use crate::model::{Record, RecordSet};
use crate::Result;
use atomic::{atomic_write, read_if_exists, remove_if_exists};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// What will happen to one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteAction {
    Create,
    Update,
    Unchanged,
    Delete,
}

/// Which artifact a planned write concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Inventory,
    HostVars,
}

/// One planned file operation.
#[derive(Debug, Clone, Serialize)]
pub struct PlannedWrite {
    pub path: PathBuf,
    pub kind: ArtifactKind,
    pub action: WriteAction,
    #[serde(skip)]
    pub content: Option<String>,
}

/// Planned-action counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriteCounts {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub deleted: usize,
}

impl WriteCounts {
    /// Files that would be touched.
    pub fn changes(&self) -> usize {
        self.created + self.updated + self.deleted
    }
}

/// Full set of planned file operations, ordered by path.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WritePlan {
    pub entries: Vec<PlannedWrite>,
}

impl WritePlan {
    pub fn counts(&self) -> WriteCounts {
        let mut counts = WriteCounts::default();
        for entry in &self.entries {
            match entry.action {
                WriteAction::Create => counts.created += 1,
                WriteAction::Update => counts.updated += 1,
                WriteAction::Unchanged => counts.unchanged += 1,
                WriteAction::Delete => counts.deleted += 1,
            }
        }
        counts
    }

    /// Entries that change the disk.
    pub fn changes(&self) -> impl Iterator<Item = &PlannedWrite> {
        self.entries
            .iter()
            .filter(|e| e.action != WriteAction::Unchanged)
    }
}

/// Which part of the output a generate run owns.
#[derive(Debug, Clone, Default)]
pub struct WriteScope {
    /// Selected environments; `None` means a full run over every configured
    /// environment.
    pub environments: Option<BTreeSet<String>>,
}

impl WriteScope {
    pub fn full() -> Self {
        Self::default()
    }

    pub fn environments<I, S>(environments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            environments: Some(environments.into_iter().map(Into::into).collect()),
        }
    }

    pub fn is_full(&self) -> bool {
        self.environments.is_none()
    }

    pub fn includes(&self, environment: &str) -> bool {
        self.environments
            .as_ref()
            .map_or(true, |envs| envs.contains(environment))
    }
}

/// Serializes group graphs and host variables into the artifact layout.
pub struct ArtifactWriter<'a> {
    config: &'a InventoryConfig,
    layout: ArtifactLayout,
}

impl<'a> ArtifactWriter<'a> {
    pub fn new(config: &'a InventoryConfig, layout: ArtifactLayout) -> Self {
        Self { config, layout }
    }

    pub fn layout(&self) -> &ArtifactLayout {
        &self.layout
    }

    /// Compute every file operation without touching the disk.
    ///
    /// `known_keys` holds the identity of every row in the source, whatever
    /// its status; host-vars files for those keys are never deleted here.
    pub fn plan(
        &self,
        graphs: &BTreeMap<String, GroupGraph>,
        records: &RecordSet,
        known_keys: &BTreeSet<String>,
        scope: &WriteScope,
    ) -> Result<WritePlan> {
        let mut entries = Vec::new();

        for environment in &self.config.environments {
            if !scope.includes(environment) {
                continue;
            }
            let path = self.layout.inventory_file(environment);
            match graphs.get(environment) {
                Some(graph) => {
                    let content = render::render_inventory(graph)?;
                    entries.push(self.plan_file(path, ArtifactKind::Inventory, content)?);
                }
                None if path.exists() => {
                    debug!("Environment {} has no active hosts", environment);
                    entries.push(PlannedWrite {
                        path,
                        kind: ArtifactKind::Inventory,
                        action: WriteAction::Delete,
                        content: None,
                    });
                }
                None => {}
            }
        }

        for record in self.host_vars_owners(records, scope) {
            let path = self.layout.host_vars_file(&record.key);
            let content = render::render_host_vars(record, self.config)?;
            entries.push(self.plan_file(path, ArtifactKind::HostVars, content)?);
        }

        if scope.is_full() {
            let expected: BTreeSet<String> = known_keys
                .iter()
                .map(|k| ArtifactLayout::host_vars_file_name(k))
                .collect();
            for (name, path) in self.layout.host_vars_files()? {
                if !expected.contains(&name) {
                    entries.push(PlannedWrite {
                        path,
                        kind: ArtifactKind::HostVars,
                        action: WriteAction::Delete,
                        content: None,
                    });
                }
            }
        }

        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(WritePlan { entries })
    }

    /// Active records that get a host-vars file, one per key.
    ///
    /// A key active in several environments maps to a single file; the
    /// environment that sorts first wins.
    fn host_vars_owners<'r>(&self, records: &'r RecordSet, scope: &WriteScope) -> Vec<&'r Record> {
        let mut owners: BTreeMap<&str, &Record> = BTreeMap::new();
        for record in records.active().filter(|r| scope.includes(&r.environment)) {
            match owners.get(record.key.as_str()) {
                Some(&existing) => {
                    warn!(
                        "Host {} is active in both {} and {}; host_vars follow {}",
                        record.key,
                        existing.environment,
                        record.environment,
                        existing.environment.as_str().min(record.environment.as_str())
                    );
                    if record.environment < existing.environment {
                        owners.insert(record.key.as_str(), record);
                    }
                }
                None => {
                    owners.insert(record.key.as_str(), record);
                }
            }
        }
        owners.into_values().collect()
    }

    fn plan_file(&self, path: PathBuf, kind: ArtifactKind, content: String) -> Result<PlannedWrite> {
        let action = match read_if_exists(&path)? {
            None => WriteAction::Create,
            Some(existing) if existing == content.as_bytes() => WriteAction::Unchanged,
            Some(_) => WriteAction::Update,
        };
        Ok(PlannedWrite {
            path,
            kind,
            action,
            content: Some(content),
        })
    }

    /// Carry out a plan. Unchanged files are not touched.
    pub fn apply(&self, plan: &WritePlan) -> Result<WriteCounts> {
        for entry in plan.changes() {
            match (entry.action, &entry.content) {
                (WriteAction::Create | WriteAction::Update, Some(content)) => {
                    atomic_write(&entry.path, content.as_bytes(), false)?;
                }
                (WriteAction::Delete, _) => {
                    remove_if_exists(&entry.path)?;
                }
                _ => {}
            }
        }
        let counts = plan.counts();
        info!(
            "Wrote artifacts: {} created, {} updated, {} deleted, {} unchanged",
            counts.created, counts.updated, counts.deleted, counts.unchanged
        );
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::groups::GroupHierarchyBuilder;
    use crate::model::HostStatus;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn setup(root: &Path) -> (InventoryConfig, ArtifactLayout) {
        let config = InventoryConfig::default().with_base_dir(root);
        let layout = ArtifactLayout::from_config(&config);
        (config, layout)
    }

    fn records() -> RecordSet {
        let mut web = Record::new(2, "web01", "production", HostStatus::Active);
        web.application_service = Some("shop".into());
        RecordSet::new(vec![
            web,
            Record::new(3, "db01", "test", HostStatus::Active),
            Record::new(4, "old01", "test", HostStatus::Decommissioned),
        ])
    }

    fn known(records: &RecordSet) -> BTreeSet<String> {
        records.keys().into_iter().map(str::to_string).collect()
    }

    #[test]
    fn test_plan_then_apply_then_unchanged() {
        let temp_dir = TempDir::new().unwrap();
        let (config, layout) = setup(temp_dir.path());
        let records = records();
        let graphs = GroupHierarchyBuilder::new(&config).build(&records);
        let writer = ArtifactWriter::new(&config, layout.clone());

        let plan = writer
            .plan(&graphs, &records, &known(&records), &WriteScope::full())
            .unwrap();
        let counts = plan.counts();
        assert_eq!(counts.created, 4);
        assert_eq!(counts.changes(), 4);
        assert!(!layout.inventory_file("production").exists());

        writer.apply(&plan).unwrap();
        assert!(layout.inventory_file("production").exists());
        assert!(layout.host_vars_file("db01").exists());
        assert!(!layout.host_vars_file("old01").exists());

        let again = writer
            .plan(&graphs, &records, &known(&records), &WriteScope::full())
            .unwrap();
        assert_eq!(again.counts().unchanged, 4);
        assert_eq!(again.counts().changes(), 0);
    }

    #[test]
    fn test_unknown_host_vars_deleted_on_full_run_only() {
        let temp_dir = TempDir::new().unwrap();
        let (config, layout) = setup(temp_dir.path());
        fs::create_dir_all(&layout.host_vars_dir).unwrap();
        fs::write(layout.host_vars_file("ghost01"), "---\n").unwrap();
        fs::write(layout.host_vars_file("old01"), "---\n").unwrap();

        let records = records();
        let graphs = GroupHierarchyBuilder::new(&config).build(&records);
        let writer = ArtifactWriter::new(&config, layout.clone());

        let partial = writer
            .plan(&graphs, &records, &known(&records), &WriteScope::environments(["test"]))
            .unwrap();
        assert_eq!(partial.counts().deleted, 0);

        let full = writer
            .plan(&graphs, &records, &known(&records), &WriteScope::full())
            .unwrap();
        let deleted: Vec<_> = full
            .entries
            .iter()
            .filter(|e| e.action == WriteAction::Delete)
            .map(|e| e.path.clone())
            .collect();
        assert_eq!(deleted, vec![layout.host_vars_file("ghost01")]);
    }

    #[test]
    fn test_empty_environment_inventory_deleted() {
        let temp_dir = TempDir::new().unwrap();
        let (config, layout) = setup(temp_dir.path());
        fs::create_dir_all(&layout.inventory_dir).unwrap();
        fs::write(layout.inventory_file("acceptance"), "---\n").unwrap();

        let records = records();
        let graphs = GroupHierarchyBuilder::new(&config).build(&records);
        let writer = ArtifactWriter::new(&config, layout.clone());
        let plan = writer
            .plan(&graphs, &records, &known(&records), &WriteScope::full())
            .unwrap();
        writer.apply(&plan).unwrap();
        assert!(!layout.inventory_file("acceptance").exists());
    }

    #[test]
    fn test_scope_limits_output() {
        let temp_dir = TempDir::new().unwrap();
        let (config, layout) = setup(temp_dir.path());
        let records = records();
        let graphs = GroupHierarchyBuilder::new(&config).build(&records);
        let writer = ArtifactWriter::new(&config, layout);

        let plan = writer
            .plan(&graphs, &records, &known(&records), &WriteScope::environments(["production"]))
            .unwrap();
        assert_eq!(plan.entries.len(), 2);
        assert!(plan.entries.iter().all(|e| e.path.to_string_lossy().contains("production")
            || e.path.to_string_lossy().contains("web01")));
    }
}
