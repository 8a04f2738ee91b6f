//! Top-level engine API.
//!
//! [`InventoryEngine`] owns the configuration and runs each command's
//! pipeline. Operations that rewrite the source table or the generated
//! artifacts hold the [`SourceLock`] from load to the last write; read-only
//! operations and dry runs never take it.

use crate::config::InventoryConfig;
use crate::groups::{GraphStats, GroupHierarchyBuilder};
use crate::health::{HealthReport, HealthScorer};
use crate::layout::ArtifactLayout;
use crate::lifecycle::{
    CleanupOptions, CleanupReport, DecommissionReport, DecommissionRequest, ExpiredHost,
    LifecycleManager,
};
use crate::loader::{LoadOutcome, SourceLoader, SourceTable};
use crate::lock::SourceLock;
use crate::writer::{ArtifactWriter, WriteCounts, WritePlan, WriteScope};
use crate::{InvgenError, Result};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{info, warn};

/// Options for [`InventoryEngine::generate`].
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    /// Limit output to these environments; empty means all.
    pub environments: Vec<String>,
    pub inventory_dir: Option<PathBuf>,
    pub host_vars_dir: Option<PathBuf>,
    pub dry_run: bool,
}

/// Result of a generate run.
#[derive(Debug, Clone, Serialize)]
pub struct GenerateReport {
    pub dry_run: bool,
    pub environments: BTreeMap<String, GraphStats>,
    pub totals: GraphStats,
    pub counts: WriteCounts,
    pub warnings: usize,
    pub plan: WritePlan,
}

/// Inventory generation and lifecycle engine.
pub struct InventoryEngine {
    config: InventoryConfig,
    today: Option<NaiveDate>,
}

impl InventoryEngine {
    pub fn new(config: InventoryConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            today: None,
        })
    }

    /// Pin the reference date for lifecycle and health decisions.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    pub fn config(&self) -> &InventoryConfig {
        &self.config
    }

    pub fn layout(&self) -> ArtifactLayout {
        ArtifactLayout::from_config(&self.config)
    }

    fn lifecycle(&self) -> LifecycleManager<'_> {
        let manager = LifecycleManager::new(&self.config, self.layout());
        match self.today {
            Some(today) => manager.with_today(today),
            None => manager,
        }
    }

    fn lock_unless(&self, dry_run: bool) -> Result<Option<SourceLock>> {
        if dry_run {
            return Ok(None);
        }
        SourceLock::acquire(&self.config.source_file, self.config.lock_timeout()).map(Some)
    }

    fn load(&self) -> Result<(SourceTable, LoadOutcome)> {
        SourceLoader::new(&self.config).load()
    }

    /// Load and validate the source. Never locks or writes.
    pub fn validate(&self) -> Result<LoadOutcome> {
        let (_, outcome) = self.load()?;
        Ok(outcome)
    }

    /// Run the full pipeline and write (or plan) the artifacts.
    ///
    /// Any validation error aborts the run before a single file is written.
    pub fn generate(&self, options: &GenerateOptions) -> Result<GenerateReport> {
        for env in &options.environments {
            if !self.config.is_known_environment(env) {
                return Err(InvgenError::Config {
                    message: format!(
                        "unknown environment '{}'; configured: {}",
                        env,
                        self.config.environments.join(", ")
                    ),
                });
            }
        }
        let scope = if options.environments.is_empty() {
            WriteScope::full()
        } else {
            WriteScope::environments(options.environments.iter().cloned())
        };

        let _lock = self.lock_unless(options.dry_run)?;
        let (table, outcome) = self.load()?;
        if !outcome.report.is_valid() {
            return Err(InvgenError::Validation {
                file: table.path().to_path_buf(),
                report: Box::new(outcome.report),
            });
        }

        let graphs = GroupHierarchyBuilder::new(&self.config).build(&outcome.records);
        let layout = self
            .layout()
            .with_output_dirs(options.inventory_dir.clone(), options.host_vars_dir.clone());
        let writer = ArtifactWriter::new(&self.config, layout);
        let known_keys = table.identity_keys(self.config.identity_key);
        let plan = writer.plan(&graphs, &outcome.records, &known_keys, &scope)?;

        let counts = if options.dry_run {
            info!("[DRY RUN] {} file(s) would change", plan.counts().changes());
            plan.counts()
        } else {
            writer.apply(&plan)?
        };

        let mut totals = GraphStats::default();
        let mut environments = BTreeMap::new();
        for (env, graph) in &graphs {
            if scope.includes(env) {
                let stats = graph.stats();
                totals.merge(&stats);
                environments.insert(env.clone(), stats);
            }
        }

        Ok(GenerateReport {
            dry_run: options.dry_run,
            environments,
            totals,
            counts,
            warnings: outcome.report.warnings.len(),
            plan,
        })
    }

    /// Score the current source and artifacts. Never locks or writes.
    pub fn health(&self) -> Result<HealthReport> {
        let (table, outcome) = self.load()?;
        let scorer = HealthScorer::new(&self.config, self.layout());
        let scorer = match self.today {
            Some(today) => scorer.with_today(today),
            None => scorer,
        };
        scorer.score(&table, &outcome)
    }

    /// Decommissioned hosts past their grace period. Never locks or writes.
    pub fn list_expired(&self, grace_override: Option<u32>) -> Result<Vec<ExpiredHost>> {
        let (_, outcome) = self.load()?;
        Ok(self.lifecycle().list_expired(&outcome.records, grace_override))
    }

    pub fn mark_decommission(&self, request: &DecommissionRequest) -> Result<DecommissionReport> {
        let _lock = self.lock_unless(request.dry_run)?;
        let (mut table, outcome) = self.load()?;
        self.warn_if_invalid(&outcome);
        self.lifecycle()
            .mark_decommission(&mut table, &outcome.records, request)
    }

    pub fn cleanup(&self, options: &CleanupOptions) -> Result<CleanupReport> {
        let _lock = self.lock_unless(options.dry_run)?;
        let (mut table, outcome) = self.load()?;
        self.warn_if_invalid(&outcome);
        self.lifecycle().cleanup(&mut table, &outcome.records, options)
    }

    fn warn_if_invalid(&self, outcome: &LoadOutcome) {
        if !outcome.report.is_valid() {
            warn!(
                "Source has {}; rows with errors are left untouched",
                outcome.report.summary()
            );
        }
    }
}
