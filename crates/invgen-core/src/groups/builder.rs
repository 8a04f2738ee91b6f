//! Group hierarchy derivation.
//!
//! One [`GroupGraph`] is built per environment from the active records only.
//! Every collection is ordered by name, so the graph (and anything serialized
//! from it) does not depend on source row order.

use super::naming::group_name;
use crate::config::InventoryConfig;
use crate::model::{Record, RecordSet};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Dimension a group is derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupKind {
    Environment,
    Application,
    Product,
    Site,
    Dashboard,
    Batch,
}

impl GroupKind {
    pub const ALL: [GroupKind; 6] = [
        GroupKind::Environment,
        GroupKind::Application,
        GroupKind::Product,
        GroupKind::Site,
        GroupKind::Dashboard,
        GroupKind::Batch,
    ];

    pub fn prefix(&self) -> &'static str {
        match self {
            GroupKind::Environment => "env",
            GroupKind::Application => "app",
            GroupKind::Product => "product",
            GroupKind::Site => "site",
            GroupKind::Dashboard => "dashboard",
            GroupKind::Batch => "batch",
        }
    }
}

impl std::fmt::Display for GroupKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.prefix())
    }
}

/// A named set of hosts plus its child groups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Group {
    pub name: String,
    pub kind: GroupKind,
    pub members: BTreeSet<String>,
    pub children: BTreeSet<String>,
}

impl Group {
    fn new(name: String, kind: GroupKind) -> Self {
        Self {
            name,
            kind,
            members: BTreeSet::new(),
            children: BTreeSet::new(),
        }
    }
}

/// Group counts per kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GraphStats {
    pub hosts: usize,
    pub environment_groups: usize,
    pub application_groups: usize,
    pub product_groups: usize,
    pub site_groups: usize,
    pub dashboard_groups: usize,
    pub batch_groups: usize,
}

impl GraphStats {
    pub fn total_groups(&self) -> usize {
        self.environment_groups
            + self.application_groups
            + self.product_groups
            + self.site_groups
            + self.dashboard_groups
            + self.batch_groups
    }

    pub fn merge(&mut self, other: &GraphStats) {
        self.hosts += other.hosts;
        self.environment_groups += other.environment_groups;
        self.application_groups += other.application_groups;
        self.product_groups += other.product_groups;
        self.site_groups += other.site_groups;
        self.dashboard_groups += other.dashboard_groups;
        self.batch_groups += other.batch_groups;
    }
}

/// Every group derived for one environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupGraph {
    environment: String,
    groups: BTreeMap<String, Group>,
}

impl GroupGraph {
    fn new(environment: &str) -> Self {
        let mut graph = Self {
            environment: environment.to_string(),
            groups: BTreeMap::new(),
        };
        let name = graph.environment_group_name();
        graph
            .groups
            .insert(name.clone(), Group::new(name, GroupKind::Environment));
        graph
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn environment_group_name(&self) -> String {
        group_name(GroupKind::Environment, &self.environment)
    }

    pub fn get(&self, name: &str) -> Option<&Group> {
        self.groups.get(name)
    }

    /// Groups in name order.
    pub fn groups(&self) -> impl Iterator<Item = &Group> {
        self.groups.values()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Every host that is a member of any group.
    pub fn hosts(&self) -> BTreeSet<&str> {
        self.groups
            .values()
            .flat_map(|g| g.members.iter().map(String::as_str))
            .collect()
    }

    pub fn stats(&self) -> GraphStats {
        let mut stats = GraphStats {
            hosts: self.hosts().len(),
            ..GraphStats::default()
        };
        for group in self.groups.values() {
            let slot = match group.kind {
                GroupKind::Environment => &mut stats.environment_groups,
                GroupKind::Application => &mut stats.application_groups,
                GroupKind::Product => &mut stats.product_groups,
                GroupKind::Site => &mut stats.site_groups,
                GroupKind::Dashboard => &mut stats.dashboard_groups,
                GroupKind::Batch => &mut stats.batch_groups,
            };
            *slot += 1;
        }
        stats
    }

    /// Insert the group if absent, add `key` as a member and, if requested,
    /// register the group as a child of the environment group.
    fn add_member(&mut self, kind: GroupKind, value: &str, key: &str, nest: bool) {
        let name = group_name(kind, value);
        self.groups
            .entry(name.clone())
            .or_insert_with(|| Group::new(name.clone(), kind))
            .members
            .insert(key.to_string());

        if nest {
            let env_name = self.environment_group_name();
            if let Some(env_group) = self.groups.get_mut(&env_name) {
                env_group.children.insert(name);
            }
        }
    }

    fn add_record(&mut self, record: &Record, nest_products: bool) {
        let key = record.key.as_str();
        let environment = self.environment.clone();
        self.add_member(GroupKind::Environment, &environment, key, false);

        if let Some(app) = &record.application_service {
            self.add_member(GroupKind::Application, app, key, true);
        }
        if let Some(site) = &record.site_code {
            self.add_member(GroupKind::Site, site, key, true);
        }
        if let Some(dashboard) = &record.dashboard_group {
            self.add_member(GroupKind::Dashboard, dashboard, key, true);
        }
        if let Some(batch) = record.batch_number {
            self.add_member(GroupKind::Batch, &batch.to_string(), key, true);
        }
        for product in &record.products {
            self.add_member(GroupKind::Product, product, key, nest_products);
        }
    }
}

/// Builds one [`GroupGraph`] per environment.
pub struct GroupHierarchyBuilder<'a> {
    config: &'a InventoryConfig,
}

impl<'a> GroupHierarchyBuilder<'a> {
    pub fn new(config: &'a InventoryConfig) -> Self {
        Self { config }
    }

    /// Build graphs for every environment that has active records.
    ///
    /// Decommissioned records never contribute to any group.
    pub fn build(&self, records: &RecordSet) -> BTreeMap<String, GroupGraph> {
        let mut graphs: BTreeMap<String, GroupGraph> = BTreeMap::new();
        for record in records.active() {
            graphs
                .entry(record.environment.clone())
                .or_insert_with(|| GroupGraph::new(&record.environment))
                .add_record(record, self.config.nest_products);
        }

        for graph in graphs.values() {
            let stats = graph.stats();
            debug!(
                "Environment {}: {} host(s), {} group(s)",
                graph.environment(),
                stats.hosts,
                stats.total_groups()
            );
        }
        graphs
    }
}
