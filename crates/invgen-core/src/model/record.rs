//! Typed host record and the record set produced by the loader.

use super::schema::RecognizedField;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

/// Which identity column names a host in the generated inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IdentityKey {
    #[default]
    Hostname,
    #[serde(alias = "cname")]
    CanonicalName,
}

impl IdentityKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityKey::Hostname => "hostname",
            IdentityKey::CanonicalName => "canonical_name",
        }
    }

    /// Column holding the configured identity.
    pub fn identity_field(&self) -> RecognizedField {
        match self {
            IdentityKey::Hostname => RecognizedField::Hostname,
            IdentityKey::CanonicalName => RecognizedField::CanonicalName,
        }
    }

    /// Pick the inventory key from the two identity columns.
    ///
    /// The configured column wins; the other one is the fallback.
    pub fn resolve<'a>(
        &self,
        hostname: Option<&'a str>,
        canonical_name: Option<&'a str>,
    ) -> Option<&'a str> {
        match self {
            IdentityKey::Hostname => hostname.or(canonical_name),
            IdentityKey::CanonicalName => canonical_name.or(hostname),
        }
    }
}

impl FromStr for IdentityKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "hostname" => Ok(IdentityKey::Hostname),
            "canonical_name" | "cname" => Ok(IdentityKey::CanonicalName),
            other => Err(format!(
                "invalid identity key '{}': must be hostname or canonical_name",
                other
            )),
        }
    }
}

impl std::fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Host status column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostStatus {
    Active,
    Decommissioned,
}

impl HostStatus {
    pub const VALUES: [&'static str; 2] = ["active", "decommissioned"];

    pub fn as_str(&self) -> &'static str {
        match self {
            HostStatus::Active => "active",
            HostStatus::Decommissioned => "decommissioned",
        }
    }

    /// Case-insensitive parse.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "active" => Some(HostStatus::Active),
            "decommissioned" => Some(HostStatus::Decommissioned),
            _ => None,
        }
    }
}

/// Patch application mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchMode {
    Auto,
    Manual,
}

impl PatchMode {
    pub const VALUES: [&'static str; 2] = ["auto", "manual"];

    pub fn as_str(&self) -> &'static str {
        match self {
            PatchMode::Auto => "auto",
            PatchMode::Manual => "manual",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "auto" => Some(PatchMode::Auto),
            "manual" => Some(PatchMode::Manual),
            _ => None,
        }
    }
}

/// One validated host row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    /// 1-based source row number (the header is row 1).
    pub row: usize,
    /// Resolved inventory key for the configured [`IdentityKey`].
    pub key: String,
    pub hostname: Option<String>,
    pub canonical_name: Option<String>,
    pub environment: String,
    pub status: HostStatus,
    pub instance: Option<String>,
    pub site_code: Option<String>,
    pub ssl_port: Option<u16>,
    pub application_service: Option<String>,
    pub primary_application: Option<String>,
    pub function: Option<String>,
    pub batch_number: Option<u32>,
    pub patch_mode: Option<PatchMode>,
    pub dashboard_group: Option<String>,
    pub decommission_date: Option<NaiveDate>,
    /// Organizational path; stored and emitted, never used for grouping.
    pub group_path: Option<String>,
    pub ansible_tags: Vec<String>,
    /// Product identifiers in column order, unique within the record.
    pub products: Vec<String>,
    /// Every unrecognized column, keyed by its header.
    pub extra_vars: BTreeMap<String, String>,
}

impl Record {
    /// Minimal active record, mainly for building fixtures.
    pub fn new(
        row: usize,
        key: impl Into<String>,
        environment: impl Into<String>,
        status: HostStatus,
    ) -> Self {
        let key = key.into();
        Self {
            row,
            hostname: Some(key.clone()),
            key,
            canonical_name: None,
            environment: environment.into(),
            status,
            instance: None,
            site_code: None,
            ssl_port: None,
            application_service: None,
            primary_application: None,
            function: None,
            batch_number: None,
            patch_mode: None,
            dashboard_group: None,
            decommission_date: None,
            group_path: None,
            ansible_tags: Vec::new(),
            products: Vec::new(),
            extra_vars: BTreeMap::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == HostStatus::Active
    }

    pub fn is_decommissioned(&self) -> bool {
        self.status == HostStatus::Decommissioned
    }
}

/// All records loaded from one source table, in source order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RecordSet {
    records: Vec<Record>,
}

impl RecordSet {
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.records.iter()
    }

    pub fn active(&self) -> impl Iterator<Item = &Record> {
        self.records.iter().filter(|r| r.is_active())
    }

    pub fn decommissioned(&self) -> impl Iterator<Item = &Record> {
        self.records.iter().filter(|r| r.is_decommissioned())
    }

    /// Every record whose key matches, across environments.
    pub fn find_by_key<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a Record> + 'a {
        self.records.iter().filter(move |r| r.key == key)
    }

    /// Environments that have at least one record, sorted.
    pub fn environments(&self) -> BTreeSet<&str> {
        self.records.iter().map(|r| r.environment.as_str()).collect()
    }

    /// Keys of every record regardless of status.
    pub fn keys(&self) -> BTreeSet<&str> {
        self.records.iter().map(|r| r.key.as_str()).collect()
    }
}

impl<'a> IntoIterator for &'a RecordSet {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
