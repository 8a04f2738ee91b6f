//! Row validation.
//!
//! Validation never stops at the first problem: every row is checked and every
//! issue is collected so one pass reports everything wrong with the source.
//! Rows with at least one error are left out of the resulting record set.

use super::table::{SourceRow, SourceTable};
use crate::config::InventoryConfig;
use crate::model::{
    classify_header, ColumnKind, HostStatus, PatchMode, RecognizedField, Record, RecordSet,
};
use chrono::NaiveDate;
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;
use tracing::{debug, warn};

/// Row number used for issues about the header itself.
pub const HEADER_ROW: usize = 1;

/// Longest hostname label accepted without a warning.
const MAX_HOSTNAME_LENGTH: usize = 63;

/// ISO calendar date shape; the calendar check is done by chrono.
static ISO_DATE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap());

/// Characters allowed in a hostname without a warning.
static HOSTNAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._-]+$").unwrap());

/// What kind of problem an issue describes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IssueKind {
    /// Missing or malformed field.
    Schema,
    /// Identity key already used in the same environment at `first_row`.
    DuplicateKey { first_row: usize },
    /// Suspicious but accepted.
    Warning,
}

/// One problem found in the source table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    pub row: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub kind: IssueKind,
    pub message: String,
}

impl ValidationIssue {
    fn schema(row: usize, key: Option<&str>, field: Option<&str>, message: String) -> Self {
        Self {
            row,
            key: key.map(str::to_string),
            field: field.map(str::to_string),
            kind: IssueKind::Schema,
            message,
        }
    }

    fn warning(row: usize, key: Option<&str>, field: Option<&str>, message: String) -> Self {
        Self {
            kind: IssueKind::Warning,
            ..Self::schema(row, key, field, message)
        }
    }

    pub fn is_duplicate_key(&self) -> bool {
        matches!(self.kind, IssueKind::DuplicateKey { .. })
    }
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "row {}", self.row)?;
        if let Some(key) = &self.key {
            write!(f, " ({})", key)?;
        }
        if let Some(field) = &self.field {
            write!(f, " [{}]", field)?;
        }
        write!(f, ": {}", self.message)
    }
}

/// Every issue found in one validation pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationReport {
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
    /// Data rows examined (blank and comment rows excluded).
    pub rows_checked: usize,
    /// Rows that became records.
    pub valid_rows: usize,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    pub fn duplicate_keys(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.errors.iter().filter(|i| i.is_duplicate_key())
    }

    /// One-line summary used in error messages and logs.
    pub fn summary(&self) -> String {
        let duplicates = self.duplicate_keys().count();
        let mut text = format!(
            "{} error(s), {} warning(s) in {} row(s)",
            self.errors.len(),
            self.warnings.len(),
            self.rows_checked
        );
        if duplicates > 0 {
            text.push_str(&format!(", {} duplicate key(s)", duplicates));
        }
        text
    }
}

/// Loader result: the valid records plus the report for the whole table.
#[derive(Debug, Clone, Default)]
pub struct LoadOutcome {
    pub records: RecordSet,
    pub report: ValidationReport,
}

/// Resolved column positions for one header row.
#[derive(Debug, Default)]
struct ColumnLayout {
    fields: HashMap<RecognizedField, usize>,
    /// `product_N` columns ordered by `N`.
    products: Vec<(u32, usize)>,
    /// Unrecognized columns in header order.
    extras: Vec<(String, usize)>,
}

impl ColumnLayout {
    fn from_headers(headers: &[String], issues: &mut Vec<ValidationIssue>) -> Self {
        let mut layout = ColumnLayout::default();
        let mut product_numbers = BTreeMap::new();

        for (index, header) in headers.iter().enumerate() {
            match classify_header(header) {
                ColumnKind::Recognized(field) => {
                    if layout.fields.contains_key(&field) {
                        issues.push(ValidationIssue::schema(
                            HEADER_ROW,
                            None,
                            Some(field.column()),
                            format!("column '{}' appears more than once", header.trim()),
                        ));
                    } else {
                        layout.fields.insert(field, index);
                    }
                }
                ColumnKind::Product(n) => {
                    if product_numbers.insert(n, index).is_some() {
                        issues.push(ValidationIssue::schema(
                            HEADER_ROW,
                            None,
                            Some(header.trim()),
                            format!("column 'product_{}' appears more than once", n),
                        ));
                    }
                }
                ColumnKind::Extra => {
                    let name = header.trim();
                    if !name.is_empty() {
                        layout.extras.push((name.to_string(), index));
                    }
                }
            }
        }

        layout.products = product_numbers.into_iter().collect();
        layout
    }

    fn index(&self, field: RecognizedField) -> Option<usize> {
        self.fields.get(&field).copied()
    }

    fn missing_required(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.index(RecognizedField::Hostname).is_none()
            && self.index(RecognizedField::CanonicalName).is_none()
        {
            missing.push("hostname|canonical_name");
        }
        for field in [RecognizedField::Environment, RecognizedField::Status] {
            if self.index(field).is_none() {
                missing.push(field.column());
            }
        }
        missing
    }
}

/// Collects issues for one row while its record is assembled.
struct RowCheck<'r> {
    row: &'r SourceRow,
    key: Option<String>,
    errors: Vec<ValidationIssue>,
    warnings: Vec<ValidationIssue>,
}

impl<'r> RowCheck<'r> {
    fn error(&mut self, field: RecognizedField, message: String) {
        self.errors.push(ValidationIssue::schema(
            self.row.number,
            self.key.as_deref(),
            Some(field.column()),
            message,
        ));
    }

    fn warn(&mut self, field: RecognizedField, message: String) {
        self.warnings.push(ValidationIssue::warning(
            self.row.number,
            self.key.as_deref(),
            Some(field.column()),
            message,
        ));
    }

    fn text(&self, layout: &ColumnLayout, field: RecognizedField) -> Option<String> {
        self.row.value(layout.index(field)).map(str::to_string)
    }

    fn unsigned(&mut self, layout: &ColumnLayout, field: RecognizedField) -> Option<u64> {
        let value = self.row.value(layout.index(field))?;
        if !value.bytes().all(|b| b.is_ascii_digit()) {
            self.error(field, format!("'{}' is not a base-10 integer", value));
            return None;
        }
        match value.parse::<u64>() {
            Ok(n) => Some(n),
            Err(_) => {
                self.error(field, format!("'{}' is out of range", value));
                None
            }
        }
    }

    fn date(&mut self, layout: &ColumnLayout, field: RecognizedField) -> Option<NaiveDate> {
        let value = self.row.value(layout.index(field))?;
        if !ISO_DATE.is_match(value) {
            self.error(field, format!("'{}' is not an ISO date (YYYY-MM-DD)", value));
            return None;
        }
        match NaiveDate::parse_from_str(value, "%Y-%m-%d") {
            Ok(date) => Some(date),
            Err(_) => {
                self.error(field, format!("'{}' is not a valid calendar date", value));
                None
            }
        }
    }
}

/// Validates source rows against the recognized schema and configuration.
pub struct Validator<'a> {
    config: &'a InventoryConfig,
}

impl<'a> Validator<'a> {
    pub fn new(config: &'a InventoryConfig) -> Self {
        Self { config }
    }

    /// Validate every row of `table`.
    pub fn validate(&self, table: &SourceTable) -> LoadOutcome {
        let mut report = ValidationReport::default();
        let layout = ColumnLayout::from_headers(table.headers(), &mut report.errors);

        let missing = layout.missing_required();
        if !missing.is_empty() {
            report.errors.push(ValidationIssue::schema(
                HEADER_ROW,
                None,
                None,
                format!("missing required column(s): {}", missing.join(", ")),
            ));
            warn!(
                "Source {} lacks required columns: {}",
                table.path().display(),
                missing.join(", ")
            );
            return LoadOutcome {
                records: RecordSet::default(),
                report,
            };
        }

        let width = table.headers().len();
        let mut records = Vec::new();
        for row in table.rows() {
            if row.is_blank() {
                continue;
            }
            let Some(check) = self.check_row(row, &layout, width) else {
                debug!("Skipping comment row {}", row.number);
                continue;
            };
            report.rows_checked += 1;
            let (record, check) = check;
            report.warnings.extend(check.warnings);
            if check.errors.is_empty() {
                if let Some(record) = record {
                    records.push(record);
                }
            } else {
                report.errors.extend(check.errors);
            }
        }

        let records = self.reject_duplicates(records, &mut report);
        self.warn_large_environments(&records, &mut report);

        report.valid_rows = records.len();
        debug!(
            "Validated {}: {}",
            table.path().display(),
            report.summary()
        );
        LoadOutcome {
            records: RecordSet::new(records),
            report,
        }
    }

    /// Check one row. Returns `None` for comment rows.
    fn check_row<'r>(
        &self,
        row: &'r SourceRow,
        layout: &ColumnLayout,
        width: usize,
    ) -> Option<(Option<Record>, RowCheck<'r>)> {
        let hostname = row.value(layout.index(RecognizedField::Hostname));
        let canonical_name = row.value(layout.index(RecognizedField::CanonicalName));
        let key = self.config.identity_key.resolve(hostname, canonical_name);
        if key.is_some_and(|k| k.starts_with('#')) {
            return None;
        }

        let mut check = RowCheck {
            row,
            key: key.map(str::to_string),
            errors: Vec::new(),
            warnings: Vec::new(),
        };

        if row.cells.len() > width {
            check.errors.push(ValidationIssue::schema(
                row.number,
                key,
                None,
                format!(
                    "row has {} cells but the header has {} columns",
                    row.cells.len(),
                    width
                ),
            ));
        }

        if key.is_none() {
            check.error(
                self.config.identity_key.identity_field(),
                "neither hostname nor canonical_name is set".to_string(),
            );
        }

        if let Some(name) = hostname {
            if name.len() > MAX_HOSTNAME_LENGTH {
                check.warn(
                    RecognizedField::Hostname,
                    format!("hostname is longer than {} characters", MAX_HOSTNAME_LENGTH),
                );
            }
            if !HOSTNAME_CHARS.is_match(name) {
                check.warn(
                    RecognizedField::Hostname,
                    format!("hostname '{}' contains unusual characters", name),
                );
            }
        }

        let environment = match row.value(layout.index(RecognizedField::Environment)) {
            None => {
                check.error(RecognizedField::Environment, "value is required".to_string());
                None
            }
            Some(env) if !self.config.is_known_environment(env) => {
                check.error(
                    RecognizedField::Environment,
                    format!(
                        "'{}' is not one of: {}",
                        env,
                        self.config.environments.join(", ")
                    ),
                );
                None
            }
            Some(env) => Some(env.to_string()),
        };

        let status = match row.value(layout.index(RecognizedField::Status)) {
            None => {
                check.error(RecognizedField::Status, "value is required".to_string());
                None
            }
            Some(value) => {
                let parsed = HostStatus::parse(value);
                if parsed.is_none() {
                    check.error(
                        RecognizedField::Status,
                        format!("'{}' is not one of: {}", value, HostStatus::VALUES.join(", ")),
                    );
                }
                parsed
            }
        };

        let patch_mode = match row.value(layout.index(RecognizedField::PatchMode)) {
            None => None,
            Some(value) => {
                let parsed = PatchMode::parse(value);
                if parsed.is_none() {
                    check.error(
                        RecognizedField::PatchMode,
                        format!("'{}' is not one of: {}", value, PatchMode::VALUES.join(", ")),
                    );
                }
                parsed
            }
        };

        let ssl_port = match check.unsigned(layout, RecognizedField::SslPort) {
            Some(port @ 1..=65535) => u16::try_from(port).ok(),
            Some(port) => {
                check.error(
                    RecognizedField::SslPort,
                    format!("port {} is outside 1-65535", port),
                );
                None
            }
            None => None,
        };

        let batch_number = match check.unsigned(layout, RecognizedField::BatchNumber) {
            Some(n) => match u32::try_from(n) {
                Ok(n) => Some(n),
                Err(_) => {
                    check.error(
                        RecognizedField::BatchNumber,
                        format!("batch {} is out of range", n),
                    );
                    None
                }
            },
            None => None,
        };

        let decommission_date = check.date(layout, RecognizedField::DecommissionDate);
        if decommission_date.is_some() && status == Some(HostStatus::Active) {
            check.warn(
                RecognizedField::DecommissionDate,
                "decommission_date is set on an active host and will be ignored".to_string(),
            );
        }

        let products = self.collect_products(row, layout, &mut check);
        let ansible_tags = split_list(row.value(layout.index(RecognizedField::AnsibleTags)));

        let mut extra_vars = BTreeMap::new();
        for (header, index) in &layout.extras {
            if let Some(value) = row.cell(*index) {
                if !value.trim().is_empty() {
                    extra_vars.insert(header.clone(), value.to_string());
                }
            }
        }

        let record = match (key, environment, status) {
            (Some(key), Some(environment), Some(status)) => Some(Record {
                row: row.number,
                key: key.to_string(),
                hostname: hostname.map(str::to_string),
                canonical_name: canonical_name.map(str::to_string),
                environment,
                status,
                instance: check.text(layout, RecognizedField::Instance),
                site_code: check.text(layout, RecognizedField::SiteCode),
                ssl_port,
                application_service: check.text(layout, RecognizedField::ApplicationService),
                primary_application: check.text(layout, RecognizedField::PrimaryApplication),
                function: check.text(layout, RecognizedField::Function),
                batch_number,
                patch_mode,
                dashboard_group: check.text(layout, RecognizedField::DashboardGroup),
                decommission_date,
                group_path: check.text(layout, RecognizedField::GroupPath),
                ansible_tags,
                products,
                extra_vars,
            }),
            _ => None,
        };

        Some((record, check))
    }

    /// `product_N` values in column order, then the legacy `product_id` list.
    fn collect_products(
        &self,
        row: &SourceRow,
        layout: &ColumnLayout,
        check: &mut RowCheck<'_>,
    ) -> Vec<String> {
        let mut products: Vec<String> = Vec::new();
        let mut seen: HashMap<String, String> = HashMap::new();

        let numbered = layout
            .products
            .iter()
            .filter_map(|(n, index)| Some((format!("product_{}", n), row.value(Some(*index))?)));
        let legacy = split_list(row.value(layout.index(RecognizedField::ProductId)))
            .into_iter()
            .map(|p| (RecognizedField::ProductId.column().to_string(), p));

        for (column, value) in numbered
            .map(|(c, v)| (c, v.to_string()))
            .chain(legacy)
        {
            if let Some(first) = seen.get(&value) {
                check.errors.push(ValidationIssue::schema(
                    row.number,
                    check.key.as_deref(),
                    Some(column.as_str()),
                    format!("product '{}' is already listed in {}", value, first),
                ));
            } else {
                seen.insert(value.clone(), column);
                products.push(value);
            }
        }
        products
    }

    /// Keep the first record per (environment, key); report the rest.
    fn reject_duplicates(&self, records: Vec<Record>, report: &mut ValidationReport) -> Vec<Record> {
        let mut first_rows: HashMap<(String, String), usize> = HashMap::new();
        let mut kept = Vec::with_capacity(records.len());

        for record in records {
            let slot = (record.environment.clone(), record.key.clone());
            if let Some(&first_row) = first_rows.get(&slot) {
                report.errors.push(ValidationIssue {
                    row: record.row,
                    key: Some(record.key.clone()),
                    field: Some(self.config.identity_key.as_str().to_string()),
                    kind: IssueKind::DuplicateKey { first_row },
                    message: format!(
                        "'{}' is already defined for environment '{}' at row {}",
                        record.key, record.environment, first_row
                    ),
                });
            } else {
                first_rows.insert(slot, record.row);
                kept.push(record);
            }
        }
        kept
    }

    fn warn_large_environments(&self, records: &[Record], report: &mut ValidationReport) {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for record in records.iter().filter(|r| r.is_active()) {
            *counts.entry(record.environment.as_str()).or_default() += 1;
        }
        for (env, count) in counts {
            if count > self.config.large_environment_warning {
                report.warnings.push(ValidationIssue::warning(
                    HEADER_ROW,
                    None,
                    Some(RecognizedField::Environment.column()),
                    format!(
                        "environment '{}' has {} active hosts (more than {})",
                        env, count, self.config.large_environment_warning
                    ),
                ));
            }
        }
    }
}

/// Split a comma-separated cell into trimmed, non-empty entries.
fn split_list(value: Option<&str>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
