//! Source loading and validation.
//!
//! This module provides:
//! - Raw CSV access that round-trips unknown columns (`table`)
//! - Exhaustive row validation into typed records (`validate`)

pub mod table;
pub mod validate;

pub use table::{SourceRow, SourceTable};
pub use validate::{IssueKind, LoadOutcome, ValidationIssue, ValidationReport, Validator};

use crate::config::InventoryConfig;
use crate::Result;
use tracing::{info, warn};

/// Reads the configured source table and validates it.
///
/// Loading never mutates the source.
pub struct SourceLoader<'a> {
    config: &'a InventoryConfig,
}

impl<'a> SourceLoader<'a> {
    pub fn new(config: &'a InventoryConfig) -> Self {
        Self { config }
    }

    /// Read the raw table without validating it.
    pub fn load_table(&self) -> Result<SourceTable> {
        SourceTable::read(&self.config.source_file)
    }

    /// Validate an already-read table.
    pub fn validate_table(&self, table: &SourceTable) -> LoadOutcome {
        let outcome = Validator::new(self.config).validate(table);
        for warning in &outcome.report.warnings {
            warn!("{}", warning);
        }
        if outcome.report.is_valid() {
            info!(
                "Loaded {} record(s) from {}",
                outcome.records.len(),
                table.path().display()
            );
        } else {
            warn!(
                "Source {} failed validation: {}",
                table.path().display(),
                outcome.report.summary()
            );
        }
        outcome
    }

    /// Read and validate the source table.
    pub fn load(&self) -> Result<(SourceTable, LoadOutcome)> {
        let table = self.load_table()?;
        let outcome = self.validate_table(&table);
        Ok((table, outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InvgenError;
    use tempfile::TempDir;

    #[test]
    fn test_load_from_disk() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("hosts.csv");
        std::fs::write(
            &source,
            "hostname,environment,status\nweb01,production,active\n",
        )
        .unwrap();

        let config = InventoryConfig {
            source_file: source,
            ..InventoryConfig::default()
        };
        let (table, outcome) = SourceLoader::new(&config).load().unwrap();
        assert_eq!(table.rows().len(), 1);
        assert_eq!(outcome.records.len(), 1);
    }

    #[test]
    fn test_missing_source_is_file_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let config = InventoryConfig {
            source_file: temp_dir.path().join("missing.csv"),
            ..InventoryConfig::default()
        };
        let err = SourceLoader::new(&config).load().unwrap_err();
        assert!(matches!(err, InvgenError::FileNotFound(_)));
        assert_eq!(err.exit_code(), 2);
    }
}
