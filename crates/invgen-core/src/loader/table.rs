//! Raw tabular source.
//!
//! The table keeps every cell as text in header order so lifecycle operations
//! can rewrite the file without losing columns the engine does not understand.

use crate::model::{classify_header, ColumnKind, IdentityKey, RecognizedField};
use crate::writer::atomic::atomic_write;
use crate::{InvgenError, Result};
use std::collections::BTreeSet;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// One data row with its 1-based source row number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRow {
    pub number: usize,
    pub cells: Vec<String>,
}

impl SourceRow {
    pub fn cell(&self, index: usize) -> Option<&str> {
        self.cells.get(index).map(String::as_str)
    }

    /// Trimmed cell value, `None` when absent or blank.
    pub fn value(&self, index: Option<usize>) -> Option<&str> {
        let value = self.cell(index?)?.trim();
        (!value.is_empty()).then_some(value)
    }

    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(|c| c.trim().is_empty())
    }
}

/// Header plus rows of a CSV host registry.
#[derive(Debug, Clone)]
pub struct SourceTable {
    path: PathBuf,
    headers: Vec<String>,
    rows: Vec<SourceRow>,
}

impl SourceTable {
    /// Read and parse the table at `path`.
    pub fn read(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|e| InvgenError::io_with_path(e, path))?;
        let table = Self::from_reader(file, path)?;
        debug!(
            "Read {} row(s) with {} column(s) from {}",
            table.rows.len(),
            table.headers.len(),
            path.display()
        );
        Ok(table)
    }

    /// Parse CSV from any reader; `path` is kept for error context and writes.
    pub fn from_reader<R: Read>(reader: R, path: &Path) -> Result<Self> {
        let csv_error = |e: csv::Error| InvgenError::Csv {
            message: e.to_string(),
            path: path.to_path_buf(),
            source: Some(e),
        };

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let headers: Vec<String> = reader
            .headers()
            .map_err(csv_error)?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').to_string())
            .collect();

        let mut rows = Vec::new();
        for (index, record) in reader.records().enumerate() {
            let record = record.map_err(csv_error)?;
            rows.push(SourceRow {
                number: index + 2,
                cells: record.iter().map(str::to_string).collect(),
            });
        }

        Ok(Self {
            path: path.to_path_buf(),
            headers,
            rows,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[SourceRow] {
        &self.rows
    }

    /// Index of the first column holding `field` (by name or alias).
    pub fn field_index(&self, field: RecognizedField) -> Option<usize> {
        self.headers
            .iter()
            .position(|h| classify_header(h) == ColumnKind::Recognized(field))
    }

    /// Index of `field`, appending an empty column if the table lacks it.
    pub fn ensure_field(&mut self, field: RecognizedField) -> usize {
        if let Some(index) = self.field_index(field) {
            return index;
        }
        self.headers.push(field.column().to_string());
        let width = self.headers.len();
        for row in &mut self.rows {
            row.cells.resize(width, String::new());
        }
        width - 1
    }

    /// Position of the row with source number `number`.
    pub fn position_of(&self, number: usize) -> Option<usize> {
        self.rows.iter().position(|r| r.number == number)
    }

    /// Overwrite one cell, padding short rows.
    pub fn set_cell(&mut self, number: usize, column: usize, value: &str) -> bool {
        let width = self.headers.len();
        match self.rows.iter_mut().find(|r| r.number == number) {
            Some(row) => {
                if row.cells.len() < width {
                    row.cells.resize(width, String::new());
                }
                if column < row.cells.len() {
                    row.cells[column] = value.to_string();
                    true
                } else {
                    false
                }
            }
            None => false,
        }
    }

    /// Drop the rows with the given source numbers; returns how many went.
    pub fn remove_rows(&mut self, numbers: &BTreeSet<usize>) -> usize {
        let before = self.rows.len();
        self.rows.retain(|r| !numbers.contains(&r.number));
        before - self.rows.len()
    }

    /// Identity value of a raw row, without any other validation.
    ///
    /// Comment rows (identity starting with `#`) yield `None`.
    pub fn row_identity<'a>(&self, row: &'a SourceRow, identity: IdentityKey) -> Option<&'a str> {
        let hostname = row.value(self.field_index(RecognizedField::Hostname));
        let canonical = row.value(self.field_index(RecognizedField::CanonicalName));
        identity
            .resolve(hostname, canonical)
            .filter(|key| !key.starts_with('#'))
    }

    /// Identity values of every non-comment row, valid or not.
    pub fn identity_keys(&self, identity: IdentityKey) -> BTreeSet<String> {
        self.rows
            .iter()
            .filter_map(|row| self.row_identity(row, identity))
            .map(str::to_string)
            .collect()
    }

    /// Serialize back to CSV bytes in the original column order.
    pub fn to_csv_bytes(&self) -> Result<Vec<u8>> {
        let csv_error = |e: csv::Error| InvgenError::Csv {
            message: e.to_string(),
            path: self.path.clone(),
            source: Some(e),
        };

        let mut writer = csv::WriterBuilder::new()
            .flexible(true)
            .from_writer(Vec::new());
        writer.write_record(&self.headers).map_err(csv_error)?;
        for row in &self.rows {
            writer.write_record(&row.cells).map_err(csv_error)?;
        }
        writer.into_inner().map_err(|e| InvgenError::Csv {
            message: e.to_string(),
            path: self.path.clone(),
            source: None,
        })
    }

    /// Atomically replace the source file with the current contents.
    pub fn write(&self, keep_backup: bool) -> Result<()> {
        let bytes = self.to_csv_bytes()?;
        atomic_write(&self.path, &bytes, keep_backup)?;
        info!(
            "Rewrote source table {} ({} row(s))",
            self.path.display(),
            self.rows.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> SourceTable {
        SourceTable::from_reader(text.as_bytes(), Path::new("hosts.csv")).unwrap()
    }

    #[test]
    fn test_row_numbers_start_after_header() {
        let table = parse("hostname,environment,status\nweb01,production,active\nweb02,test,active\n");
        assert_eq!(table.headers(), &["hostname", "environment", "status"]);
        assert_eq!(table.rows()[0].number, 2);
        assert_eq!(table.rows()[1].number, 3);
    }

    #[test]
    fn test_field_index_uses_aliases() {
        let table = parse("cname,environment,status\nwww,production,active\n");
        assert_eq!(table.field_index(RecognizedField::CanonicalName), Some(0));
        assert_eq!(table.field_index(RecognizedField::Hostname), None);
    }

    #[test]
    fn test_ensure_field_appends_column() {
        let mut table = parse("hostname,environment,status\nweb01,production,active\n");
        let index = table.ensure_field(RecognizedField::DecommissionDate);
        assert_eq!(index, 3);
        assert!(table.set_cell(2, index, "2030-01-01"));
        assert_eq!(table.rows()[0].cell(3), Some("2030-01-01"));
    }

    #[test]
    fn test_identity_keys_skip_comments() {
        let table = parse(
            "hostname,canonical_name,environment,status\n\
             web01,,production,active\n\
             #disabled,,production,active\n\
             ,www.example.com,test,active\n",
        );
        let keys = table.identity_keys(IdentityKey::Hostname);
        assert_eq!(
            keys.into_iter().collect::<Vec<_>>(),
            vec!["web01".to_string(), "www.example.com".to_string()]
        );
    }

    #[test]
    fn test_roundtrip_preserves_unknown_columns() {
        let text = "hostname,environment,status,owner\nweb01,production,active,\"ops, team\"\n";
        let table = parse(text);
        let bytes = table.to_csv_bytes().unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), text);
    }

    #[test]
    fn test_remove_rows() {
        let mut table = parse("hostname,environment,status\na,test,active\nb,test,active\nc,test,active\n");
        let removed = table.remove_rows(&BTreeSet::from([3]));
        assert_eq!(removed, 1);
        assert_eq!(table.rows().len(), 2);
        assert_eq!(table.position_of(4), Some(1));
    }
}
