//! Host record model.
//!
//! This module provides:
//! - The recognized column taxonomy (`schema`)
//! - Typed records and the record set (`record`)

pub mod record;
pub mod schema;

pub use record::{HostStatus, IdentityKey, PatchMode, Record, RecordSet};
pub use schema::{classify_header, ColumnKind, FieldType, RecognizedField};
