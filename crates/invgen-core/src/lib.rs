//! Invgen Core - Inventory generation and host lifecycle engine.
//!
//! This crate turns a flat CSV host registry into an Ansible-style YAML
//! inventory: one group graph per environment plus one variables file per
//! active host. It also scores the health of the generated state and manages
//! host decommissioning (grace periods, expired host and orphan cleanup).
//!
//! Command-line handling lives in the `invgen-cli` crate.
//!
//! # Example
//!
//! ```rust,ignore
//! use invgen_core::{GenerateOptions, InventoryConfig, InventoryEngine};
//!
//! fn main() -> invgen_core::Result<()> {
//!     let config = InventoryConfig::load("invgen.yml".as_ref())?.with_env_overrides()?;
//!     let engine = InventoryEngine::new(config)?;
//!
//!     // Validate the source table
//!     let outcome = engine.validate()?;
//!     println!("{}", outcome.report.summary());
//!
//!     // Write the inventory
//!     let report = engine.generate(&GenerateOptions::default())?;
//!     println!("{} file(s) changed", report.counts.changes());
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod groups;
pub mod health;
pub mod layout;
pub mod lifecycle;
pub mod loader;
pub mod lock;
pub mod model;
pub mod writer;

// Re-export commonly used types
pub use config::InventoryConfig;
pub use engine::{GenerateOptions, GenerateReport, InventoryEngine};
pub use error::{InvgenError, Result};
pub use groups::{GraphStats, Group, GroupGraph, GroupHierarchyBuilder, GroupKind};
pub use health::{HealthBand, HealthReport, HealthScorer};
pub use layout::ArtifactLayout;
pub use lifecycle::{
    CleanupOptions, CleanupReport, DecommissionReport, DecommissionRequest, ExpiredHost,
    LifecycleManager, LifecycleState,
};
pub use loader::{
    IssueKind, LoadOutcome, SourceLoader, SourceTable, ValidationIssue, ValidationReport,
};
pub use lock::SourceLock;
pub use model::{HostStatus, IdentityKey, PatchMode, Record, RecordSet};
pub use writer::{ArtifactWriter, WriteAction, WriteCounts, WritePlan, WriteScope};
