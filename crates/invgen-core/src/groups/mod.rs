//! Group hierarchy derivation.
//!
//! This module provides:
//! - Group name normalization (`naming`)
//! - Per-environment group graph construction (`builder`)

pub mod builder;
pub mod naming;

pub use builder::{GraphStats, Group, GroupGraph, GroupHierarchyBuilder, GroupKind};
pub use naming::{group_name, normalize_group_value};
