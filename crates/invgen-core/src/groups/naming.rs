//! Deterministic group name derivation.
//!
//! Group names double as YAML keys and as the `group_vars` file stems the
//! orchestration tool looks up, so they are restricted to `[a-z0-9_]`.

use super::GroupKind;
use regex::Regex;
use std::sync::LazyLock;

/// Runs of characters that are not allowed in a group name.
static INVALID_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9_]+").unwrap());

/// Runs of underscores left over after replacement.
static CONSECUTIVE_UNDERSCORES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"_{2,}").unwrap());

/// Substitute for values that normalize to nothing.
const EMPTY_VALUE: &str = "unnamed";

/// Normalize an attribute value for use in a group name.
///
/// # Rules Applied
/// 1. Convert to lowercase
/// 2. Replace each run of characters outside `[a-z0-9_]` with one underscore
/// 3. Collapse consecutive underscores
/// 4. Trim leading/trailing underscores
/// 5. Ensure non-empty result
///
/// # Examples
///
/// ```
/// use invgen_core::groups::normalize_group_value;
///
/// assert_eq!(normalize_group_value("Web Frontend"), "web_frontend");
/// assert_eq!(normalize_group_value("AMS-01"), "ams_01");
/// assert_eq!(normalize_group_value("--"), "unnamed");
/// ```
pub fn normalize_group_value(value: &str) -> String {
    let lowered = value.trim().to_lowercase();
    let replaced = INVALID_RUN.replace_all(&lowered, "_");
    let collapsed = CONSECUTIVE_UNDERSCORES.replace_all(&replaced, "_");
    let trimmed = collapsed.trim_matches('_');

    if trimmed.is_empty() {
        EMPTY_VALUE.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Full group name for a kind and raw value: `{prefix}_{normalized value}`.
pub fn group_name(kind: GroupKind, value: &str) -> String {
    format!("{}_{}", kind.prefix(), normalize_group_value(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_basic() {
        assert_eq!(normalize_group_value("Payments"), "payments");
        assert_eq!(normalize_group_value("  web  "), "web");
        assert_eq!(normalize_group_value("api.v2/internal"), "api_v2_internal");
    }

    #[test]
    fn test_normalize_collapses_and_trims() {
        assert_eq!(normalize_group_value("__a -- b__"), "a_b");
        assert_eq!(normalize_group_value("Ünïcode"), "n_code");
        assert_eq!(normalize_group_value(""), "unnamed");
        assert_eq!(normalize_group_value("!!!"), "unnamed");
    }

    #[test]
    fn test_group_name_prefixes() {
        assert_eq!(group_name(GroupKind::Environment, "production"), "env_production");
        assert_eq!(group_name(GroupKind::Application, "Web Store"), "app_web_store");
        assert_eq!(group_name(GroupKind::Product, "web"), "product_web");
        assert_eq!(group_name(GroupKind::Site, "AMS1"), "site_ams1");
        assert_eq!(group_name(GroupKind::Dashboard, "ops"), "dashboard_ops");
        assert_eq!(group_name(GroupKind::Batch, "2"), "batch_2");
    }

    #[test]
    fn test_normalization_is_stable() {
        let once = normalize_group_value("Mixed Case-Value");
        assert_eq!(normalize_group_value(&once), once);
    }
}
