//! YAML rendering of group graphs and host variables.
//!
//! Output carries a fixed header and no timestamps; maps are emitted in key
//! order so identical input always renders to identical bytes.

use crate::config::{ArtifactConfig, InventoryConfig};
use crate::groups::GroupGraph;
use crate::model::Record;
use crate::Result;
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;

fn header(title: &str) -> String {
    format!(
        "---\n# {}\n# {}\n\n",
        ArtifactConfig::GENERATED_HEADER,
        title
    )
}

fn empty_map_entries<'a, I>(names: I) -> Mapping
where
    I: IntoIterator<Item = &'a String>,
{
    names
        .into_iter()
        .map(|name| (Value::String(name.clone()), Value::Null))
        .collect()
}

/// Render one environment's group graph as an Ansible YAML inventory.
///
/// Each group maps to `hosts` (member keys) and `children` (child group
/// names); empty sections are omitted.
pub fn render_inventory(graph: &GroupGraph) -> Result<String> {
    let mut root = Mapping::new();
    for group in graph.groups() {
        let mut body = Mapping::new();
        if !group.members.is_empty() {
            body.insert(
                Value::String("hosts".to_string()),
                Value::Mapping(empty_map_entries(&group.members)),
            );
        }
        if !group.children.is_empty() {
            body.insert(
                Value::String("children".to_string()),
                Value::Mapping(empty_map_entries(&group.children)),
            );
        }
        root.insert(Value::String(group.name.clone()), Value::Mapping(body));
    }

    let mut text = header(&format!("Inventory for environment: {}", graph.environment()));
    text.push_str(&serde_yaml::to_string(&Value::Mapping(root))?);
    Ok(text)
}

/// Variables written for one host, in key order.
///
/// Extra columns go in first so that a recognized attribute with the same
/// name replaces them.
pub fn host_variables(record: &Record, config: &InventoryConfig) -> BTreeMap<String, Value> {
    let mut vars: BTreeMap<String, Value> = record
        .extra_vars
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();

    let mut text = |name: &str, value: &Option<String>| {
        if let Some(value) = value {
            vars.insert(name.to_string(), Value::String(value.clone()));
        }
    };
    text("hostname", &record.hostname);
    text("canonical_name", &record.canonical_name);
    text("instance", &record.instance);
    text("site_code", &record.site_code);
    text("application_service", &record.application_service);
    text("primary_application", &record.primary_application);
    text("function", &record.function);
    text("dashboard_group", &record.dashboard_group);
    text("group_path", &record.group_path);

    vars.insert(
        "environment".to_string(),
        Value::String(record.environment.clone()),
    );
    vars.insert(
        "status".to_string(),
        Value::String(record.status.as_str().to_string()),
    );
    if let Some(port) = record.ssl_port {
        vars.insert("ssl_port".to_string(), Value::from(port));
    }
    if let Some(batch) = record.batch_number {
        vars.insert("batch_number".to_string(), Value::from(batch));
        vars.insert(
            "patching_window".to_string(),
            Value::String(config.patching_window(batch)),
        );
    }
    if let Some(mode) = record.patch_mode {
        vars.insert(
            "patch_mode".to_string(),
            Value::String(mode.as_str().to_string()),
        );
    }
    if let Some(date) = record.decommission_date {
        vars.insert(
            "decommission_date".to_string(),
            Value::String(date.format("%Y-%m-%d").to_string()),
        );
    }
    if !record.products.is_empty() {
        vars.insert("products".to_string(), string_list(&record.products));
    }
    if !record.ansible_tags.is_empty() {
        vars.insert("ansible_tags".to_string(), string_list(&record.ansible_tags));
    }
    vars
}

fn string_list(values: &[String]) -> Value {
    Value::Sequence(values.iter().cloned().map(Value::String).collect())
}

/// Render the host-variable file for one record.
pub fn render_host_vars(record: &Record, config: &InventoryConfig) -> Result<String> {
    let vars = host_variables(record, config);
    let mut text = header(&format!("Host variables for {}", record.key));
    text.push_str(&serde_yaml::to_string(&vars)?);
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::groups::GroupHierarchyBuilder;
    use crate::model::{HostStatus, PatchMode, RecordSet};

    #[test]
    fn test_inventory_rendering() {
        let mut web = Record::new(2, "web01", "production", HostStatus::Active);
        web.batch_number = Some(1);
        web.products = vec!["web".into()];
        let config = InventoryConfig::default();
        let graphs = GroupHierarchyBuilder::new(&config).build(&RecordSet::new(vec![web]));

        let text = render_inventory(&graphs["production"]).unwrap();
        assert!(text.starts_with("---\n# AUTO-GENERATED FILE - DO NOT EDIT MANUALLY\n"));

        let body: Value = serde_yaml::from_str(&text).unwrap();
        assert!(body["env_production"]["hosts"]
            .as_mapping()
            .unwrap()
            .contains_key("web01"));
        assert!(body["env_production"]["children"]
            .as_mapping()
            .unwrap()
            .contains_key("batch_1"));
        assert!(body["batch_1"].get("children").is_none());
        assert!(body["product_web"]["hosts"]
            .as_mapping()
            .unwrap()
            .contains_key("web01"));
    }

    #[test]
    fn test_recognized_attributes_override_extras() {
        let mut record = Record::new(2, "web01", "production", HostStatus::Active);
        record.extra_vars.insert("status".into(), "bogus".into());
        record.extra_vars.insert("owner".into(), "team-a".into());
        record.ssl_port = Some(8443);
        record.batch_number = Some(7);
        record.patch_mode = Some(PatchMode::Manual);

        let vars = host_variables(&record, &InventoryConfig::default());
        assert_eq!(vars["status"], Value::String("active".into()));
        assert_eq!(vars["owner"], Value::String("team-a".into()));
        assert_eq!(vars["ssl_port"], Value::from(8443u16));
        assert_eq!(vars["patching_window"], Value::String("TBD".into()));
        assert_eq!(vars["patch_mode"], Value::String("manual".into()));
    }

    #[test]
    fn test_host_vars_rendering_is_stable() {
        let mut record = Record::new(2, "web01", "test", HostStatus::Active);
        record.products = vec!["b".into(), "a".into()];
        record.ansible_tags = vec!["nginx".into()];
        let config = InventoryConfig::default();

        let first = render_host_vars(&record, &config).unwrap();
        let second = render_host_vars(&record, &config).unwrap();
        assert_eq!(first, second);

        let parsed: Value = serde_yaml::from_str(&first).unwrap();
        let products: Vec<&str> = parsed["products"]
            .as_sequence()
            .unwrap()
            .iter()
            .filter_map(Value::as_str)
            .collect();
        assert_eq!(products, vec!["b", "a"]);
    }
}
