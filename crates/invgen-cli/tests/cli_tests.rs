//! Integration tests for the invgen binary.
//!
//! These run the real executable inside a temporary project directory and
//! check exit codes and output.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn invgen(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_invgen"))
        .args(args)
        .current_dir(dir)
        .env_remove("INVGEN_SOURCE_FILE")
        .env_remove("INVGEN_IDENTITY_KEY")
        .output()
        .expect("Failed to run invgen")
}

/// Create a project directory with the default source location.
fn create_test_env(csv: &str) -> TempDir {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let source_dir = temp_dir.path().join("inventory_source");
    fs::create_dir_all(&source_dir).unwrap();
    fs::write(source_dir.join("hosts.csv"), csv).unwrap();
    temp_dir
}

#[test]
fn test_generate_then_validate() {
    let temp_dir = create_test_env(
        "hostname,environment,status,product_1,batch_number\n\
         web01,production,active,web,1\n\
         api01,production,active,api,2\n",
    );

    let output = invgen(temp_dir.path(), &["generate"]);
    assert_eq!(output.status.code(), Some(0));
    assert!(temp_dir.path().join("inventory/production.yml").exists());
    assert!(temp_dir.path().join("inventory/host_vars/web01.yml").exists());

    let output = invgen(temp_dir.path(), &["validate", "--json"]);
    assert_eq!(output.status.code(), Some(0));
    let body: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(body["valid"], serde_json::Value::Bool(true));
}

#[test]
fn test_duplicate_key_fails_without_writing() {
    let temp_dir = create_test_env(
        "hostname,environment,status\n\
         web01,production,active\n\
         web01,production,active\n",
    );

    let output = invgen(temp_dir.path(), &["validate"]);
    assert_eq!(output.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("row 3"));
    assert!(stdout.contains("row 2"));

    let output = invgen(temp_dir.path(), &["generate"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(!temp_dir.path().join("inventory").exists());
}

#[test]
fn test_missing_source_exit_code() {
    let temp_dir = TempDir::new().unwrap();
    let output = invgen(temp_dir.path(), &["validate"]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_source_flag_overrides_default() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(
        temp_dir.path().join("elsewhere.csv"),
        "hostname,environment,status\nweb01,test,active\n",
    )
    .unwrap();
    let output = invgen(temp_dir.path(), &["--source", "elsewhere.csv", "validate"]);
    assert_eq!(output.status.code(), Some(0));
}

#[test]
fn test_config_file_is_picked_up() {
    let temp_dir = create_test_env("hostname,environment,status\nweb01,staging,active\n");

    let output = invgen(temp_dir.path(), &["validate"]);
    assert_eq!(output.status.code(), Some(1));

    fs::write(
        temp_dir.path().join("invgen.yml"),
        "environments: [staging]\n",
    )
    .unwrap();
    let output = invgen(temp_dir.path(), &["validate"]);
    assert_eq!(output.status.code(), Some(0));
}

#[test]
fn test_health_json() {
    let temp_dir = create_test_env("hostname,environment,status\nweb01,test,active\n");
    let output = invgen(temp_dir.path(), &["health", "--json", "--threshold", "99"]);
    assert_eq!(output.status.code(), Some(0));

    let body: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(body["score"].as_f64().unwrap() < 99.0);
    assert!(body["band"].is_string());
}

#[test]
fn test_lifecycle_unknown_host_is_user_error() {
    let temp_dir = create_test_env("hostname,environment,status\nweb01,test,active\n");
    let output = invgen(
        temp_dir.path(),
        &[
            "lifecycle",
            "mark-decommission",
            "--host",
            "nope01",
            "--date",
            "2999-01-01",
        ],
    );
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_lifecycle_dry_run_leaves_source_untouched() {
    let csv = "hostname,environment,status\nweb01,test,active\n";
    let temp_dir = create_test_env(csv);
    let output = invgen(
        temp_dir.path(),
        &[
            "lifecycle",
            "mark-decommission",
            "--host",
            "web01",
            "--date",
            "2999-01-01",
            "--dry-run",
        ],
    );
    assert_eq!(output.status.code(), Some(0));
    let source = fs::read_to_string(temp_dir.path().join("inventory_source/hosts.csv")).unwrap();
    assert_eq!(source, csv);

    let output = invgen(temp_dir.path(), &["lifecycle", "cleanup", "--dry-run", "--json"]);
    assert_eq!(output.status.code(), Some(0));
    let body: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(body["dry_run"], serde_json::Value::Bool(true));
}
