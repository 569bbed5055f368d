//! E2E tests for the subcommands that never touch the network.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn dva_cmd(config: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("dva"));
    cmd.arg("--config").arg(config);
    cmd.env("DVA_LOG", "error");
    cmd.env_remove("DVA_FORMAT");
    cmd.env_remove("ADO_ORGANIZATION");
    cmd.env_remove("ADO_PROJECT");
    cmd.env_remove("ADO_PAT");
    cmd
}

fn config_in(dir: &TempDir) -> PathBuf {
    dir.path().join("nested").join("config.toml")
}

#[test]
fn area_prints_normalized_path() {
    let dir = TempDir::new().unwrap();
    dva_cmd(&config_in(&dir))
        .args(["area", "\\Contoso\\Area\\Web"])
        .assert()
        .success()
        .stdout("Contoso\\Web\n");
}

#[test]
fn area_json_reports_input_and_result() {
    let dir = TempDir::new().unwrap();
    let output = dva_cmd(&config_in(&dir))
        .args(["--json", "area", "Contoso\\Web"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let value: Value = serde_json::from_slice(&output.stdout).expect("valid JSON");
    assert_eq!(value["input"], "Contoso\\Web");
    assert_eq!(value["normalized"], "Contoso\\Web");
}

#[test]
fn wiql_epics_is_printed_without_credentials() {
    let dir = TempDir::new().unwrap();
    dva_cmd(&config_in(&dir))
        .args(["wiql", "epics", "--area", "\\Contoso\\Area\\Web"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[System.WorkItemType] = 'Epic'"))
        .stdout(predicate::str::contains("UNDER 'Contoso\\Web'"))
        .stdout(predicate::str::contains("WorkItemLinks").not());
}

#[test]
fn wiql_metrics_without_date_fails_with_message() {
    let dir = TempDir::new().unwrap();
    dva_cmd(&config_in(&dir))
        .args(["wiql", "metrics", "--area", "Contoso"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--since"));
}

#[test]
fn config_set_then_show_masks_the_token() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);

    for (key, value) in [
        ("connection.organization", "contoso"),
        ("connection.project", "Web"),
        ("connection.pat", "super-secret-token"),
        ("fetch.batch_size", "50"),
    ] {
        dva_cmd(&config).args(["config", "set", key, value]).assert().success();
    }

    let raw = fs::read_to_string(&config).unwrap();
    assert!(raw.contains("organization = \"contoso\""));
    assert!(raw.contains("batch_size = 50"));

    let output = dva_cmd(&config)
        .args(["--json", "config", "show"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(!stdout.contains("super-secret-token"));

    let value: Value = serde_json::from_str(&stdout).expect("valid JSON");
    assert_eq!(value["connection"]["organization"], "contoso");
    assert_eq!(value["connection"]["pat"], "********");
    assert_eq!(value["fetch"]["batch_size"], 50);
}

#[test]
fn config_set_rejects_unknown_key() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);
    dva_cmd(&config)
        .args(["config", "set", "connection.token", "x"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unsupported key"));
    assert!(!config.exists());
}

#[test]
fn config_path_echoes_override() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);
    dva_cmd(&config)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
}

#[test]
fn tree_without_connection_settings_fails_fast() {
    let dir = TempDir::new().unwrap();
    let output = dva_cmd(&config_in(&dir))
        .args(["--json", "tree", "--area", "Contoso"])
        .output()
        .unwrap();
    assert!(!output.status.success());

    let value: Value = serde_json::from_slice(&output.stderr).expect("valid JSON error");
    assert_eq!(value["error"]["error_code"], "E1001");
    let message = value["error"]["message"].as_str().unwrap();
    assert!(message.contains("organization"));
    assert!(message.contains("pat"));
}

#[test]
fn tree_without_area_explains_how_to_set_one() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);
    dva_cmd(&config)
        .args(["tree"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--area"));
}

#[test]
fn broken_config_file_is_reported() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("config.toml");
    fs::write(&config, "connection = [not toml").unwrap();

    dva_cmd(&config)
        .args(["--format", "text", "config", "show"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E1002"));
}

#[test]
fn completions_generate_for_bash() {
    let dir = TempDir::new().unwrap();
    dva_cmd(&config_in(&dir))
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("dva"));
}
