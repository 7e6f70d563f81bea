//! CLI output integration tests.

mod support;

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;

use support::config::{write_config, CONFIG_YAML};

fn uc_deploy() -> Command {
    cargo_bin_cmd!("uc-deploy")
}

#[test]
fn test_help() {
    uc_deploy()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("uc-deploy"))
        .stdout(predicate::str::contains("deployment"))
        .stdout(predicate::str::contains("init-config"))
        .stdout(predicate::str::contains("show-config"));
}

#[test]
fn test_version() {
    uc_deploy()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("uc-deploy"));
}

#[test]
fn test_deployment_help_lists_subcommands() {
    uc_deploy()
        .args(["deployment", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("list"))
        .stdout(predicate::str::contains("deploy"))
        .stdout(predicate::str::contains("revive"))
        .stdout(predicate::str::contains("delete"))
        .stdout(predicate::str::contains("check"));
}

#[test]
fn test_show_config() {
    let (_dir, path) = write_config(CONFIG_YAML);
    uc_deploy()
        .arg("-c")
        .arg(&path)
        .args(["--color", "never", "show-config"])
        .assert()
        .success()
        .stdout(predicate::str::contains("dev-cluster"))
        .stdout(predicate::str::contains("myregistry.azurecr.io"))
        .stdout(predicate::str::contains("userpool"));
}

#[test]
fn test_show_config_json_for_other_environment() {
    let (_dir, path) = write_config(CONFIG_YAML);
    uc_deploy()
        .arg("--config-file")
        .arg(&path)
        .args(["--json", "-e", "prd", "show-config"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"command\":\"show-config\""))
        .stdout(predicate::str::contains("dagster-prd"));
}

#[test]
fn test_missing_config_file_fails() {
    let dir = tempfile::TempDir::new().unwrap();
    uc_deploy()
        .arg("-c")
        .arg(dir.path().join("absent.yaml"))
        .arg("show-config")
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read config file"));
}

#[test]
fn test_unknown_environment_fails() {
    let (_dir, path) = write_config(CONFIG_YAML);
    uc_deploy()
        .arg("-c")
        .arg(&path)
        .args(["-e", "qa", "show-config"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("'qa'"));
}

#[test]
fn test_init_config_json_mode_is_rejected() {
    let dir = tempfile::TempDir::new().unwrap();
    uc_deploy()
        .args(["--json", "init-config", "-f"])
        .arg(dir.path().join("uc.yaml"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("JSON mode"));
}

#[test]
fn test_init_config_refuses_existing_file() {
    let (_dir, path) = write_config(CONFIG_YAML);
    uc_deploy()
        .args(["init-config", "-f"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));
}

#[test]
fn test_revive_requires_tag() {
    uc_deploy()
        .args(["deployment", "revive", "--name", "feature-x"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--tag"));
}
