//! Integration tests for the microdeploy binary's argument handling.

#![allow(clippy::expect_used)]

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn microdeploy(home: &TempDir) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("microdeploy"));
    cmd.env("NO_COLOR", "1")
        .env("HOME", home.path())
        .env_remove("MICRODEPLOY_CPI_JOB_DIR")
        .env_remove("MICRODEPLOY_STATE");
    cmd
}

#[test]
fn test_cli_no_args_shows_help() {
    let home = TempDir::new().expect("temp dir");
    microdeploy(&home)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Deploy a single-VM environment"));
}

#[test]
fn test_cli_help_lists_commands() {
    let home = TempDir::new().expect("temp dir");
    microdeploy(&home)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("deploy"))
        .stdout(predicate::str::contains("delete"))
        .stdout(predicate::str::contains("cpi-info"));
}

#[test]
fn test_cli_version_flag() {
    let home = TempDir::new().expect("temp dir");
    microdeploy(&home)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("microdeploy"));
}

#[test]
fn test_deploy_without_stemcell_is_a_usage_error() {
    let home = TempDir::new().expect("temp dir");
    microdeploy(&home)
        .args(["deploy", "manifest.yml"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--stemcell"));
}

#[test]
fn test_cpi_info_requires_cpi_job_dir() {
    let home = TempDir::new().expect("temp dir");
    microdeploy(&home)
        .arg("cpi-info")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--cpi-job-dir"));
}

#[test]
fn test_no_color_env_accepts_any_value() {
    for value in ["1", "true", "yes", "0"] {
        let home = TempDir::new().expect("temp dir");
        microdeploy(&home)
            .env("NO_COLOR", value)
            .arg("cpi-info")
            .assert()
            .failure()
            .stderr(predicate::str::contains("--cpi-job-dir"))
            .stderr(predicate::str::contains("invalid value").not());
    }
}

#[test]
fn test_deploy_missing_manifest_names_the_file() {
    let home = TempDir::new().expect("temp dir");
    microdeploy(&home)
        .args(["deploy", "/nonexistent/manifest.yml", "--stemcell", "/nonexistent/sc"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("/nonexistent/manifest.yml"));
}

#[cfg(unix)]
#[test]
fn test_cpi_info_json_against_scripted_plugin() {
    use std::os::unix::fs::PermissionsExt;

    let home = TempDir::new().expect("temp dir");
    let job_dir = home.path().join("jobs").join("cpi");
    std::fs::create_dir_all(job_dir.join("bin")).expect("mkdir");
    let executable = job_dir.join("bin").join("cpi");
    std::fs::write(
        &executable,
        "#!/bin/sh\ncat > /dev/null\nprintf '%s' '{\"result\":{\"api_version\":5,\"stemcell_formats\":[\"openstack-raw\"]},\"error\":null,\"log\":\"\"}'\n",
    )
    .expect("write plugin");
    std::fs::set_permissions(&executable, std::fs::Permissions::from_mode(0o755))
        .expect("chmod");

    let output = microdeploy(&home)
        .args(["cpi-info", "--json", "--cpi-job-dir"])
        .arg(&job_dir)
        .output()
        .expect("run");
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(value["api_version"], 2);
    assert_eq!(value["stemcell_formats"], serde_json::json!(["openstack-raw"]));
    assert!(home.path().join(".microdeploy").join("state.json").exists());
}
