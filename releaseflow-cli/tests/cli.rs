use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use serde_json::Value;

const CONFIG: &str = r#"
trigger:
  tags: ["v*"]
matrix:
  os: [ubuntu-latest, windows-latest]
  runtime: [cp311, cp312]
  exclude:
    - { os: windows-latest, runtime: cp312 }
build:
  selector: "{runtime}-*"
  tool_version: "2.16.5"
artifacts:
  prefix: "cibw-"
publish:
  environment: pypi
"#;

fn write_config(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("release.yaml");
    fs::write(&path, body).expect("write config");
    path
}

fn releaseflow() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("releaseflow");
    cmd.env_remove("GITHUB_REF")
        .env_remove("RELEASEFLOW_CONFIG")
        .env_remove("RELEASEFLOW_DRY_RUN")
        .env_remove("RELEASEFLOW_MATRIX_OS")
        .env_remove("RELEASEFLOW_MATRIX_RUNTIME")
        .env_remove("RUST_LOG");
    cmd
}

fn stdout_json(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("stdout is JSON")
}

#[test]
fn help_lists_commands() {
    let assert = releaseflow().arg("--help").assert().success();
    let stdout = String::from_utf8_lossy(&assert.get_output().stdout).to_string();
    for command in ["plan", "check-ref", "run"] {
        assert!(stdout.contains(command), "help is missing {command}: {stdout}");
    }
}

#[test]
fn plan_prints_every_entry_with_its_key() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = write_config(temp.path(), CONFIG);

    let assert = releaseflow()
        .args(["plan", "--config"])
        .arg(&config)
        .assert()
        .success();
    let stdout = String::from_utf8_lossy(&assert.get_output().stdout).to_string();

    assert!(stdout.contains("3 wheel job(s)"), "{stdout}");
    assert!(stdout.contains("build-wheels-ubuntu-latest-cp311"), "{stdout}");
    assert!(stdout.contains("select=cp312-*"), "{stdout}");
    assert!(!stdout.contains("build-wheels-windows-latest-cp312"), "{stdout}");
    assert!(stdout.contains("sdist key: cibw-sdist"), "{stdout}");
}

#[test]
fn plan_json_has_distinct_keys() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = write_config(temp.path(), CONFIG);

    let assert = releaseflow()
        .args(["--json", "plan", "--config"])
        .arg(&config)
        .assert()
        .success();
    let payload = stdout_json(assert.get_output());

    let entries = payload["entries"].as_array().expect("entries array");
    assert_eq!(entries.len(), 3);
    let mut keys: Vec<&str> = entries
        .iter()
        .map(|e| e["artifact_key"].as_str().expect("key"))
        .collect();
    keys.push(payload["sdist_key"].as_str().expect("sdist key"));
    let mut unique = keys.clone();
    unique.sort_unstable();
    unique.dedup();
    assert_eq!(unique.len(), keys.len(), "keys collide: {keys:?}");
    assert_eq!(payload["fail_fast"], true);
}

#[test]
fn check_ref_exit_codes() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = write_config(temp.path(), CONFIG);

    let assert = releaseflow()
        .args(["check-ref", "--ref", "refs/tags/v1.4.0", "--config"])
        .arg(&config)
        .assert()
        .success();
    let stdout = String::from_utf8_lossy(&assert.get_output().stdout).to_string();
    assert!(stdout.contains("run: v1.4.0"), "{stdout}");

    releaseflow()
        .args(["check-ref", "--ref", "refs/heads/main", "--config"])
        .arg(&config)
        .assert()
        .code(3);

    releaseflow()
        .args(["check-ref", "--ref", "refs/tags/nightly", "--config"])
        .arg(&config)
        .assert()
        .code(3);
}

#[test]
fn check_ref_reads_github_ref() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = write_config(temp.path(), CONFIG);

    let assert = releaseflow()
        .env("GITHUB_REF", "refs/tags/v2.0")
        .args(["--json", "check-ref", "--config"])
        .arg(&config)
        .assert()
        .success();
    let payload = stdout_json(assert.get_output());
    assert_eq!(payload["decision"], "run");
    assert_eq!(payload["tag"], "v2.0");
}

#[test]
fn run_ignores_branch_push_without_building() {
    let temp = tempfile::tempdir().expect("tempdir");
    let body = format!(
        "trigger:\n  tags: [\"v*\"]\nmatrix:\n  os: [ubuntu-latest]\n  runtime: [cp311]\nwork_dir: {}\n",
        temp.path().join("work").display()
    );
    let config = write_config(temp.path(), &body);

    let assert = releaseflow()
        .args(["--json", "run", "--ref", "refs/heads/main", "--config"])
        .arg(&config)
        .assert()
        .success();
    let payload = stdout_json(assert.get_output());

    assert_eq!(payload["state"], "idle");
    assert_eq!(payload["decision"]["decision"], "ignore");
    assert!(!temp.path().join("work").exists());
}

#[test]
fn invalid_config_fails() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = write_config(temp.path(), "build:\n  tool_version: latest\n");

    let assert = releaseflow()
        .args(["plan", "--config"])
        .arg(&config)
        .assert()
        .failure();
    let stderr = String::from_utf8_lossy(&assert.get_output().stderr).to_string();
    assert!(stderr.contains("tool_version"), "{stderr}");
}

#[test]
fn missing_config_fails() {
    let temp = tempfile::tempdir().expect("tempdir");

    releaseflow()
        .args(["plan", "--config"])
        .arg(temp.path().join("absent.yaml"))
        .assert()
        .failure();
}

#[test]
fn run_rejects_matrix_entries_the_host_cannot_build() {
    let temp = tempfile::tempdir().expect("tempdir");
    let foreign = if cfg!(target_os = "windows") { "macos-14" } else { "windows-latest" };
    let body = format!(
        "matrix:\n  os: [ubuntu-latest, {foreign}]\n  runtime: [cp311]\nwork_dir: {}\n",
        temp.path().join("work").display()
    );
    let config = write_config(temp.path(), &body);

    let assert = releaseflow()
        .args(["run", "--ref", "refs/tags/v1.0", "--dry-run", "--config"])
        .arg(&config)
        .assert()
        .failure();
    let stderr = String::from_utf8_lossy(&assert.get_output().stderr).to_string();
    assert!(stderr.contains(&format!("'{foreign}' needs a")), "{stderr}");
    assert!(!temp.path().join("work").exists());
}
