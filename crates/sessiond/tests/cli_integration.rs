//! CLI integration tests for the sessiond command-line interface.
//!
//! Every test points the config directory and working directory at a
//! temporary directory so nothing outside it is read or written.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Get a command for the sessiond binary, isolated in `dir`.
fn sessiond(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("sessiond").unwrap();
    cmd.current_dir(dir.path())
        .env("SESSIOND_CONFIG_DIR", dir.path().join("config"))
        .env_remove("SESSIOND_CONFIG")
        .env_remove("RUST_LOG");
    cmd
}

// ─────────────────────────────────────────────────────────────────────────────
// Help and Version Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_help_lists_subcommands() {
    let dir = TempDir::new().unwrap();
    sessiond(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("session store"))
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("simulate"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_version_displays() {
    let dir = TempDir::new().unwrap();
    sessiond(&dir)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("sessiond"));
}

#[test]
fn test_unknown_subcommand_rejected() {
    let dir = TempDir::new().unwrap();
    sessiond(&dir)
        .arg("frobnicate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unrecognized subcommand"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Config Command Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_config_which_without_files() {
    let dir = TempDir::new().unwrap();
    sessiond(&dir)
        .args(["config", "which"])
        .assert()
        .success()
        .stdout(predicate::str::contains("not found"))
        .stdout(predicate::str::contains("sessiond config init"));
}

#[test]
fn test_config_init_then_which() {
    let dir = TempDir::new().unwrap();
    sessiond(&dir)
        .args(["config", "init"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created"));
    assert!(dir.path().join("config").join("config.toml").is_file());

    sessiond(&dir)
        .args(["config", "which"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 config file(s) loaded."));

    sessiond(&dir)
        .args(["config", "init"])
        .assert()
        .success()
        .stdout(predicate::str::contains("already exists"));
}

#[test]
fn test_config_show_reflects_project_file() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("sessiond.toml"),
        "[store]\nshort_term_depth = 9\n\n[logging]\nfile = false\n",
    )
    .unwrap();

    sessiond(&dir)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("short_term_depth = 9"))
        .stdout(predicate::str::contains("sessiond.toml"));
}

#[test]
fn test_config_show_json() {
    let dir = TempDir::new().unwrap();
    let output = sessiond(&dir)
        .args(["--json", "config", "show"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["store"]["short_term_depth"], 4);
    assert_eq!(value["logging"]["level"], "info");
}

#[test]
fn test_invalid_config_fails() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("sessiond.toml"),
        "[store]\nshort_term_depth = 0\n",
    )
    .unwrap();

    sessiond(&dir)
        .args(["config", "show"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("short_term_depth"));
}

#[test]
fn test_explicit_config_flag() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("custom.toml");
    std::fs::write(&path, "[store]\nlong_term_depth = 0\n").unwrap();

    sessiond(&dir)
        .arg("--config")
        .arg(&path)
        .args(["config", "which"])
        .assert()
        .success()
        .stdout(predicate::str::contains("custom.toml"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Run and Simulate Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_run_exits_after_deadline() {
    let dir = TempDir::new().unwrap();
    sessiond(&dir)
        .args(["run", "--exit-after", "1", "--stats-interval", "0"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Stopped after"));
}

#[test]
fn test_simulate_json_report() {
    let dir = TempDir::new().unwrap();
    let output = sessiond(&dir)
        .args([
            "--json",
            "simulate",
            "--workers",
            "4",
            "--operations",
            "400",
            "--rotate-ms",
            "10",
        ])
        .output()
        .unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["workers"], 4);
    assert_eq!(report["operations"], 1600);
    assert_eq!(report["added"], 400);
    assert_eq!(report["rejected"], 0);
    assert!(report["lookups"].as_u64().unwrap() > 0);
}

#[test]
fn test_simulate_reports_capacity_rejections() {
    let dir = TempDir::new().unwrap();
    let output = sessiond(&dir)
        .args([
            "--json",
            "simulate",
            "--workers",
            "2",
            "--operations",
            "200",
            "--max-sessions",
            "5",
            "--rotate-ms",
            "60000",
        ])
        .output()
        .unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let added = report["added"].as_u64().unwrap();
    let rejected = report["rejected"].as_u64().unwrap();
    assert_eq!(added + rejected, 100);
    assert!(rejected > 0);
}
