//! sumo-login CLI Integration Tests
//!
//! These tests run the login binary against an empty home directory, so no
//! cached credentials exist and no login window may be opened.

#![allow(deprecated)] // Allow deprecated cargo_bin for now

use assert_cmd::Command as AssertCommand;
use predicates::prelude::*;
use tempfile::TempDir;

const CLEARED_VARS: [&str; 8] = [
    "AZURE_FEDERATED_TOKEN_FILE",
    "AZURE_TENANT_ID",
    "AZURE_CLIENT_ID",
    "AZURE_AUTHORITY_HOST",
    "SUMO_ENV",
    "SUMO_CLIENT_ID",
    "SUMO_RESOURCE_ID",
    "RUST_LOG",
];

/// The login command with an isolated, empty home directory.
fn login_command(home: &TempDir) -> AssertCommand {
    let mut cmd = AssertCommand::cargo_bin("sumo-login").unwrap();
    cmd.env("HOME", home.path()).env("USERPROFILE", home.path());
    for var in CLEARED_VARS {
        cmd.env_remove(var);
    }
    cmd
}

// ============================================================================
// Integration Tests
// ============================================================================

#[test]
fn test_binary_help() {
    let home = TempDir::new().unwrap();
    login_command(&home)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Login to Sumo on Azure"))
        .stdout(predicate::str::contains("--devicecode"))
        .stdout(predicate::str::contains("--silent"));
}

#[test]
fn test_binary_version() {
    let home = TempDir::new().unwrap();
    login_command(&home)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("sumo-login"));
}

#[test]
fn test_silent_without_cache_exits_one() {
    let home = TempDir::new().unwrap();
    login_command(&home)
        .arg("--silent")
        .assert()
        .code(1)
        .stdout(predicate::str::is_empty());
}

#[test]
fn test_silent_ignores_print_flag() {
    let home = TempDir::new().unwrap();
    login_command(&home)
        .args(["-s", "-p", "-v", "debug"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("TOKEN").not());
}

#[test]
fn test_unknown_environment_fails() {
    let home = TempDir::new().unwrap();
    login_command(&home)
        .args(["--env", "nowhere"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Login to Sumo environment: nowhere"))
        .stderr(predicate::str::contains("Invalid environment: nowhere"));
}

#[test]
fn test_debug_verbosity_logs_to_stderr() {
    let home = TempDir::new().unwrap();
    login_command(&home)
        .args(["-s", "-v", "DEBUG"])
        .assert()
        .code(1)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("sumo-login v"));
}

#[test]
fn test_rust_log_overrides_verbosity() {
    let home = TempDir::new().unwrap();
    login_command(&home)
        .env("RUST_LOG", "debug")
        .arg("-s")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("sumo-login v"));
}

#[test]
fn test_invalid_verbosity_rejected() {
    let home = TempDir::new().unwrap();
    login_command(&home)
        .args(["--verbosity", "LOUD"])
        .assert()
        .failure();
}

#[cfg(unix)]
#[test]
fn test_shared_key_login_prints_token() {
    let home = TempDir::new().unwrap();
    let sumo = home.path().join(".sumo");
    std::fs::create_dir_all(&sumo).unwrap();
    // Resource id of the built-in dev registration
    std::fs::write(
        sumo.join("88d2b022-3539-4dda-9e66-853801334a86.sharedkey"),
        "static-key\n",
    )
    .unwrap();

    login_command(&home)
        .arg("--print")
        .assert()
        .success()
        .stdout(predicate::str::contains("TOKEN: static-key"))
        .stdout(predicate::str::contains(
            "Successfully logged in to Sumo environment: dev",
        ));
}
