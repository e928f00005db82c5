//! Integration tests for the schmux-client binary

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

use super::common::daemon_server::TestDaemon;
use schmux::daemon::mock::MockDaemon;

fn client(data_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("schmux-client").expect("binary should build");
    cmd.arg("--data-dir").arg(data_dir.path());
    cmd
}

/// Help lists the subcommands
#[test]
fn test_help_lists_subcommands() {
    Command::cargo_bin("schmux-client")
        .expect("binary should build")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("spawn"))
        .stdout(predicate::str::contains("attach"));
}

/// An unreachable daemon fails with context, after writing a default config
#[test]
fn test_status_without_daemon_fails() {
    let data_dir = TempDir::new().expect("temp dir");

    client(&data_dir)
        .args(["--daemon-url", "http://127.0.0.1:1", "status"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to list sessions"));

    assert!(data_dir.path().join("client.toml").exists());
    assert!(data_dir.path().join("logs").is_dir());
}

/// Malformed target counts are rejected during argument parsing
#[test]
fn test_invalid_targets_are_rejected() {
    let data_dir = TempDir::new().expect("temp dir");

    client(&data_dir)
        .args(["spawn", "--repo", "r", "--branch", "main", "--targets", "a=x"])
        .assert()
        .failure()
        .code(2);
}

/// Command and target counts cannot be combined
#[test]
fn test_command_conflicts_with_targets() {
    let data_dir = TempDir::new().expect("temp dir");

    client(&data_dir)
        .args(["spawn", "--targets", "claude=1", "--command", "lint"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be used with"));
}

/// Status against a live daemon reports an empty registry
#[tokio::test(flavor = "multi_thread")]
async fn test_status_against_empty_daemon() {
    let server = TestDaemon::start(MockDaemon::new()).await;
    let data_dir = TempDir::new().expect("temp dir");
    let url = server.url.clone();

    let assert = tokio::task::spawn_blocking(move || {
        client(&data_dir)
            .args(["--daemon-url", url.as_str(), "status"])
            .assert()
    })
    .await
    .expect("blocking task");

    assert
        .success()
        .stdout(predicate::str::contains("No workspaces"));
}
