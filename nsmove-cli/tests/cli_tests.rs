use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

/// Check if running as root
fn is_root() -> bool {
    unsafe { libc::getuid() == 0 }
}

fn nsmove() -> Command {
    Command::new(env!("CARGO_BIN_EXE_nsmove"))
}

#[test]
fn test_help_command() {
    nsmove()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Move network interfaces"))
        .stdout(predicate::str::contains("Commands:"))
        .stdout(predicate::str::contains("request"))
        .stdout(predicate::str::contains("close"))
        .stdout(predicate::str::contains("namespaces"))
        .stdout(predicate::str::contains("--config"));
}

#[test]
fn test_version_command() {
    nsmove()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("nsmove"));
}

#[test]
fn test_invalid_command() {
    nsmove()
        .arg("invalid")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unrecognized subcommand"));
}

#[test]
fn test_request_help() {
    nsmove()
        .args(["request", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--id"))
        .stdout(predicate::str::contains("--netns"))
        .stdout(predicate::str::contains("--interface"))
        .stdout(predicate::str::contains("--client"));
}

#[test]
fn test_request_without_interface() {
    nsmove()
        .args(["request", "--id", "conn-1", "--netns", "client1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("required"));
}

#[test]
fn test_close_without_id() {
    nsmove()
        .args(["close", "--netns", "client1", "--interface", "veth0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("required"));
}

#[test]
fn test_invalid_interface_name() {
    nsmove()
        .args([
            "request",
            "--id",
            "conn-1",
            "--netns",
            "client1",
            "--interface",
            "bad/name",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid interface name"));
}

#[test]
fn test_interface_name_too_long() {
    nsmove()
        .args([
            "close",
            "--id",
            "conn-1",
            "--netns",
            "client1",
            "--interface",
            "this-name-is-far-too-long",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("exceeds 15 bytes"));
}

#[test]
fn test_unsupported_netns_scheme() {
    nsmove()
        .args([
            "request",
            "--id",
            "conn-1",
            "--netns",
            "http://example.com/ns",
            "--interface",
            "veth0",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "Invalid network namespace reference",
        ));
}

#[test]
fn test_request_requires_root() {
    // Skip if running as root
    if is_root() {
        return;
    }

    nsmove()
        .args([
            "request",
            "--id",
            "conn-1",
            "--netns",
            "client1",
            "--interface",
            "veth0",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Must run as root"));
}

#[test]
fn test_request_missing_namespace() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = tempfile::NamedTempFile::new().unwrap();
    write!(
        config,
        r#"{{"netns_dir": "{}"}}"#,
        dir.path().display()
    )
    .unwrap();

    nsmove()
        .args(["--config"])
        .arg(config.path())
        .args([
            "request",
            "--id",
            "conn-1",
            "--netns",
            "does-not-exist",
            "--interface",
            "veth0",
        ])
        .assert()
        .failure()
        .stderr(
            predicate::str::contains("Must run as root")
                .or(predicate::str::contains("Request for connection conn-1 failed")),
        );
}

#[test]
fn test_namespaces_no_root_needed() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = tempfile::NamedTempFile::new().unwrap();
    write!(
        config,
        r#"{{"netns_dir": "{}"}}"#,
        dir.path().display()
    )
    .unwrap();

    nsmove()
        .arg("--config")
        .arg(config.path())
        .arg("namespaces")
        .assert()
        .success()
        .stdout(predicate::str::contains("Network Namespace for PID"))
        .stdout(predicate::str::contains("net:["))
        .stdout(predicate::str::contains("(none)"));
}

#[test]
fn test_missing_config_file() {
    nsmove()
        .args(["--config", "/nonexistent/nsmove.json", "namespaces"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load configuration"));
}

#[test]
fn test_invalid_config_value() {
    let mut config = tempfile::NamedTempFile::new().unwrap();
    write!(config, r#"{{"queue_depth": 0}}"#).unwrap();

    nsmove()
        .arg("--config")
        .arg(config.path())
        .arg("namespaces")
        .assert()
        .failure()
        .stderr(predicate::str::contains("queue_depth"));
}
