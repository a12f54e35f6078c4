//! CLI argument parsing tests for both binaries.
//!
//! These check that flags parse without touching a real profile or network;
//! `--help` short-circuits clap before profile loading runs.

use assert_cmd::Command;

#[test]
fn dev_help_runs() {
    Command::cargo_bin("devsync-dev")
        .unwrap()
        .arg("--help")
        .assert()
        .success();
}

#[test]
fn dev_version_runs() {
    Command::cargo_bin("devsync-dev")
        .unwrap()
        .arg("--version")
        .assert()
        .success();
}

#[test]
fn exec_help_runs() {
    Command::cargo_bin("devsync-exec")
        .unwrap()
        .arg("--help")
        .assert()
        .success();
}

#[test]
fn dev_requires_profile() {
    Command::cargo_bin("devsync-dev")
        .unwrap()
        .assert()
        .failure()
        .stderr(predicates::str::contains("--profile"));
}

#[test]
fn dev_data_dir_accepts_path() {
    Command::cargo_bin("devsync-dev")
        .unwrap()
        .args(["--profile", "/dev/null", "--data-dir", "/tmp/devsync-test", "--help"])
        .assert()
        .success();
}

#[test]
fn verbose_stacks_as_short_flags() {
    Command::cargo_bin("devsync-dev")
        .unwrap()
        .args(["--profile", "/dev/null", "-vvv", "--help"])
        .assert()
        .success();
}

#[test]
fn quiet_and_verbose_both_parse() {
    // Parsing succeeds for both; the conflict (if any) is a runtime concern,
    // not a clap-level one.
    Command::cargo_bin("devsync-dev")
        .unwrap()
        .args(["--profile", "/dev/null", "--quiet", "--verbose", "--help"])
        .assert()
        .success();
}

#[test]
fn max_workers_accepts_zero() {
    Command::cargo_bin("devsync-exec")
        .unwrap()
        .args(["--profile", "/dev/null", "--max-workers", "0", "--help"])
        .assert()
        .success();
}

#[test]
fn log_mode_accepts_known_values() {
    for mode in ["disabled", "internal", "external"] {
        Command::cargo_bin("devsync-exec")
            .unwrap()
            .args(["--profile", "/dev/null", "--log-mode", mode, "--help"])
            .assert()
            .success();
    }
}

#[test]
fn log_mode_rejects_unknown_value() {
    Command::cargo_bin("devsync-exec")
        .unwrap()
        .args(["--profile", "/dev/null", "--log-mode", "verbose", "--help"])
        .assert()
        .failure()
        .stderr(predicates::str::contains("invalid value 'verbose'"));
}
