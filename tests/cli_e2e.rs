//! End-to-end CLI tests for the crawler binary.

#![allow(clippy::unwrap_used)]

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn test_help_lists_the_flag_surface() {
    Command::cargo_bin("mirrorcheck")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("--config")
                .and(predicate::str::contains("--include-private"))
                .and(predicate::str::contains("--threads"))
                .and(predicate::str::contains("--timeout-minutes"))
                .and(predicate::str::contains("--startid"))
                .and(predicate::str::contains("--stopid"))
                .and(predicate::str::contains("--category"))
                .and(predicate::str::contains("--canary"))
                .and(predicate::str::contains("--debug")),
        );
}

#[test]
fn test_canary_mode_is_refused_at_startup() {
    Command::cargo_bin("mirrorcheck")
        .unwrap()
        .arg("--canary")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Canary mode is not yet implemented"));
}

#[test]
fn test_missing_config_file_is_reported() {
    Command::cargo_bin("mirrorcheck")
        .unwrap()
        .args(["--config", "/definitely/not/a/config/file.conf"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read config file"));
}

#[test]
fn test_crawl_runs_against_an_empty_catalog() {
    let temp = tempfile::tempdir().unwrap();
    let db_path = temp.path().join("catalog.db");
    let config_path = temp.path().join("crawler.conf");
    std::fs::write(
        &config_path,
        format!("db_url = \"{}\"\n", db_path.display()),
    )
    .unwrap();

    Command::cargo_bin("mirrorcheck")
        .unwrap()
        .args(["--config", config_path.to_str().unwrap()])
        .assert()
        .success();
}
