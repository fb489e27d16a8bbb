//! Binary-level CLI behavior.

use assert_cmd::Command;
use predicates::prelude::*;

// Run from an empty directory so no strata.toml or environment credentials
// leak into the test.
fn strata(dir: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("strata").unwrap();
    cmd.current_dir(dir);
    cmd.env_remove("STRATA_URL");
    cmd.env_remove("STRATA_USERNAME");
    cmd.env_remove("STRATA_PASSWORD");
    cmd.env_remove("STRATA_CHANGELOG_FILE");
    cmd
}

#[test]
fn help_lists_commands() {
    let dir = tempfile::tempdir().unwrap();
    strata(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("update"))
        .stdout(predicate::str::contains("rollback"))
        .stdout(predicate::str::contains("release-locks"));
}

#[test]
fn update_without_configuration_fails_with_message() {
    let dir = tempfile::tempdir().unwrap();
    strata(dir.path())
        .arg("update")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--url"));
}

#[test]
fn update_without_changelog_names_the_missing_flag() {
    let dir = tempfile::tempdir().unwrap();
    strata(dir.path())
        .args(["update", "--url", "postgres://localhost/app"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--changelog-file"));
}

#[test]
fn rollback_requires_a_boundary() {
    let dir = tempfile::tempdir().unwrap();
    strata(dir.path())
        .args([
            "rollback",
            "--changelog-file",
            "db/changelog.toml",
            "--url",
            "postgres://localhost/app",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("boundary"));
}

#[test]
fn invalid_url_scheme_is_a_configuration_error() {
    let dir = tempfile::tempdir().unwrap();
    strata(dir.path())
        .args([
            "validate",
            "--changelog-file",
            "missing.toml",
            "--url",
            "redis://localhost/0",
        ])
        .assert()
        .failure();
}
