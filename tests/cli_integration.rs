use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

fn checkroom() -> Command {
    Command::cargo_bin("checkroom").unwrap()
}

#[test]
fn init_check_in_collect_status_smoke() {
    let dir = tempdir().unwrap();
    let root = dir.path().to_str().unwrap();
    let body = dir.path().join("body.xml");
    fs::write(&body, "<order/>").unwrap();

    checkroom()
        .args(["init", "--root", root])
        .assert()
        .success()
        .stdout(predicate::str::contains("initialized checkroom depot"));

    checkroom()
        .args(["check-in", body.to_str().unwrap(), "--root", root])
        .assert()
        .success()
        .stdout(predicate::str::contains(".chk"));

    checkroom()
        .args(["status", "--root", root, "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"state\":\"unlocked\""));

    checkroom()
        .args(["collect", "--passes", "4", "--root", root])
        .assert()
        .success()
        .stdout(predicate::str::contains("locked 1"))
        .stdout(predicate::str::contains("unlocked 1"));

    // Fully retired: nothing left to report.
    checkroom()
        .args(["status", "--root", root, "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[]"));
}

#[test]
fn init_twice_fails_with_a_stable_code() {
    let dir = tempdir().unwrap();
    let root = dir.path().to_str().unwrap();

    checkroom().args(["init", "--root", root]).assert().success();
    checkroom()
        .args(["init", "--root", root])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already_initialized"));
}

#[test]
fn commands_require_an_initialized_depot() {
    let dir = tempdir().unwrap();
    let root = dir.path().to_str().unwrap();

    checkroom()
        .args(["status", "--root", root])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not a checkroom depot"));
}

#[test]
fn check_in_rejects_a_missing_body() {
    let dir = tempdir().unwrap();
    let root = dir.path().to_str().unwrap();

    checkroom().args(["init", "--root", root]).assert().success();
    checkroom()
        .args(["check-in", "no-such-file.xml", "--root", root])
        .assert()
        .failure()
        .stderr(predicate::str::contains("body_not_found"));
}
