use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn help_exits_zero() {
    Command::cargo_bin("devicekit")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("devicekit"))
        .stdout(predicate::str::contains("android"))
        .stdout(predicate::str::contains("apple"))
        .stdout(predicate::str::contains("test"));
}

#[test]
fn android_help_lists_lifecycle_subcommands() {
    Command::cargo_bin("devicekit")
        .unwrap()
        .args(["android", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("list"))
        .stdout(predicate::str::contains("create"))
        .stdout(predicate::str::contains("delete"))
        .stdout(predicate::str::contains("boot"));
}

#[test]
fn test_help_documents_the_filters() {
    Command::cargo_bin("devicekit")
        .unwrap()
        .args(["test", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--device-results"))
        .stdout(predicate::str::contains("--runtime"))
        .stdout(predicate::str::contains("--latest"))
        .stdout(predicate::str::contains("--reset"))
        .stdout(predicate::str::contains("--shutdown"));
}

#[test]
fn missing_subcommand_fails_with_usage() {
    Command::cargo_bin("devicekit")
        .unwrap()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn unsupported_app_extension_fails() {
    Command::cargo_bin("devicekit")
        .unwrap()
        .args(["test", "SomeApp.zip"])
        .assert()
        .failure();
}
