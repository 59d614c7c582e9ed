use assert_cmd::Command;
use predicates::prelude::*;

fn keisaku() -> Command {
    Command::cargo_bin("keisaku").unwrap()
}

#[test]
fn test_help_flag() {
    keisaku()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("telemetry"))
        .stdout(predicate::str::contains("--time-series-port"))
        .stdout(predicate::str::contains("--band-power-port"));
}

#[test]
fn test_version_flag() {
    keisaku()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("keisaku"));
}

#[test]
fn test_rejects_unknown_flag() {
    keisaku()
        .arg("--no-such-flag")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unexpected argument"));
}
