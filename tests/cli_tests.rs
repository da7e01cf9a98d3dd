//! CLI smoke tests against the built binary.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

fn spec_file(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".yaml")
        .tempfile()
        .unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

const VALID_SPEC: &str = r#"
name: order-tracking
description: Track order status transitions
scenarios:
  - name: happy path
    given: an order exists
    when: the order ships
    then:
      - status becomes shipped
"#;

#[test]
fn tools_lists_every_capability() {
    Command::cargo_bin("crucible")
        .unwrap()
        .arg("tools")
        .assert()
        .success()
        .stdout(predicate::str::contains("generate_implementation"))
        .stdout(predicate::str::contains("validate_syntax"))
        .stdout(predicate::str::contains("analyze_code_quality"))
        .stdout(predicate::str::contains("generate_dockerfile"));
}

#[test]
fn run_with_template_backend_converges() {
    let spec = spec_file(VALID_SPEC);
    Command::cargo_bin("crucible")
        .unwrap()
        .arg("run")
        .arg(spec.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Target reached"));
}

#[test]
fn run_with_packaging_reports_artifacts() {
    let spec = spec_file(VALID_SPEC);
    Command::cargo_bin("crucible")
        .unwrap()
        .arg("run")
        .arg(spec.path())
        .arg("--package")
        .assert()
        .success()
        .stdout(predicate::str::contains("Packaging: Dockerfile"));
}

#[test]
fn missing_spec_file_fails_cleanly() {
    Command::cargo_bin("crucible")
        .unwrap()
        .arg("run")
        .arg("does-not-exist.yaml")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn spec_without_scenarios_is_rejected() {
    let spec = spec_file("name: empty\nscenarios: []\n");
    Command::cargo_bin("crucible")
        .unwrap()
        .arg("run")
        .arg(spec.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Specification error"));
}

#[test]
fn unreachable_target_exits_nonzero() {
    let spec = spec_file(VALID_SPEC);
    Command::cargo_bin("crucible")
        .unwrap()
        .arg("run")
        .arg(spec.path())
        .args(["--target", "100", "-n", "2"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("Target not reached"));
}
