//! Sync command integration tests.

use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn forward_prints_positions() {
  let env = TestEnv::built();

  env
    .quire_cmd()
    .args(["sync", "forward", "paper.tex", "3", "--root"])
    .arg(&env.project)
    .assert()
    .success()
    .stdout(predicate::str::contains("page 1 at (72.00, 100.50)"));
}

#[test]
fn inverse_prints_source_line() {
  let env = TestEnv::built();

  env
    .quire_cmd()
    .args(["sync", "inverse", "1", "72", "100.5", "--root"])
    .arg(&env.project)
    .assert()
    .success()
    .stdout(predicate::str::contains("paper.tex:3"));
}

#[test]
fn forward_json_output() {
  let env = TestEnv::built();

  let output = env
    .quire_cmd()
    .args(["sync", "forward", "paper.tex", "3", "-o", "json", "--root"])
    .arg(&env.project)
    .output()
    .unwrap();
  assert!(output.status.success());

  let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  assert_eq!(json["ok"], true);
  assert_eq!(json["results"][0]["page"], 1);
  assert_eq!(json["results"][0]["w"], 300.0);
}

#[test]
fn sync_after_clean_has_no_data() {
  let env = TestEnv::built();
  env
    .quire_cmd()
    .args(["clean", "--force", "--root"])
    .arg(&env.project)
    .assert()
    .success();

  env
    .quire_cmd()
    .args(["sync", "inverse", "1", "0", "0", "--root"])
    .arg(&env.project)
    .assert()
    .failure()
    .stderr(predicate::str::contains("No sync data available, recompile first."));
}
