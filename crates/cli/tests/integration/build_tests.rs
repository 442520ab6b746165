//! Build command integration tests.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use predicates::prelude::*;

use super::common::{CITED, TestEnv};

#[test]
fn build_succeeds_and_reports() {
  let env = TestEnv::new();
  env.write("paper.tex", CITED);

  env
    .build_cmd(&[])
    .assert()
    .success()
    .stdout(predicate::str::contains("Built paper.tex"))
    .stdout(predicate::str::contains("Sync map: yes"));

  assert_eq!(env.scratch_entries(), 0);
}

#[test]
fn build_writes_artifact_to_out() {
  let env = TestEnv::new();
  env.write("paper.tex", CITED);
  let out = env.temp.path().join("out.pdf");

  env.build_cmd(&["--out"]).arg(&out).assert().success();

  assert_eq!(std::fs::read(&out).unwrap(), b"%PDF-1.5 fake");
}

#[test]
fn build_json_output() {
  let env = TestEnv::new();
  env.write("paper.tex", CITED);

  let output = env.build_cmd(&["-o", "json"]).output().unwrap();
  assert!(output.status.success());

  let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  assert_eq!(json["ok"], true);
  assert_eq!(json["exit_status"], 0);
  assert_eq!(json["has_sync_map"], true);
  let artifact = STANDARD.decode(json["artifact"].as_str().unwrap()).unwrap();
  assert_eq!(artifact, b"%PDF-1.5 fake");
  assert!(json["log"].as_str().unwrap().contains("bibliography: bibtex"));
}

#[test]
fn rebuild_skips_bibliography() {
  let env = TestEnv::built();

  let output = env.build_cmd(&["-o", "json"]).output().unwrap();
  assert!(output.status.success());

  let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  assert!(
    json["log"]
      .as_str()
      .unwrap()
      .contains("citations unchanged, skipping bibliography")
  );
}

#[test]
fn clean_build_reruns_bibliography() {
  let env = TestEnv::built();

  let output = env.build_cmd(&["--clean", "-o", "json"]).output().unwrap();
  assert!(output.status.success());

  let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  let log = json["log"].as_str().unwrap();
  assert!(log.contains("bibliography: bibtex"));
  assert!(!log.contains("skipping bibliography"));
}

#[test]
fn stream_json_emits_events() {
  let env = TestEnv::new();
  env.write("paper.tex", CITED);

  let output = env.build_cmd(&["--stream", "-o", "json"]).output().unwrap();
  assert!(output.status.success());

  let stdout = String::from_utf8(output.stdout).unwrap();
  let events: Vec<serde_json::Value> = stdout.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
  let (done, logs) = events.split_last().unwrap();

  assert_eq!(done["event"], "done");
  assert_eq!(done["ok"], true);
  assert!(!logs.is_empty());
  assert!(logs.iter().all(|e| e["event"] == "log"));

  let joined: String = logs.iter().map(|e| e["chunk"].as_str().unwrap()).collect();
  assert_eq!(joined, done["log"].as_str().unwrap());
}

#[test]
fn stream_text_prints_log() {
  let env = TestEnv::new();
  env.write("paper.tex", CITED);

  env
    .build_cmd(&["--stream"])
    .assert()
    .success()
    .stdout(predicate::str::contains("[quire] pass 1: fake"))
    .stdout(predicate::str::contains("Output written on paper.pdf"));
}

#[test]
fn failed_build_exits_nonzero() {
  let env = TestEnv::new();
  env.write("paper.tex", "NOPDF\n");

  env
    .build_cmd(&[])
    .assert()
    .failure()
    .stdout(predicate::str::contains("! Emergency stop."))
    .stderr(predicate::str::contains("No artifact generated."));
}

#[test]
fn failed_build_json_has_no_artifact() {
  let env = TestEnv::new();
  env.write("paper.tex", "NOPDF\n");

  let output = env.build_cmd(&["-o", "json"]).output().unwrap();
  assert!(!output.status.success());

  let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  assert_eq!(json["ok"], false);
  assert_eq!(json["exit_status"], 1);
  assert!(json.get("artifact").is_none());
  assert_eq!(json["error"], "No artifact generated.");
}
