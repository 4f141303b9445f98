use predicates::prelude::*;
use serial_test::serial;
use tempfile::TempDir;

use super::common::TestEnv;

#[test]
#[serial]
fn build_without_tooling_fails_and_writes_nothing() {
  let env = TestEnv::project("layer-artifact-path = \"layer.zip\"\n");
  let empty_bin = TempDir::new().unwrap();

  env
    .cmd_with_path(empty_bin.path())
    .arg("build")
    .assert()
    .failure()
    .stderr(predicate::str::contains("Build failed"));

  assert!(!env.path("layer.zip").exists());
}

#[test]
#[serial]
fn build_json_failure_keeps_stdout_clean() {
  let env = TestEnv::project("");
  let empty_bin = TempDir::new().unwrap();

  env
    .cmd_with_path(empty_bin.path())
    .args(["--output", "json", "build"])
    .assert()
    .failure()
    .stdout(predicate::str::is_empty());

  assert!(!env.path("package.zip").exists());
}
