use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn config_section_selects_separated_build() {
  let env = TestEnv::project("layer-artifact-path = \"dist/layer.zip\"\nfunction-artifact-path = \"dist/function\"\n");

  let plan = env.plan_json(&[]);

  assert_eq!(plan["variant"], "separated-local");
  assert_eq!(plan["backend"], "local");
  let targets = plan["targets"].as_array().unwrap();
  assert_eq!(targets[0]["kind"], "function");
  assert_eq!(targets[0]["archive"], false);
  assert_eq!(targets[1]["kind"], "layer");
  assert!(targets[1]["path"].as_str().unwrap().ends_with("layer.zip"));
}

#[test]
fn cli_tokens_override_config() {
  let env = TestEnv::project("layer-install-dir = \"python\"\nlayer-artifact-path = \"layer.zip\"\n");

  let plan = env.plan_json(&["--layer-install-dir", "opt/python", "no-checksum"]);

  let target = &plan["targets"][0];
  assert_eq!(plan["variant"], "merged-local");
  assert_eq!(target["install_prefix"], "opt/python");
  assert!(target["up_to_date"].is_null());
}

#[test]
fn plan_reports_changed_inputs() {
  let env = TestEnv::project("");

  let plan = env.plan_json(&[]);

  assert_eq!(plan["targets"][0]["up_to_date"], false);
  assert!(plan["targets"][0]["job"].as_str().unwrap().contains("poetry build"));
}

#[test]
fn container_image_selects_container_backend() {
  let env = TestEnv::project("docker-image = \"public.ecr.aws/sam/build-python3.12\"\n");

  let plan = env.plan_json(&[]);

  assert_eq!(plan["variant"], "merged-container");
  assert_eq!(plan["backend"], "container");
  assert!(
    plan["targets"][0]["job"]
      .as_str()
      .unwrap()
      .starts_with("pip install poetry")
  );
}

#[test]
fn conflicting_groups_fail() {
  let env = TestEnv::project("only = \"main\"\n");

  env
    .cmd()
    .args(["plan", "with=dev"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("'only' cannot be combined"));
}

#[test]
fn compression_level_out_of_range_fails() {
  let env = TestEnv::project("");

  env
    .cmd()
    .args(["plan", "zip-compression=ZIP_DEFLATED", "zip-compresslevel=12"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("zip-compresslevel"));
}
