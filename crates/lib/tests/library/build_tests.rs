use lambda_build_lib::BuildError;
use lambda_build_lib::backend::ExecuteError;
use lambda_build_lib::build::{BuildVariant, TargetKind};
use lambda_build_lib::params::ParameterSet;
use lambda_build_lib::{Builder, Project};

use super::common::{FakeRequirements, SpyBackend, TestProject, zip_entries};

// =============================================================================
// Merged builds
// =============================================================================

#[tokio::test]
async fn merged_build_zips_dependencies_and_project_under_prefix() {
  let project = TestProject::new();
  let spy = SpyBackend::default();
  let builder = project.builder(&[("install-dir", "python")], &spy);

  let report = builder.build().await.unwrap();

  assert_eq!(report.variant, BuildVariant::MergedLocal);
  assert_eq!(report.built(), 1);
  assert_eq!(
    zip_entries(&project.root().join("package.zip")),
    vec![
      "python/checksum",
      "python/handler/__init__.py",
      "python/requests/__init__.py",
    ]
  );
  let calls = spy.calls();
  assert_eq!(calls.len(), 1);
  assert!(calls[0].needs_project);
  assert!(calls[0].display.contains("poetry build"));
}

#[tokio::test]
async fn unchanged_inputs_skip_second_build() {
  let project = TestProject::new();
  let spy = SpyBackend::default();
  let builder = project.builder(&[], &spy);

  builder.build().await.unwrap();
  let report = builder.build().await.unwrap();

  assert_eq!(report.skipped(), 1);
  assert_eq!(report.targets[0].files, None);
  assert_eq!(spy.calls().len(), 1);
}

#[tokio::test]
async fn project_change_triggers_rebuild() {
  let project = TestProject::new();
  let spy = SpyBackend::default();
  let builder = project.builder(&[], &spy);

  builder.build().await.unwrap();
  project.write("handler/app.py", "VERSION = 2\n");
  let report = builder.build().await.unwrap();

  assert_eq!(report.built(), 1);
  assert_eq!(spy.calls().len(), 2);
}

#[tokio::test]
async fn disabled_checksum_always_builds_without_sidecar() {
  let project = TestProject::new();
  let spy = SpyBackend::default();
  let builder = project.builder(&[("no-checksum", "true")], &spy);

  builder.build().await.unwrap();
  builder.build().await.unwrap();

  assert_eq!(spy.calls().len(), 2);
  let entries = zip_entries(&project.root().join("package.zip"));
  assert!(!entries.iter().any(|e| e.ends_with("checksum")));
}

#[tokio::test]
async fn failed_install_leaves_no_artifact() {
  let project = TestProject::new();
  let spy = SpyBackend::failing();
  let builder = project.builder(&[], &spy);

  let err = builder.build().await.unwrap_err();

  match err {
    BuildError::Execute(ExecuteError::CmdFailed { code, stderr, .. }) => {
      assert_eq!(code, Some(1));
      assert!(stderr.contains("No matching distribution"));
    }
    other => panic!("unexpected error: {other}"),
  }
  assert!(!project.root().join("package.zip").exists());
}

// =============================================================================
// Separated builds
// =============================================================================

#[tokio::test]
async fn separated_build_runs_function_then_layer() {
  let project = TestProject::new();
  let spy = SpyBackend::default();
  let builder = project.builder(
    &[
      ("layer-artifact-path", "dist/layer.zip"),
      ("layer-install-dir", "python"),
      ("function-artifact-path", "dist/function"),
    ],
    &spy,
  );

  let report = builder.build().await.unwrap();

  let kinds: Vec<_> = report.targets.iter().map(|t| t.kind).collect();
  assert_eq!(kinds, vec![TargetKind::Function, TargetKind::Layer]);

  let calls = spy.calls();
  assert!(calls[0].needs_project);
  assert!(calls[0].requirements.is_none());
  assert!(!calls[1].needs_project);
  let requirements = calls[1].requirements.as_deref().unwrap();
  assert!(requirements.contains("requests==2.32.3"));
  assert!(!requirements.contains("--extra-index-url"));

  let function_dir = project.root().join("dist/function");
  assert!(function_dir.join("handler/__init__.py").exists());
  assert!(function_dir.join("checksum").exists());
  assert!(!function_dir.join("requests").exists());

  assert_eq!(
    zip_entries(&project.root().join("dist/layer.zip")),
    vec!["python/checksum", "python/requests/__init__.py"]
  );
}

#[tokio::test]
async fn separated_container_build_installs_poetry_for_function_only() {
  let project = TestProject::new();
  let spy = SpyBackend::default();
  let builder = project.builder(
    &[
      ("docker-image", "public.ecr.aws/sam/build-python3.12"),
      ("layer-artifact-path", "layer.zip"),
      ("layer-install-dir", "python"),
      ("function-artifact-path", "function.zip"),
    ],
    &spy,
  );

  let report = builder.build().await.unwrap();

  assert_eq!(report.variant, BuildVariant::SeparatedContainer);
  assert_eq!(report.backend, "spy");
  let calls = spy.calls();
  assert!(calls[0].display.starts_with("pip install poetry"));
  assert!(calls[1].display.starts_with("mkdir -p"));
  assert_eq!(
    zip_entries(&project.root().join("function.zip")),
    vec!["checksum", "handler/__init__.py"]
  );
}

#[tokio::test]
async fn index_credentials_are_masked_in_display_only() {
  let project = TestProject::new();
  let spy = SpyBackend::default();
  let builder = project.builder(
    &[
      ("layer-artifact-path", "layer.zip"),
      ("function-artifact-path", "function.zip"),
    ],
    &spy,
  );

  builder.build().await.unwrap();

  let layer = &spy.calls()[1];
  assert!(layer.argv.iter().any(|a| a.contains("hunter2")));
  assert!(layer.argv.contains(&"--extra-index-url".to_string()));
  assert!(!layer.display.contains("hunter2"));
}

#[tokio::test]
async fn layer_ignores_project_changes() {
  let project = TestProject::new();
  let spy = SpyBackend::default();
  let builder = project.builder(
    &[
      ("layer-artifact-path", "layer.zip"),
      ("function-artifact-path", "function.zip"),
    ],
    &spy,
  );

  builder.build().await.unwrap();
  project.write("handler/app.py", "VERSION = 2\n");
  let report = builder.build().await.unwrap();

  assert!(!report.targets[0].skipped, "function should rebuild");
  assert!(report.targets[1].skipped, "layer should be up to date");
}

#[tokio::test]
async fn pre_install_script_runs_before_install() {
  let project = TestProject::new();
  let spy = SpyBackend::default();
  let builder = project.builder(&[("pre-install-script", "echo 'hello world'")], &spy);

  builder.build().await.unwrap();

  let argv = &spy.calls()[0].argv;
  assert_eq!(argv[..3], ["echo", "hello world", "&&"]);
}

// =============================================================================
// Configuration
// =============================================================================

#[test]
fn config_table_feeds_parameters() {
  let project = TestProject::new();
  project.write(
    "pyproject.toml",
    "[tool.poetry]\nname = \"handler\"\n\n[tool.lambda-build]\nlayer-artifact-path = \"layer.zip\"\nfunction-artifact-path = \"function.zip\"\nzip-compression = \"ZIP_DEFLATED\"\n",
  );
  let loaded = Project::discover(project.root()).unwrap();
  let params = ParameterSet::builder()
    .merge_table(loaded.config_table())
    .unwrap()
    .build()
    .unwrap();

  let builder = Builder::with_parts(
    params,
    loaded,
    Box::new(SpyBackend::default()),
    Box::new(FakeRequirements::with_private_index()),
  )
  .unwrap();

  assert_eq!(builder.variant(), BuildVariant::SeparatedLocal);
  assert_eq!(builder.targets().unwrap().len(), 2);
}

#[test]
fn removed_package_path_is_reported() {
  let project = TestProject::new();
  let params = ParameterSet::builder()
    .put("package-artifact-path", "")
    .unwrap()
    .build()
    .unwrap();

  let err = Builder::with_parts(
    params,
    Project::discover(project.root()).unwrap(),
    Box::new(SpyBackend::default()),
    Box::new(FakeRequirements::with_private_index()),
  )
  .err()
  .unwrap();

  assert!(matches!(err, BuildError::MissingArtifactPath(TargetKind::Package)));
}
