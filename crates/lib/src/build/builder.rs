use std::fs;
use std::path::Path;

use globset::GlobSet;
use tracing::{info, instrument};

use super::jobs::install_job;
use super::{BuildError, BuildPlan, BuildReport, BuildVariant, PlannedTarget, TargetKind, TargetReport, TargetSpec};
use crate::artifact::{ArtifactTarget, FinalizeReport, finalize, glob_set};
use crate::backend::{ContainerBackend, ExecutionBackend, LocalBackend, Workspace};
use crate::checksum::{Checksum, ChecksumError, ChecksumGate, GateOutcome, compute_file, compute_tree};
use crate::command::{Bindings, CommandTemplate};
use crate::consts::{CHECKSUM_EXCLUDES, REQUIREMENTS_FILE};
use crate::params::{ParameterSet, TargetParams};
use crate::project::Project;
use crate::requirements::{PoetryExporter, RequirementsSource};

/// Drives a whole build: classify, then gate, install and finalize each target.
pub struct Builder {
  params: ParameterSet,
  project: Project,
  variant: BuildVariant,
  backend: Box<dyn ExecutionBackend>,
  requirements: Box<dyn RequirementsSource>,
  gate: ChecksumGate,
}

impl Builder {
  /// Create a builder with the backend implied by the parameters and
  /// `poetry export` as the requirements source.
  pub fn new(params: ParameterSet, project: Project) -> Result<Self, BuildError> {
    let backend: Box<dyn ExecutionBackend> = if params.in_container() {
      Box::new(ContainerBackend::new(params.docker().clone())?)
    } else {
      Box::new(LocalBackend::new())
    };
    let requirements = Box::new(PoetryExporter::new(project.root()));
    Self::with_parts(params, project, backend, requirements)
  }

  /// Create a builder with explicit collaborators.
  ///
  /// Targets are resolved here, so missing artifact paths fail before any
  /// backend runs.
  pub fn with_parts(
    params: ParameterSet,
    project: Project,
    backend: Box<dyn ExecutionBackend>,
    requirements: Box<dyn RequirementsSource>,
  ) -> Result<Self, BuildError> {
    let variant = BuildVariant::classify(&params);
    let gate = ChecksumGate::new(params.checksum_enabled());
    let builder = Self {
      params,
      project,
      variant,
      backend,
      requirements,
      gate,
    };
    builder.targets()?;
    info!(variant = %builder.variant, backend = builder.backend.name(), "build classified");
    Ok(builder)
  }

  pub fn variant(&self) -> BuildVariant {
    self.variant
  }

  pub fn params(&self) -> &ParameterSet {
    &self.params
  }

  /// Resolve every target of the classified variant, in build order.
  pub fn targets(&self) -> Result<Vec<TargetSpec>, BuildError> {
    self
      .variant
      .target_kinds()
      .iter()
      .map(|&kind| self.resolve_target(kind))
      .collect()
  }

  fn resolve_target(&self, kind: TargetKind) -> Result<TargetSpec, BuildError> {
    let params = &self.params;
    let fallback_dir = params.package().install_dir.as_deref();
    let (path, prefix) = match kind {
      TargetKind::Layer => target_params(params.layer(), None),
      TargetKind::Function => target_params(params.function(), None),
      TargetKind::Package => [params.function(), params.layer(), params.package()]
        .into_iter()
        .find(|t| t.artifact_path.is_some())
        .map(|t| target_params(t, fallback_dir))
        .unwrap_or((None, fallback_dir)),
    };
    let path = path.ok_or(BuildError::MissingArtifactPath(kind))?;
    Ok(TargetSpec {
      kind,
      artifact: ArtifactTarget::new(self.project.resolve(path), prefix),
    })
  }

  /// Describe the build without running any backend.
  pub fn plan(&self) -> Result<BuildPlan, BuildError> {
    let targets = self
      .targets()?
      .into_iter()
      .map(|spec| {
        let job = self.job(spec.kind);
        let up_to_date = if self.gate.enabled() {
          Some(self.gate.is_fresh(&spec.artifact, &self.checksum_for(spec.kind)?))
        } else {
          None
        };
        Ok(PlannedTarget {
          kind: spec.kind,
          path: spec.artifact.path().display().to_string(),
          install_prefix: spec.artifact.install_prefix().to_string(),
          archive: spec.artifact.is_archive(),
          job: job.to_string(),
          up_to_date,
        })
      })
      .collect::<Result<Vec<_>, BuildError>>()?;

    Ok(BuildPlan {
      variant: self.variant,
      backend: self.backend.name().to_string(),
      targets,
    })
  }

  /// Build every target. The first failure aborts the build.
  pub async fn build(&self) -> Result<BuildReport, BuildError> {
    let specs = self.targets()?;
    let mut targets = Vec::with_capacity(specs.len());

    for spec in &specs {
      targets.push(self.build_target(spec).await?);
    }

    Ok(BuildReport {
      variant: self.variant,
      backend: self.backend.name().to_string(),
      targets,
    })
  }

  #[instrument(skip_all, fields(target = %spec.kind))]
  async fn build_target(&self, spec: &TargetSpec) -> Result<TargetReport, BuildError> {
    info!(path = %spec.artifact.path().display(), "building {} artifact", spec.kind);
    let kind = spec.kind;
    let artifact = &spec.artifact;

    let outcome = self
      .gate
      .run(artifact, move || self.checksum_for(kind), move || self.install(kind, artifact))
      .await?;

    let files = match outcome {
      GateOutcome::Skipped => None,
      GateOutcome::Built(report) => {
        info!(path = %artifact.path().display(), files = report.files, "artifact built");
        Some(report.files)
      }
    };

    Ok(TargetReport {
      kind,
      path: artifact.path().display().to_string(),
      install_prefix: artifact.install_prefix().to_string(),
      skipped: files.is_none(),
      files,
    })
  }

  fn job(&self, kind: TargetKind) -> CommandTemplate {
    install_job(kind, self.variant.in_container(), self.params.pre_install_script())
  }

  /// Install into a fresh staging directory and finalize the artifact.
  ///
  /// The staging directory is removed when this returns, on success or failure.
  async fn install(&self, kind: TargetKind, artifact: &ArtifactTarget) -> Result<FinalizeReport, BuildError> {
    let job = self.job(kind);
    let tmp = tempfile::Builder::new()
      .prefix("lambda-build-")
      .tempdir()
      .map_err(BuildError::Staging)?;
    let staging_root = tmp.path().join("staging");
    let output_dir = match artifact.install_prefix() {
      "" => staging_root.clone(),
      prefix => staging_root.join(prefix),
    };
    fs::create_dir_all(&output_dir).map_err(BuildError::Staging)?;

    let mut workspace = Workspace::new(self.project.root(), &output_dir)
      .with_project(kind != TargetKind::Layer)
      .with_excludes(self.artifact_globs());
    let mut indexes = Vec::new();

    if job.uses("requirements") {
      info!("generating requirements file");
      let requirements = self.requirements.export(self.params.groups()).await?;
      let path = tmp.path().join(REQUIREMENTS_FILE);
      fs::write(&path, &requirements.text).map_err(BuildError::Staging)?;
      workspace = workspace.with_requirements(path);
      indexes = requirements.indexes;
    }

    let view = self.backend.view(&workspace);
    let mut bindings = Bindings::new()
      .value("output_dir", view.output_dir)
      .value("project_dir", view.project_dir)
      .value("package_name", self.project.package_name())
      .secret("indexes", indexes);
    if let Some(requirements) = view.requirements {
      bindings = bindings.value("requirements", requirements);
    }

    let command = job.render(&bindings)?;
    self.backend.run(&command, &workspace).await?;

    Ok(finalize(&staging_root, artifact, self.params.zip(), &[])?)
  }

  /// Checksum of the inputs of a target kind.
  ///
  /// Layers depend on the lock file only; anything containing the project
  /// depends on the project tree minus outputs and build byproducts.
  fn checksum_for(&self, kind: TargetKind) -> Result<Checksum, ChecksumError> {
    match kind {
      TargetKind::Layer => compute_file(&self.project.lock_file()),
      TargetKind::Function | TargetKind::Package => compute_tree(self.project.root(), &self.checksum_excludes()?),
    }
  }

  fn checksum_excludes(&self) -> Result<GlobSet, ChecksumError> {
    let mut patterns: Vec<String> = CHECKSUM_EXCLUDES.iter().map(|s| s.to_string()).collect();
    patterns.push(crate::consts::LOCK_FILE.to_string());
    patterns.extend(self.artifact_globs());
    glob_set(patterns.iter().map(String::as_str)).map_err(|e| ChecksumError::Walk {
      path: self.project.root().display().to_string(),
      message: e.to_string(),
    })
  }

  /// Globs, relative to the project root, covering every configured artifact.
  fn artifact_globs(&self) -> Vec<String> {
    self
      .params
      .artifact_paths()
      .into_iter()
      .filter_map(|path| {
        let resolved = self.project.resolve(path);
        let rel = resolved.strip_prefix(self.project.root()).ok()?;
        let rel = rel_glob(rel);
        (!rel.is_empty()).then(|| [rel.clone(), format!("{rel}/**")])
      })
      .flatten()
      .collect()
  }
}

fn target_params<'a>(target: &'a TargetParams, fallback_dir: Option<&'a str>) -> (Option<&'a str>, Option<&'a str>) {
  (
    target.artifact_path.as_deref(),
    target.install_dir.as_deref().or(fallback_dir),
  )
}

/// Relative path as a literal glob.
fn rel_glob(rel: &Path) -> String {
  let raw = crate::artifact::relative_slash_path(Path::new(""), rel);
  let mut escaped = String::with_capacity(raw.len());
  for c in raw.chars() {
    if "*?[]{}".contains(c) {
      escaped.push('[');
      escaped.push(c);
      escaped.push(']');
    } else {
      escaped.push(c);
    }
  }
  escaped
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::params::DependencyGroups;
  use crate::requirements::{Requirements, RequirementsError};
  use crate::util::testutil::write_project;
  use tempfile::TempDir;

  struct NoRequirements;

  #[async_trait::async_trait]
  impl RequirementsSource for NoRequirements {
    async fn export(&self, _groups: &DependencyGroups) -> Result<Requirements, RequirementsError> {
      Ok(Requirements::default())
    }
  }

  fn project(dir: &TempDir) -> Project {
    write_project(dir.path(), "handler", "");
    Project::discover(dir.path()).unwrap()
  }

  fn builder(dir: &TempDir, params: ParameterSet) -> Result<Builder, BuildError> {
    Builder::with_parts(params, project(dir), Box::new(LocalBackend::new()), Box::new(NoRequirements))
  }

  fn params(pairs: &[(&str, &str)]) -> ParameterSet {
    pairs
      .iter()
      .fold(ParameterSet::builder(), |b, (k, v)| b.put(k, v).unwrap())
      .build()
      .unwrap()
  }

  #[test]
  fn merged_uses_single_set_path_and_its_install_dir() {
    let dir = TempDir::new().unwrap();
    let b = builder(
      &dir,
      params(&[
        ("layer-artifact-path", "out/layer.zip"),
        ("layer-install-dir", "python"),
      ]),
    )
    .unwrap();

    let targets = b.targets().unwrap();

    assert_eq!(targets.len(), 1);
    assert_eq!(targets[0].kind, TargetKind::Package);
    assert!(targets[0].artifact.path().ends_with("out/layer.zip"));
    assert_eq!(targets[0].artifact.install_prefix(), "python");
  }

  #[test]
  fn merged_falls_back_to_install_dir_alias() {
    let dir = TempDir::new().unwrap();
    let b = builder(&dir, params(&[("install-dir", "python")])).unwrap();
    let targets = b.targets().unwrap();
    assert!(targets[0].artifact.path().ends_with("package.zip"));
    assert_eq!(targets[0].artifact.install_prefix(), "python");
  }

  #[test]
  fn missing_path_is_config_error() {
    let dir = TempDir::new().unwrap();
    let err = builder(&dir, params(&[("package-artifact-path", "")])).err().unwrap();
    assert!(matches!(err, BuildError::MissingArtifactPath(TargetKind::Package)));
    assert!(err.is_config());
  }

  #[test]
  fn artifact_globs_cover_outputs_under_project() {
    let dir = TempDir::new().unwrap();
    let b = builder(
      &dir,
      params(&[
        ("layer-artifact-path", "dist/layer.zip"),
        ("function-artifact-path", "/elsewhere/function.zip"),
      ]),
    )
    .unwrap();

    let globs = b.artifact_globs();

    assert!(globs.contains(&"dist/layer.zip".to_string()));
    assert!(globs.contains(&"package.zip/**".to_string()));
    assert!(!globs.iter().any(|g| g.contains("function.zip")));
  }

  #[test]
  fn project_checksum_ignores_outputs_and_lock() {
    let dir = TempDir::new().unwrap();
    let b = builder(&dir, params(&[])).unwrap();
    fs::write(dir.path().join("handler.py"), "def handler(): ...\n").unwrap();
    let before = b.checksum_for(TargetKind::Package).unwrap();

    fs::write(dir.path().join("package.zip"), "zip").unwrap();
    fs::write(dir.path().join("poetry.lock"), "# changed lock\n").unwrap();

    assert_eq!(before, b.checksum_for(TargetKind::Package).unwrap());
  }

  #[test]
  fn plan_reports_targets_without_running() {
    let dir = TempDir::new().unwrap();
    let b = builder(
      &dir,
      params(&[
        ("layer-artifact-path", "layer"),
        ("function-artifact-path", "function.zip"),
      ]),
    )
    .unwrap();

    let plan = b.plan().unwrap();

    assert_eq!(plan.variant, BuildVariant::SeparatedLocal);
    assert_eq!(plan.backend, "local");
    let kinds: Vec<_> = plan.targets.iter().map(|t| t.kind).collect();
    assert_eq!(kinds, vec![TargetKind::Function, TargetKind::Layer]);
    assert!(!plan.targets[1].archive);
    assert_eq!(plan.targets[0].up_to_date, Some(false));
    assert!(plan.targets[1].job.contains("-r {requirements}"));
  }

  #[test]
  fn container_plan_needs_no_runtime() {
    let dir = TempDir::new().unwrap();
    let params = params(&[("docker-image", "python:3.12")]);

    let plan = Builder::new(params, project(&dir)).unwrap().plan().unwrap();

    assert_eq!(plan.variant, BuildVariant::MergedContainer);
    assert_eq!(plan.backend, "container");
    assert_eq!(plan.targets.len(), 1);
    assert!(plan.targets[0].job.contains("{output_dir}"));
  }

  #[test]
  fn rel_glob_escapes_metacharacters() {
    assert_eq!(rel_glob(Path::new("out/[v1]/a*.zip")), "out/[[]v1[]]/a[*].zip");
  }
}
