use std::fmt;

use serde::Serialize;

use crate::artifact::ArtifactTarget;
use crate::params::ParameterSet;

/// Shape of a build, decided once from the parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BuildVariant {
  MergedLocal,
  MergedContainer,
  SeparatedLocal,
  SeparatedContainer,
}

impl BuildVariant {
  /// Separated only when both layer and function paths are set; a container
  /// image moves either shape into a container.
  pub fn classify(params: &ParameterSet) -> Self {
    let separated = params.layer().artifact_path.is_some() && params.function().artifact_path.is_some();
    match (params.in_container(), separated) {
      (true, true) => BuildVariant::SeparatedContainer,
      (true, false) => BuildVariant::MergedContainer,
      (false, true) => BuildVariant::SeparatedLocal,
      (false, false) => BuildVariant::MergedLocal,
    }
  }

  pub fn is_separated(self) -> bool {
    matches!(self, BuildVariant::SeparatedLocal | BuildVariant::SeparatedContainer)
  }

  pub fn in_container(self) -> bool {
    matches!(self, BuildVariant::MergedContainer | BuildVariant::SeparatedContainer)
  }

  /// Target kinds built by this variant, in build order.
  pub fn target_kinds(self) -> &'static [TargetKind] {
    if self.is_separated() {
      &[TargetKind::Function, TargetKind::Layer]
    } else {
      &[TargetKind::Package]
    }
  }
}

impl fmt::Display for BuildVariant {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      BuildVariant::MergedLocal => "merged (local)",
      BuildVariant::MergedContainer => "merged (container)",
      BuildVariant::SeparatedLocal => "separated (local)",
      BuildVariant::SeparatedContainer => "separated (container)",
    };
    f.write_str(name)
  }
}

/// What an artifact contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
  /// Third-party dependencies only.
  Layer,
  /// The project's own package only.
  Function,
  /// Dependencies and the project together.
  Package,
}

impl fmt::Display for TargetKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      TargetKind::Layer => "layer",
      TargetKind::Function => "function",
      TargetKind::Package => "package",
    };
    f.write_str(name)
  }
}

/// A resolved target: what to build and where it goes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetSpec {
  pub kind: TargetKind,
  pub artifact: ArtifactTarget,
}

/// Result of one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetReport {
  pub kind: TargetKind,
  pub path: String,
  pub install_prefix: String,
  pub skipped: bool,
  /// Files written into the artifact, absent when skipped.
  pub files: Option<usize>,
}

/// Result of a whole build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildReport {
  pub variant: BuildVariant,
  pub backend: String,
  pub targets: Vec<TargetReport>,
}

impl BuildReport {
  pub fn built(&self) -> usize {
    self.targets.iter().filter(|t| !t.skipped).count()
  }

  pub fn skipped(&self) -> usize {
    self.targets.iter().filter(|t| t.skipped).count()
  }
}

/// A target as it would be built, without running anything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedTarget {
  pub kind: TargetKind,
  pub path: String,
  pub install_prefix: String,
  pub archive: bool,
  /// Install job template.
  pub job: String,
  /// Whether the checksum gate would skip it; absent when checksums are off.
  pub up_to_date: Option<bool>,
}

/// What `build` would do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildPlan {
  pub variant: BuildVariant,
  pub backend: String,
  pub targets: Vec<PlannedTarget>,
}
