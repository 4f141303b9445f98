//! Build orchestration.
//!
//! [`Builder`] classifies the build once, resolves its targets, and for each
//! target runs the checksum-gated install job through an execution backend
//! inside a scoped staging directory before finalizing the artifact.

mod builder;
pub mod jobs;
mod types;

use thiserror::Error;

pub use builder::Builder;
pub use types::{BuildPlan, BuildReport, BuildVariant, PlannedTarget, TargetKind, TargetReport, TargetSpec};

use crate::artifact::ArtifactError;
use crate::backend::ExecuteError;
use crate::checksum::ChecksumError;
use crate::command::TemplateError;
use crate::params::ConfigError;
use crate::requirements::RequirementsError;

#[derive(Debug, Error)]
pub enum BuildError {
  #[error(transparent)]
  Config(#[from] ConfigError),

  #[error("no artifact path configured for the {0} target")]
  MissingArtifactPath(TargetKind),

  #[error("template error: {0}")]
  Template(#[from] TemplateError),

  #[error(transparent)]
  Execute(#[from] ExecuteError),

  #[error("requirements export failed: {0}")]
  Requirements(#[from] RequirementsError),

  #[error("checksum error: {0}")]
  Checksum(#[from] ChecksumError),

  #[error("artifact error: {0}")]
  Artifact(#[from] ArtifactError),

  #[error("failed to prepare staging directory: {0}")]
  Staging(#[source] std::io::Error),
}

impl BuildError {
  /// Whether the error comes from configuration rather than execution.
  pub fn is_config(&self) -> bool {
    matches!(
      self,
      BuildError::Config(_) | BuildError::MissingArtifactPath(_) | BuildError::Template(_)
    )
  }
}
