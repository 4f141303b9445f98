mod build;
mod params;
mod plan;

pub use build::cmd_build;
pub use params::cmd_params;
pub use plan::cmd_plan;

use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use lambda_build_lib::params::{ParameterSet, parse_cli_tokens};
use lambda_build_lib::{Builder, Project};

/// Load the project and resolve parameters: `[tool.lambda-build]` first,
/// command-line tokens on top.
pub(crate) fn load_builder(project_dir: &Path, tokens: &[String]) -> Result<Builder> {
  let project = Project::discover(project_dir).context("Failed to load project")?;
  let pairs = parse_cli_tokens(tokens).context("Invalid build parameters")?;
  debug!(project = %project.root().display(), params = pairs.len(), "resolving parameters");

  let params = ParameterSet::builder()
    .merge_table(project.config_table())
    .context("Invalid [tool.lambda-build] configuration")?
    .merge_pairs(&pairs)
    .context("Invalid build parameters")?
    .build()
    .context("Invalid build parameters")?;

  Builder::new(params, project).context("Failed to prepare build")
}
