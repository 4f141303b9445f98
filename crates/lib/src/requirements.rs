//! Requirements export.
//!
//! Locked dependencies are exported as a plain requirements list. Package
//! index options found in the export are lifted out into a separate argument
//! list so index credentials never land in the requirements file and can be
//! masked when commands are logged.

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

use crate::params::DependencyGroups;

#[derive(Debug, Error)]
pub enum RequirementsError {
  #[error("failed to run {program}: {source}")]
  Spawn {
    program: String,
    #[source]
    source: std::io::Error,
  },

  #[error("requirements export failed with exit code {code:?}: {stderr}")]
  ExportFailed { code: Option<i32>, stderr: String },
}

/// Exported dependencies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Requirements {
  /// Requirements file contents without index options.
  pub text: String,
  /// Index arguments for `pip install`, e.g. `["--extra-index-url", "https://..."]`.
  pub indexes: Vec<String>,
}

impl Requirements {
  /// Split raw export output into requirement lines and index arguments.
  pub fn from_export(output: &str) -> Self {
    let mut text = String::new();
    let mut indexes = Vec::new();

    for line in output.lines() {
      let trimmed = line.trim();
      if is_index_option(trimmed) {
        indexes.extend(index_args(trimmed));
      } else {
        text.push_str(line);
        text.push('\n');
      }
    }

    Self { text, indexes }
  }
}

const INDEX_OPTIONS: &[&str] = &["--index-url", "--extra-index-url", "--trusted-host", "-i"];

fn is_index_option(line: &str) -> bool {
  let flag = line.split(|c: char| c.is_whitespace() || c == '=').next().unwrap_or_default();
  INDEX_OPTIONS.contains(&flag)
}

fn index_args(line: &str) -> Vec<String> {
  line
    .split_whitespace()
    .flat_map(|token| match token.split_once('=') {
      Some((flag, value)) if flag.starts_with('-') => vec![flag.to_string(), value.to_string()],
      _ => vec![token.to_string()],
    })
    .collect()
}

/// Produces the locked requirements of a project.
#[async_trait]
pub trait RequirementsSource: Send + Sync {
  async fn export(&self, groups: &DependencyGroups) -> Result<Requirements, RequirementsError>;
}

/// Exports requirements with `poetry export`.
#[derive(Debug, Clone)]
pub struct PoetryExporter {
  project_dir: PathBuf,
  program: String,
}

impl PoetryExporter {
  pub fn new(project_dir: impl Into<PathBuf>) -> Self {
    Self {
      project_dir: project_dir.into(),
      program: "poetry".to_string(),
    }
  }

  /// Use a different executable, e.g. an absolute path to poetry.
  pub fn with_program(mut self, program: impl Into<String>) -> Self {
    self.program = program.into();
    self
  }

  /// Arguments passed to the program.
  pub fn args(groups: &DependencyGroups) -> Vec<String> {
    let mut args: Vec<String> = ["export", "-f", "requirements.txt", "--without-hashes"]
      .iter()
      .map(|s| s.to_string())
      .collect();
    for (flag, set) in [("--only", &groups.only), ("--with", &groups.with), ("--without", &groups.without)] {
      if !set.is_empty() {
        args.push(flag.to_string());
        args.push(set.iter().cloned().collect::<Vec<_>>().join(","));
      }
    }
    args
  }
}

#[async_trait]
impl RequirementsSource for PoetryExporter {
  async fn export(&self, groups: &DependencyGroups) -> Result<Requirements, RequirementsError> {
    let args = Self::args(groups);
    info!(program = %self.program, args = %args.join(" "), "exporting requirements");

    let output = Command::new(&self.program)
      .args(&args)
      .current_dir(&self.project_dir)
      .output()
      .await
      .map_err(|source| RequirementsError::Spawn {
        program: self.program.clone(),
        source,
      })?;

    if !output.status.success() {
      return Err(RequirementsError::ExportFailed {
        code: output.status.code(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
      });
    }

    let requirements = Requirements::from_export(&String::from_utf8_lossy(&output.stdout));
    debug!(
      lines = requirements.text.lines().count(),
      indexes = requirements.indexes.len(),
      "requirements exported"
    );
    Ok(requirements)
  }
}
