//! Execution backends.
//!
//! A backend runs a rendered install command against a [`Workspace`]: the
//! host project directory, an optional requirements file and the directory
//! the command installs into. Each backend decides how those host paths look
//! to the command ([`WorkspaceView`]) and how files travel in and out.
//!
//! - [`LocalBackend`]: spawns processes on the host
//! - [`ContainerBackend`]: runs inside a throwaway container

mod container;
pub mod dockerignore;
mod local;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

pub use container::ContainerBackend;
pub use local::LocalBackend;

use crate::command::RenderedCommand;

#[derive(Debug, Error)]
pub enum ExecuteError {
  /// A command exited unsuccessfully. `cmd` is the print-safe form.
  #[error("command failed with exit code {}: {cmd}{}", display_code(.code), display_stderr(.stderr))]
  CmdFailed {
    cmd: String,
    code: Option<i64>,
    stderr: String,
  },

  #[error("failed to start {program}: {source}")]
  Spawn {
    program: String,
    #[source]
    source: std::io::Error,
  },

  /// Container runtime plumbing failed (create, copy, exec).
  #[error("container runtime error: {message}")]
  Transport { message: String },

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

fn display_code(code: &Option<i64>) -> String {
  code.map_or_else(|| "unknown".to_string(), |c| c.to_string())
}

fn display_stderr(stderr: &str) -> String {
  if stderr.trim().is_empty() {
    String::new()
  } else {
    format!("\n{}", stderr.trim_end())
  }
}

impl From<bollard::errors::Error> for ExecuteError {
  fn from(err: bollard::errors::Error) -> Self {
    ExecuteError::Transport {
      message: err.to_string(),
    }
  }
}

/// Host-side inputs and outputs of one install job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
  pub project_dir: PathBuf,
  pub requirements: Option<PathBuf>,
  pub output_dir: PathBuf,
  /// Whether the job needs the project sources.
  pub needs_project: bool,
  /// Globs (relative to the project) never copied anywhere, e.g. artifact outputs.
  pub excludes: Vec<String>,
}

impl Workspace {
  pub fn new(project_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
    Self {
      project_dir: project_dir.into(),
      requirements: None,
      output_dir: output_dir.into(),
      needs_project: true,
      excludes: Vec::new(),
    }
  }

  pub fn with_requirements(mut self, path: impl Into<PathBuf>) -> Self {
    self.requirements = Some(path.into());
    self
  }

  pub fn with_project(mut self, needs_project: bool) -> Self {
    self.needs_project = needs_project;
    self
  }

  pub fn with_excludes(mut self, excludes: Vec<String>) -> Self {
    self.excludes = excludes;
    self
  }
}

/// Workspace paths as the command sees them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceView {
  pub project_dir: String,
  pub requirements: Option<String>,
  pub output_dir: String,
}

/// Runs install commands.
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
  /// Short name used in logs and reports.
  fn name(&self) -> &'static str;

  /// Map host workspace paths to the paths commands should reference.
  fn view(&self, workspace: &Workspace) -> WorkspaceView;

  /// Run `command`, streaming its output, and leave its results in
  /// `workspace.output_dir`.
  async fn run(&self, command: &RenderedCommand, workspace: &Workspace) -> Result<(), ExecuteError>;
}

fn host_path(path: &Path) -> String {
  path.display().to_string()
}

/// `(secret, masked)` pairs of a command, used to scrub its output.
fn secret_replacements(command: &RenderedCommand) -> Vec<(String, String)> {
  command
    .argv
    .iter()
    .zip(&command.print_safe)
    .filter(|(real, safe)| real != safe)
    .map(|(real, safe)| (real.clone(), safe.clone()))
    .collect()
}

fn scrub(line: &str, replacements: &[(String, String)]) -> String {
  replacements
    .iter()
    .fold(line.to_string(), |acc, (from, to)| acc.replace(from, to))
}
