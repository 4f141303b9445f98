//! Shared test helpers for CLI integration tests.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

/// Isolated Python project.
pub struct TestEnv {
  pub temp: TempDir,
}

impl TestEnv {
  /// A poetry project named `handler` with the given `[tool.lambda-build]` body.
  pub fn project(config: &str) -> Self {
    let env = Self::empty();
    env.write_file(
      "pyproject.toml",
      &format!("[tool.poetry]\nname = \"handler\"\nversion = \"0.1.0\"\n\n[tool.lambda-build]\n{config}"),
    );
    env.write_file("poetry.lock", "# lock\n");
    env.write_file("handler/__init__.py", "def handler(event, context):\n    return event\n");
    env
  }

  pub fn empty() -> Self {
    Self {
      temp: TempDir::new().unwrap(),
    }
  }

  /// Write a file relative to the project root.
  pub fn write_file(&self, relative_path: &str, content: &str) {
    let path = self.temp.path().join(relative_path);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
  }

  pub fn root(&self) -> PathBuf {
    dunce::canonicalize(self.temp.path()).unwrap()
  }

  pub fn path(&self, relative_path: &str) -> PathBuf {
    self.root().join(relative_path)
  }

  /// Command running inside this project.
  pub fn cmd(&self) -> Command {
    let mut cmd = cargo_bin_cmd!("lambda-build");
    cmd.arg("-C").arg(self.temp.path());
    cmd
  }

  /// Command whose PATH only contains `bin_dir`.
  pub fn cmd_with_path(&self, bin_dir: &Path) -> Command {
    let mut cmd = self.cmd();
    cmd.env("PATH", bin_dir);
    cmd
  }

  /// Run `plan --output json` and parse the result.
  pub fn plan_json(&self, args: &[&str]) -> serde_json::Value {
    let output = self.cmd().args(["--output", "json", "plan"]).args(args).output().unwrap();
    assert!(
      output.status.success(),
      "plan failed: {}",
      String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).unwrap()
  }
}
