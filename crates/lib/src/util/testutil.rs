//! Test helpers shared across modules.

use std::fs;
use std::path::Path;

/// Returns the shell binary and args that run `script`.
#[cfg(unix)]
pub fn shell_cmd(script: &str) -> (&'static str, Vec<String>) {
  ("/bin/sh", vec!["-c".to_string(), script.to_string()])
}

/// Write a minimal poetry project named `name` into `dir`.
pub fn write_project(dir: &Path, name: &str, config: &str) {
  fs::write(
    dir.join("pyproject.toml"),
    format!("[tool.poetry]\nname = \"{name}\"\nversion = \"0.1.0\"\n\n{config}"),
  )
  .unwrap();
  fs::write(dir.join("poetry.lock"), "# lock\n").unwrap();
}
