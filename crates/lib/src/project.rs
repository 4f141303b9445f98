//! Project metadata read from `pyproject.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::consts::{CONFIG_SECTION, LEGACY_CONFIG_SECTION, LOCK_FILE, PYPROJECT_FILE};

#[derive(Debug, Error)]
pub enum ProjectError {
  #[error("no pyproject.toml found in {0}")]
  NotFound(String),

  #[error("failed to read {path}: {source}")]
  Read {
    path: String,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse {path}: {message}")]
  Parse { path: String, message: String },

  #[error("{path} declares no package name in [project] or [tool.poetry]")]
  MissingName { path: String },

  #[error("[tool.{section}] in {path} must be a table")]
  InvalidSection { path: String, section: &'static str },
}

/// A Python project on disk.
#[derive(Debug, Clone)]
pub struct Project {
  root: PathBuf,
  package_name: String,
  config: toml::Table,
}

impl Project {
  /// Load the project rooted at `dir`.
  pub fn discover(dir: &Path) -> Result<Self, ProjectError> {
    let root = dunce::canonicalize(dir).map_err(|source| ProjectError::Read {
      path: dir.display().to_string(),
      source,
    })?;
    let manifest = root.join(PYPROJECT_FILE);
    if !manifest.is_file() {
      return Err(ProjectError::NotFound(root.display().to_string()));
    }

    let contents = fs::read_to_string(&manifest).map_err(|source| ProjectError::Read {
      path: manifest.display().to_string(),
      source,
    })?;
    let doc: toml::Table = toml::from_str(&contents).map_err(|e| ProjectError::Parse {
      path: manifest.display().to_string(),
      message: e.to_string(),
    })?;

    let package_name = package_name(&doc).ok_or_else(|| ProjectError::MissingName {
      path: manifest.display().to_string(),
    })?;

    let section = [CONFIG_SECTION, LEGACY_CONFIG_SECTION]
      .into_iter()
      .find_map(|name| doc.get("tool").and_then(|tool| tool.get(name)).map(|value| (name, value)));
    let config = match section {
      None => toml::Table::new(),
      Some((name, toml::Value::Table(table))) => {
        debug!(section = name, "read configuration table");
        table.clone()
      }
      Some((name, _)) => {
        return Err(ProjectError::InvalidSection {
          path: manifest.display().to_string(),
          section: name,
        });
      }
    };

    debug!(root = %root.display(), package = %package_name, "discovered project");
    Ok(Self {
      root,
      package_name,
      config,
    })
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn package_name(&self) -> &str {
    &self.package_name
  }

  /// The `[tool.lambda-build]` table, or `[tool.poetry-plugin-lambda-build]`
  /// when only that one exists. Empty when neither is present.
  pub fn config_table(&self) -> &toml::Table {
    &self.config
  }

  pub fn lock_file(&self) -> PathBuf {
    self.root.join(LOCK_FILE)
  }

  /// Resolve a configured path against the project root.
  pub fn resolve(&self, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
      path.to_path_buf()
    } else {
      self.root.join(path)
    }
  }
}

fn package_name(doc: &toml::Table) -> Option<String> {
  let from_project = doc.get("project").and_then(|p| p.get("name"));
  let from_poetry = doc
    .get("tool")
    .and_then(|t| t.get("poetry"))
    .and_then(|p| p.get("name"));
  from_project
    .or(from_poetry)
    .and_then(|v| v.as_str())
    .map(String::from)
}
