//! Build parameters.
//!
//! Parameters come from the `[tool.lambda-build]` table of `pyproject.toml`
//! and from CLI tokens, in that order, through [`ParameterSetBuilder`]. The
//! resulting [`ParameterSet`] is immutable and shared by every build stage.

mod builder;
mod schema;
mod tokens;

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

pub use builder::ParameterSetBuilder;
pub use schema::{PARAMS, ParamKind, ParamSpec, lookup, normalize_key};
pub use tokens::parse_cli_tokens;

/// Errors raised while loading parameters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
  #[error("unknown parameter '{0}'")]
  UnknownParameter(String),

  #[error("invalid value for '{key}': {message}")]
  InvalidValue { key: String, message: String },

  #[error("parameter '{0}' expects a value")]
  MissingValue(String),

  #[error("'only' cannot be combined with 'with' or 'without'")]
  ConflictingGroups,
}

/// Container settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DockerOptions {
  pub image: Option<String>,
  pub entrypoint: Vec<String>,
  pub environment: Vec<String>,
  pub dns: Vec<String>,
  pub network: Option<String>,
  pub network_mode: Option<String>,
  pub platform: Option<String>,
  pub network_disabled: bool,
}

impl DockerOptions {
  /// Network mode handed to the runtime. An explicit mode wins over the network name.
  pub fn effective_network_mode(&self) -> Option<&str> {
    self.network_mode.as_deref().or(self.network.as_deref())
  }
}

/// Artifact path and install prefix of one target kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TargetParams {
  pub artifact_path: Option<String>,
  pub install_dir: Option<String>,
}

/// Dependency groups passed to the requirements export.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DependencyGroups {
  pub only: BTreeSet<String>,
  pub with: BTreeSet<String>,
  pub without: BTreeSet<String>,
}

/// Archive compression method.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum Compression {
  #[default]
  Stored,
  Deflated,
  Bzip2,
  Lzma,
}

impl Compression {
  /// Valid compression levels, or `None` when the method takes no level.
  pub fn level_range(self) -> Option<(i64, i64)> {
    match self {
      Compression::Stored | Compression::Lzma => None,
      Compression::Deflated => Some((0, 9)),
      Compression::Bzip2 => Some((1, 9)),
    }
  }
}

impl FromStr for Compression {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_uppercase().as_str() {
      "ZIP_STORED" => Ok(Compression::Stored),
      "ZIP_DEFLATED" => Ok(Compression::Deflated),
      "ZIP_BZIP2" => Ok(Compression::Bzip2),
      "ZIP_LZMA" => Ok(Compression::Lzma),
      other => Err(format!(
        "unknown compression '{other}', expected one of ZIP_STORED, ZIP_DEFLATED, ZIP_BZIP2, ZIP_LZMA"
      )),
    }
  }
}

impl fmt::Display for Compression {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Compression::Stored => "ZIP_STORED",
      Compression::Deflated => "ZIP_DEFLATED",
      Compression::Bzip2 => "ZIP_BZIP2",
      Compression::Lzma => "ZIP_LZMA",
    };
    f.write_str(name)
  }
}

/// Archive settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ZipOptions {
  pub compression: Compression,
  /// Level, only kept when the method accepts one.
  pub level: Option<i64>,
}

/// Validated, immutable build configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParameterSet {
  pub(crate) docker: DockerOptions,
  pub(crate) package: TargetParams,
  pub(crate) function: TargetParams,
  pub(crate) layer: TargetParams,
  pub(crate) groups: DependencyGroups,
  pub(crate) zip: ZipOptions,
  pub(crate) pre_install_script: Vec<String>,
  pub(crate) no_checksum: bool,
}

impl ParameterSet {
  pub fn builder() -> ParameterSetBuilder {
    ParameterSetBuilder::new()
  }

  pub fn docker(&self) -> &DockerOptions {
    &self.docker
  }

  pub fn package(&self) -> &TargetParams {
    &self.package
  }

  pub fn function(&self) -> &TargetParams {
    &self.function
  }

  pub fn layer(&self) -> &TargetParams {
    &self.layer
  }

  pub fn groups(&self) -> &DependencyGroups {
    &self.groups
  }

  pub fn zip(&self) -> &ZipOptions {
    &self.zip
  }

  /// Tokens of the script run before dependencies are installed.
  pub fn pre_install_script(&self) -> &[String] {
    &self.pre_install_script
  }

  pub fn checksum_enabled(&self) -> bool {
    !self.no_checksum
  }

  pub fn in_container(&self) -> bool {
    self.docker.image.is_some()
  }

  /// Every configured artifact path, used to keep outputs out of checksums and uploads.
  pub fn artifact_paths(&self) -> Vec<&str> {
    [&self.package, &self.function, &self.layer]
      .into_iter()
      .filter_map(|t| t.artifact_path.as_deref())
      .collect()
  }
}
