use std::collections::BTreeSet;

use tracing::debug;

use super::schema::{ParamKind, lookup};
use super::{Compression, ConfigError, DependencyGroups, DockerOptions, ParameterSet, TargetParams, ZipOptions};
use crate::command::split_shell_words;
use crate::consts::{DEFAULT_ENTRYPOINT, DEFAULT_NETWORK, DEFAULT_PACKAGE_PATH};

/// Collects raw parameter values and validates them into a [`ParameterSet`].
///
/// Later writes win, so load the config file first and CLI tokens second.
#[derive(Debug, Clone)]
pub struct ParameterSetBuilder {
  draft: ParameterSet,
  compression: Compression,
  level: Option<i64>,
}

impl Default for ParameterSetBuilder {
  fn default() -> Self {
    Self::new()
  }
}

impl ParameterSetBuilder {
  pub fn new() -> Self {
    Self {
      draft: ParameterSet {
        docker: DockerOptions {
          image: None,
          entrypoint: vec![DEFAULT_ENTRYPOINT.to_string()],
          environment: Vec::new(),
          dns: Vec::new(),
          network: Some(DEFAULT_NETWORK.to_string()),
          network_mode: None,
          platform: None,
          network_disabled: false,
        },
        package: TargetParams {
          artifact_path: Some(DEFAULT_PACKAGE_PATH.to_string()),
          install_dir: None,
        },
        function: TargetParams::default(),
        layer: TargetParams::default(),
        groups: DependencyGroups::default(),
        zip: ZipOptions::default(),
        pre_install_script: Vec::new(),
        no_checksum: false,
      },
      compression: Compression::default(),
      level: None,
    }
  }

  /// Set a parameter from its string form.
  ///
  /// # Errors
  ///
  /// Returns [`ConfigError::UnknownParameter`] for keys outside the schema and
  /// [`ConfigError::InvalidValue`] when the value does not parse.
  pub fn put(self, key: &str, value: &str) -> Result<Self, ConfigError> {
    let spec = lookup(key).ok_or_else(|| ConfigError::UnknownParameter(key.to_string()))?;
    let value = match spec.kind {
      ParamKind::Text => Value::Text(value.trim().to_string()),
      ParamKind::List => Value::List(split_list(value)),
      ParamKind::Shell => Value::List(split_shell_words(value).map_err(|e| invalid(spec.name, e))?),
      ParamKind::Flag => Value::Flag(parse_flag(value)),
      ParamKind::Integer => Value::Integer(
        value
          .trim()
          .parse()
          .map_err(|_| invalid(spec.name, format!("'{value}' is not an integer")))?,
      ),
    };
    self.set(spec.name, value)
  }

  /// Set a list parameter from already separated items.
  pub fn put_list<I, S>(self, key: &str, items: I) -> Result<Self, ConfigError>
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    let spec = lookup(key).ok_or_else(|| ConfigError::UnknownParameter(key.to_string()))?;
    let items: Vec<String> = items.into_iter().map(Into::into).collect();
    match spec.kind {
      ParamKind::List | ParamKind::Shell => self.set(spec.name, Value::List(items)),
      ParamKind::Text if items.len() == 1 => self.set(spec.name, Value::Text(items[0].clone())),
      _ => Err(invalid(spec.name, "expected a single value, got a list")),
    }
  }

  /// Set a parameter from a TOML value.
  pub fn put_toml(self, key: &str, value: &toml::Value) -> Result<Self, ConfigError> {
    match value {
      toml::Value::String(s) => self.put(key, s),
      toml::Value::Integer(i) => self.put(key, &i.to_string()),
      toml::Value::Boolean(b) => self.put(key, if *b { "true" } else { "false" }),
      toml::Value::Array(items) => {
        let items = items
          .iter()
          .map(|item| match item {
            toml::Value::String(s) => Ok(s.clone()),
            other => Err(invalid(key, format!("array items must be strings, got {}", other.type_str()))),
          })
          .collect::<Result<Vec<_>, _>>()?;
        self.put_list(key, items)
      }
      other => Err(invalid(key, format!("unsupported {} value", other.type_str()))),
    }
  }

  /// Load every entry of a config table.
  pub fn merge_table(self, table: &toml::Table) -> Result<Self, ConfigError> {
    table
      .iter()
      .try_fold(self, |builder, (key, value)| builder.put_toml(key, value))
  }

  /// Load `(key, value)` pairs produced by [`super::parse_cli_tokens`].
  pub fn merge_pairs<'a, I>(self, pairs: I) -> Result<Self, ConfigError>
  where
    I: IntoIterator<Item = &'a (String, String)>,
  {
    pairs
      .into_iter()
      .try_fold(self, |builder, (key, value)| builder.put(key, value))
  }

  /// Validate cross-field constraints and freeze the parameters.
  ///
  /// # Errors
  ///
  /// Returns [`ConfigError::ConflictingGroups`] when `only` is combined with
  /// `with` or `without`, and [`ConfigError::InvalidValue`] for a compression
  /// level outside the method's range.
  pub fn build(self) -> Result<ParameterSet, ConfigError> {
    let mut params = self.draft;

    let groups = &params.groups;
    if !groups.only.is_empty() && (!groups.with.is_empty() || !groups.without.is_empty()) {
      return Err(ConfigError::ConflictingGroups);
    }

    if self.compression == Compression::Lzma {
      return Err(invalid(
        "zip-compression",
        "ZIP_LZMA archives cannot be written; use ZIP_DEFLATED or ZIP_BZIP2",
      ));
    }

    params.zip = ZipOptions {
      compression: self.compression,
      level: match (self.compression.level_range(), self.level) {
        (Some((min, max)), Some(level)) if !(min..=max).contains(&level) => {
          return Err(invalid(
            "zip-compresslevel",
            format!("{level} is outside {min}-{max} for {}", self.compression),
          ));
        }
        (Some(_), level) => level,
        (None, Some(level)) => {
          debug!(level, compression = %self.compression, "compression level ignored");
          None
        }
        (None, None) => None,
      },
    };

    Ok(params)
  }

  fn set(mut self, name: &'static str, value: Value) -> Result<Self, ConfigError> {
    debug!(param = name, "parameter set");
    let p = &mut self.draft;
    match (name, value) {
      ("docker-image", Value::Text(v)) => p.docker.image = non_empty(v),
      ("docker-entrypoint", Value::List(v)) => p.docker.entrypoint = v,
      ("docker-environment", Value::List(v)) => p.docker.environment = v,
      ("docker-dns", Value::List(v)) => p.docker.dns = v,
      ("docker-network", Value::Text(v)) => p.docker.network = non_empty(v),
      ("docker-network-mode", Value::Text(v)) => p.docker.network_mode = non_empty(v),
      ("docker-platform", Value::Text(v)) => p.docker.platform = non_empty(v),
      ("docker-network-disabled", Value::Flag(v)) => p.docker.network_disabled = v,
      ("package-artifact-path", Value::Text(v)) => p.package.artifact_path = non_empty(v),
      ("package-install-dir" | "install-dir", Value::Text(v)) => p.package.install_dir = non_empty(v),
      ("function-artifact-path", Value::Text(v)) => p.function.artifact_path = non_empty(v),
      ("function-install-dir", Value::Text(v)) => p.function.install_dir = non_empty(v),
      ("layer-artifact-path", Value::Text(v)) => p.layer.artifact_path = non_empty(v),
      ("layer-install-dir", Value::Text(v)) => p.layer.install_dir = non_empty(v),
      ("only", Value::List(v)) => p.groups.only = into_set(v),
      ("with", Value::List(v)) => p.groups.with = into_set(v),
      ("without", Value::List(v)) => p.groups.without = into_set(v),
      ("zip-compression", Value::Text(v)) => self.compression = v.parse().map_err(|e| invalid(name, e))?,
      ("zip-compresslevel", Value::Integer(v)) => self.level = Some(v),
      ("pre-install-script", Value::List(v)) => p.pre_install_script = v,
      ("no-checksum", Value::Flag(v)) => p.no_checksum = v,
      (name, _) => return Err(invalid(name, "value has the wrong type")),
    }
    Ok(self)
  }
}

#[derive(Debug)]
enum Value {
  Text(String),
  List(Vec<String>),
  Flag(bool),
  Integer(i64),
}

fn invalid(key: &str, message: impl ToString) -> ConfigError {
  ConfigError::InvalidValue {
    key: key.to_string(),
    message: message.to_string(),
  }
}

fn non_empty(value: String) -> Option<String> {
  if value.is_empty() { None } else { Some(value) }
}

fn into_set(values: Vec<String>) -> BTreeSet<String> {
  values.into_iter().collect()
}

fn split_list(value: &str) -> Vec<String> {
  value
    .split(',')
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .map(String::from)
    .collect()
}

/// `0`, `false`, `no` and `off` are false; anything else is true.
fn parse_flag(value: &str) -> bool {
  !matches!(value.trim().to_ascii_lowercase().as_str(), "0" | "false" | "no" | "off")
}
