use super::ConfigError;
use super::schema::{ParamKind, lookup, normalize_key};

/// Turn CLI tokens into `(key, value)` pairs.
///
/// Accepted forms: `key=value`, `key value`, `--key=value`, `--key value`,
/// and a bare `--flag` (or `flag`) for boolean parameters. Keys are
/// normalized; unknown keys are rejected.
pub fn parse_cli_tokens(tokens: &[String]) -> Result<Vec<(String, String)>, ConfigError> {
  let mut pairs = Vec::new();
  let mut iter = tokens.iter();

  while let Some(token) = iter.next() {
    if let Some((key, value)) = token.split_once('=') {
      let spec = lookup(key).ok_or_else(|| ConfigError::UnknownParameter(key.to_string()))?;
      pairs.push((spec.name.to_string(), value.to_string()));
      continue;
    }

    let spec = lookup(token).ok_or_else(|| ConfigError::UnknownParameter(normalize_key(token)))?;
    if spec.kind == ParamKind::Flag {
      pairs.push((spec.name.to_string(), "true".to_string()));
      continue;
    }

    let value = iter
      .next()
      .ok_or_else(|| ConfigError::MissingValue(spec.name.to_string()))?;
    pairs.push((spec.name.to_string(), value.clone()));
  }

  Ok(pairs)
}
