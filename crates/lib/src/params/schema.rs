use serde::Serialize;

/// How a parameter value is parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
  /// A single string.
  Text,
  /// Comma separated string or array of strings.
  List,
  /// A shell command line split into words.
  Shell,
  /// A boolean; bare flags mean `true`.
  Flag,
  /// A signed integer.
  Integer,
}

/// A known parameter.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ParamSpec {
  pub name: &'static str,
  pub kind: ParamKind,
  pub help: &'static str,
}

const fn spec(name: &'static str, kind: ParamKind, help: &'static str) -> ParamSpec {
  ParamSpec { name, kind, help }
}

/// Every accepted parameter, in the order shown by `--help`.
pub const PARAMS: &[ParamSpec] = &[
  spec("docker-image", ParamKind::Text, "Build inside a container from this image"),
  spec("docker-entrypoint", ParamKind::List, "Container entrypoint (default /bin/bash)"),
  spec("docker-environment", ParamKind::List, "Container environment, KEY=VALUE,..."),
  spec("docker-dns", ParamKind::List, "DNS servers for the container"),
  spec("docker-network", ParamKind::Text, "Container network (default host)"),
  spec("docker-network-mode", ParamKind::Text, "Container network mode"),
  spec("docker-platform", ParamKind::Text, "Image platform, e.g. linux/arm64"),
  spec("docker-network-disabled", ParamKind::Flag, "Disable container networking"),
  spec("package-artifact-path", ParamKind::Text, "Merged artifact path (default package.zip)"),
  spec("package-install-dir", ParamKind::Text, "Install prefix inside the merged artifact"),
  spec("install-dir", ParamKind::Text, "Alias of package-install-dir"),
  spec("function-artifact-path", ParamKind::Text, "Function artifact path"),
  spec("function-install-dir", ParamKind::Text, "Install prefix inside the function artifact"),
  spec("layer-artifact-path", ParamKind::Text, "Layer artifact path"),
  spec("layer-install-dir", ParamKind::Text, "Install prefix inside the layer artifact"),
  spec("only", ParamKind::List, "Only export these dependency groups"),
  spec("with", ParamKind::List, "Also export these optional dependency groups"),
  spec("without", ParamKind::List, "Exclude these dependency groups"),
  spec("zip-compression", ParamKind::Text, "ZIP_STORED, ZIP_DEFLATED or ZIP_BZIP2 (ZIP_LZMA is not writable)"),
  spec("zip-compresslevel", ParamKind::Integer, "Compression level (0-9 deflated, 1-9 bzip2)"),
  spec("pre-install-script", ParamKind::Shell, "Command run before dependencies are installed"),
  spec("no-checksum", ParamKind::Flag, "Always rebuild, ignoring stored checksums"),
];

/// Canonical form of a parameter key: no leading dashes, hyphens instead of underscores.
pub fn normalize_key(key: &str) -> String {
  key.trim().trim_start_matches('-').replace('_', "-").to_ascii_lowercase()
}

/// Look up a parameter by any accepted spelling.
pub fn lookup(key: &str) -> Option<&'static ParamSpec> {
  let key = normalize_key(key);
  PARAMS.iter().find(|p| p.name == key)
}
