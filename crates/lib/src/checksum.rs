//! Change detection for artifacts.
//!
//! A [`Checksum`] is a SHA-256 over the stat signatures (size, modification
//! time, permission bits) of a file or of every file in a tree, sorted by
//! relative path. The checksum of the inputs an artifact was built from is
//! embedded in the artifact itself as a `checksum` sidecar at its install
//! prefix; [`ChecksumGate`] compares it against the current inputs and skips
//! the build when nothing changed.

use std::fs::{self, File, OpenOptions};
use std::future::Future;
use std::io::{self, Read, Write};
use std::path::Path;

use globset::GlobSet;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

use crate::artifact::{ArtifactTarget, relative_slash_path};
use crate::consts::CHECKSUM_FILE;

/// Hex-encoded SHA-256 fingerprint of build inputs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Checksum(pub String);

impl std::fmt::Display for Checksum {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

#[derive(Debug, Error)]
pub enum ChecksumError {
  #[error("failed to walk {path}: {message}")]
  Walk { path: String, message: String },

  #[error("failed to stat {path}: {source}")]
  Stat {
    path: String,
    #[source]
    source: io::Error,
  },

  #[error("failed to embed checksum in {path}: {message}")]
  Embed { path: String, message: String },
}

fn stat_signature(path: &Path) -> Result<String, ChecksumError> {
  let meta = fs::metadata(path).map_err(|source| ChecksumError::Stat {
    path: path.display().to_string(),
    source,
  })?;

  let mtime = meta
    .modified()
    .ok()
    .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
    .map(|d| d.as_nanos())
    .unwrap_or_default();

  #[cfg(unix)]
  let mode = {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode()
  };
  #[cfg(not(unix))]
  let mode = u32::from(meta.permissions().readonly());

  Ok(format!("{}:{}:{:o}", meta.len(), mtime, mode))
}

/// Checksum of a single file.
pub fn compute_file(path: &Path) -> Result<Checksum, ChecksumError> {
  let mut hasher = Sha256::new();
  hasher.update(stat_signature(path)?.as_bytes());
  Ok(Checksum(format!("{:x}", hasher.finalize())))
}

/// Checksum of every file under `root` whose relative path does not match `excludes`.
///
/// Excluded directories are not descended into.
pub fn compute_tree(root: &Path, excludes: &GlobSet) -> Result<Checksum, ChecksumError> {
  let mut entries: Vec<(String, String)> = Vec::new();

  let walker = WalkDir::new(root)
    .sort_by_file_name()
    .into_iter()
    .filter_entry(|e| {
      let rel = relative_slash_path(root, e.path());
      rel.is_empty() || !excludes.is_match(&rel)
    });

  for entry in walker {
    let entry = entry.map_err(|e| ChecksumError::Walk {
      path: root.display().to_string(),
      message: e.to_string(),
    })?;
    if !entry.file_type().is_file() {
      continue;
    }
    let rel = relative_slash_path(root, entry.path());
    entries.push((rel, stat_signature(entry.path())?));
  }

  entries.sort_by(|a, b| a.0.cmp(&b.0));

  let mut hasher = Sha256::new();
  for (rel, signature) in &entries {
    hasher.update(rel.as_bytes());
    hasher.update(b"\0");
    hasher.update(signature.as_bytes());
    hasher.update(b"\n");
  }

  debug!(root = %root.display(), files = entries.len(), "computed tree checksum");
  Ok(Checksum(format!("{:x}", hasher.finalize())))
}

/// Read the checksum embedded in a previously produced artifact.
///
/// A missing artifact, a missing sidecar or an unreadable archive all mean
/// "no previous checksum".
pub fn read_embedded(target: &ArtifactTarget) -> Option<Checksum> {
  let path = target.path();
  if !path.exists() {
    return None;
  }

  let contents = if target.is_archive() {
    read_zip_entry(path, &target.entry_name(CHECKSUM_FILE))
  } else {
    fs::read_to_string(target.dir_file(CHECKSUM_FILE)).ok()
  }?;

  let value = contents.trim();
  if value.is_empty() {
    None
  } else {
    Some(Checksum(value.to_string()))
  }
}

fn read_zip_entry(path: &Path, name: &str) -> Option<String> {
  let file = File::open(path).ok()?;
  let mut archive = match ZipArchive::new(file) {
    Ok(archive) => archive,
    Err(e) => {
      warn!(path = %path.display(), error = %e, "unreadable artifact, rebuilding");
      return None;
    }
  };
  let mut entry = match archive.by_name(name) {
    Ok(entry) => entry,
    Err(ZipError::FileNotFound) => return None,
    Err(e) => {
      warn!(path = %path.display(), error = %e, "unreadable checksum entry, rebuilding");
      return None;
    }
  };
  let mut contents = String::new();
  entry.read_to_string(&mut contents).ok()?;
  Some(contents)
}

/// Write `checksum` into a finalized artifact.
pub fn embed(target: &ArtifactTarget, checksum: &Checksum) -> Result<(), ChecksumError> {
  let path = target.path();
  let embed_err = |message: String| ChecksumError::Embed {
    path: path.display().to_string(),
    message,
  };

  if target.is_archive() {
    let file = OpenOptions::new()
      .read(true)
      .write(true)
      .open(path)
      .map_err(|e| embed_err(e.to_string()))?;
    let mut writer = ZipWriter::new_append(file).map_err(|e| embed_err(e.to_string()))?;
    writer
      .start_file(target.entry_name(CHECKSUM_FILE), SimpleFileOptions::default())
      .map_err(|e| embed_err(e.to_string()))?;
    writer
      .write_all(checksum.0.as_bytes())
      .map_err(|e| embed_err(e.to_string()))?;
    writer.finish().map_err(|e| embed_err(e.to_string()))?;
  } else {
    let sidecar = target.dir_file(CHECKSUM_FILE);
    if let Some(parent) = sidecar.parent() {
      fs::create_dir_all(parent).map_err(|e| embed_err(e.to_string()))?;
    }
    fs::write(&sidecar, &checksum.0).map_err(|e| embed_err(e.to_string()))?;
  }

  debug!(target = %path.display(), checksum = %checksum, "embedded checksum");
  Ok(())
}

/// What the gate did for a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome<T> {
  /// Inputs unchanged since the artifact was built.
  Skipped,
  Built(T),
}

impl<T> GateOutcome<T> {
  pub fn is_skipped(&self) -> bool {
    matches!(self, GateOutcome::Skipped)
  }
}

/// Skips builds whose inputs match the checksum embedded in their artifact.
#[derive(Debug, Clone, Copy)]
pub struct ChecksumGate {
  enabled: bool,
}

impl ChecksumGate {
  pub fn new(enabled: bool) -> Self {
    Self { enabled }
  }

  pub fn enabled(&self) -> bool {
    self.enabled
  }

  /// Whether `target` is up to date with respect to `current`.
  pub fn is_fresh(&self, target: &ArtifactTarget, current: &Checksum) -> bool {
    self.enabled && read_embedded(target).as_ref() == Some(current)
  }

  /// Run `build` unless the artifact is fresh, then embed the new checksum.
  ///
  /// `checksum` is only evaluated when the gate is enabled. Nothing is
  /// embedded if `build` fails.
  pub async fn run<C, B, Fut, T, E>(
    &self,
    target: &ArtifactTarget,
    checksum: C,
    build: B,
  ) -> Result<GateOutcome<T>, E>
  where
    C: FnOnce() -> Result<Checksum, ChecksumError>,
    B: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<ChecksumError>,
  {
    if !self.enabled {
      return Ok(GateOutcome::Built(build().await?));
    }

    let current = checksum()?;
    if self.is_fresh(target, &current) {
      info!(target = %target.path().display(), "inputs unchanged, skipping");
      return Ok(GateOutcome::Skipped);
    }

    let output = build().await?;
    embed(target, &current)?;
    Ok(GateOutcome::Built(output))
  }
}
