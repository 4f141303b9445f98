//! Artifact materialization.
//!
//! A staging root is turned into either a zip archive or a plain directory,
//! decided purely by the target path's suffix. Entries keep their install
//! prefix (`python/...`) in both shapes.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Serialize;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::consts::{ARTIFACT_EXCLUDES, CHECKSUM_FILE, REQUIREMENTS_FILE};
use crate::params::{Compression, ZipOptions};

#[derive(Debug, Error)]
pub enum ArtifactError {
  #[error("invalid exclude pattern '{pattern}': {message}")]
  Pattern { pattern: String, message: String },

  #[error("failed to walk {path}: {message}")]
  Walk { path: String, message: String },

  #[error("failed to write {path}: {source}")]
  Io {
    path: String,
    #[source]
    source: io::Error,
  },

  #[error("failed to write archive {path}: {message}")]
  Zip { path: String, message: String },
}

impl ArtifactError {
  fn io(path: &Path, source: io::Error) -> Self {
    ArtifactError::Io {
      path: path.display().to_string(),
      source,
    }
  }

  fn zip(path: &Path, err: zip::result::ZipError) -> Self {
    ArtifactError::Zip {
      path: path.display().to_string(),
      message: err.to_string(),
    }
  }
}

/// Where an artifact goes and under which prefix its files live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactTarget {
  path: PathBuf,
  install_prefix: String,
}

impl ArtifactTarget {
  pub fn new(path: impl Into<PathBuf>, install_prefix: Option<&str>) -> Self {
    let install_prefix = install_prefix
      .map(|p| p.trim_matches('/').to_string())
      .unwrap_or_default();
    Self {
      path: path.into(),
      install_prefix,
    }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// Install prefix relative to the artifact root, empty for the root itself.
  pub fn install_prefix(&self) -> &str {
    &self.install_prefix
  }

  /// A `.zip` suffix means an archive; anything else is a directory.
  pub fn is_archive(&self) -> bool {
    self
      .path
      .extension()
      .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"))
  }

  /// Archive entry name of a file placed at the install prefix.
  pub fn entry_name(&self, file: &str) -> String {
    if self.install_prefix.is_empty() {
      file.to_string()
    } else {
      format!("{}/{}", self.install_prefix, file)
    }
  }

  /// Filesystem path of a file placed at the install prefix of a directory artifact.
  pub fn dir_file(&self, file: &str) -> PathBuf {
    let mut path = self.path.clone();
    if !self.install_prefix.is_empty() {
      path.push(&self.install_prefix);
    }
    path.push(file);
    path
  }
}

/// Summary of a finalized artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FinalizeReport {
  pub files: usize,
}

/// Build a glob set from patterns. `*` also matches `/`, like shell `fnmatch`.
pub fn glob_set<'a, I>(patterns: I) -> Result<GlobSet, ArtifactError>
where
  I: IntoIterator<Item = &'a str>,
{
  let mut builder = GlobSetBuilder::new();
  for pattern in patterns {
    let glob = Glob::new(pattern).map_err(|e| ArtifactError::Pattern {
      pattern: pattern.to_string(),
      message: e.to_string(),
    })?;
    builder.add(glob);
  }
  builder.build().map_err(|e| ArtifactError::Pattern {
    pattern: "<set>".to_string(),
    message: e.to_string(),
  })
}

/// Materialize `staging_root` into `target`.
///
/// Files matching the built-in excludes (`*.pyc`, `__pycache__`), the
/// requirements file, the checksum sidecar or any of `extra_excludes` are
/// skipped. Archives are rewritten from scratch; directories are merged into
/// existing content.
pub fn finalize(
  staging_root: &Path,
  target: &ArtifactTarget,
  zip: &ZipOptions,
  extra_excludes: &[&str],
) -> Result<FinalizeReport, ArtifactError> {
  let sidecar = target.entry_name(CHECKSUM_FILE);
  let patterns = ARTIFACT_EXCLUDES
    .iter()
    .copied()
    .chain([REQUIREMENTS_FILE, sidecar.as_str()])
    .chain(extra_excludes.iter().copied());
  let excludes = glob_set(patterns)?;

  if let Some(parent) = target.path().parent().filter(|p| !p.as_os_str().is_empty()) {
    fs::create_dir_all(parent).map_err(|e| ArtifactError::io(parent, e))?;
  }

  let files = collect_files(staging_root, &excludes)?;
  info!(
    target = %target.path().display(),
    files = files.len(),
    archive = target.is_archive(),
    "finalizing artifact"
  );

  if target.is_archive() {
    write_archive(staging_root, &files, target.path(), zip)?;
  } else {
    copy_tree(staging_root, &files, target.path())?;
  }

  Ok(FinalizeReport { files: files.len() })
}

/// Relative paths (with `/` separators) of files under `root` not matching `excludes`.
fn collect_files(root: &Path, excludes: &GlobSet) -> Result<Vec<String>, ArtifactError> {
  let mut files = Vec::new();

  for entry in WalkDir::new(root).sort_by_file_name() {
    let entry = entry.map_err(|e| ArtifactError::Walk {
      path: root.display().to_string(),
      message: e.to_string(),
    })?;
    if entry.file_type().is_dir() {
      continue;
    }

    let rel = relative_slash_path(root, entry.path());
    if rel.is_empty() || excludes.is_match(&rel) {
      debug!(path = %rel, "excluded from artifact");
      continue;
    }
    files.push(rel);
  }

  Ok(files)
}

pub(crate) fn relative_slash_path(root: &Path, path: &Path) -> String {
  path
    .strip_prefix(root)
    .unwrap_or(path)
    .components()
    .map(|c| c.as_os_str().to_string_lossy())
    .collect::<Vec<_>>()
    .join("/")
}

fn file_options(zip: &ZipOptions) -> SimpleFileOptions {
  let method = match zip.compression {
    Compression::Stored => CompressionMethod::Stored,
    Compression::Deflated => CompressionMethod::Deflated,
    Compression::Bzip2 => CompressionMethod::Bzip2,
    Compression::Lzma => CompressionMethod::Lzma,
  };
  SimpleFileOptions::default()
    .compression_method(method)
    .compression_level(zip.level)
}

/// Write the archive next to `output` and move it into place once complete.
///
/// A failure leaves any previous archive at `output` untouched.
fn write_archive(root: &Path, files: &[String], output: &Path, zip: &ZipOptions) -> Result<(), ArtifactError> {
  let dir = output
    .parent()
    .filter(|p| !p.as_os_str().is_empty())
    .unwrap_or(Path::new("."));
  let partial = NamedTempFile::new_in(dir).map_err(|e| ArtifactError::io(dir, e))?;
  let mut writer = ZipWriter::new(partial);
  let options = file_options(zip);

  for rel in files {
    let source = root.join(rel);
    let mut options = options;
    #[cfg(unix)]
    {
      use std::os::unix::fs::PermissionsExt;
      let mode = fs::metadata(&source)
        .map_err(|e| ArtifactError::io(&source, e))?
        .permissions()
        .mode();
      options = options.unix_permissions(mode);
    }

    writer
      .start_file(rel.as_str(), options)
      .map_err(|e| ArtifactError::zip(output, e))?;
    let mut input = File::open(&source).map_err(|e| ArtifactError::io(&source, e))?;
    io::copy(&mut input, &mut writer).map_err(|e| ArtifactError::io(&source, e))?;
  }

  let mut partial = writer.finish().map_err(|e| ArtifactError::zip(output, e))?;
  partial.flush().map_err(|e| ArtifactError::io(output, e))?;
  partial.persist(output).map_err(|e| ArtifactError::io(output, e.error))?;
  Ok(())
}

fn copy_tree(root: &Path, files: &[String], output: &Path) -> Result<(), ArtifactError> {
  for rel in files {
    let source = root.join(rel);
    let dest = output.join(rel);
    if let Some(parent) = dest.parent() {
      fs::create_dir_all(parent).map_err(|e| ArtifactError::io(parent, e))?;
    }
    fs::copy(&source, &dest).map_err(|e| ArtifactError::io(&dest, e))?;
  }
  Ok(())
}
