/// Name of the checksum sidecar stored at the install prefix of every artifact.
pub const CHECKSUM_FILE: &str = "checksum";

/// Name of the exported requirements file written next to each staging root.
pub const REQUIREMENTS_FILE: &str = "requirements.txt";

pub const PYPROJECT_FILE: &str = "pyproject.toml";
pub const LOCK_FILE: &str = "poetry.lock";
pub const DOCKERIGNORE_FILE: &str = ".dockerignore";

/// Table under `[tool]` in `pyproject.toml` holding build parameters.
pub const CONFIG_SECTION: &str = "lambda-build";
/// Older table name, read when [`CONFIG_SECTION`] is absent.
pub const LEGACY_CONFIG_SECTION: &str = "poetry-plugin-lambda-build";

/// Directory the project is copied to inside a build container.
pub const CONTAINER_PROJECT_DIR: &str = "/opt/lambda/project";
/// Path of the requirements file inside a build container.
pub const CONTAINER_REQUIREMENTS_PATH: &str = "/opt/lambda/requirements.txt";
/// Install root inside a build container, copied back to the staging root.
pub const CONTAINER_CACHE_DIR: &str = "/opt/lambda/cache";

/// Characters of a secret left visible in print-safe commands.
pub const MASK_VISIBLE_PREFIX: usize = 14;

pub const DEFAULT_ENTRYPOINT: &str = "/bin/bash";
pub const DEFAULT_NETWORK: &str = "host";
pub const DEFAULT_PACKAGE_PATH: &str = "package.zip";

/// Patterns never copied into an artifact.
pub const ARTIFACT_EXCLUDES: &[&str] = &["*.pyc", "*__pycache__/*", "**/__pycache__", "**/__pycache__/**"];

/// Patterns never part of a project checksum.
pub const CHECKSUM_EXCLUDES: &[&str] = &[
  ".git",
  ".git/**",
  "dist",
  "dist/**",
  "**/__pycache__",
  "**/__pycache__/**",
  "**/*.pyc",
];
