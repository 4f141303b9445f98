use std::io::Cursor;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{
  Config, CreateContainerOptions, DownloadFromContainerOptions, KillContainerOptions, LogOutput,
  RemoveContainerOptions, StartContainerOptions, UploadToContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::image::CreateImageOptions;
use bollard::service::HostConfig;
use bytes::Bytes;
use futures_util::StreamExt;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::dockerignore::DockerIgnore;
use super::{ExecuteError, ExecutionBackend, Workspace, WorkspaceView, scrub, secret_replacements};
use crate::artifact::relative_slash_path;
use crate::command::RenderedCommand;
use crate::consts::{CONTAINER_CACHE_DIR, CONTAINER_PROJECT_DIR, CONTAINER_REQUIREMENTS_PATH};
use crate::params::DockerOptions;

/// Runs commands inside a fresh container per job.
///
/// Each job creates a container from the configured image, copies the
/// project and requirements in, execs the command through the entrypoint
/// (`<entrypoint> -c "<command>"`), copies the install root back out and
/// always kills and removes the container.
///
/// The runtime client is created on the first job, so planning works without
/// a reachable container daemon.
#[derive(Debug, Clone)]
pub struct ContainerBackend {
  client: OnceCell<Docker>,
  options: DockerOptions,
  image: String,
}

impl ContainerBackend {
  pub fn new(options: DockerOptions) -> Result<Self, ExecuteError> {
    let image = options.image.clone().ok_or_else(|| ExecuteError::Transport {
      message: "no container image configured".to_string(),
    })?;
    Ok(Self {
      client: OnceCell::new(),
      options,
      image,
    })
  }

  /// Connect to the local container runtime on first use.
  async fn client(&self) -> Result<&Docker, ExecuteError> {
    self
      .client
      .get_or_try_init(|| async {
        debug!("connecting to container runtime");
        Ok::<_, ExecuteError>(Docker::connect_with_local_defaults()?)
      })
      .await
  }

  fn container_config(&self) -> Config<String> {
    Config {
      image: Some(self.image.clone()),
      entrypoint: Some(self.options.entrypoint.clone()),
      env: Some(self.options.environment.clone()),
      working_dir: Some(CONTAINER_PROJECT_DIR.to_string()),
      tty: Some(true),
      open_stdin: Some(true),
      network_disabled: Some(self.options.network_disabled),
      host_config: Some(HostConfig {
        dns: (!self.options.dns.is_empty()).then(|| self.options.dns.clone()),
        network_mode: self.options.effective_network_mode().map(String::from),
        ..Default::default()
      }),
      ..Default::default()
    }
  }

  async fn ensure_image(&self, docker: &Docker) -> Result<(), ExecuteError> {
    if docker.inspect_image(&self.image).await.is_ok() {
      return Ok(());
    }

    info!(image = %self.image, "pulling image");
    let options = CreateImageOptions::<String> {
      from_image: self.image.clone(),
      platform: self.options.platform.clone().unwrap_or_default(),
      ..Default::default()
    };
    let mut stream = docker.create_image(Some(options), None, None);
    while let Some(progress) = stream.next().await {
      let progress = progress?;
      if let Some(status) = progress.status {
        debug!(image = %self.image, status = %status, "pull");
      }
    }
    Ok(())
  }

  async fn create(&self, docker: &Docker) -> Result<ContainerGuard, ExecuteError> {
    let options = CreateContainerOptions {
      name: container_name(),
      platform: self.options.platform.clone(),
    };
    let response = docker
      .create_container(Some(options), self.container_config())
      .await?;
    for warning in &response.warnings {
      warn!(warning = %warning, "container runtime warning");
    }
    info!(image = %self.image, id = %response.id, "created container");
    Ok(ContainerGuard {
      docker: docker.clone(),
      id: response.id,
      released: false,
    })
  }

  async fn upload(&self, docker: &Docker, id: &str, workspace: &Workspace) -> Result<(), ExecuteError> {
    let archive = input_archive(workspace)?;
    debug!(id, bytes = archive.len(), "uploading inputs");
    let options = UploadToContainerOptions {
      path: "/".to_string(),
      ..Default::default()
    };
    docker
      .upload_to_container(id, Some(options), Bytes::from(archive))
      .await?;
    Ok(())
  }

  async fn exec(&self, docker: &Docker, id: &str, command: &RenderedCommand) -> Result<(), ExecuteError> {
    let mut cmd = self.options.entrypoint.clone();
    cmd.push("-c".to_string());
    cmd.push(command.shell_line());

    let exec = docker
      .create_exec(
        id,
        CreateExecOptions {
          cmd: Some(cmd),
          attach_stdout: Some(true),
          attach_stderr: Some(true),
          working_dir: Some(CONTAINER_PROJECT_DIR.to_string()),
          ..Default::default()
        },
      )
      .await?;

    let replacements = secret_replacements(command);
    let mut stdout = LineBuffer::default();
    let mut stderr = LineBuffer::default();
    let mut stderr_log = String::new();

    if let StartExecResults::Attached { mut output, .. } = docker.start_exec(&exec.id, None).await? {
      while let Some(msg) = output.next().await {
        match msg? {
          LogOutput::StdErr { message } => {
            for line in stderr.push(&message) {
              let line = scrub(&line, &replacements);
              info!("{}", line);
              stderr_log.push_str(&line);
              stderr_log.push('\n');
            }
          }
          LogOutput::StdOut { message } | LogOutput::Console { message } => {
            for line in stdout.push(&message) {
              info!("{}", scrub(&line, &replacements));
            }
          }
          LogOutput::StdIn { .. } => {}
        }
      }
    }
    if let Some(line) = stdout.finish() {
      info!("{}", scrub(&line, &replacements));
    }
    if let Some(line) = stderr.finish() {
      let line = scrub(&line, &replacements);
      info!("{}", line);
      stderr_log.push_str(&line);
    }

    let inspect = docker.inspect_exec(&exec.id).await?;
    match inspect.exit_code {
      Some(0) => Ok(()),
      code => Err(ExecuteError::CmdFailed {
        cmd: command.display(),
        code,
        stderr: stderr_log,
      }),
    }
  }

  async fn download(&self, docker: &Docker, id: &str, output_dir: &Path) -> Result<(), ExecuteError> {
    let options = DownloadFromContainerOptions {
      path: CONTAINER_CACHE_DIR.to_string(),
    };
    let mut stream = docker.download_from_container(id, Some(options));
    let mut archive = Vec::new();
    while let Some(chunk) = stream.next().await {
      archive.extend_from_slice(&chunk?);
    }
    debug!(id, bytes = archive.len(), "downloaded outputs");
    unpack_stripped(&archive, output_dir)
  }
}

#[async_trait]
impl ExecutionBackend for ContainerBackend {
  fn name(&self) -> &'static str {
    "container"
  }

  fn view(&self, workspace: &Workspace) -> WorkspaceView {
    WorkspaceView {
      project_dir: CONTAINER_PROJECT_DIR.to_string(),
      requirements: workspace
        .requirements
        .as_ref()
        .map(|_| CONTAINER_REQUIREMENTS_PATH.to_string()),
      output_dir: CONTAINER_CACHE_DIR.to_string(),
    }
  }

  async fn run(&self, command: &RenderedCommand, workspace: &Workspace) -> Result<(), ExecuteError> {
    let docker = self.client().await?;
    self.ensure_image(docker).await?;
    let mut guard = self.create(docker).await?;

    let result = async {
      docker
        .start_container(&guard.id, None::<StartContainerOptions<String>>)
        .await?;
      self.upload(docker, &guard.id, workspace).await?;
      info!(cmd = %command.display(), "executing in container");
      self.exec(docker, &guard.id, command).await?;
      self.download(docker, &guard.id, &workspace.output_dir).await
    }
    .await;

    guard.release().await;
    result
  }
}

/// Owns a created container and removes it when released or dropped.
struct ContainerGuard {
  docker: Docker,
  id: String,
  released: bool,
}

impl ContainerGuard {
  /// Kill and remove the container, logging failures.
  async fn release(&mut self) {
    if let Err(e) = self
      .docker
      .kill_container(&self.id, None::<KillContainerOptions<String>>)
      .await
    {
      debug!(id = %self.id, error = %e, "kill failed");
    }
    match self.docker.remove_container(&self.id, Some(remove_options())).await {
      Ok(()) => info!(id = %self.id, "removed container"),
      Err(e) => warn!(id = %self.id, error = %e, "failed to remove container"),
    }
    self.released = true;
  }
}

impl Drop for ContainerGuard {
  fn drop(&mut self) {
    if self.released {
      return;
    }
    let Ok(handle) = tokio::runtime::Handle::try_current() else {
      warn!(id = %self.id, "container left behind, no runtime to remove it");
      return;
    };
    let docker = self.docker.clone();
    let id = std::mem::take(&mut self.id);
    handle.spawn(async move {
      if let Err(e) = docker.remove_container(&id, Some(remove_options())).await {
        warn!(id = %id, error = %e, "failed to remove container");
      }
    });
  }
}

fn container_name() -> String {
  let nanos = std::time::SystemTime::now()
    .duration_since(std::time::UNIX_EPOCH)
    .map(|d| d.subsec_nanos())
    .unwrap_or_default();
  format!("lambda-build-{}-{:08x}", std::process::id(), nanos)
}

fn remove_options() -> RemoveContainerOptions {
  RemoveContainerOptions {
    force: true,
    v: true,
    ..Default::default()
  }
}

/// Splits a byte stream into complete lines, decoding each line lossily.
#[derive(Default)]
struct LineBuffer {
  pending: Vec<u8>,
}

impl LineBuffer {
  fn push(&mut self, bytes: &[u8]) -> Vec<String> {
    self.pending.extend_from_slice(bytes);
    let mut lines = Vec::new();
    while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
      let line: Vec<u8> = self.pending.drain(..=pos).collect();
      lines.push(String::from_utf8_lossy(&line).trim_end_matches(['\r', '\n']).to_string());
    }
    lines
  }

  fn finish(&mut self) -> Option<String> {
    let rest = std::mem::take(&mut self.pending);
    if rest.is_empty() {
      None
    } else {
      Some(String::from_utf8_lossy(&rest).into_owned())
    }
  }
}

/// Tar the job inputs at their container paths, rooted at `/`.
fn input_archive(workspace: &Workspace) -> Result<Vec<u8>, ExecuteError> {
  let mut tar = tar::Builder::new(Vec::new());
  tar.follow_symlinks(false);
  let project_root = CONTAINER_PROJECT_DIR.trim_start_matches('/');

  if workspace.needs_project {
    let ignore = DockerIgnore::load(&workspace.project_dir, &workspace.excludes);
    let prune = !ignore.has_negations();
    let root = &workspace.project_dir;

    let walker = WalkDir::new(root).sort_by_file_name().into_iter().filter_entry(|e| {
      let rel = relative_slash_path(root, e.path());
      rel.is_empty() || !(prune && e.file_type().is_dir() && ignore.should_ignore(&rel))
    });

    for entry in walker {
      let entry = entry.map_err(|e| ExecuteError::Io(e.into()))?;
      let rel = relative_slash_path(root, entry.path());
      let name = if rel.is_empty() {
        project_root.to_string()
      } else if ignore.should_ignore(&rel) {
        continue;
      } else {
        format!("{project_root}/{rel}")
      };

      if entry.file_type().is_dir() {
        tar.append_dir(&name, entry.path())?;
      } else {
        tar.append_path_with_name(entry.path(), &name)?;
      }
    }
  }

  if let Some(requirements) = &workspace.requirements {
    tar.append_path_with_name(requirements, CONTAINER_REQUIREMENTS_PATH.trim_start_matches('/'))?;
  }

  Ok(tar.into_inner()?)
}

/// Unpack a downloaded archive into `dest`, dropping its top-level directory.
fn unpack_stripped(archive: &[u8], dest: &Path) -> Result<(), ExecuteError> {
  std::fs::create_dir_all(dest)?;
  let mut archive = tar::Archive::new(Cursor::new(archive));
  archive.set_preserve_permissions(true);

  for entry in archive.entries()? {
    let mut entry = entry?;
    let path = entry.path()?.into_owned();
    let mut components = path.components();
    components.next();
    let rel: PathBuf = components.collect();
    if rel.as_os_str().is_empty() {
      continue;
    }
    if !rel.components().all(|c| matches!(c, Component::Normal(_))) {
      warn!(path = %rel.display(), "skipping unsafe archive entry");
      continue;
    }

    let target = dest.join(&rel);
    if let Some(parent) = target.parent() {
      std::fs::create_dir_all(parent)?;
    }
    entry.unpack(&target)?;
  }
  Ok(())
}
