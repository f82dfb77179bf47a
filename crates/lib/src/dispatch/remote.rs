//! Remote execution over `ssh` and `scp`.
//!
//! The project tree is archived, uploaded with the plan to a work directory
//! on the server and unpacked there; `chpack exec-plan` then runs the plan
//! on the server. Once it completes, the remote output directory is copied
//! back into the local output directory.

use std::fs;
use std::path::{Path, PathBuf};

use tokio::process::Command;
use tracing::{debug, info};

use super::DispatchError;
use crate::consts::{APP_NAME, PLAN_FILENAME};
use crate::execute::actions::archive;
use crate::platform::paths;

/// Base directory for project uploads on the server.
pub const REMOTE_BASE: &str = "/tmp/chpack";

const SSH_OPTIONS: [&str; 8] = [
  "-o",
  "BatchMode=yes",
  "-o",
  "ConnectTimeout=10",
  "-o",
  "ServerAliveInterval=15",
  "-o",
  "ServerAliveCountMax=3",
];

/// Where a project is unpacked on the server.
pub fn remote_project_dir(project: &str) -> PathBuf {
  Path::new(REMOTE_BASE).join(project)
}

/// Quote a value for the remote POSIX shell.
pub fn quote(value: &str) -> String {
  format!("'{}'", value.replace('\'', r"'\''"))
}

/// An ssh destination, `[user@]host`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshTarget {
  destination: String,
}

impl SshTarget {
  pub fn parse(server: &str) -> Result<Self, DispatchError> {
    let server = server.trim();
    if server.is_empty() || server.starts_with('-') || server.contains(char::is_whitespace) {
      return Err(DispatchError::Remote {
        step: "connect".to_string(),
        message: format!("invalid server '{}'", server),
      });
    }
    Ok(Self {
      destination: server.to_string(),
    })
  }

  pub fn destination(&self) -> &str {
    &self.destination
  }

  fn ssh_args(&self, command: &str) -> Vec<String> {
    let mut args: Vec<String> = SSH_OPTIONS.iter().map(|s| s.to_string()).collect();
    args.push(self.destination.clone());
    args.push(command.to_string());
    args
  }

  fn upload_args(&self, local: &Path, remote: &Path) -> Vec<String> {
    let mut args: Vec<String> = SSH_OPTIONS.iter().map(|s| s.to_string()).collect();
    args.push(local.display().to_string());
    args.push(format!("{}:{}", self.destination, remote.display()));
    args
  }

  fn download_args(&self, remote: &Path, local: &Path) -> Vec<String> {
    let mut args: Vec<String> = SSH_OPTIONS.iter().map(|s| s.to_string()).collect();
    args.push("-r".to_string());
    args.push(format!("{}:{}", self.destination, remote.display()));
    args.push(local.display().to_string());
    args
  }

  async fn ssh(&self, step: &str, command: &str) -> Result<(), DispatchError> {
    info!(server = %self.destination, step = %step, "running remote command");
    debug!(command = %command, "ssh");
    run(step, "ssh", self.ssh_args(command)).await
  }

  async fn scp(&self, step: &str, args: Vec<String>) -> Result<(), DispatchError> {
    info!(server = %self.destination, step = %step, "transferring files");
    run(step, "scp", args).await
  }
}

async fn run(step: &str, program: &str, args: Vec<String>) -> Result<(), DispatchError> {
  let status = Command::new(program)
    .args(&args)
    .status()
    .await
    .map_err(|e| DispatchError::Remote {
      step: step.to_string(),
      message: format!("failed to run {}: {}", program, e),
    })?;
  if !status.success() {
    let exit = match status.code() {
      Some(code) => format!("code {}", code),
      None => "a signal".to_string(),
    };
    return Err(DispatchError::Remote {
      step: step.to_string(),
      message: format!("{} exited with {}", program, exit),
    });
  }
  Ok(())
}

/// Everything a remote run needs to know about the local side.
#[derive(Debug, Clone)]
pub struct RemoteJob<'a> {
  pub project: &'a str,
  pub project_root: &'a Path,
  pub exclusions: &'a [String],
  pub plan_file: &'a Path,
  /// Output directory on the server, from the remote layout.
  pub remote_output: &'a Path,
  /// Where retrieved artifacts land locally.
  pub local_output: &'a Path,
  pub install_dependencies: bool,
}

/// Shell command that unpacks the upload and runs the plan on the server.
fn execute_command(job: &RemoteJob<'_>, workdir: &Path, upload: &Path) -> String {
  let plan = workdir.join(PLAN_FILENAME);
  let mut command = format!(
    "tar -xzf {} -C {} && {} exec-plan {}",
    quote(&upload.display().to_string()),
    quote(&workdir.display().to_string()),
    APP_NAME,
    quote(&plan.display().to_string()),
  );
  if job.install_dependencies {
    command.push_str(" --install-dependencies");
  }
  command
}

/// Upload, execute and collect. Returns the retrieved artifact paths.
pub async fn run_remote(target: &SshTarget, job: &RemoteJob<'_>) -> Result<Vec<PathBuf>, DispatchError> {
  let workdir = remote_project_dir(job.project);
  let upload = Path::new(REMOTE_BASE).join(archive::project_archive_name(job.project));

  let staging = tempfile::TempDir::new()?;
  let local_archive = staging.path().join(archive::project_archive_name(job.project));
  archive::pack_project(job.project_root, job.exclusions, &local_archive).map_err(|e| DispatchError::Remote {
    step: "package".to_string(),
    message: e.to_string(),
  })?;

  let workdir_arg = quote(&workdir.display().to_string());
  target
    .ssh("prepare", &format!("rm -rf {0} && mkdir -p {0}", workdir_arg))
    .await?;
  target.scp("upload", target.upload_args(&local_archive, &upload)).await?;
  target
    .scp("upload", target.upload_args(job.plan_file, &workdir.join(PLAN_FILENAME)))
    .await?;

  target
    .ssh("execute", &execute_command(job, &workdir, &upload))
    .await
    .map_err(|e| execute_failure(target, &workdir, e))?;

  let retrieved = staging.path().join("output");
  fs::create_dir_all(&retrieved)?;
  target
    .scp("collect", target.download_args(job.remote_output, &retrieved))
    .await?;

  let name = job
    .remote_output
    .file_name()
    .map(PathBuf::from)
    .unwrap_or_else(|| PathBuf::from("pkg"));
  collect(&retrieved.join(name), job.local_output)
}

/// Name what a failed remote execution leaves behind on the server.
///
/// The remote run keeps its plan and the failed environment, like a local one.
fn execute_failure(target: &SshTarget, workdir: &Path, err: DispatchError) -> DispatchError {
  match err {
    DispatchError::Remote { step, message } => DispatchError::Remote {
      step,
      message: format!(
        "{} on {}; plan kept at {} and failed environments under {} for inspection",
        message,
        target.destination,
        workdir.join(PLAN_FILENAME).display(),
        paths::default_environments_dir().display(),
      ),
    },
    other => other,
  }
}

/// Move retrieved files into the local output directory.
fn collect(retrieved: &Path, local_output: &Path) -> Result<Vec<PathBuf>, DispatchError> {
  fs::create_dir_all(local_output)?;
  let mut artifacts = Vec::new();
  for entry in fs::read_dir(retrieved)? {
    let entry = entry?;
    if !entry.file_type()?.is_file() {
      continue;
    }
    let target = local_output.join(entry.file_name());
    fs::copy(entry.path(), &target)?;
    info!(artifact = ?target, "retrieved artifact");
    artifacts.push(target);
  }
  artifacts.sort();
  Ok(artifacts)
}
