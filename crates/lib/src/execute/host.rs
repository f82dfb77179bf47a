//! Runner that performs steps against the real host.

use std::path::Path;

use tokio::task;
use tracing::info;

use super::actions::{self, archive, fs, tool};
use super::types::{ExecuteError, StepOutput};
use super::Runner;
use crate::manifest::FileManifest;
use crate::plan::{CommandSpec, Step, ToolInstall};

/// Executes plan steps with real processes and filesystem operations.
///
/// Requires the privileges the steps need (chroot, device nodes, writes
/// under the cache and environment directories).
#[derive(Debug, Default)]
pub struct HostRunner;

impl HostRunner {
  pub fn new() -> Self {
    Self
  }
}

/// Run blocking filesystem work off the async runtime.
async fn blocking<T, F>(f: F) -> Result<T, ExecuteError>
where
  F: FnOnce() -> Result<T, ExecuteError> + Send + 'static,
  T: Send + 'static,
{
  task::spawn_blocking(f)
    .await
    .map_err(|e| ExecuteError::Io(std::io::Error::other(e)))?
}

impl Runner for HostRunner {
  async fn run(&mut self, step: &Step) -> Result<StepOutput, ExecuteError> {
    match step {
      Step::RequireTool { program, .. } => tool::require_tool(program)?,
      Step::ResetRoot { root } => fs::reset_root(root)?,
      Step::CacheBranch { .. } => {
        // Resolved by the executor.
      }
      Step::UnpackArchive { archive: path, dest } => {
        let (path, dest) = (path.clone(), dest.clone());
        blocking(move || archive::unpack(&path, &dest)).await?;
      }
      Step::FetchMirrorPackage { mirror, prefix, dest } => {
        actions::execute_fetch_mirror(mirror, prefix, dest).await?;
      }
      Step::Command(command) => actions::execute_command(command).await?,
      Step::Chroot { root, command } => actions::execute_chroot(root, command).await?,
      Step::MakeCharDevice {
        path,
        major,
        minor,
        mode,
      } => fs::make_char_device(path, *major, *minor, *mode)?,
      Step::CopyFile { from, to } => fs::copy_file(from, to)?,
      Step::AppendLine { path, line } => fs::append_line(path, line)?,
      Step::SnapshotCache { root, archive: path } => {
        let (root, path) = (root.clone(), path.clone());
        blocking(move || archive::snapshot(&root, &path)).await?;
      }
      Step::CaptureManifest {
        root,
        directories,
        output,
      } => {
        let manifest = capture(root, directories).await?;
        info!(files = manifest.len(), output = ?output, "pre-build manifest captured");
        manifest.write(output)?;
      }
      Step::CopyProject { source, dest, exclude } => {
        let (source, dest, exclude) = (source.clone(), dest.clone(), exclude.clone());
        blocking(move || fs::copy_project(&source, &dest, &exclude)).await?;
      }
      Step::RunScript { root, cwd, body, trace } => actions::execute_script(root, cwd, body, *trace).await?,
      Step::CaptureDelta {
        root,
        directories,
        baseline,
        output,
      } => {
        let post = capture(root, directories).await?;
        let delta = post.delta(&FileManifest::read(baseline)?);
        info!(files = delta.len(), output = ?output, "delta manifest captured");
        delta.write(output)?;
        return Ok(StepOutput {
          delta: Some(delta),
          ..Default::default()
        });
      }
      Step::Assemble(assembly) => {
        std::fs::create_dir_all(&assembly.workdir)?;
        std::fs::create_dir_all(&assembly.output_dir)?;
        let command = CommandSpec::new(&assembly.packager, assembly.args());
        actions::execute_command(&command).await?;
      }
      Step::RelocateArtifacts { from, to, extension } => {
        return Ok(StepOutput {
          artifacts: fs::relocate(from, to, extension)?,
          ..Default::default()
        });
      }
      Step::RemoveFile { path } => fs::remove_file(path)?,
      Step::RemoveDir { path } => {
        info!(path = ?path, "tearing down environment");
        fs::remove_dir(path)?;
      }
    }
    Ok(StepOutput::default())
  }

  async fn install_tool(&mut self, program: &str, install: &ToolInstall) -> Result<(), ExecuteError> {
    tool::install_tool(program, install).await
  }

  fn exists(&self, path: &Path) -> bool {
    path.is_file()
  }
}

async fn capture(root: &Path, directories: &[String]) -> Result<FileManifest, ExecuteError> {
  let (root, directories) = (root.to_path_buf(), directories.to_vec());
  blocking(move || Ok(FileManifest::capture(&root, &directories)?)).await
}
