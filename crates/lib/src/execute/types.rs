//! Types for plan execution.

use std::path::PathBuf;

use thiserror::Error;

use crate::manifest::{FileManifest, ManifestError};
use crate::mirror::ResolveError;
use crate::plan::Phase;
use crate::platform::PlatformId;

/// Errors that can occur while executing a single step.
#[derive(Debug, Error)]
pub enum ExecuteError {
  /// A required host tool is not on `PATH`.
  #[error("required tool '{program}' not found on PATH (use --install-dependencies to install it)")]
  ToolMissing { program: String },

  /// Automatic installation of a missing tool failed.
  #[error("failed to install '{target}': {message}")]
  ToolInstallFailed { target: String, message: String },

  /// Mirror listing could not be resolved to a download.
  #[error(transparent)]
  Resolve(#[from] ResolveError),

  /// HTTP request failed while downloading.
  #[error("fetch failed for {url}: {message}")]
  FetchFailed { url: String, message: String },

  /// Host or chroot command exited unsuccessfully.
  #[error("command failed with exit code {code:?}: {cmd}")]
  CmdFailed { cmd: String, code: Option<i32> },

  /// The build script exited unsuccessfully.
  #[error("build script failed with exit code {code:?} in {root}")]
  ScriptFailed { root: String, code: Option<i32> },

  #[error(transparent)]
  Manifest(#[from] ManifestError),

  #[error("archive error for {path}: {message}")]
  Archive { path: String, message: String },

  /// The assembler produced no artifact.
  #[error("no .{extension} artifact found in {dir}")]
  NoArtifact { dir: String, extension: String },

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

/// Data produced by a step that the executor keeps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepOutput {
  /// Package files moved to the output directory.
  pub artifacts: Vec<PathBuf>,
  /// Delta manifest computed by the step.
  pub delta: Option<FileManifest>,
}

/// Options for executing a plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecuteOptions {
  /// Install missing tools and retry the step once.
  pub install_dependencies: bool,
}

/// Result of one successfully packaged platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildResult {
  pub platform: PlatformId,
  /// Package artifacts, at their final location.
  pub artifacts: Vec<PathBuf>,
  /// Delta manifest the package was assembled from.
  pub delta: FileManifest,
}

/// A failed run, with enough context to reproduce the failing step.
///
/// Platforms completed before the failure are kept in `completed`; their
/// artifacts remain in the output directory.
#[derive(Debug, Error)]
#[error("[{platform}] {phase} step '{step}' failed: {source}")]
pub struct RunFailure {
  pub platform: PlatformId,
  pub phase: Phase,
  pub step: String,
  /// Environment root, left in place when provisioning or building failed.
  pub root: PathBuf,
  #[source]
  pub source: ExecuteError,
  pub completed: Vec<BuildResult>,
}

impl RunFailure {
  /// Whether the environment was left intact for inspection.
  pub fn environment_retained(&self) -> bool {
    matches!(self.phase, Phase::Provision | Phase::Build)
  }
}
