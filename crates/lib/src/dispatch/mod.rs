//! Run orchestration.
//!
//! A run moves through `validate -> generate -> (preview | run) -> collect ->
//! cleanup`. Validation covers the execution mode, the descriptor, the
//! platform filter and the working-tree precondition, all before anything
//! touches an environment. The generated [`Plan`] is written to the plan file
//! in the project root and is removed only when every platform succeeded.
//!
//! # Submodules
//!
//! - [`git`] - Working-tree queries
//! - [`remote`] - Upload, remote execution and artifact retrieval over ssh

pub mod git;
pub mod remote;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, warn};

use crate::consts::PLAN_FILENAME;
use crate::descriptor::{BuildDescriptor, DescriptorError};
use crate::execute::{self, ExecuteOptions, HostRunner, RunFailure, Runner};
use crate::lua;
use crate::plan::{Layout, Plan, PlanError, PlanOptions};
use crate::platform::{PlatformId, registry};

#[derive(Debug, Error)]
pub enum DispatchError {
  #[error(transparent)]
  Descriptor(#[from] DescriptorError),

  #[error("{0}")]
  ExecutionMode(String),

  #[error("invalid platform '{id}': {message}")]
  InvalidPlatform { id: String, message: String },

  #[error("unsupported platform '{0}'")]
  UnsupportedPlatform(String),

  #[error("platform '{0}' is not declared in the descriptor")]
  UndeclaredPlatform(String),

  #[error("working tree has uncommitted changes: {}", .files.join(", "))]
  UncommittedChanges { files: Vec<String> },

  #[error("{0}")]
  Git(String),

  #[error(transparent)]
  Plan(#[from] PlanError),

  #[error(transparent)]
  Execution(#[from] Box<RunFailure>),

  #[error("remote {step} failed: {message}")]
  Remote { step: String, message: String },

  #[error(transparent)]
  Io(#[from] io::Error),
}

/// Where the plan executes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionMode {
  Local,
  Remote { server: String },
}

impl ExecutionMode {
  /// Exactly one of `--local` and `--server` must be given.
  pub fn from_flags(local: bool, server: Option<&str>) -> Result<Self, DispatchError> {
    match (local, server) {
      (true, None) => Ok(ExecutionMode::Local),
      (false, Some(server)) => Ok(ExecutionMode::Remote {
        server: server.to_string(),
      }),
      (true, Some(_)) => Err(DispatchError::ExecutionMode(
        "--local and --server are mutually exclusive".to_string(),
      )),
      (false, None) => Err(DispatchError::ExecutionMode(
        "one of --local or --server <host> is required".to_string(),
      )),
    }
  }
}

/// Inputs of a run, as collected by the CLI.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
  pub descriptor: PathBuf,
  /// Platform filter; empty builds every declared platform.
  pub platforms: Vec<String>,
  pub local: bool,
  pub server: Option<String>,
  pub install_dependencies: bool,
  pub debug: bool,
  pub preview: bool,
  pub ignore_uncommitted: bool,
  pub output: Option<PathBuf>,
}

#[derive(Debug)]
pub enum DispatchOutcome {
  /// The plan was generated and written, nothing executed.
  Previewed { plan: Plan, plan_file: PathBuf },
  /// Every platform succeeded; the plan file has been removed.
  Completed { artifacts: Vec<PathBuf> },
}

/// Validate, generate and execute a run.
pub async fn run(options: &RunOptions) -> Result<DispatchOutcome, DispatchError> {
  run_with(options, &mut HostRunner::new()).await
}

/// Like [`run`], executing local plans through `runner`.
///
/// Remote runs hand the plan to the build server and never touch `runner`.
pub async fn run_with<R: Runner>(options: &RunOptions, runner: &mut R) -> Result<DispatchOutcome, DispatchError> {
  let mode = ExecutionMode::from_flags(options.local, options.server.as_deref())?;
  let target = match &mode {
    ExecutionMode::Remote { server } => Some(remote::SshTarget::parse(server)?),
    ExecutionMode::Local => None,
  };

  let descriptor_path = dunce::canonicalize(&options.descriptor).map_err(|e| {
    DescriptorError::Eval(format!("cannot open {}: {}", options.descriptor.display(), e))
  })?;
  let descriptor = lua::load_descriptor(&descriptor_path)?;
  let targets = resolve_targets(&descriptor, &options.platforms)?;

  let descriptor_dir = descriptor_path.parent().unwrap_or(Path::new("/")).to_path_buf();
  let project_root = git::toplevel(&descriptor_dir)
    .await
    .unwrap_or_else(|| descriptor_dir.clone());
  let subdir = descriptor_dir
    .strip_prefix(&project_root)
    .map(Path::to_path_buf)
    .unwrap_or_default();

  let output = options.output.as_deref().map(resolve_output).transpose()?;
  let local_layout = Layout::local(project_root.clone(), subdir.clone(), output);
  if !options.ignore_uncommitted {
    ensure_clean(&local_layout).await?;
  }

  let layout = match mode {
    ExecutionMode::Local => local_layout.clone(),
    ExecutionMode::Remote { .. } => Layout::remote(remote::remote_project_dir(&descriptor.name), subdir),
  };
  let plan = Plan::generate(&descriptor, &targets, &layout, PlanOptions { trace: options.debug })?;
  let plan_file = project_root.join(PLAN_FILENAME);
  plan.write(&plan_file)?;
  info!(plan = ?plan_file, platforms = plan.platforms.len(), "plan written");

  if options.preview {
    return Ok(DispatchOutcome::Previewed { plan, plan_file });
  }

  let artifacts = match target {
    None => {
      let results = execute::run_plan(
        &plan,
        runner,
        ExecuteOptions {
          install_dependencies: options.install_dependencies,
        },
      )
      .await?;
      results.into_iter().flat_map(|r| r.artifacts).collect()
    }
    Some(target) => {
      let exclusions = local_layout.exclusions();
      let job = remote::RemoteJob {
        project: &descriptor.name,
        project_root: &project_root,
        exclusions: &exclusions,
        plan_file: &plan_file,
        remote_output: &layout.output_dir,
        local_output: &local_layout.output_dir,
        install_dependencies: options.install_dependencies,
      };
      remote::run_remote(&target, &job).await?
    }
  };

  fs::remove_file(&plan_file)?;
  info!(plan = ?plan_file, "plan removed");
  Ok(DispatchOutcome::Completed { artifacts })
}

/// Target platforms in build order.
///
/// Without a filter every declared platform is built in declaration order.
/// A filter keeps its own order, ignoring repeats.
pub fn resolve_targets(descriptor: &BuildDescriptor, filter: &[String]) -> Result<Vec<PlatformId>, DispatchError> {
  let requested: Vec<PlatformId> = if filter.is_empty() {
    descriptor.platforms.iter().map(|p| p.id.clone()).collect()
  } else {
    let mut ids: Vec<PlatformId> = Vec::with_capacity(filter.len());
    for raw in filter {
      let id: PlatformId = raw.parse().map_err(|e: crate::platform::PlatformError| {
        DispatchError::InvalidPlatform {
          id: raw.clone(),
          message: e.to_string(),
        }
      })?;
      if !ids.contains(&id) {
        ids.push(id);
      }
    }
    ids
  };

  for id in &requested {
    if registry::lookup(id).is_none() {
      return Err(DispatchError::UnsupportedPlatform(id.to_string()));
    }
    if descriptor.platform(id).is_none() {
      return Err(DispatchError::UndeclaredPlatform(id.to_string()));
    }
  }
  Ok(requested)
}

/// Absolute form of a user-supplied output directory.
///
/// Relative paths are taken from the current directory. The part that exists
/// is canonicalized so the result compares against the canonical project root.
fn resolve_output(dir: &Path) -> io::Result<PathBuf> {
  let absolute = std::path::absolute(dir)?;
  let mut existing = absolute.as_path();
  let mut missing = Vec::new();
  loop {
    if let Ok(canonical) = dunce::canonicalize(existing) {
      return Ok(missing.iter().rev().fold(canonical, |path, name| path.join(name)));
    }
    match (existing.parent(), existing.file_name()) {
      (Some(parent), Some(name)) => {
        missing.push(name.to_os_string());
        existing = parent;
      }
      _ => return Ok(absolute),
    }
  }
}

/// Fail if the project working tree has uncommitted changes.
///
/// The plan file and the output directory are ignored since runs produce
/// them. A project outside version control passes with a warning.
async fn ensure_clean(layout: &Layout) -> Result<(), DispatchError> {
  let ignore = layout.exclusions();
  match git::uncommitted_changes(&layout.project_root, &ignore).await? {
    None => {
      warn!(root = ?layout.project_root, "project is not under git, skipping uncommitted change check");
      Ok(())
    }
    Some(files) if files.is_empty() => Ok(()),
    Some(files) => Err(DispatchError::UncommittedChanges { files }),
  }
}
