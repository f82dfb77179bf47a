//! Execution plans.
//!
//! A [`Plan`] is the complete, ordered description of a run: for every target
//! platform, the steps that provision its environment, build the project,
//! assemble the package and tear the environment down. Plans are pure data;
//! they are serialized to the plan file, previewed, shipped to remote hosts
//! and finally interpreted by [`crate::execute`].
//!
//! # Submodules
//!
//! - [`provision`] - Environment provisioning steps (cache restore or bootstrap)
//! - [`build`] - Manifest capture, source copy and build script steps
//! - [`package`] - Package assembler invocation

pub mod build;
pub mod package;
pub mod provision;

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consts::{ENV_SOURCE_DIR, OUTPUT_DIRNAME, PROJECT_EXCLUSIONS};
use crate::descriptor::BuildDescriptor;
use crate::platform::{PlatformError, PlatformId, paths};

pub use package::Assembly;

/// Plan file format version.
pub const PLAN_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum PlanError {
  #[error(transparent)]
  Platform(#[from] PlatformError),

  #[error("platform '{0}' is not declared in the descriptor")]
  Undeclared(String),

  #[error("failed to read plan {path}: {source}")]
  Read {
    path: String,
    #[source]
    source: io::Error,
  },

  #[error("failed to write plan {path}: {source}")]
  Write {
    path: String,
    #[source]
    source: io::Error,
  },

  #[error("invalid plan {path}: {message}")]
  Parse { path: String, message: String },

  #[error("unsupported plan version {0}")]
  UnsupportedVersion(u32),
}

/// A host process invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
  pub program: String,
  #[serde(default)]
  pub args: Vec<String>,
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub env: BTreeMap<String, String>,
}

impl CommandSpec {
  pub fn new<I, S>(program: &str, args: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self {
      program: program.to_string(),
      args: args.into_iter().map(Into::into).collect(),
      env: BTreeMap::new(),
    }
  }

  pub fn with_env(mut self, key: &str, value: &str) -> Self {
    self.env.insert(key.to_string(), value.to_string());
    self
  }
}

impl fmt::Display for CommandSpec {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for (key, value) in &self.env {
      write!(f, "{}={} ", key, value)?;
    }
    write!(f, "{}", self.program)?;
    for arg in &self.args {
      write!(f, " {}", arg)?;
    }
    Ok(())
  }
}

/// How a missing host tool can be installed when auto-install is enabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "via", rename_all = "snake_case")]
pub enum ToolInstall {
  /// Install with the host's system package manager.
  System { package: String },
  /// Install as a Ruby gem.
  Gem { name: String },
}

impl fmt::Display for ToolInstall {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::System { package } => write!(f, "package {}", package),
      Self::Gem { name } => write!(f, "gem {}", name),
    }
  }
}

/// One typed operation of a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum Step {
  /// Fail with a tooling error unless `program` is on the host `PATH`.
  RequireTool { program: String, install: ToolInstall },

  /// Remove any previous environment at `root` and create it empty.
  ResetRoot { root: PathBuf },

  /// Run `hit` when `archive` exists at execution time, `miss` otherwise.
  CacheBranch {
    archive: PathBuf,
    hit: Vec<Step>,
    miss: Vec<Step>,
  },

  /// Unpack a gzip tarball into `dest`.
  UnpackArchive { archive: PathBuf, dest: PathBuf },

  /// Resolve a file from a mirror listing and download it to `dest`.
  /// Skipped when `dest` already exists.
  FetchMirrorPackage {
    mirror: String,
    prefix: String,
    dest: PathBuf,
  },

  /// Run a process on the host.
  Command(CommandSpec),

  /// Run a process confined to `root`.
  Chroot { root: PathBuf, command: CommandSpec },

  /// Create a character device node unless it already exists.
  MakeCharDevice {
    path: PathBuf,
    major: u32,
    minor: u32,
    mode: u32,
  },

  CopyFile { from: PathBuf, to: PathBuf },

  /// Append a line to a text file, creating it if needed.
  AppendLine { path: PathBuf, line: String },

  /// Archive `root` into `archive` atomically.
  SnapshotCache { root: PathBuf, archive: PathBuf },

  /// Record the files under the package directories of `root`.
  CaptureManifest {
    root: PathBuf,
    directories: Vec<String>,
    output: PathBuf,
  },

  /// Copy the project tree into the environment.
  CopyProject {
    source: PathBuf,
    dest: PathBuf,
    exclude: Vec<String>,
  },

  /// Run the opaque build script body with `/bin/sh -e` inside `root`,
  /// starting in `cwd` (a path inside the environment).
  RunScript {
    root: PathBuf,
    cwd: PathBuf,
    body: String,
    trace: bool,
  },

  /// Capture the post-build manifest and write the paths absent from `baseline`.
  CaptureDelta {
    root: PathBuf,
    directories: Vec<String>,
    baseline: PathBuf,
    output: PathBuf,
  },

  /// Invoke the package assembler.
  Assemble(Assembly),

  /// Move every `*.{extension}` file from `from` into `to`.
  RelocateArtifacts {
    from: PathBuf,
    to: PathBuf,
    extension: String,
  },

  RemoveFile { path: PathBuf },

  RemoveDir { path: PathBuf },
}

impl fmt::Display for Step {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Step::RequireTool { program, install } => write!(f, "require {} ({})", program, install),
      Step::ResetRoot { root } => write!(f, "reset {}", root.display()),
      Step::CacheBranch { archive, .. } => write!(f, "if cached {}", archive.display()),
      Step::UnpackArchive { archive, dest } => write!(f, "unpack {} -> {}", archive.display(), dest.display()),
      Step::FetchMirrorPackage { mirror, prefix, dest } => {
        write!(f, "fetch {}{}* -> {}", mirror, prefix, dest.display())
      }
      Step::Command(command) => write!(f, "run {}", command),
      Step::Chroot { root, command } => write!(f, "chroot {} {}", root.display(), command),
      Step::MakeCharDevice { path, major, minor, .. } => {
        write!(f, "mknod {} c {} {}", path.display(), major, minor)
      }
      Step::CopyFile { from, to } => write!(f, "copy {} -> {}", from.display(), to.display()),
      Step::AppendLine { path, line } => write!(f, "append '{}' >> {}", line, path.display()),
      Step::SnapshotCache { root, archive } => write!(f, "snapshot {} -> {}", root.display(), archive.display()),
      Step::CaptureManifest { output, .. } => write!(f, "capture manifest -> {}", output.display()),
      Step::CopyProject { source, dest, .. } => write!(f, "copy project {} -> {}", source.display(), dest.display()),
      Step::RunScript { root, cwd, body, .. } => write!(
        f,
        "build in {} at {} ({} lines)",
        root.display(),
        cwd.display(),
        body.lines().count()
      ),
      Step::CaptureDelta { output, .. } => write!(f, "capture delta -> {}", output.display()),
      Step::Assemble(assembly) => write!(
        f,
        "assemble {} {} ({})",
        assembly.name, assembly.version, assembly.format
      ),
      Step::RelocateArtifacts { from, to, extension } => {
        write!(f, "move {}/*.{} -> {}", from.display(), extension, to.display())
      }
      Step::RemoveFile { path } => write!(f, "remove {}", path.display()),
      Step::RemoveDir { path } => write!(f, "remove dir {}", path.display()),
    }
  }
}

/// Phases of a platform run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
  Provision,
  Build,
  Package,
  Teardown,
}

impl fmt::Display for Phase {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Phase::Provision => "provision",
      Phase::Build => "build",
      Phase::Package => "package",
      Phase::Teardown => "teardown",
    };
    f.write_str(name)
  }
}

/// All steps for one platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformPlan {
  pub platform: PlatformId,
  pub root: PathBuf,
  pub provision: Vec<Step>,
  pub build: Vec<Step>,
  pub package: Vec<Step>,
  pub teardown: Vec<Step>,
}

impl PlatformPlan {
  pub fn phase(&self, phase: Phase) -> &[Step] {
    match phase {
      Phase::Provision => &self.provision,
      Phase::Build => &self.build,
      Phase::Package => &self.package,
      Phase::Teardown => &self.teardown,
    }
  }
}

/// Host locations a plan is generated against.
///
/// Local runs use the configured paths; remote runs use the locations the
/// project will have on the remote host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
  /// Root of the project tree copied into each environment.
  pub project_root: PathBuf,
  /// Directory of the descriptor, relative to `project_root`.
  pub subdir: PathBuf,
  /// Where artifacts and transient manifests are written.
  pub output_dir: PathBuf,
  pub cache_dir: PathBuf,
  pub environments_dir: PathBuf,
  pub downloads_dir: PathBuf,
  /// Package assembler program.
  pub packager: String,
}

impl Layout {
  /// Layout for the current host, honoring the `CHPACK_*` overrides.
  ///
  /// A relative `output_dir` is taken relative to the project root.
  pub fn local(project_root: PathBuf, subdir: PathBuf, output_dir: Option<PathBuf>) -> Self {
    let output_dir = match output_dir {
      Some(dir) if dir.is_relative() => project_root.join(dir),
      Some(dir) => dir,
      None => project_root.join(&subdir).join(OUTPUT_DIRNAME),
    };
    Self {
      project_root,
      subdir,
      output_dir,
      cache_dir: paths::cache_dir(),
      environments_dir: paths::environments_dir(),
      downloads_dir: paths::downloads_dir(),
      packager: paths::packager(),
    }
  }

  /// Layout on a remote host where the project is unpacked at `project_root`.
  pub fn remote(project_root: PathBuf, subdir: PathBuf) -> Self {
    let output_dir = project_root.join(&subdir).join(OUTPUT_DIRNAME);
    let cache_dir = paths::default_cache_dir();
    Self {
      project_root,
      subdir,
      output_dir,
      downloads_dir: cache_dir.join("downloads"),
      cache_dir,
      environments_dir: paths::default_environments_dir(),
      packager: "fpm".to_string(),
    }
  }

  /// Project-relative paths never copied into an environment.
  pub fn exclusions(&self) -> Vec<String> {
    let mut exclude: Vec<String> = PROJECT_EXCLUSIONS.iter().map(|s| s.to_string()).collect();
    if let Ok(relative) = self.output_dir.strip_prefix(&self.project_root) {
      let relative = relative.to_string_lossy().to_string();
      if !relative.is_empty() && !exclude.contains(&relative) {
        exclude.push(relative);
      }
    }
    exclude
  }

  /// Where the project is copied inside an environment, as an in-environment path.
  pub fn env_source_dir(&self, project: &str) -> PathBuf {
    Path::new("/").join(ENV_SOURCE_DIR).join(project)
  }
}

/// Generation switches carried into the plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlanOptions {
  /// Run build scripts with shell tracing.
  pub trace: bool,
}

/// A complete run: every target platform, in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
  pub version: u32,
  pub project: String,
  pub platforms: Vec<PlatformPlan>,
}

impl Plan {
  /// Generate the plan for `targets`, in the order given.
  pub fn generate(
    descriptor: &BuildDescriptor,
    targets: &[PlatformId],
    layout: &Layout,
    options: PlanOptions,
  ) -> Result<Self, PlanError> {
    let mut platforms = Vec::with_capacity(targets.len());

    for id in targets {
      let entry = id.entry()?;
      let spec = descriptor
        .platform(id)
        .ok_or_else(|| PlanError::Undeclared(id.to_string()))?;
      let root = paths::environment_root(&layout.environments_dir, &descriptor.name, &id.to_string());

      platforms.push(PlatformPlan {
        platform: id.clone(),
        provision: provision::steps(entry, spec, layout, &root),
        build: build::steps(descriptor, spec, layout, &root, options),
        package: package::steps(descriptor, spec, layout, &root),
        teardown: vec![Step::RemoveDir { path: root.clone() }],
        root,
      });
    }

    Ok(Self {
      version: PLAN_VERSION,
      project: descriptor.name.clone(),
      platforms,
    })
  }

  pub fn write(&self, path: &Path) -> Result<(), PlanError> {
    let to_err = |source| PlanError::Write {
      path: path.display().to_string(),
      source,
    };
    let content = serde_json::to_string_pretty(self).map_err(|e| to_err(io::Error::other(e)))?;
    fs::write(path, content).map_err(to_err)
  }

  pub fn read(path: &Path) -> Result<Self, PlanError> {
    let content = fs::read_to_string(path).map_err(|source| PlanError::Read {
      path: path.display().to_string(),
      source,
    })?;
    let plan: Plan = serde_json::from_str(&content).map_err(|e| PlanError::Parse {
      path: path.display().to_string(),
      message: e.to_string(),
    })?;
    if plan.version != PLAN_VERSION {
      return Err(PlanError::UnsupportedVersion(plan.version));
    }
    Ok(plan)
  }
}

impl fmt::Display for Plan {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    fn write_steps(f: &mut fmt::Formatter<'_>, steps: &[Step], indent: usize) -> fmt::Result {
      for step in steps {
        writeln!(f, "{:indent$}{}", "", step, indent = indent)?;
        if let Step::CacheBranch { hit, miss, .. } = step {
          writeln!(f, "{:indent$}hit:", "", indent = indent + 2)?;
          write_steps(f, hit, indent + 4)?;
          writeln!(f, "{:indent$}miss:", "", indent = indent + 2)?;
          write_steps(f, miss, indent + 4)?;
        }
      }
      Ok(())
    }

    for platform in &self.platforms {
      writeln!(f, "[{}] {}", platform.platform, platform.root.display())?;
      for phase in [Phase::Provision, Phase::Build, Phase::Package, Phase::Teardown] {
        writeln!(f, "  {}:", phase)?;
        write_steps(f, platform.phase(phase), 4)?;
      }
    }
    Ok(())
  }
}

#[cfg(test)]
pub(crate) mod tests {
  use super::*;
  use crate::descriptor::DescriptorBuilder;
  use tempfile::TempDir;

  pub(crate) fn two_platform_descriptor() -> BuildDescriptor {
    let mut builder = DescriptorBuilder::new();
    builder.name("hello").unwrap();
    builder.version("1.0.0").unwrap();
    builder.description("Hello world").unwrap();
    builder.directories(&["usr".to_string()]).unwrap();
    builder.platform("ubuntu", "14").unwrap();
    builder.build_dependencies(&["build-essential".to_string()]).unwrap();
    builder.build_script("make install").unwrap();
    builder.platform("centos", "7").unwrap();
    builder.build_script("make install").unwrap();
    builder.build().unwrap()
  }

  pub(crate) fn test_layout(base: &Path) -> Layout {
    Layout {
      project_root: base.join("project"),
      subdir: PathBuf::from("packaging"),
      output_dir: base.join("project/packaging/pkg"),
      cache_dir: base.join("cache"),
      environments_dir: base.join("envs"),
      downloads_dir: base.join("cache/downloads"),
      packager: "fpm".to_string(),
    }
  }

  pub(crate) fn ids(values: &[&str]) -> Vec<PlatformId> {
    values.iter().map(|v| v.parse().unwrap()).collect()
  }

  #[test]
  fn platforms_follow_requested_order() {
    let descriptor = two_platform_descriptor();
    let layout = test_layout(Path::new("/base"));

    let plan = Plan::generate(&descriptor, &ids(&["ubuntu14", "centos7"]), &layout, PlanOptions::default()).unwrap();
    let order: Vec<String> = plan.platforms.iter().map(|p| p.platform.to_string()).collect();
    assert_eq!(order, vec!["ubuntu14", "centos7"]);

    let plan = Plan::generate(&descriptor, &ids(&["centos7", "ubuntu14"]), &layout, PlanOptions::default()).unwrap();
    let order: Vec<String> = plan.platforms.iter().map(|p| p.platform.to_string()).collect();
    assert_eq!(order, vec!["centos7", "ubuntu14"]);
  }

  #[test]
  fn unsupported_platform_is_rejected() {
    let mut builder = DescriptorBuilder::new();
    builder.name("hello").unwrap();
    builder.version("1.0.0").unwrap();
    builder.description("Hello world").unwrap();
    builder.directories(&["usr".to_string()]).unwrap();
    builder.platform("ubuntu", "99").unwrap();
    let descriptor = builder.build().unwrap();

    let result = Plan::generate(
      &descriptor,
      &ids(&["ubuntu99"]),
      &test_layout(Path::new("/base")),
      PlanOptions::default(),
    );
    assert!(matches!(result, Err(PlanError::Platform(PlatformError::Unsupported(_)))));
  }

  #[test]
  fn undeclared_platform_is_rejected() {
    let result = Plan::generate(
      &two_platform_descriptor(),
      &ids(&["debian8"]),
      &test_layout(Path::new("/base")),
      PlanOptions::default(),
    );
    assert!(matches!(result, Err(PlanError::Undeclared(id)) if id == "debian8"));
  }

  #[test]
  fn every_platform_ends_with_teardown_of_its_root() {
    let plan = Plan::generate(
      &two_platform_descriptor(),
      &ids(&["ubuntu14", "centos7"]),
      &test_layout(Path::new("/base")),
      PlanOptions::default(),
    )
    .unwrap();

    for platform in &plan.platforms {
      assert_eq!(platform.teardown, vec![Step::RemoveDir { path: platform.root.clone() }]);
      assert_eq!(
        platform.root,
        PathBuf::from(format!("/base/envs/hello-{}", platform.platform))
      );
    }
  }

  #[test]
  fn plan_file_round_trips() {
    let temp = TempDir::new().unwrap();
    let plan = Plan::generate(
      &two_platform_descriptor(),
      &ids(&["ubuntu14", "centos7"]),
      &test_layout(temp.path()),
      PlanOptions { trace: true },
    )
    .unwrap();
    let path = temp.path().join("plan.json");

    plan.write(&path).unwrap();

    assert_eq!(Plan::read(&path).unwrap(), plan);
  }

  #[test]
  fn plan_with_unknown_version_is_rejected() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("plan.json");
    fs::write(&path, r#"{"version": 99, "project": "x", "platforms": []}"#).unwrap();

    assert!(matches!(Plan::read(&path), Err(PlanError::UnsupportedVersion(99))));
  }

  #[test]
  fn exclusions_include_output_dir_inside_project() {
    let layout = test_layout(Path::new("/base"));
    let exclude = layout.exclusions();
    assert!(exclude.contains(&".git".to_string()));
    assert!(exclude.contains(&"packaging/pkg".to_string()));
  }

  #[test]
  fn relative_output_dir_is_excluded() {
    let layout = Layout::local(PathBuf::from("/proj"), PathBuf::new(), Some(PathBuf::from("out")));

    assert_eq!(layout.output_dir, PathBuf::from("/proj/out"));
    assert!(layout.exclusions().contains(&"out".to_string()));
  }

  #[test]
  fn output_dir_outside_project_is_not_excluded() {
    let layout = Layout::local(PathBuf::from("/proj"), PathBuf::new(), Some(PathBuf::from("/srv/packages")));

    assert_eq!(layout.exclusions().len(), PROJECT_EXCLUSIONS.len());
  }

  #[test]
  fn preview_lists_platforms_in_order() {
    let plan = Plan::generate(
      &two_platform_descriptor(),
      &ids(&["ubuntu14", "centos7"]),
      &test_layout(Path::new("/base")),
      PlanOptions::default(),
    )
    .unwrap();

    let rendered = plan.to_string();
    let ubuntu = rendered.find("[ubuntu14]").unwrap();
    let centos = rendered.find("[centos7]").unwrap();
    assert!(ubuntu < centos);
    assert!(rendered.contains("make install") || rendered.contains("build in"));
  }
}
