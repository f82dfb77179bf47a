//! Package assembler invocation.
//!
//! The assembler is an `fpm`-compatible tool: it reads the delta manifest
//! relative to the environment root and writes one native package into a
//! scratch directory inside the root. The artifact is then moved to the
//! output directory before teardown destroys the root.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{Layout, Step, build};
use crate::consts::ENV_WORK_DIR;
use crate::descriptor::{BuildDescriptor, LifecycleHook, PlatformSpec};
use crate::platform::PackageFormat;

/// Owner of every packaged file.
const PACKAGE_OWNER: &str = "root";

/// Typed argument set for one assembler run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assembly {
  pub packager: String,
  pub name: String,
  pub version: String,
  pub description: String,
  pub epoch: Option<u32>,
  pub license: Option<String>,
  pub maintainer: Option<String>,
  pub url: Option<String>,
  pub vendor: Option<String>,
  pub format: PackageFormat,
  pub user: String,
  pub group: String,
  pub workdir: PathBuf,
  pub output_dir: PathBuf,
  /// Base directory the manifest paths are resolved against.
  pub input_root: PathBuf,
  /// Delta manifest file.
  pub inputs: PathBuf,
  pub dependencies: Vec<String>,
  pub replaces: Vec<String>,
  pub conflicts: Vec<String>,
  /// Host paths of lifecycle scripts.
  pub scripts: BTreeMap<LifecycleHook, PathBuf>,
}

impl Assembly {
  /// Command-line arguments in `fpm` syntax.
  pub fn args(&self) -> Vec<String> {
    let format = self.format.as_str();
    let mut args: Vec<String> = vec![
      "-s".into(),
      "dir".into(),
      "-t".into(),
      format.into(),
      "-n".into(),
      self.name.clone(),
      "-v".into(),
      self.version.clone(),
      "--description".into(),
      self.description.clone(),
    ];

    if let Some(epoch) = self.epoch {
      args.push("--epoch".into());
      args.push(epoch.to_string());
    }
    let optional = [
      ("--license", &self.license),
      ("--maintainer", &self.maintainer),
      ("--url", &self.url),
      ("--vendor", &self.vendor),
    ];
    for (flag, value) in optional {
      if let Some(value) = value {
        args.push(flag.into());
        args.push(value.clone());
      }
    }

    args.push(format!("--{}-user", format));
    args.push(self.user.clone());
    args.push(format!("--{}-group", format));
    args.push(self.group.clone());
    args.push("--workdir".into());
    args.push(self.workdir.display().to_string());
    args.push("-p".into());
    args.push(
      self
        .output_dir
        .join(format!("NAME_FULLVERSION_ARCH.{}", self.format.extension()))
        .display()
        .to_string(),
    );
    args.push("-C".into());
    args.push(self.input_root.display().to_string());
    args.push("--inputs".into());
    args.push(self.inputs.display().to_string());

    for (flag, values) in [
      ("-d", &self.dependencies),
      ("--replaces", &self.replaces),
      ("--conflicts", &self.conflicts),
    ] {
      for value in values {
        args.push(flag.into());
        args.push(value.clone());
      }
    }

    for (hook, path) in &self.scripts {
      args.push(format!("--{}", hook.as_str()));
      args.push(path.display().to_string());
    }

    args
  }
}

pub(crate) fn steps(descriptor: &BuildDescriptor, spec: &PlatformSpec, layout: &Layout, root: &Path) -> Vec<Step> {
  let platform = spec.id.to_string();
  let format = spec.id.package_format();
  let workdir = root.join(ENV_WORK_DIR);
  let artifacts = workdir.join("out");
  let pre = build::pre_manifest(layout, &platform);
  let delta = build::delta_manifest(layout, &platform);

  let scripts = spec
    .scripts
    .iter()
    .map(|(hook, path)| (*hook, layout.project_root.join(&layout.subdir).join(path)))
    .collect();

  let assembly = Assembly {
    packager: layout.packager.clone(),
    name: descriptor.name.clone(),
    version: descriptor.version.clone(),
    description: descriptor.description.clone(),
    epoch: descriptor.epoch,
    license: descriptor.license.clone(),
    maintainer: descriptor.maintainer.clone(),
    url: descriptor.url.clone(),
    vendor: descriptor.vendor.clone(),
    format,
    user: PACKAGE_OWNER.to_string(),
    group: PACKAGE_OWNER.to_string(),
    workdir,
    output_dir: artifacts.clone(),
    input_root: root.to_path_buf(),
    inputs: delta.clone(),
    dependencies: spec.dependencies.clone(),
    replaces: spec.replaces.clone(),
    conflicts: spec.conflicts.clone(),
    scripts,
  };

  vec![
    Step::Assemble(assembly),
    Step::RelocateArtifacts {
      from: artifacts,
      to: layout.output_dir.clone(),
      extension: format.extension().to_string(),
    },
    Step::RemoveFile { path: pre },
    Step::RemoveFile { path: delta },
  ]
}
