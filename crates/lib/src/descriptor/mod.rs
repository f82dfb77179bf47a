//! Build descriptor model.
//!
//! A descriptor is assembled by applying directives in file order. Global
//! directives set project metadata; platform-scoped directives mutate the
//! most recently opened platform. Once every directive has been applied the
//! builder is validated and frozen into an immutable [`BuildDescriptor`].
//!
//! # Submodules
//!
//! - [`lua`] - Lua bindings exposing the directives as global functions

pub mod lua;

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::platform::PlatformId;

/// Configuration errors raised while applying or validating directives.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DescriptorError {
  #[error("missing mandatory field '{0}'")]
  MissingField(&'static str),

  #[error("'{directive}' used before any platform was declared")]
  NoOpenPlatform { directive: &'static str },

  #[error("platform '{0}' declared more than once")]
  DuplicatePlatform(String),

  #[error("no platform declared")]
  NoPlatforms,

  #[error("invalid platform: {0}")]
  InvalidPlatform(String),

  #[error("package directory '{0}' must be relative (no leading '/')")]
  AbsoluteDirectory(String),

  #[error("package directory '{0}' must not contain '.' or '..' components")]
  UnsafeDirectory(String),

  #[error("invalid package name '{0}' (use letters, digits and '-', '_', '.', '+', not starting with '.')")]
  InvalidName(String),

  #[error("'{directive}' value must not be empty")]
  EmptyValue { directive: &'static str },

  #[error("unrecognized lifecycle script '{0}' (expected before-install, after-install, before-remove or after-remove)")]
  UnknownLifecycleScript(String),

  #[error("failed to evaluate descriptor: {0}")]
  Eval(String),
}

/// Package-manager hook a lifecycle script is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LifecycleHook {
  BeforeInstall,
  AfterInstall,
  BeforeRemove,
  AfterRemove,
}

impl LifecycleHook {
  pub const ALL: [LifecycleHook; 4] = [
    LifecycleHook::BeforeInstall,
    LifecycleHook::AfterInstall,
    LifecycleHook::BeforeRemove,
    LifecycleHook::AfterRemove,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::BeforeInstall => "before-install",
      Self::AfterInstall => "after-install",
      Self::BeforeRemove => "before-remove",
      Self::AfterRemove => "after-remove",
    }
  }

  /// Match a script path to a hook by its file stem.
  ///
  /// `after_install.sh`, `after-install` and `scripts/after-install.bash`
  /// all map to [`LifecycleHook::AfterInstall`].
  pub fn from_script_path(path: &Path) -> Option<Self> {
    let stem = path.file_stem()?.to_str()?.replace('_', "-");
    Self::ALL.into_iter().find(|hook| hook.as_str() == stem)
  }
}

impl fmt::Display for LifecycleHook {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Build parameters for one target platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformSpec {
  pub id: PlatformId,
  pub replaces: Vec<String>,
  pub conflicts: Vec<String>,
  pub build_dependencies: Vec<String>,
  pub dependencies: Vec<String>,
  /// Script paths relative to the descriptor directory, keyed by hook.
  pub scripts: BTreeMap<LifecycleHook, PathBuf>,
  /// Build script body, stored verbatim.
  pub build_script: String,
}

impl PlatformSpec {
  fn new(id: PlatformId) -> Self {
    Self {
      id,
      replaces: Vec::new(),
      conflicts: Vec::new(),
      build_dependencies: Vec::new(),
      dependencies: Vec::new(),
      scripts: BTreeMap::new(),
      build_script: String::new(),
    }
  }
}

/// Immutable project description, the output of directive evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildDescriptor {
  pub name: String,
  pub version: String,
  pub description: String,
  /// Package directories relative to the environment root.
  pub directories: Vec<String>,
  pub epoch: Option<u32>,
  pub license: Option<String>,
  pub maintainer: Option<String>,
  pub url: Option<String>,
  pub vendor: Option<String>,
  /// Declared platforms, in declaration order.
  pub platforms: Vec<PlatformSpec>,
}

impl BuildDescriptor {
  pub fn platform(&self, id: &PlatformId) -> Option<&PlatformSpec> {
    self.platforms.iter().find(|p| &p.id == id)
  }
}

/// Mutable accumulator for directives.
///
/// Every method validates its input before touching state, so a rejected
/// directive leaves the builder unchanged.
#[derive(Debug, Default)]
pub struct DescriptorBuilder {
  name: Option<String>,
  version: Option<String>,
  description: Option<String>,
  directories: Vec<String>,
  epoch: Option<u32>,
  license: Option<String>,
  maintainer: Option<String>,
  url: Option<String>,
  vendor: Option<String>,
  platforms: Vec<PlatformSpec>,
  /// Index into `platforms` of the platform currently open for mutation.
  open: Option<usize>,
}

fn non_empty(directive: &'static str, value: &str) -> Result<String, DescriptorError> {
  let value = value.trim();
  if value.is_empty() {
    return Err(DescriptorError::EmptyValue { directive });
  }
  Ok(value.to_string())
}

fn extend_unique(target: &mut Vec<String>, values: &[String]) {
  for value in values {
    if !target.contains(value) {
      target.push(value.clone());
    }
  }
}

impl DescriptorBuilder {
  pub fn new() -> Self {
    Self::default()
  }

  /// The name becomes part of environment paths, so it is restricted to a
  /// single safe path segment.
  pub fn name(&mut self, value: &str) -> Result<(), DescriptorError> {
    let value = non_empty("name", value)?;
    let valid = !value.starts_with('.')
      && value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '+'));
    if !valid {
      return Err(DescriptorError::InvalidName(value));
    }
    self.name = Some(value);
    Ok(())
  }

  pub fn version(&mut self, value: &str) -> Result<(), DescriptorError> {
    self.version = Some(non_empty("version", value)?);
    Ok(())
  }

  pub fn description(&mut self, value: &str) -> Result<(), DescriptorError> {
    self.description = Some(non_empty("description", value)?);
    Ok(())
  }

  pub fn directories(&mut self, values: &[String]) -> Result<(), DescriptorError> {
    let mut cleaned = Vec::with_capacity(values.len());
    for value in values {
      let value = non_empty("directories", value)?;
      if value.starts_with('/') {
        return Err(DescriptorError::AbsoluteDirectory(value));
      }
      let escapes = value.split('/').any(|segment| segment == "." || segment == "..")
        || Path::new(&value)
          .components()
          .any(|c| !matches!(c, Component::Normal(_)));
      if escapes {
        return Err(DescriptorError::UnsafeDirectory(value));
      }
      cleaned.push(value.trim_end_matches('/').to_string());
    }
    extend_unique(&mut self.directories, &cleaned);
    Ok(())
  }

  pub fn epoch(&mut self, value: u32) {
    self.epoch = Some(value);
  }

  pub fn license(&mut self, value: &str) -> Result<(), DescriptorError> {
    self.license = Some(non_empty("license", value)?);
    Ok(())
  }

  pub fn maintainer(&mut self, value: &str) -> Result<(), DescriptorError> {
    self.maintainer = Some(non_empty("maintainer", value)?);
    Ok(())
  }

  pub fn url(&mut self, value: &str) -> Result<(), DescriptorError> {
    self.url = Some(non_empty("url", value)?);
    Ok(())
  }

  pub fn vendor(&mut self, value: &str) -> Result<(), DescriptorError> {
    self.vendor = Some(non_empty("vendor", value)?);
    Ok(())
  }

  /// Declare a platform and make it the target of subsequent platform directives.
  pub fn platform(&mut self, family: &str, version: &str) -> Result<(), DescriptorError> {
    let id = PlatformId::new(family, version).map_err(|e| DescriptorError::InvalidPlatform(e.to_string()))?;
    if self.platforms.iter().any(|p| p.id == id) {
      return Err(DescriptorError::DuplicatePlatform(id.to_string()));
    }
    self.platforms.push(PlatformSpec::new(id));
    self.open = Some(self.platforms.len() - 1);
    Ok(())
  }

  fn open_platform(&mut self, directive: &'static str) -> Result<&mut PlatformSpec, DescriptorError> {
    match self.open {
      Some(index) => Ok(&mut self.platforms[index]),
      None => Err(DescriptorError::NoOpenPlatform { directive }),
    }
  }

  pub fn replaces(&mut self, values: &[String]) -> Result<(), DescriptorError> {
    let spec = self.open_platform("replaces")?;
    extend_unique(&mut spec.replaces, values);
    Ok(())
  }

  pub fn conflicts(&mut self, values: &[String]) -> Result<(), DescriptorError> {
    let spec = self.open_platform("conflicts")?;
    extend_unique(&mut spec.conflicts, values);
    Ok(())
  }

  pub fn build_dependencies(&mut self, values: &[String]) -> Result<(), DescriptorError> {
    let spec = self.open_platform("build_dependencies")?;
    extend_unique(&mut spec.build_dependencies, values);
    Ok(())
  }

  pub fn dependencies(&mut self, values: &[String]) -> Result<(), DescriptorError> {
    let spec = self.open_platform("dependencies")?;
    extend_unique(&mut spec.dependencies, values);
    Ok(())
  }

  /// Set the build script of the open platform. The body is kept verbatim.
  pub fn build_script(&mut self, body: &str) -> Result<(), DescriptorError> {
    let spec = self.open_platform("build")?;
    spec.build_script = body.to_string();
    Ok(())
  }

  pub fn scripts(&mut self, paths: &[String]) -> Result<(), DescriptorError> {
    // Resolve every hook first so an unknown name leaves the spec untouched.
    let mut resolved = Vec::with_capacity(paths.len());
    for path in paths {
      let path = PathBuf::from(path);
      let hook = LifecycleHook::from_script_path(&path)
        .ok_or_else(|| DescriptorError::UnknownLifecycleScript(path.display().to_string()))?;
      resolved.push((hook, path));
    }

    let spec = self.open_platform("scripts")?;
    spec.scripts.extend(resolved);
    Ok(())
  }

  /// Validate mandatory fields and freeze the descriptor.
  pub fn build(self) -> Result<BuildDescriptor, DescriptorError> {
    let name = self.name.ok_or(DescriptorError::MissingField("name"))?;
    let version = self.version.ok_or(DescriptorError::MissingField("version"))?;
    let description = self.description.ok_or(DescriptorError::MissingField("description"))?;
    if self.directories.is_empty() {
      return Err(DescriptorError::MissingField("directories"));
    }
    if self.platforms.is_empty() {
      return Err(DescriptorError::NoPlatforms);
    }

    Ok(BuildDescriptor {
      name,
      version,
      description,
      directories: self.directories,
      epoch: self.epoch,
      license: self.license,
      maintainer: self.maintainer,
      url: self.url,
      vendor: self.vendor,
      platforms: self.platforms,
    })
  }
}
