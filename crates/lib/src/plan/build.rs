//! Build-and-diff steps.

use std::path::{Path, PathBuf};

use super::{Layout, PlanOptions, Step};
use crate::consts::ENV_SOURCE_DIR;
use crate::descriptor::{BuildDescriptor, PlatformSpec};

/// Pre-build manifest location for a platform.
pub fn pre_manifest(layout: &Layout, platform: &str) -> PathBuf {
  layout.output_dir.join(format!("{}.pre", platform))
}

/// Delta manifest location for a platform.
pub fn delta_manifest(layout: &Layout, platform: &str) -> PathBuf {
  layout.output_dir.join(format!("{}.files", platform))
}

pub(crate) fn steps(
  descriptor: &BuildDescriptor,
  spec: &PlatformSpec,
  layout: &Layout,
  root: &Path,
  options: PlanOptions,
) -> Vec<Step> {
  let platform = spec.id.to_string();
  let pre = pre_manifest(layout, &platform);
  let source = layout.env_source_dir(&descriptor.name);

  vec![
    Step::CaptureManifest {
      root: root.to_path_buf(),
      directories: descriptor.directories.clone(),
      output: pre.clone(),
    },
    Step::CopyProject {
      source: layout.project_root.clone(),
      dest: root.join(ENV_SOURCE_DIR).join(&descriptor.name),
      exclude: layout.exclusions(),
    },
    Step::RunScript {
      root: root.to_path_buf(),
      cwd: source.join(&layout.subdir),
      body: spec.build_script.clone(),
      trace: options.trace,
    },
    Step::CaptureDelta {
      root: root.to_path_buf(),
      directories: descriptor.directories.clone(),
      baseline: pre,
      output: delta_manifest(layout, &platform),
    },
  ]
}
