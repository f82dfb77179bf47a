//! File manifests of environment package directories.
//!
//! A manifest is the sorted, deduplicated list of files and symlinks found
//! under the declared package directories of an environment root, written as
//! absolute-in-environment paths (`/usr/bin/hello`). Two manifests taken
//! around a build give the package contents by set difference.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum ManifestError {
  #[error("failed to walk {path}: {message}")]
  Walk { path: String, message: String },

  #[error("failed to read manifest {path}: {source}")]
  Read {
    path: String,
    #[source]
    source: io::Error,
  },

  #[error("failed to write manifest {path}: {source}")]
  Write {
    path: String,
    #[source]
    source: io::Error,
  },
}

/// Sorted set of absolute-in-environment paths.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileManifest {
  paths: BTreeSet<String>,
}

impl FileManifest {
  /// List every file and symlink (not directories) under each package directory.
  ///
  /// Missing package directories contribute nothing. Symlinks are recorded
  /// but never followed.
  pub fn capture(root: &Path, directories: &[String]) -> Result<Self, ManifestError> {
    let mut paths = BTreeSet::new();

    for dir in directories {
      let base = root.join(dir.trim_start_matches('/'));
      if fs::symlink_metadata(&base).is_err() {
        continue;
      }

      for entry in WalkDir::new(&base).follow_links(false) {
        let entry = entry.map_err(|e| ManifestError::Walk {
          path: base.display().to_string(),
          message: e.to_string(),
        })?;

        let file_type = entry.file_type();
        if file_type.is_dir() {
          continue;
        }

        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        paths.insert(format!("/{}", relative.to_string_lossy()));
      }
    }

    Ok(Self { paths })
  }

  /// Paths present in `self` but absent from `baseline`, in sorted order.
  ///
  /// Files that existed in the baseline and were only modified are not part
  /// of the delta.
  pub fn delta(&self, baseline: &FileManifest) -> FileManifest {
    FileManifest {
      paths: self.paths.difference(&baseline.paths).cloned().collect(),
    }
  }

  pub fn read(path: &Path) -> Result<Self, ManifestError> {
    let content = fs::read_to_string(path).map_err(|source| ManifestError::Read {
      path: path.display().to_string(),
      source,
    })?;
    Ok(content.lines().filter(|line| !line.is_empty()).collect())
  }

  /// Write one path per line, in sorted order.
  pub fn write(&self, path: &Path) -> Result<(), ManifestError> {
    let to_err = |source| ManifestError::Write {
      path: path.display().to_string(),
      source,
    };
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent).map_err(to_err)?;
    }
    let mut content = String::new();
    for entry in &self.paths {
      content.push_str(entry);
      content.push('\n');
    }
    fs::write(path, content).map_err(to_err)
  }

  pub fn len(&self) -> usize {
    self.paths.len()
  }

  pub fn is_empty(&self) -> bool {
    self.paths.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = &str> {
    self.paths.iter().map(String::as_str)
  }

  /// Paths joined onto an environment root.
  pub fn host_paths(&self, root: &Path) -> Vec<PathBuf> {
    self.iter().map(|p| root.join(p.trim_start_matches('/'))).collect()
  }
}

impl<S: Into<String>> FromIterator<S> for FileManifest {
  fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
    Self {
      paths: iter.into_iter().map(Into::into).collect(),
    }
  }
}
