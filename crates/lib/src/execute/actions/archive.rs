//! Gzip tarballs of environment roots and project trees.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use tempfile::NamedTempFile;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::execute::types::ExecuteError;

fn archive_err(path: &Path, e: impl std::fmt::Display) -> ExecuteError {
  ExecuteError::Archive {
    path: path.display().to_string(),
    message: e.to_string(),
  }
}

/// Unpack `archive` into `dest`, keeping permissions and ownership.
pub fn unpack(archive: &Path, dest: &Path) -> Result<(), ExecuteError> {
  info!(archive = ?archive, dest = ?dest, "unpacking archive");
  fs::create_dir_all(dest)?;

  let file = File::open(archive).map_err(|e| archive_err(archive, e))?;
  let mut tar = tar::Archive::new(GzDecoder::new(file));
  tar.set_preserve_permissions(true);
  tar.set_preserve_ownerships(true);
  tar.set_overwrite(true);
  tar.unpack(dest).map_err(|e| archive_err(archive, e))
}

/// Archive the whole of `root` into `archive`.
///
/// The archive is written to a temporary file in the destination directory
/// and renamed over `archive` only once complete, so readers see either the
/// previous entry or the new one.
pub fn snapshot(root: &Path, archive: &Path) -> Result<(), ExecuteError> {
  info!(root = ?root, archive = ?archive, "snapshotting environment");
  let parent = archive
    .parent()
    .ok_or_else(|| archive_err(archive, "archive path has no parent directory"))?;
  fs::create_dir_all(parent)?;

  let temp = NamedTempFile::new_in(parent)?;
  {
    let encoder = GzEncoder::new(temp.as_file(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.follow_symlinks(false);
    builder
      .append_dir_all(".", root)
      .map_err(|e| archive_err(archive, e))?;
    let encoder = builder.into_inner().map_err(|e| archive_err(archive, e))?;
    encoder.finish().map_err(|e| archive_err(archive, e))?;
  }

  temp.persist(archive).map_err(|e| archive_err(archive, e.error))?;
  debug!(archive = ?archive, "snapshot in place");
  Ok(())
}

/// Archive a project tree, skipping excluded project-relative paths.
pub fn pack_project(source: &Path, exclude: &[String], archive: &Path) -> Result<(), ExecuteError> {
  info!(source = ?source, archive = ?archive, "packing project");
  let file = File::create(archive).map_err(|e| archive_err(archive, e))?;
  let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
  builder.follow_symlinks(false);

  let walker = WalkDir::new(source)
    .min_depth(1)
    .follow_links(false)
    .into_iter()
    .filter_entry(|entry| !is_excluded(source, entry.path(), exclude));
  for entry in walker {
    let entry = entry.map_err(|e| archive_err(source, e))?;
    let relative = entry.path().strip_prefix(source).unwrap_or(entry.path());
    if entry.file_type().is_dir() {
      builder
        .append_dir(relative, entry.path())
        .map_err(|e| archive_err(archive, e))?;
    } else {
      builder
        .append_path_with_name(entry.path(), relative)
        .map_err(|e| archive_err(archive, e))?;
    }
  }

  let encoder = builder.into_inner().map_err(|e| archive_err(archive, e))?;
  encoder.finish().map_err(|e| archive_err(archive, e))?;
  Ok(())
}

/// Whether `path` under `source` matches an exclusion prefix.
pub(crate) fn is_excluded(source: &Path, path: &Path, exclude: &[String]) -> bool {
  let Ok(relative) = path.strip_prefix(source) else {
    return false;
  };
  exclude.iter().any(|prefix| relative.starts_with(prefix))
}

/// Archive path used for a project upload.
pub fn project_archive_name(project: &str) -> PathBuf {
  PathBuf::from(format!("{}-source.tar.gz", project))
}
