//! Filesystem operations on environment roots and the output directory.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::archive::is_excluded;
use crate::execute::types::ExecuteError;

/// Remove any previous tree at `root` and create it empty.
pub fn reset_root(root: &Path) -> Result<(), ExecuteError> {
  if fs::symlink_metadata(root).is_ok() {
    info!(root = ?root, "removing previous environment");
    fs::remove_dir_all(root)?;
  }
  fs::create_dir_all(root)?;
  Ok(())
}

/// Remove a directory tree if it exists.
pub fn remove_dir(path: &Path) -> Result<(), ExecuteError> {
  match fs::remove_dir_all(path) {
    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
    result => Ok(result?),
  }
}

/// Remove a file if it exists.
pub fn remove_file(path: &Path) -> Result<(), ExecuteError> {
  match fs::remove_file(path) {
    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
    result => Ok(result?),
  }
}

pub fn copy_file(from: &Path, to: &Path) -> Result<(), ExecuteError> {
  if let Some(parent) = to.parent() {
    fs::create_dir_all(parent)?;
  }
  fs::copy(from, to)?;
  Ok(())
}

pub fn append_line(path: &Path, line: &str) -> Result<(), ExecuteError> {
  if let Some(parent) = path.parent() {
    fs::create_dir_all(parent)?;
  }
  let mut file = OpenOptions::new().create(true).append(true).open(path)?;
  writeln!(file, "{}", line)?;
  Ok(())
}

/// Copy a project tree, preserving symlinks and skipping excluded paths.
pub fn copy_project(source: &Path, dest: &Path, exclude: &[String]) -> Result<(), ExecuteError> {
  info!(source = ?source, dest = ?dest, "copying project into environment");
  fs::create_dir_all(dest)?;

  let walker = WalkDir::new(source)
    .min_depth(1)
    .follow_links(false)
    .into_iter()
    .filter_entry(|entry| !is_excluded(source, entry.path(), exclude));

  for entry in walker {
    let entry = entry.map_err(io::Error::other)?;
    let relative = entry.path().strip_prefix(source).unwrap_or(entry.path());
    let target = dest.join(relative);
    let file_type = entry.file_type();

    if file_type.is_dir() {
      fs::create_dir_all(&target)?;
    } else if file_type.is_symlink() {
      let link = fs::read_link(entry.path())?;
      if fs::symlink_metadata(&target).is_ok() {
        fs::remove_file(&target)?;
      }
      symlink(&link, &target)?;
    } else {
      fs::copy(entry.path(), &target)?;
    }
  }

  Ok(())
}

#[cfg(unix)]
fn symlink(link: &Path, target: &Path) -> io::Result<()> {
  std::os::unix::fs::symlink(link, target)
}

#[cfg(windows)]
fn symlink(link: &Path, target: &Path) -> io::Result<()> {
  std::os::windows::fs::symlink_file(link, target)
}

/// Create a character device node unless something already exists at `path`.
#[cfg(unix)]
pub fn make_char_device(path: &Path, major: u32, minor: u32, mode: u32) -> Result<(), ExecuteError> {
  use rustix::fs::{CWD, FileType, Mode, makedev, mknodat};

  if fs::symlink_metadata(path).is_ok() {
    debug!(path = ?path, "device node exists");
    return Ok(());
  }
  if let Some(parent) = path.parent() {
    fs::create_dir_all(parent)?;
  }
  mknodat(
    CWD,
    path,
    FileType::CharacterDevice,
    Mode::from_bits_truncate(mode),
    makedev(major, minor),
  )
  .map_err(io::Error::from)?;
  Ok(())
}

#[cfg(not(unix))]
pub fn make_char_device(path: &Path, _major: u32, _minor: u32, _mode: u32) -> Result<(), ExecuteError> {
  Err(ExecuteError::Io(io::Error::new(
    io::ErrorKind::Unsupported,
    format!("cannot create device node {} on this platform", path.display()),
  )))
}

/// Move every `*.{extension}` file from `from` into `to`.
///
/// Fails when the assembler left nothing to move.
pub fn relocate(from: &Path, to: &Path, extension: &str) -> Result<Vec<PathBuf>, ExecuteError> {
  fs::create_dir_all(to)?;
  let mut moved = Vec::new();

  let mut entries: Vec<PathBuf> = fs::read_dir(from)?
    .filter_map(|entry| entry.ok().map(|e| e.path()))
    .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == extension))
    .collect();
  entries.sort();

  for path in entries {
    let Some(name) = path.file_name() else {
      continue;
    };
    let target = to.join(name);
    if fs::rename(&path, &target).is_err() {
      // Output directory on another filesystem.
      warn!(from = ?path, to = ?target, "rename failed, copying");
      fs::copy(&path, &target)?;
      fs::remove_file(&path)?;
    }
    info!(artifact = ?target, "package artifact");
    moved.push(target);
  }

  if moved.is_empty() {
    return Err(ExecuteError::NoArtifact {
      dir: from.display().to_string(),
      extension: extension.to_string(),
    });
  }
  Ok(moved)
}
