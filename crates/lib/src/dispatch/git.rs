//! Version-control queries for the project tree.

use std::path::{Path, PathBuf};
use std::process::Output;

use tokio::process::Command;
use tracing::debug;

use super::DispatchError;

async fn git(dir: &Path, args: &[&str]) -> Result<Output, DispatchError> {
  debug!(dir = ?dir, args = ?args, "running git");
  Command::new("git")
    .args(args)
    .current_dir(dir)
    .output()
    .await
    .map_err(|e| DispatchError::Git(format!("failed to run git: {}", e)))
}

/// Root of the git working tree containing `dir`, if any.
pub async fn toplevel(dir: &Path) -> Option<PathBuf> {
  let output = git(dir, &["rev-parse", "--show-toplevel"]).await.ok()?;
  if !output.status.success() {
    return None;
  }
  let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
  if path.is_empty() {
    return None;
  }
  Some(PathBuf::from(path))
}

/// Uncommitted changes in the working tree at `root`, relative to the root.
///
/// Paths under any of `ignore` (root-relative) are not reported. Returns
/// `None` when `root` is not inside a git working tree.
pub async fn uncommitted_changes(root: &Path, ignore: &[String]) -> Result<Option<Vec<String>>, DispatchError> {
  if toplevel(root).await.is_none() {
    return Ok(None);
  }

  let output = git(root, &["status", "--porcelain=v1", "--untracked-files=normal"]).await?;
  if !output.status.success() {
    let stderr = String::from_utf8_lossy(&output.stderr);
    return Err(DispatchError::Git(format!("git status failed: {}", stderr.trim())));
  }

  Ok(Some(parse_porcelain(&String::from_utf8_lossy(&output.stdout), ignore)))
}

fn parse_porcelain(stdout: &str, ignore: &[String]) -> Vec<String> {
  stdout
    .lines()
    .filter(|line| line.len() > 3)
    .map(|line| {
      let path = &line[3..];
      // Renames are reported as "old -> new".
      let path = path.rsplit(" -> ").next().unwrap_or(path);
      path.trim_matches('"').trim_end_matches('/').to_string()
    })
    .filter(|path| !ignore.iter().any(|prefix| Path::new(path).starts_with(prefix)))
    .collect()
}
