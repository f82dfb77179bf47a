//! Bootstrap package downloads.
//!
//! Downloads are resolved from mirror listings, then written to a temporary
//! file next to the destination and renamed into place, so an interrupted
//! download never leaves a partial file that later runs would trust.

use std::path::Path;

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::execute::types::ExecuteError;
use crate::mirror;

/// Resolve `prefix` in the `mirror` listing and download it to `dest`.
///
/// Does nothing when `dest` already exists, so partially completed
/// bootstraps can be resumed without network access.
pub async fn execute_fetch_mirror(mirror: &str, prefix: &str, dest: &Path) -> Result<(), ExecuteError> {
  if dest.exists() {
    info!(path = ?dest, "using downloaded package");
    return Ok(());
  }

  let url = mirror::resolve(mirror, prefix).await?;
  download(&url, dest).await
}

/// Download `url` to `dest` atomically.
pub async fn download(url: &str, dest: &Path) -> Result<(), ExecuteError> {
  info!(url = %url, "fetching URL");

  if let Some(parent) = dest.parent() {
    fs::create_dir_all(parent).await?;
  }

  let fetch_err = |message: String| ExecuteError::FetchFailed {
    url: url.to_string(),
    message,
  };

  let response = reqwest::get(url).await.map_err(|e| fetch_err(e.to_string()))?;
  if !response.status().is_success() {
    return Err(fetch_err(format!("HTTP {}", response.status())));
  }
  let bytes = response.bytes().await.map_err(|e| fetch_err(e.to_string()))?;

  let partial = dest.with_extension("partial");
  let mut file = fs::File::create(&partial).await?;
  file.write_all(&bytes).await?;
  file.flush().await?;
  drop(file);
  fs::rename(&partial, dest).await?;

  debug!(path = ?dest, size = bytes.len(), "download complete");
  Ok(())
}
