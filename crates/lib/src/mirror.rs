//! Mirror directory resolution.
//!
//! Release packages for package-index families are not pinned; their file
//! names are discovered by listing the mirror directory and picking the
//! entry that matches the expected prefix.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ResolveError {
  #[error("failed to list mirror {url}: {message}")]
  Listing { url: String, message: String },

  #[error("no entry matching '{prefix}' in mirror listing {url}")]
  NoMatch { url: String, prefix: String },
}

static HREF: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r#"(?i)href\s*=\s*["']([^"'?#]+)["']"#).expect("href pattern is valid"));

/// Pick the best entry from a mirror listing.
///
/// Candidates are link targets whose file name starts with `prefix` and ends
/// in `.rpm`. When several match, the highest version wins.
pub fn best_match(listing: &str, prefix: &str) -> Option<String> {
  HREF
    .captures_iter(listing)
    .filter_map(|caps| caps.get(1))
    .map(|m| m.as_str().rsplit('/').next().unwrap_or_default().to_string())
    .filter(|name| name.starts_with(prefix) && name.ends_with(".rpm"))
    .max_by(|a, b| version_key(a).cmp(&version_key(b)).then_with(|| a.cmp(b)))
}

/// Split a file name into numeric and textual runs so `10` sorts after `9`.
fn version_key(name: &str) -> Vec<(u64, String)> {
  let mut key = Vec::new();
  let mut digits = String::new();
  let mut text = String::new();

  for c in name.chars() {
    if c.is_ascii_digit() {
      if !text.is_empty() {
        key.push((0, std::mem::take(&mut text)));
      }
      digits.push(c);
    } else {
      if !digits.is_empty() {
        key.push((digits.parse().unwrap_or(u64::MAX), String::new()));
        digits.clear();
      }
      text.push(c);
    }
  }
  if !digits.is_empty() {
    key.push((digits.parse().unwrap_or(u64::MAX), String::new()));
  }
  if !text.is_empty() {
    key.push((0, text));
  }
  key
}

/// Fetch a mirror directory listing and resolve the download URL for `prefix`.
pub async fn resolve(mirror: &str, prefix: &str) -> Result<String, ResolveError> {
  info!(mirror = %mirror, prefix = %prefix, "resolving package from mirror listing");

  let listing_err = |message: String| ResolveError::Listing {
    url: mirror.to_string(),
    message,
  };

  let response = reqwest::get(mirror).await.map_err(|e| listing_err(e.to_string()))?;
  if !response.status().is_success() {
    return Err(listing_err(format!("HTTP {}", response.status())));
  }
  let listing = response.text().await.map_err(|e| listing_err(e.to_string()))?;

  let name = best_match(&listing, prefix).ok_or_else(|| ResolveError::NoMatch {
    url: mirror.to_string(),
    prefix: prefix.to_string(),
  })?;
  debug!(name = %name, "mirror entry selected");

  Ok(join_url(mirror, &name))
}

fn join_url(base: &str, name: &str) -> String {
  format!("{}/{}", base.trim_end_matches('/'), name)
}

#[cfg(test)]
mod tests {
  use super::*;

  const LISTING: &str = r#"
<html><body><pre>
<a href="../">../</a>
<a href="centos-logos-70.0.6-3.el7.centos.noarch.rpm">centos-logos-70.0.6-3.el7.centos.noarch.rpm</a>
<a href="centos-release-7-9.2009.0.el7.centos.x86_64.rpm">centos-release-7-9.2009.0.el7.centos.x86_64.rpm</a>
<a href="centos-release-7-10.2009.1.el7.centos.x86_64.rpm">centos-release-7-10.2009.1.el7.centos.x86_64.rpm</a>
<a href='centos-release-7-9.2009.0.el7.centos.x86_64.rpm.sig'>sig</a>
<a HREF="/pub/epel-release-7-14.noarch.rpm">epel-release-7-14.noarch.rpm</a>
</pre></body></html>
"#;

  #[test]
  fn picks_highest_version_with_prefix() {
    assert_eq!(
      best_match(LISTING, "centos-release-7"),
      Some("centos-release-7-10.2009.1.el7.centos.x86_64.rpm".to_string())
    );
  }

  #[test]
  fn strips_directory_components_from_links() {
    assert_eq!(
      best_match(LISTING, "epel-release-"),
      Some("epel-release-7-14.noarch.rpm".to_string())
    );
  }

  #[test]
  fn no_match_returns_none() {
    assert_eq!(best_match(LISTING, "fedora-release-"), None);
    assert_eq!(best_match("", "centos-release-7"), None);
  }

  #[test]
  fn numeric_runs_compare_numerically() {
    assert!(version_key("pkg-10.rpm") > version_key("pkg-9.rpm"));
    assert!(version_key("pkg-1.2.rpm") < version_key("pkg-1.10.rpm"));
  }

  #[test]
  fn join_url_handles_trailing_slash() {
    assert_eq!(join_url("http://m/Packages/", "a.rpm"), "http://m/Packages/a.rpm");
    assert_eq!(join_url("http://m/Packages", "a.rpm"), "http://m/Packages/a.rpm");
  }
}
