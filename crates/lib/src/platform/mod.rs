//! Target platforms.
//!
//! A platform is an OS family plus a version (`ubuntu14`, `centos7`). The
//! [`registry`] holds the static knowledge needed to bootstrap each supported
//! platform; [`paths`] resolves the host locations chpack works in.

pub mod family;
pub mod paths;
pub mod registry;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use family::{Family, PackageFormat};
pub use registry::{Bootstrap, MirrorPackage, RegistryEntry};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlatformError {
  #[error("unknown platform family '{0}'")]
  UnknownFamily(String),

  #[error("invalid platform version '{0}'")]
  InvalidVersion(String),

  #[error("malformed platform id '{0}' (expected e.g. 'ubuntu14')")]
  Malformed(String),

  #[error("unsupported platform '{0}'")]
  Unsupported(String),
}

/// Platform identifier combining family and version (e.g., "ubuntu14")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PlatformId {
  pub family: Family,
  pub version: String,
}

impl PlatformId {
  pub fn new(family: &str, version: &str) -> Result<Self, PlatformError> {
    let family = family.parse::<Family>()?;
    let version = version.trim();
    if version.is_empty() || !version.chars().all(|c| c.is_ascii_digit() || c == '.') {
      return Err(PlatformError::InvalidVersion(version.to_string()));
    }
    Ok(Self {
      family,
      version: version.to_string(),
    })
  }

  /// Look up the registry entry for this platform.
  pub fn entry(&self) -> Result<&'static RegistryEntry, PlatformError> {
    registry::lookup(self).ok_or_else(|| PlatformError::Unsupported(self.to_string()))
  }

  pub fn package_format(&self) -> PackageFormat {
    self.family.package_format()
  }
}

impl fmt::Display for PlatformId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}{}", self.family, self.version)
  }
}

impl FromStr for PlatformId {
  type Err = PlatformError;

  /// Parse `ubuntu14` or `ubuntu-14`.
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let split = s
      .find(|c: char| c.is_ascii_digit())
      .ok_or_else(|| PlatformError::Malformed(s.to_string()))?;
    let (family, version) = s.split_at(split);
    let family = family.trim_end_matches('-');
    if family.is_empty() {
      return Err(PlatformError::Malformed(s.to_string()));
    }
    Self::new(family, version)
  }
}

impl TryFrom<String> for PlatformId {
  type Error = PlatformError;

  fn try_from(value: String) -> Result<Self, Self::Error> {
    value.parse()
  }
}

impl From<PlatformId> for String {
  fn from(value: PlatformId) -> Self {
    value.to_string()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn platform_id_format() {
    let id = PlatformId::new("ubuntu", "14").unwrap();
    assert_eq!(id.to_string(), "ubuntu14");
  }

  #[test]
  fn platform_id_parses_with_and_without_separator() {
    assert_eq!("centos7".parse::<PlatformId>().unwrap(), PlatformId::new("centos", "7").unwrap());
    assert_eq!("debian-8".parse::<PlatformId>().unwrap(), PlatformId::new("debian", "8").unwrap());
  }

  #[test]
  fn malformed_ids_are_rejected() {
    assert_eq!(
      "ubuntu".parse::<PlatformId>(),
      Err(PlatformError::Malformed("ubuntu".to_string()))
    );
    assert_eq!("14".parse::<PlatformId>(), Err(PlatformError::Malformed("14".to_string())));
    assert!(PlatformId::new("ubuntu", "14x").is_err());
  }

  #[test]
  fn serializes_as_string() {
    let id = PlatformId::new("centos", "7").unwrap();
    assert_eq!(serde_json::to_string(&id).unwrap(), "\"centos7\"");
    let back: PlatformId = serde_json::from_str("\"centos7\"").unwrap();
    assert_eq!(back, id);
  }

  #[test]
  fn unknown_version_is_unsupported() {
    let id = PlatformId::new("ubuntu", "99").unwrap();
    assert_eq!(id.entry().unwrap_err(), PlatformError::Unsupported("ubuntu99".to_string()));
  }
}
