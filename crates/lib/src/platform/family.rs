use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::PlatformError;

/// Operating system families chpack can build for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Family {
  Centos,
  Debian,
  Ubuntu,
}

impl Family {
  /// Returns the lowercase identifier used in platform ids
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Centos => "centos",
      Self::Debian => "debian",
      Self::Ubuntu => "ubuntu",
    }
  }

  /// Native package format produced for this family
  pub fn package_format(&self) -> PackageFormat {
    match self {
      Self::Centos => PackageFormat::Rpm,
      Self::Debian | Self::Ubuntu => PackageFormat::Deb,
    }
  }
}

impl fmt::Display for Family {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

impl FromStr for Family {
  type Err = PlatformError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "centos" | "el" => Ok(Self::Centos),
      "debian" => Ok(Self::Debian),
      "ubuntu" => Ok(Self::Ubuntu),
      _ => Err(PlatformError::UnknownFamily(s.to_string())),
    }
  }
}

/// Package-manager family, which also names the assembler's target format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageFormat {
  Rpm,
  Deb,
}

impl PackageFormat {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Rpm => "rpm",
      Self::Deb => "deb",
    }
  }

  /// File extension of artifacts in this format
  pub fn extension(&self) -> &'static str {
    self.as_str()
  }
}

impl fmt::Display for PackageFormat {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}
