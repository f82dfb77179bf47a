//! Static table of supported platforms.
//!
//! Each entry carries what the provisioner needs to build a base image from
//! scratch: where to find the release packages for package-index families,
//! or the bootstrap codename and extra repository component for
//! debootstrap-based families.

use super::{Family, PlatformId};

/// A package located by listing a mirror directory and matching a name prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MirrorPackage {
  /// Directory listing URL, with trailing slash.
  pub mirror: &'static str,
  /// Expected file name prefix, e.g. `centos-release-7`.
  pub prefix: &'static str,
}

/// How a base image is produced on a cache miss.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bootstrap {
  /// rpm/yum style: install the release packages into an empty rpm database.
  PackageIndex {
    release: MirrorPackage,
    extension: MirrorPackage,
  },
  /// debootstrap style: bootstrap a codename, then add an extra component.
  Debootstrap {
    codename: &'static str,
    mirror: &'static str,
    component: &'static str,
  },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryEntry {
  pub family: Family,
  pub version: &'static str,
  pub bootstrap: Bootstrap,
  /// Packages installed on top of the release package on the from-scratch path.
  pub base_packages: &'static [&'static str],
}

impl RegistryEntry {
  pub fn id(&self) -> PlatformId {
    PlatformId {
      family: self.family,
      version: self.version.to_string(),
    }
  }

  /// Debootstrap codename, for families that need one.
  pub fn codename(&self) -> Option<&'static str> {
    match self.bootstrap {
      Bootstrap::Debootstrap { codename, .. } => Some(codename),
      Bootstrap::PackageIndex { .. } => None,
    }
  }
}

const RPM_BASE: &[&str] = &["bash", "yum", "nss-softokn-freebl"];

static REGISTRY: &[RegistryEntry] = &[
  RegistryEntry {
    family: Family::Centos,
    version: "6",
    bootstrap: Bootstrap::PackageIndex {
      release: MirrorPackage {
        mirror: "http://vault.centos.org/6.10/os/x86_64/Packages/",
        prefix: "centos-release-6",
      },
      extension: MirrorPackage {
        mirror: "https://archives.fedoraproject.org/pub/archive/epel/6/x86_64/Packages/e/",
        prefix: "epel-release-6",
      },
    },
    base_packages: RPM_BASE,
  },
  RegistryEntry {
    family: Family::Centos,
    version: "7",
    bootstrap: Bootstrap::PackageIndex {
      release: MirrorPackage {
        mirror: "http://vault.centos.org/7.9.2009/os/x86_64/Packages/",
        prefix: "centos-release-7",
      },
      extension: MirrorPackage {
        mirror: "https://archives.fedoraproject.org/pub/archive/epel/7/x86_64/Packages/e/",
        prefix: "epel-release-7",
      },
    },
    base_packages: RPM_BASE,
  },
  RegistryEntry {
    family: Family::Debian,
    version: "7",
    bootstrap: Bootstrap::Debootstrap {
      codename: "wheezy",
      mirror: "http://archive.debian.org/debian/",
      component: "contrib",
    },
    base_packages: &[],
  },
  RegistryEntry {
    family: Family::Debian,
    version: "8",
    bootstrap: Bootstrap::Debootstrap {
      codename: "jessie",
      mirror: "http://archive.debian.org/debian/",
      component: "contrib",
    },
    base_packages: &[],
  },
  RegistryEntry {
    family: Family::Ubuntu,
    version: "12",
    bootstrap: Bootstrap::Debootstrap {
      codename: "precise",
      mirror: "http://old-releases.ubuntu.com/ubuntu/",
      component: "universe",
    },
    base_packages: &[],
  },
  RegistryEntry {
    family: Family::Ubuntu,
    version: "14",
    bootstrap: Bootstrap::Debootstrap {
      codename: "trusty",
      mirror: "http://archive.ubuntu.com/ubuntu/",
      component: "universe",
    },
    base_packages: &[],
  },
  RegistryEntry {
    family: Family::Ubuntu,
    version: "16",
    bootstrap: Bootstrap::Debootstrap {
      codename: "xenial",
      mirror: "http://archive.ubuntu.com/ubuntu/",
      component: "universe",
    },
    base_packages: &[],
  },
];

/// All supported platforms, grouped by family.
pub fn entries() -> &'static [RegistryEntry] {
  REGISTRY
}

pub fn lookup(id: &PlatformId) -> Option<&'static RegistryEntry> {
  REGISTRY
    .iter()
    .find(|entry| entry.family == id.family && entry.version == id.version)
}
