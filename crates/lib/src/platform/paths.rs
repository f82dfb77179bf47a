use std::path::{Path, PathBuf};

use crate::consts::APP_NAME;

/// Returns the directory holding cached base-image archives
///
/// Overridden by `CHPACK_CACHE_DIR`.
pub fn cache_dir() -> PathBuf {
  if let Ok(path) = std::env::var("CHPACK_CACHE_DIR") {
    return PathBuf::from(path);
  }
  default_cache_dir()
}

pub fn default_cache_dir() -> PathBuf {
  PathBuf::from("/var/cache").join(APP_NAME)
}

/// Returns the directory under which environment roots are created
///
/// Overridden by `CHPACK_ENV_DIR`.
pub fn environments_dir() -> PathBuf {
  if let Ok(path) = std::env::var("CHPACK_ENV_DIR") {
    return PathBuf::from(path);
  }
  default_environments_dir()
}

pub fn default_environments_dir() -> PathBuf {
  PathBuf::from("/var/lib").join(APP_NAME).join("environments")
}

/// Returns the directory where bootstrap packages are downloaded
///
/// Overridden by `CHPACK_DOWNLOAD_DIR`, defaults to `downloads` inside the cache.
pub fn downloads_dir() -> PathBuf {
  if let Ok(path) = std::env::var("CHPACK_DOWNLOAD_DIR") {
    return PathBuf::from(path);
  }
  cache_dir().join("downloads")
}

/// Returns the package assembler program
///
/// Overridden by `CHPACK_PACKAGER`.
pub fn packager() -> String {
  std::env::var("CHPACK_PACKAGER").unwrap_or_else(|_| "fpm".to_string())
}

/// Cache archive for a platform: `<cache>/<platform>.tar.gz`
pub fn cache_archive(cache_dir: &Path, platform: &str) -> PathBuf {
  cache_dir.join(format!("{}.tar.gz", platform))
}

/// Environment root for a project and platform. Stable across runs.
pub fn environment_root(environments_dir: &Path, project: &str, platform: &str) -> PathBuf {
  environments_dir.join(format!("{}-{}", project, platform))
}

#[cfg(test)]
mod tests {
  use super::*;
  use serial_test::serial;

  #[test]
  #[serial]
  fn env_overrides_take_precedence() {
    temp_env::with_vars(
      [
        ("CHPACK_CACHE_DIR", Some("/custom/cache")),
        ("CHPACK_ENV_DIR", Some("/custom/envs")),
        ("CHPACK_DOWNLOAD_DIR", None::<&str>),
        ("CHPACK_PACKAGER", Some("/opt/fpm/bin/fpm")),
      ],
      || {
        assert_eq!(cache_dir(), PathBuf::from("/custom/cache"));
        assert_eq!(environments_dir(), PathBuf::from("/custom/envs"));
        assert_eq!(downloads_dir(), PathBuf::from("/custom/cache/downloads"));
        assert_eq!(packager(), "/opt/fpm/bin/fpm");
      },
    );
  }

  #[test]
  #[serial]
  fn defaults_without_overrides() {
    temp_env::with_vars(
      [
        ("CHPACK_CACHE_DIR", None::<&str>),
        ("CHPACK_ENV_DIR", None::<&str>),
        ("CHPACK_DOWNLOAD_DIR", None::<&str>),
        ("CHPACK_PACKAGER", None::<&str>),
      ],
      || {
        assert_eq!(cache_dir(), PathBuf::from("/var/cache/chpack"));
        assert_eq!(environments_dir(), PathBuf::from("/var/lib/chpack/environments"));
        assert_eq!(downloads_dir(), PathBuf::from("/var/cache/chpack/downloads"));
        assert_eq!(packager(), "fpm");
      },
    );
  }

  #[test]
  fn environment_root_is_stable() {
    let envs = Path::new("/envs");
    assert_eq!(
      environment_root(envs, "hello", "ubuntu14"),
      environment_root(envs, "hello", "ubuntu14")
    );
    assert_eq!(environment_root(envs, "hello", "ubuntu14"), PathBuf::from("/envs/hello-ubuntu14"));
  }
}
