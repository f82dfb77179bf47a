//! Environment provisioning steps.
//!
//! Every platform starts from a reset root. A cached base image is unpacked
//! when present; otherwise the base system is bootstrapped from scratch with
//! the family's tooling and snapshotted into the cache. Both paths finish
//! with a full non-interactive system update, after which the platform's
//! build dependencies are installed.

use std::path::{Path, PathBuf};

use super::{CommandSpec, Layout, Step, ToolInstall};
use crate::descriptor::PlatformSpec;
use crate::platform::{Bootstrap, MirrorPackage, PackageFormat, RegistryEntry, paths};

const RESOLV_CONF: &str = "/etc/resolv.conf";

pub(crate) fn steps(entry: &RegistryEntry, spec: &PlatformSpec, layout: &Layout, root: &Path) -> Vec<Step> {
  let platform = entry.id().to_string();
  let format = entry.family.package_format();
  let archive = paths::cache_archive(&layout.cache_dir, &platform);

  let mut hit = vec![Step::UnpackArchive {
    archive: archive.clone(),
    dest: root.to_path_buf(),
  }];
  hit.push(resolv_conf(root));
  hit.extend(update(format, root));

  let mut miss = match entry.bootstrap {
    Bootstrap::PackageIndex { release, extension } => {
      bootstrap_package_index(entry, release, extension, layout, root, &platform)
    }
    Bootstrap::Debootstrap {
      codename,
      mirror,
      component,
    } => bootstrap_debootstrap(codename, mirror, component, root),
  };
  miss.push(resolv_conf(root));
  miss.extend(update(format, root));
  miss.push(Step::SnapshotCache {
    root: root.to_path_buf(),
    archive: archive.clone(),
  });

  let mut steps = vec![
    require(&layout.packager, ToolInstall::Gem { name: "fpm".to_string() }),
    Step::ResetRoot { root: root.to_path_buf() },
    Step::CacheBranch { archive, hit, miss },
  ];

  if !spec.build_dependencies.is_empty() {
    steps.push(chroot(root, install(format, &spec.build_dependencies)));
  }

  steps
}

fn bootstrap_package_index(
  entry: &RegistryEntry,
  release: MirrorPackage,
  extension: MirrorPackage,
  layout: &Layout,
  root: &Path,
  platform: &str,
) -> Vec<Step> {
  let release_rpm = layout.downloads_dir.join(format!("{}-release.rpm", platform));
  let extension_rpm = layout.downloads_dir.join(format!("{}-extension.rpm", platform));
  let root_arg = root.display().to_string();
  let in_env_release = PathBuf::from("/tmp/chpack-release.rpm");
  let in_env_extension = PathBuf::from("/tmp/chpack-extension.rpm");

  let mut steps = vec![
    require("rpm", ToolInstall::System { package: "rpm".to_string() }),
    require("yum", ToolInstall::System { package: "yum".to_string() }),
    fetch(release, &release_rpm),
    fetch(extension, &extension_rpm),
    Step::Command(CommandSpec::new("rpm", ["--root", root_arg.as_str(), "--initdb"])),
    Step::Command(CommandSpec::new(
      "rpm",
      [
        "--root".to_string(),
        root_arg.clone(),
        "-ivh".to_string(),
        "--force".to_string(),
        "--nodeps".to_string(),
        release_rpm.display().to_string(),
      ],
    )),
  ];

  let mut yum = vec![
    format!("--installroot={}", root_arg),
    "-y".to_string(),
    "install".to_string(),
  ];
  yum.extend(entry.base_packages.iter().map(|p| p.to_string()));
  steps.push(Step::Command(CommandSpec::new("yum", yum)));

  // The chroot-side rpm needs a random source to verify signatures.
  steps.push(Step::MakeCharDevice {
    path: root.join("dev/urandom"),
    major: 1,
    minor: 9,
    mode: 0o666,
  });

  for (host, inside) in [(&release_rpm, &in_env_release), (&extension_rpm, &in_env_extension)] {
    steps.push(Step::CopyFile {
      from: host.clone(),
      to: in_root(root, inside),
    });
  }
  steps.push(chroot(
    root,
    CommandSpec::new(
      "rpm",
      [
        "-ivh".to_string(),
        "--force".to_string(),
        "--nodeps".to_string(),
        in_env_release.display().to_string(),
        in_env_extension.display().to_string(),
      ],
    ),
  ));
  for inside in [&in_env_release, &in_env_extension] {
    steps.push(Step::RemoveFile {
      path: in_root(root, inside),
    });
  }

  steps
}

fn bootstrap_debootstrap(codename: &str, mirror: &str, component: &str, root: &Path) -> Vec<Step> {
  vec![
    require(
      "debootstrap",
      ToolInstall::System {
        package: "debootstrap".to_string(),
      },
    ),
    Step::Command(CommandSpec::new(
      "debootstrap",
      [codename.to_string(), root.display().to_string(), mirror.to_string()],
    )),
    Step::AppendLine {
      path: root.join("etc/apt/sources.list"),
      line: format!("deb {} {} {}", mirror, codename, component),
    },
  ]
}

/// Full non-interactive system update followed by package cache cleanup.
fn update(format: PackageFormat, root: &Path) -> Vec<Step> {
  let commands = match format {
    PackageFormat::Rpm => vec![
      CommandSpec::new("yum", ["-y", "update"]),
      CommandSpec::new("yum", ["clean", "all"]),
    ],
    PackageFormat::Deb => vec![
      apt(["update"]),
      apt([
        "-y",
        "-o",
        "Dpkg::Options::=--force-confdef",
        "-o",
        "Dpkg::Options::=--force-confold",
        "dist-upgrade",
      ]),
      apt(["clean"]),
    ],
  };
  commands.into_iter().map(|command| chroot(root, command)).collect()
}

fn install(format: PackageFormat, packages: &[String]) -> CommandSpec {
  let mut args = vec!["-y".to_string(), "install".to_string()];
  args.extend(packages.iter().cloned());
  match format {
    PackageFormat::Rpm => CommandSpec::new("yum", args),
    PackageFormat::Deb => apt(args),
  }
}

fn apt<I, S>(args: I) -> CommandSpec
where
  I: IntoIterator<Item = S>,
  S: Into<String>,
{
  CommandSpec::new("apt-get", args).with_env("DEBIAN_FRONTEND", "noninteractive")
}

fn require(program: &str, install: ToolInstall) -> Step {
  Step::RequireTool {
    program: program.to_string(),
    install,
  }
}

fn fetch(package: MirrorPackage, dest: &Path) -> Step {
  Step::FetchMirrorPackage {
    mirror: package.mirror.to_string(),
    prefix: package.prefix.to_string(),
    dest: dest.to_path_buf(),
  }
}

fn chroot(root: &Path, command: CommandSpec) -> Step {
  Step::Chroot {
    root: root.to_path_buf(),
    command,
  }
}

fn resolv_conf(root: &Path) -> Step {
  Step::CopyFile {
    from: PathBuf::from(RESOLV_CONF),
    to: in_root(root, Path::new(RESOLV_CONF)),
  }
}

/// Host path of an absolute in-environment path.
fn in_root(root: &Path, inside: &Path) -> PathBuf {
  root.join(inside.strip_prefix("/").unwrap_or(inside))
}
