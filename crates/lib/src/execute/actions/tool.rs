//! Host tool discovery and installation.

use tracing::{debug, info};

use super::cmd::execute_command;
use crate::execute::types::ExecuteError;
use crate::plan::{CommandSpec, ToolInstall};

/// Fail with [`ExecuteError::ToolMissing`] unless `program` resolves on `PATH`.
pub fn require_tool(program: &str) -> Result<(), ExecuteError> {
  match which::which(program) {
    Ok(path) => {
      debug!(program = %program, path = ?path, "tool found");
      Ok(())
    }
    Err(_) => Err(ExecuteError::ToolMissing {
      program: program.to_string(),
    }),
  }
}

/// Install a missing tool with the host package manager or `gem`.
pub async fn install_tool(program: &str, install: &ToolInstall) -> Result<(), ExecuteError> {
  info!(program = %program, via = %install, "installing tool");
  let command = install_command(install, |tool| which::which(tool).is_ok()).ok_or_else(|| {
    ExecuteError::ToolInstallFailed {
      target: program.to_string(),
      message: "no supported package manager (apt-get, yum) on this host".to_string(),
    }
  })?;

  execute_command(&command).await.map_err(|e| ExecuteError::ToolInstallFailed {
    target: program.to_string(),
    message: e.to_string(),
  })
}

/// Pick the installer command; `available` reports whether a host tool exists.
fn install_command(install: &ToolInstall, available: impl Fn(&str) -> bool) -> Option<CommandSpec> {
  match install {
    ToolInstall::Gem { name } => Some(CommandSpec::new("gem", ["install", "--no-document", name.as_str()])),
    ToolInstall::System { package } => {
      if available("apt-get") {
        Some(
          CommandSpec::new("apt-get", ["-y", "install", package.as_str()])
            .with_env("DEBIAN_FRONTEND", "noninteractive"),
        )
      } else if available("yum") {
        Some(CommandSpec::new("yum", ["-y", "install", package.as_str()]))
      } else {
        None
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  #[cfg(unix)]
  fn shell_is_found() {
    require_tool("sh").unwrap();
  }

  #[test]
  fn missing_tool_is_reported() {
    let result = require_tool("chpack-definitely-not-a-tool");
    assert!(matches!(result, Err(ExecuteError::ToolMissing { program }) if program == "chpack-definitely-not-a-tool"));
  }

  #[test]
  fn system_install_prefers_apt() {
    let install = ToolInstall::System {
      package: "debootstrap".to_string(),
    };

    let command = install_command(&install, |_| true).unwrap();
    assert_eq!(command.program, "apt-get");
    assert_eq!(command.args, vec!["-y", "install", "debootstrap"]);

    let command = install_command(&install, |tool| tool == "yum").unwrap();
    assert_eq!(command.program, "yum");

    assert!(install_command(&install, |_| false).is_none());
  }

  #[test]
  fn gem_install_does_not_need_package_manager() {
    let install = ToolInstall::Gem { name: "fpm".to_string() };
    let command = install_command(&install, |_| false).unwrap();
    assert_eq!(command.program, "gem");
    assert_eq!(command.args, vec!["install", "--no-document", "fpm"]);
  }
}
