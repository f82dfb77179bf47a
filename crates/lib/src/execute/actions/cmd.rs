//! Process execution on the host and inside environment roots.
//!
//! Processes inherit the terminal so long builds stream their output.
//! Processes inside a root run through the system `chroot` binary with a
//! cleared environment.

use std::collections::BTreeMap;
use std::path::Path;

use tokio::process::Command;
use tracing::{debug, info};

use crate::execute::types::ExecuteError;
use crate::plan::CommandSpec;

/// `PATH` inside environment roots.
const CHROOT_PATH: &str = "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";

/// Changes into `$0` then runs `$1` as a fail-fast shell script.
const SCRIPT_WRAPPER: &str = r#"cd "$0" || exit 1; exec /bin/sh -e -c "$1""#;
const SCRIPT_WRAPPER_TRACED: &str = r#"cd "$0" || exit 1; exec /bin/sh -ex -c "$1""#;

/// Run a host process.
pub async fn execute_command(spec: &CommandSpec) -> Result<(), ExecuteError> {
  info!(cmd = %spec, "executing command");

  let mut command = Command::new(&spec.program);
  command.args(&spec.args).envs(&spec.env);

  status(command, &spec.to_string()).await
}

/// Run a process confined to `root`.
pub async fn execute_chroot(root: &Path, spec: &CommandSpec) -> Result<(), ExecuteError> {
  info!(root = ?root, cmd = %spec, "executing in environment");

  let mut command = chroot_command(root, &spec.env);
  command.arg(&spec.program).args(&spec.args);

  status(command, &format!("chroot {} {}", root.display(), spec)).await
}

/// Run an opaque build script inside `root`, starting in `cwd`.
///
/// The body is passed as a single argument and never interpreted here.
pub async fn execute_script(root: &Path, cwd: &Path, body: &str, trace: bool) -> Result<(), ExecuteError> {
  info!(root = ?root, cwd = ?cwd, "running build script");

  let wrapper = if trace { SCRIPT_WRAPPER_TRACED } else { SCRIPT_WRAPPER };
  let mut command = chroot_command(root, &BTreeMap::new());
  command.args(["/bin/sh", "-c", wrapper]).arg(cwd).arg(body);

  debug!(lines = body.lines().count(), trace, "spawning build shell");
  let status = command.status().await?;
  if !status.success() {
    return Err(ExecuteError::ScriptFailed {
      root: root.display().to_string(),
      code: status.code(),
    });
  }
  Ok(())
}

/// `chroot ROOT env -i PATH=... [KEY=VALUE ...]`, ready for the program and its arguments.
fn chroot_command(root: &Path, env: &BTreeMap<String, String>) -> Command {
  let mut command = Command::new("chroot");
  command
    .arg(root)
    .arg("/usr/bin/env")
    .arg("-i")
    .arg(format!("PATH={}", CHROOT_PATH))
    .arg("HOME=/root")
    .arg("LANG=C");
  for (key, value) in env {
    command.arg(format!("{}={}", key, value));
  }
  command
}

async fn status(mut command: Command, shown: &str) -> Result<(), ExecuteError> {
  debug!(cmd = %shown, "spawning process");
  let status = command.status().await?;
  if !status.success() {
    return Err(ExecuteError::CmdFailed {
      cmd: shown.to_string(),
      code: status.code(),
    });
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  #[tokio::test]
  #[cfg(unix)]
  async fn host_command_succeeds() {
    let temp_dir = TempDir::new().unwrap();
    let marker = temp_dir.path().join("marker");

    execute_command(&CommandSpec::new("touch", [marker.display().to_string()]))
      .await
      .unwrap();

    assert!(marker.exists());
  }

  #[tokio::test]
  #[cfg(unix)]
  async fn host_command_env_is_applied() {
    let temp_dir = TempDir::new().unwrap();
    let out = temp_dir.path().join("out");
    let spec = CommandSpec::new(
      "sh",
      ["-c".to_string(), format!("printf %s \"$GREETING\" > {}", out.display())],
    )
    .with_env("GREETING", "hello");

    execute_command(&spec).await.unwrap();

    assert_eq!(std::fs::read_to_string(out).unwrap(), "hello");
  }

  #[tokio::test]
  #[cfg(unix)]
  async fn host_command_failure_reports_code() {
    let result = execute_command(&CommandSpec::new("sh", ["-c", "exit 3"])).await;

    assert!(matches!(result, Err(ExecuteError::CmdFailed { code: Some(3), .. })));
  }

  #[tokio::test]
  #[cfg(unix)]
  async fn failure_names_the_command() {
    let spec = CommandSpec::new("sh", ["-c", "exit 4"]).with_env("STAGE", "fetch");

    let Err(ExecuteError::CmdFailed { cmd, code }) = execute_command(&spec).await else {
      panic!("expected a command failure");
    };

    assert_eq!(cmd, spec.to_string());
    assert!(cmd.contains("exit 4"));
    assert_eq!(code, Some(4));
  }

  #[tokio::test]
  async fn missing_program_is_io_error() {
    let result = execute_command(&CommandSpec::new("chpack-definitely-not-a-program", Vec::<String>::new())).await;

    assert!(matches!(result, Err(ExecuteError::Io(_))));
  }

  #[test]
  fn chroot_command_clears_environment() {
    let mut env = BTreeMap::new();
    env.insert("DEBIAN_FRONTEND".to_string(), "noninteractive".to_string());

    let command = chroot_command(Path::new("/envs/hello-ubuntu14"), &env);
    let inner = command.as_std();
    let args: Vec<String> = inner.get_args().map(|a| a.to_string_lossy().to_string()).collect();
    let path = format!("PATH={}", CHROOT_PATH);

    assert_eq!(inner.get_program(), "chroot");
    assert_eq!(
      args,
      vec![
        "/envs/hello-ubuntu14",
        "/usr/bin/env",
        "-i",
        path.as_str(),
        "HOME=/root",
        "LANG=C",
        "DEBIAN_FRONTEND=noninteractive",
      ]
    );
  }

  #[tokio::test]
  #[cfg(unix)]
  async fn script_wrapper_runs_body_fail_fast_in_cwd() {
    // Exercise the wrapper directly on the host; chroot needs privileges.
    let temp_dir = TempDir::new().unwrap();
    let body = "touch first\nfalse\ntouch second\n";

    let status = Command::new("/bin/sh")
      .args(["-c", SCRIPT_WRAPPER])
      .arg(temp_dir.path())
      .arg(body)
      .status()
      .await
      .unwrap();

    assert!(!status.success());
    assert!(temp_dir.path().join("first").exists());
    assert!(!temp_dir.path().join("second").exists());
  }

  #[tokio::test]
  #[cfg(unix)]
  async fn script_body_metacharacters_are_not_reinterpreted() {
    let temp_dir = TempDir::new().unwrap();
    let body = r#"printf '%s' "$0 ${HOME:-x} `echo` 'quoted'" > out"#;

    let status = Command::new("/bin/sh")
      .args(["-c", SCRIPT_WRAPPER])
      .arg(temp_dir.path())
      .arg(body)
      .status()
      .await
      .unwrap();

    assert!(status.success());
    let written = std::fs::read_to_string(temp_dir.path().join("out")).unwrap();
    assert!(written.ends_with(" 'quoted'"));
  }
}
