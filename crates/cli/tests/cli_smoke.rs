//! CLI smoke tests for chpack.
//!
//! These tests exercise argument validation, plan previews and the
//! working-tree precondition. None of them execute a plan.

use std::path::Path;
use std::process::Command as StdCommand;

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serial_test::serial;
use tempfile::TempDir;

/// Get a Command for the chpack binary, with state directories inside `temp`.
fn chpack_cmd(temp: &Path) -> Command {
  let mut cmd = cargo_bin_cmd!("chpack");
  cmd
    .env("CHPACK_CACHE_DIR", temp.join("cache"))
    .env("CHPACK_ENV_DIR", temp.join("envs"))
    .env_remove("RUST_LOG");
  cmd
}

/// Two platforms, `make install` into `usr`.
const DESCRIPTOR: &str = r#"
name "hello"
version "1.0.0"
description "Greets the world"
directories { "usr" }

platform("ubuntu", 14)
build_dependencies { "build-essential" }
build "make install"

platform("centos", 7)
build "make install"
"#;

/// Create a temp project holding a descriptor.
fn temp_project() -> TempDir {
  let temp = TempDir::new().unwrap();
  let project = temp.path().join("hello");
  std::fs::create_dir_all(&project).unwrap();
  std::fs::write(project.join("pkg.lua"), DESCRIPTOR).unwrap();
  temp
}

fn git(dir: &Path, args: &[&str]) {
  let status = StdCommand::new("git").args(args).current_dir(dir).status().unwrap();
  assert!(status.success(), "git {:?} failed", args);
}

// =============================================================================
// Help & Version
// =============================================================================

#[test]
fn help_flag_works() {
  let temp = TempDir::new().unwrap();
  chpack_cmd(temp.path())
    .arg("--help")
    .assert()
    .success()
    .stdout(predicate::str::contains("Usage"))
    .stdout(predicate::str::contains("--install-dependencies"));
}

#[test]
fn version_flag_works() {
  let temp = TempDir::new().unwrap();
  chpack_cmd(temp.path())
    .arg("--version")
    .assert()
    .success()
    .stdout(predicate::str::contains("chpack"));
}

// =============================================================================
// Execution mode
// =============================================================================

#[test]
fn missing_execution_mode_is_a_usage_error() {
  let temp = temp_project();

  chpack_cmd(temp.path())
    .current_dir(temp.path().join("hello"))
    .arg("--preview")
    .assert()
    .code(2)
    .stderr(predicate::str::contains("--local"));

  assert!(!temp.path().join("hello/.chpack-plan.json").exists());
}

#[test]
fn both_execution_modes_is_a_usage_error() {
  let temp = temp_project();

  chpack_cmd(temp.path())
    .current_dir(temp.path().join("hello"))
    .args(["--local", "--server", "build01", "--preview"])
    .assert()
    .code(2);

  assert!(!temp.path().join("hello/.chpack-plan.json").exists());
}

// =============================================================================
// Preview
// =============================================================================

#[test]
#[serial]
fn preview_lists_platforms_in_declaration_order() {
  let temp = temp_project();
  let project = temp.path().join("hello");

  let output = chpack_cmd(temp.path())
    .current_dir(&project)
    .args(["--local", "--preview"])
    .assert()
    .success()
    .get_output()
    .clone();

  let stdout = String::from_utf8_lossy(&output.stdout);
  let ubuntu = stdout.find("[ubuntu14]").expect("ubuntu14 in preview");
  let centos = stdout.find("[centos7]").expect("centos7 in preview");
  assert!(ubuntu < centos, "unexpected order:\n{}", stdout);
  assert!(project.join(".chpack-plan.json").is_file());
  assert!(!temp.path().join("envs").exists());
}

#[test]
#[serial]
fn preview_honours_platform_filter() {
  let temp = temp_project();
  let project = temp.path().join("hello");

  let output = chpack_cmd(temp.path())
    .current_dir(&project)
    .args(["--local", "--preview", "--platform", "centos7"])
    .assert()
    .success()
    .get_output()
    .clone();

  let stdout = String::from_utf8_lossy(&output.stdout);
  assert!(stdout.contains("[centos7]"));
  assert!(!stdout.contains("[ubuntu14]"));
}

#[test]
#[serial]
fn unsupported_platform_fails_validation() {
  let temp = temp_project();

  chpack_cmd(temp.path())
    .current_dir(temp.path().join("hello"))
    .args(["--local", "--preview", "--platform", "ubuntu99"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("unsupported platform 'ubuntu99'"));
}

#[test]
#[serial]
fn missing_descriptor_fields_fail_validation() {
  let temp = TempDir::new().unwrap();
  std::fs::write(temp.path().join("pkg.lua"), "name 'hello'\nversion '1.0'\n").unwrap();

  chpack_cmd(temp.path())
    .current_dir(temp.path())
    .args(["--local", "--preview"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("description"));

  assert!(!temp.path().join(".chpack-plan.json").exists());
}

// =============================================================================
// Uncommitted changes
// =============================================================================

#[test]
#[serial]
fn uncommitted_changes_abort_the_run() {
  let temp = temp_project();
  let project = temp.path().join("hello");
  git(&project, &["init", "-q"]);
  git(&project, &["config", "user.email", "test@example.com"]);
  git(&project, &["config", "user.name", "Test"]);
  git(&project, &["add", "-A"]);
  git(&project, &["commit", "-q", "-m", "init"]);
  std::fs::write(project.join("hello.c"), "int main(void) { return 0; }\n").unwrap();

  chpack_cmd(temp.path())
    .current_dir(&project)
    .arg("--local")
    .assert()
    .failure()
    .stderr(predicate::str::contains("uncommitted changes"))
    .stderr(predicate::str::contains("hello.c"));

  assert!(!project.join(".chpack-plan.json").exists());
  assert!(!temp.path().join("envs").exists());
}

#[test]
#[serial]
fn ignore_uncommitted_allows_preview() {
  let temp = temp_project();
  let project = temp.path().join("hello");
  git(&project, &["init", "-q"]);
  std::fs::write(project.join("hello.c"), "int main(void) { return 0; }\n").unwrap();

  chpack_cmd(temp.path())
    .current_dir(&project)
    .args(["--local", "--preview", "--ignore-uncommitted"])
    .assert()
    .success();
}

#[test]
#[serial]
fn relative_output_dir_is_not_an_uncommitted_change() {
  let temp = temp_project();
  let project = temp.path().join("hello");
  git(&project, &["init", "-q"]);
  git(&project, &["config", "user.email", "test@example.com"]);
  git(&project, &["config", "user.name", "Test"]);
  git(&project, &["add", "-A"]);
  git(&project, &["commit", "-q", "-m", "init"]);
  std::fs::create_dir(project.join("out")).unwrap();
  std::fs::write(project.join("out/hello_1.0.0_amd64.deb"), "").unwrap();

  chpack_cmd(temp.path())
    .current_dir(&project)
    .args(["--local", "--preview", "--output", "out"])
    .assert()
    .success();

  let plan = std::fs::read_to_string(project.join(".chpack-plan.json")).unwrap();
  assert!(plan.contains("\"out\""), "output dir missing from exclusions:\n{}", plan);
}

// =============================================================================
// platforms
// =============================================================================

#[test]
fn platforms_lists_registry() {
  let temp = TempDir::new().unwrap();
  chpack_cmd(temp.path())
    .arg("platforms")
    .assert()
    .success()
    .stdout(predicate::str::contains("ubuntu14"))
    .stdout(predicate::str::contains("centos7"))
    .stdout(predicate::str::contains("trusty"));
}

#[test]
fn platforms_json_output() {
  let temp = TempDir::new().unwrap();
  let output = chpack_cmd(temp.path())
    .args(["platforms", "--format", "json"])
    .assert()
    .success()
    .get_output()
    .clone();

  let rows: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  let ids: Vec<&str> = rows
    .as_array()
    .unwrap()
    .iter()
    .map(|row| row["id"].as_str().unwrap())
    .collect();
  assert!(ids.contains(&"debian8"));
  assert!(ids.contains(&"centos6"));
}

// =============================================================================
// exec-plan
// =============================================================================

#[test]
fn exec_plan_rejects_missing_file() {
  let temp = TempDir::new().unwrap();
  chpack_cmd(temp.path())
    .args(["exec-plan"])
    .arg(temp.path().join("missing.json"))
    .assert()
    .failure()
    .stderr(predicate::str::contains("Failed to load plan"));
}
