//! Implementation of the hidden `chpack exec-plan` command.
//!
//! Runs a serialized plan on this host. Build servers invoke it after a
//! project has been uploaded.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use chpack_lib::execute::{ExecuteOptions, HostRunner, run_plan};
use chpack_lib::plan::Plan;

use crate::output::{print_success, symbols};

pub fn cmd_exec_plan(path: &Path, install_dependencies: bool) -> Result<()> {
  let plan = Plan::read(path).with_context(|| format!("Failed to load plan: {}", path.display()))?;
  info!(plan = ?path, project = %plan.project, "loaded plan");

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let mut runner = HostRunner::new();
  let results = rt
    .block_on(run_plan(&plan, &mut runner, ExecuteOptions { install_dependencies }))
    .context("Plan execution failed")?;

  print_success(&format!("Executed plan for {}", plan.project));
  for result in &results {
    for artifact in &result.artifacts {
      println!("  {} [{}] {}", symbols::ARROW, result.platform, artifact.display());
    }
  }

  Ok(())
}
