//! Implementation of the default `chpack` command.
//!
//! Evaluates the descriptor, generates the plan and either prints it
//! (`--preview`) or runs it locally or on a build server.

use std::time::Instant;

use anyhow::{Context, Result};

use chpack_lib::dispatch::{self, DispatchError, DispatchOutcome, RunOptions};

use crate::output::{format_duration, print_info, print_plan, print_stat, print_success, symbols};

pub fn cmd_build(options: &RunOptions) -> Result<()> {
  let start = Instant::now();

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let outcome = match rt.block_on(dispatch::run(options)) {
    Ok(outcome) => outcome,
    Err(DispatchError::Execution(failure)) => {
      if failure.environment_retained() {
        print_info(&format!(
          "environment kept for inspection: {}",
          failure.root.display()
        ));
      }
      for done in &failure.completed {
        for artifact in &done.artifacts {
          print_stat(&done.platform.to_string(), &artifact.display().to_string());
        }
      }
      return Err(DispatchError::Execution(failure)).context("Build failed");
    }
    Err(e) => return Err(e).context("Build failed"),
  };

  match outcome {
    DispatchOutcome::Previewed { plan, plan_file } => {
      print_plan(&plan);
      println!();
      print_info(&format!("Plan written to {}", plan_file.display()));
    }
    DispatchOutcome::Completed { artifacts } => {
      println!();
      print_success("Build complete!");
      for artifact in &artifacts {
        println!("  {} {}", symbols::ARROW, artifact.display());
      }
      print_stat("Packages", &artifacts.len().to_string());
      print_stat("Duration", &format_duration(start.elapsed()));
    }
  }

  Ok(())
}
