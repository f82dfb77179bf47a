//! Plan execution.
//!
//! The executor walks a [`Plan`] platform by platform and phase by phase,
//! handing each leaf step to a [`Runner`]. Control flow lives here:
//! - cache branches are decided at execution time
//! - missing tools are installed and the step retried once when enabled
//! - a provision or build failure stops the run with the environment intact
//! - teardown always follows packaging
//!
//! Platforms run strictly one after another.

pub mod actions;
pub mod host;
pub mod types;

use std::collections::VecDeque;
use std::path::Path;

use tracing::{debug, error, info, warn};

use crate::plan::{Phase, Plan, PlatformPlan, Step, ToolInstall};

pub use host::HostRunner;
pub use types::{BuildResult, ExecuteError, ExecuteOptions, RunFailure, StepOutput};

/// Performs the side effects of individual steps.
///
/// [`Step::CacheBranch`] never reaches a runner; the executor resolves it
/// with [`Runner::exists`] and runs the selected branch.
#[allow(async_fn_in_trait)]
pub trait Runner {
  async fn run(&mut self, step: &Step) -> Result<StepOutput, ExecuteError>;

  async fn install_tool(&mut self, program: &str, install: &ToolInstall) -> Result<(), ExecuteError>;

  fn exists(&self, path: &Path) -> bool {
    path.exists()
  }
}

/// A step failure inside a phase.
struct StepFailure {
  step: String,
  source: ExecuteError,
}

/// Execute every platform of `plan` in order.
///
/// Stops at the first failing platform; later platforms are not attempted.
pub async fn run_plan<R: Runner>(
  plan: &Plan,
  runner: &mut R,
  options: ExecuteOptions,
) -> Result<Vec<BuildResult>, Box<RunFailure>> {
  info!(project = %plan.project, platforms = plan.platforms.len(), "executing plan");
  let mut completed = Vec::with_capacity(plan.platforms.len());

  for platform in &plan.platforms {
    match run_platform(platform, runner, options).await {
      Ok(result) => {
        info!(
          platform = %platform.platform,
          artifacts = result.artifacts.len(),
          files = result.delta.len(),
          "platform complete"
        );
        completed.push(result);
      }
      Err((phase, failure)) => {
        error!(
          platform = %platform.platform,
          phase = %phase,
          step = %failure.step,
          error = %failure.source,
          "platform failed"
        );
        return Err(Box::new(RunFailure {
          platform: platform.platform.clone(),
          phase,
          step: failure.step,
          root: platform.root.clone(),
          source: failure.source,
          completed,
        }));
      }
    }
  }

  Ok(completed)
}

async fn run_platform<R: Runner>(
  platform: &PlatformPlan,
  runner: &mut R,
  options: ExecuteOptions,
) -> Result<BuildResult, (Phase, StepFailure)> {
  info!(platform = %platform.platform, root = ?platform.root, "starting platform");

  run_phase(runner, &platform.provision, options)
    .await
    .map_err(|f| (Phase::Provision, f))?;
  let built = run_phase(runner, &platform.build, options)
    .await
    .map_err(|f| (Phase::Build, f))?;
  let packaged = run_phase(runner, &platform.package, options).await;

  // Teardown runs whether or not packaging succeeded.
  let teardown = run_phase(runner, &platform.teardown, options).await;

  let packaged = packaged.map_err(|f| (Phase::Package, f))?;
  teardown.map_err(|f| (Phase::Teardown, f))?;

  Ok(BuildResult {
    platform: platform.platform.clone(),
    artifacts: packaged.artifacts,
    delta: built.delta.unwrap_or_default(),
  })
}

async fn run_phase<R: Runner>(
  runner: &mut R,
  steps: &[Step],
  options: ExecuteOptions,
) -> Result<StepOutput, StepFailure> {
  let mut queue: VecDeque<Step> = steps.iter().cloned().collect();
  let mut output = StepOutput::default();

  while let Some(step) = queue.pop_front() {
    if let Step::CacheBranch { archive, hit, miss } = step {
      let branch = if runner.exists(&archive) {
        info!(archive = ?archive, "cache hit");
        hit
      } else {
        info!(archive = ?archive, "cache miss, bootstrapping");
        miss
      };
      for step in branch.into_iter().rev() {
        queue.push_front(step);
      }
      continue;
    }

    debug!(step = %step, "running step");
    let result = match run_step(runner, &step, options).await {
      Ok(result) => result,
      Err(source) => {
        return Err(StepFailure {
          step: step.to_string(),
          source,
        });
      }
    };

    output.artifacts.extend(result.artifacts);
    if result.delta.is_some() {
      output.delta = result.delta;
    }
  }

  Ok(output)
}

async fn run_step<R: Runner>(runner: &mut R, step: &Step, options: ExecuteOptions) -> Result<StepOutput, ExecuteError> {
  match runner.run(step).await {
    Err(ExecuteError::ToolMissing { program }) if options.install_dependencies => {
      let Step::RequireTool { install, .. } = step else {
        return Err(ExecuteError::ToolMissing { program });
      };
      warn!(program = %program, via = %install, "installing missing tool");
      runner.install_tool(&program, install).await?;
      runner.run(step).await
    }
    result => result,
  }
}
