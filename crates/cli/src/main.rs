mod cmd;
mod output;

use std::path::PathBuf;

use clap::error::ErrorKind;
use clap::{Args, CommandFactory, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use chpack_lib::consts::DESCRIPTOR_FILENAME;
use chpack_lib::dispatch::{ExecutionMode, RunOptions};

use crate::output::OutputFormat;

/// chpack - build native Linux packages inside per-platform chroots
#[derive(Parser)]
#[command(name = "chpack")]
#[command(author, version, about, long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(flatten)]
  build: BuildArgs,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Args, Debug, Clone)]
struct BuildArgs {
  /// Build only this platform (repeatable, e.g. --platform ubuntu14)
  #[arg(long = "platform", value_name = "ID")]
  platforms: Vec<String>,

  /// Build on a remote host over ssh ([user@]host)
  #[arg(long, value_name = "HOST", conflicts_with = "local")]
  server: Option<String>,

  /// Build on this host
  #[arg(long)]
  local: bool,

  /// Install missing host tooling instead of failing
  #[arg(long)]
  install_dependencies: bool,

  /// Trace build scripts and log at debug level
  #[arg(long)]
  debug: bool,

  /// Generate and print the plan without executing it
  #[arg(long)]
  preview: bool,

  /// Build even if the working tree has uncommitted changes
  #[arg(long)]
  ignore_uncommitted: bool,

  /// Path to the descriptor file
  #[arg(short, long, default_value = DESCRIPTOR_FILENAME)]
  file: PathBuf,

  /// Directory receiving the built packages (default: <descriptor dir>/pkg)
  #[arg(short, long, value_name = "DIR")]
  output: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
  /// List supported platforms
  Platforms {
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
  },

  /// Execute a generated plan file on this host
  #[command(hide = true)]
  ExecPlan {
    /// Path to the plan file
    plan: PathBuf,

    /// Install missing host tooling instead of failing
    #[arg(long)]
    install_dependencies: bool,
  },
}

fn main() {
  let cli = Cli::parse();

  let debug = cli.verbose || cli.build.debug;
  let default_level = if debug { "debug" } else { "info" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  let result = match cli.command {
    Some(Commands::Platforms { format }) => cmd::cmd_platforms(format),
    Some(Commands::ExecPlan {
      plan,
      install_dependencies,
    }) => cmd::cmd_exec_plan(&plan, install_dependencies),
    None => {
      let args = cli.build;
      if let Err(e) = ExecutionMode::from_flags(args.local, args.server.as_deref()) {
        Cli::command().error(ErrorKind::MissingRequiredArgument, e).exit();
      }
      cmd::cmd_build(&RunOptions {
        descriptor: args.file,
        platforms: args.platforms,
        local: args.local,
        server: args.server,
        install_dependencies: args.install_dependencies,
        debug: args.debug,
        preview: args.preview,
        ignore_uncommitted: args.ignore_uncommitted,
        output: args.output,
      })
    }
  };

  if let Err(e) = result {
    output::print_error(&format!("{:#}", e));
    std::process::exit(1);
  }
}
