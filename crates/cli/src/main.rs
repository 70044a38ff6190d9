use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod cmd;
mod output;

/// goforge - build orchestrator for Go projects
#[derive(Parser)]
#[command(name = "goforge")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Compile the project for a single target
  Build(cmd::BuildArgs),

  /// Compile the project for every supported target concurrently
  Batch(cmd::BatchArgs),

  /// Show host platform and repository metadata
  Info(cmd::InfoArgs),
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  let filter = if cli.verbose {
    EnvFilter::new("debug")
  } else {
    EnvFilter::from_default_env()
  };
  tracing_subscriber::fmt().with_env_filter(filter).without_time().init();

  match cli.command {
    Commands::Build(args) => cmd::cmd_build(args),
    Commands::Batch(args) => cmd::cmd_batch(args),
    Commands::Info(args) => cmd::cmd_info(args),
  }
}
