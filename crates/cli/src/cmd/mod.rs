mod batch;
mod build;
mod info;

pub use batch::{BatchArgs, cmd_batch};
pub use build::{BuildArgs, cmd_build};
pub use info::{InfoArgs, cmd_info};

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use goforge_lib::envmap;
use goforge_lib::{PreflightOptions, run_preflight};

use crate::output;

/// Flags shared by the build and batch subcommands.
#[derive(Args, Debug)]
pub struct SharedArgs {
  /// Project directory to build in
  #[arg(short = 'C', long, default_value = ".")]
  pub dir: PathBuf,

  /// Entry file passed to the compiler
  #[arg(short, long, default_value = "./main.go")]
  pub entry: PathBuf,

  /// Compiler executable to invoke
  #[arg(long, default_value = "go")]
  pub compiler: String,

  /// Base name for output artifacts
  #[arg(short, long, default_value = "myapp")]
  pub name: String,

  /// Directory artifacts are written to
  #[arg(long, default_value = "output")]
  pub output_dir: PathBuf,

  /// Application name baked into the binary (defaults to the artifact name)
  #[arg(long)]
  pub app_name: Option<String>,

  /// Go package holding the version symbols
  #[arg(long, default_value = "main")]
  pub ldflags_package: String,

  /// Version string appended to artifact names
  #[arg(long)]
  pub release_version: Option<String>,

  /// Clone dependencies into vendor/ during pre-flight
  #[arg(long)]
  pub vendor: bool,

  /// Compile with -mod=vendor (requires an existing vendor directory)
  #[arg(long)]
  pub vendor_build: bool,

  /// Zip each binary and delete the raw output
  #[arg(long)]
  pub zip: bool,

  /// Environment override for the compile subprocess (repeatable)
  #[arg(long = "env", value_name = "KEY=VALUE")]
  pub env: Vec<String>,

  /// Skip git metadata injection
  #[arg(long)]
  pub no_git: bool,

  /// Drop the os/arch infix from binary names
  #[arg(long)]
  pub simple_name: bool,

  /// Skip the pre-flight checks
  #[arg(long)]
  pub skip_checks: bool,
}

impl SharedArgs {
  /// Application name for the linker flags; falls back to the artifact name.
  pub fn app_name(&self) -> &str {
    self.app_name.as_deref().unwrap_or(&self.name)
  }
}

/// Parse repeated `--env KEY=VALUE` flags.
pub(crate) fn parse_env_overrides(raw: &[String]) -> Result<Vec<(String, String)>> {
  raw
    .iter()
    .map(|s| envmap::parse_override(s).map_err(anyhow::Error::from))
    .collect()
}

/// Run the pre-flight check sequence unless it was explicitly skipped.
pub(crate) async fn ensure_preflight(shared: &SharedArgs) -> Result<()> {
  if shared.skip_checks {
    output::print_info("pre-flight checks skipped");
    return Ok(());
  }

  let options = PreflightOptions {
    compiler: shared.compiler.clone(),
    entry: shared.entry.clone(),
    vendor: shared.vendor,
  };
  run_preflight(&options, &shared.dir)
    .await
    .context("pre-flight checks failed")?;

  output::print_success("pre-flight checks passed");
  Ok(())
}
