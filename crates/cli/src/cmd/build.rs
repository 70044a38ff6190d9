//! Implementation of the `goforge build` command.
//!
//! Runs the pre-flight checks, captures git metadata for the linker flags,
//! and compiles the project once for a single target, with optional zip
//! archiving and installation into `$GOPATH/bin`.

use std::time::Instant;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use goforge_lib::pipeline::InstallOptions;
use goforge_lib::{Arch, BuildConfig, GitProbe, Namer, Os, Target, build, envmap, vcs};

use crate::cmd::{SharedArgs, ensure_preflight, parse_env_overrides};
use crate::output;

#[derive(Args, Debug)]
pub struct BuildArgs {
  #[command(flatten)]
  pub shared: SharedArgs,

  /// Target platform (defaults to the host)
  #[arg(long)]
  pub os: Option<Os>,

  /// Target architecture (defaults to the host)
  #[arg(long)]
  pub arch: Option<Arch>,

  /// Explicit output path, overriding the naming scheme
  #[arg(short, long)]
  pub output: Option<std::path::PathBuf>,

  /// Install the artifact into $GOPATH/bin
  #[arg(long)]
  pub install: bool,

  /// Overwrite an existing installed binary
  #[arg(short, long)]
  pub force: bool,
}

/// Execute the build command.
pub fn cmd_build(args: BuildArgs) -> Result<()> {
  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  rt.block_on(run(args))
}

async fn run(args: BuildArgs) -> Result<()> {
  let shared = &args.shared;
  let overrides = parse_env_overrides(&shared.env)?;
  let target = resolve_target(args.os, args.arch)?;

  if !target.is_supported() {
    output::print_error(&format!("{target} is not a supported combination"));
    std::process::exit(1);
  }

  ensure_preflight(shared).await?;

  let ldflags = if shared.no_git {
    vcs::STRIP_LDFLAGS.to_string()
  } else {
    let probe = GitProbe::default();
    let metadata = vcs::cached(&probe, &shared.dir)
      .await
      .context("Failed to capture git metadata (pass --no-git to skip injection)")?;
    vcs::render_ldflags(&shared.ldflags_package, shared.app_name(), metadata, &vcs::build_timestamp())
  };

  let namer = Namer::new(&shared.output_dir)
    .with_context(|| format!("Failed to create output directory {}", shared.output_dir.display()))?;
  let version = shared.release_version.as_deref();

  let config = BuildConfig {
    compiler: shared.compiler.clone(),
    target,
    dir: shared.dir.clone(),
    output: match &args.output {
      Some(path) => path.clone(),
      None => namer.binary_name(&shared.name, target, version, shared.simple_name),
    },
    entry: shared.entry.clone(),
    ldflags,
    vendor_build: shared.vendor_build,
    env: envmap::resolve_env(target, &overrides),
    archive: shared.zip.then(|| namer.archive_name(&shared.name, target, version)),
    install: args.install.then_some(InstallOptions { force: args.force }),
  };

  info!(target = %target, output = %config.output.display(), "single build");
  let started = Instant::now();

  match build(&config).await {
    Ok(outcome) => {
      if let Some(e) = &outcome.archive_error {
        output::print_warning(&format!("archive failed, binary kept: {e}"));
      }
      output::print_success(&format!(
        "built {} in {}",
        outcome.artifact.display(),
        output::format_duration(started.elapsed())
      ));
      if let Some(dest) = &outcome.installed {
        output::print_info(&format!("installed to {}", dest.display()));
      }
      Ok(())
    }
    Err(e) => {
      output::print_error(&format!("build failed: {e}"));
      std::process::exit(1);
    }
  }
}

/// Fill missing target halves from the host.
fn resolve_target(os: Option<Os>, arch: Option<Arch>) -> Result<Target> {
  let host = Target::host();
  let os = os
    .or(host.map(|t| t.os))
    .context("Could not detect the host platform; pass --os")?;
  let arch = arch
    .or(host.map(|t| t.arch))
    .context("Could not detect the host architecture; pass --arch")?;
  Ok(Target::new(os, arch))
}
