//! Implementation of the `goforge batch` command.
//!
//! Runs the pre-flight checks once, then fans out one build task per
//! supported target over a bounded worker pool and prints the aggregate
//! report, as text or JSON. Exits nonzero when any task failed.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;

use goforge_lib::batch::default_jobs;
use goforge_lib::{BatchOptions, BatchReport, GitProbe, TaskOutcome, run_batch};

use crate::cmd::{SharedArgs, ensure_preflight, parse_env_overrides};
use crate::output;

#[derive(Args, Debug)]
pub struct BatchArgs {
  #[command(flatten)]
  pub shared: SharedArgs,

  /// Worker-pool size (defaults to host cores minus one)
  #[arg(short, long)]
  pub jobs: Option<usize>,

  /// Per-task timeout, e.g. "90s" or "30m"
  #[arg(long, default_value = "30m", value_parser = humantime::parse_duration)]
  pub task_timeout: Duration,

  /// Only build targets whose platform matches the host
  #[arg(long)]
  pub current_only: bool,

  /// Emit the final report as JSON
  #[arg(long)]
  pub json: bool,
}

/// Execute the batch command.
pub fn cmd_batch(args: BatchArgs) -> Result<()> {
  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  rt.block_on(run(args))
}

async fn run(args: BatchArgs) -> Result<()> {
  let shared = &args.shared;
  let overrides = parse_env_overrides(&shared.env)?;

  ensure_preflight(shared).await?;

  let options = BatchOptions {
    compiler: shared.compiler.clone(),
    dir: shared.dir.clone(),
    entry: shared.entry.clone(),
    base_name: shared.name.clone(),
    output_dir: shared.output_dir.clone(),
    app_name: shared.app_name().to_string(),
    ldflags_package: shared.ldflags_package.clone(),
    version: shared.release_version.clone(),
    simple_name: shared.simple_name,
    inject_git: !shared.no_git,
    probe: GitProbe::default(),
    vendor_build: shared.vendor_build,
    archive: shared.zip,
    env_overrides: overrides,
    jobs: args.jobs.unwrap_or_else(default_jobs),
    task_timeout: args.task_timeout,
    current_platform_only: args.current_only,
  };

  let report = run_batch(&options).await.context("Batch aborted before fan-out")?;

  if args.json {
    output::print_json(&report_json(&report))?;
  } else {
    print_report(&report);
  }

  if !report.is_success() {
    std::process::exit(1);
  }
  Ok(())
}

fn print_report(report: &BatchReport) {
  println!();
  for result in &report.results {
    match &result.outcome {
      TaskOutcome::Success => output::print_success(&format!(
        "{} ({})",
        result.target,
        output::format_duration(result.elapsed)
      )),
      TaskOutcome::Failure(reason) => output::print_error(&format!("{}: {}", result.target, reason)),
      TaskOutcome::Skipped(reason) => output::print_info(&format!("{} skipped ({})", result.target, reason)),
    }
  }

  println!();
  output::print_stat("succeeded", &report.succeeded.to_string());
  output::print_stat("failed", &report.failed.to_string());
  output::print_stat("skipped", &report.skipped.to_string());
  output::print_stat("elapsed", &output::format_duration(report.elapsed));
}

fn report_json(report: &BatchReport) -> serde_json::Value {
  serde_json::json!({
    "total": report.total(),
    "succeeded": report.succeeded,
    "failed": report.failed,
    "skipped": report.skipped,
    "elapsed_ms": report.elapsed.as_millis() as u64,
    "results": report
      .results
      .iter()
      .map(|r| {
        serde_json::json!({
          "target": r.target.to_string(),
          "outcome": r.outcome.label(),
          "detail": r.outcome.detail(),
          "elapsed_ms": r.elapsed.as_millis() as u64,
        })
      })
      .collect::<Vec<_>>(),
  })
}
