//! Implementation of the `goforge info` command.
//!
//! Reports the detected host target and, when the project directory is under
//! version control, the git metadata that would be baked into a build.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use goforge_lib::{GitProbe, Target, VersionMetadata};

use crate::output;

#[derive(Args, Debug)]
pub struct InfoArgs {
  /// Project directory to inspect
  #[arg(short = 'C', long, default_value = ".")]
  pub dir: PathBuf,

  /// Emit the report as JSON
  #[arg(long)]
  pub json: bool,
}

/// Execute the info command.
pub fn cmd_info(args: InfoArgs) -> Result<()> {
  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  rt.block_on(run(args))
}

async fn run(args: InfoArgs) -> Result<()> {
  let host = Target::host();
  let metadata = GitProbe::default().capture(&args.dir).await;

  if args.json {
    return output::print_json(&report_json(host, &metadata));
  }

  println!("goforge v{}", env!("CARGO_PKG_VERSION"));
  println!();

  match host {
    Some(target) => {
      output::print_stat("platform", target.os.as_str());
      output::print_stat("arch", target.arch.as_str());
    }
    None => output::print_warning("could not detect the host platform"),
  }

  match &metadata {
    Ok(m) => {
      output::print_stat("version", &m.describe);
      output::print_stat("commit", &m.commit);
      output::print_stat("commit time", &m.commit_time);
      output::print_stat("tree state", m.tree_state.as_str());
    }
    Err(e) => output::print_info(&format!("git metadata unavailable: {e}")),
  }

  Ok(())
}

fn report_json(
  host: Option<Target>,
  metadata: &std::result::Result<VersionMetadata, goforge_lib::MetadataError>,
) -> serde_json::Value {
  serde_json::json!({
    "version": env!("CARGO_PKG_VERSION"),
    "host": host.map(|t| serde_json::json!({
      "platform": t.os.as_str(),
      "arch": t.arch.as_str(),
    })),
    "git": metadata.as_ref().ok().map(|m| serde_json::json!({
      "describe": m.describe,
      "commit": m.commit,
      "commit_time": m.commit_time,
      "tree_state": m.tree_state.as_str(),
    })),
  })
}
