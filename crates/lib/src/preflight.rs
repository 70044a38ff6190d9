//! Pre-flight checks run once per invocation, before any compilation.
//!
//! Sequential and fail-fast: toolchain availability, manifest presence,
//! entry-file existence, optional dependency vendoring, dependency tidy,
//! static analysis, and a format pass. The first failure aborts the whole
//! run; captured stderr is surfaced verbatim.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

use crate::process;

/// Errors from the pre-flight check sequence. All are fatal to the run.
#[derive(Debug, Error)]
pub enum PreflightError {
  #[error("`{compiler}` toolchain not found; install it or pass an explicit compiler path")]
  ToolchainUnavailable { compiler: String },

  #[error("go.mod not found in {0}")]
  ManifestMissing(PathBuf),

  #[error("entry file {0} not found")]
  EntryFileMissing(PathBuf),

  #[error("go mod vendor failed: {stderr}")]
  VendorFailed { stderr: String },

  #[error("go mod tidy failed: {stderr}")]
  DependencyResolutionFailed { stderr: String },

  #[error("go vet failed: {stderr}")]
  StaticAnalysisFailed { stderr: String },

  #[error("go fmt failed: {stderr}")]
  FormatFailed { stderr: String },

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

/// What to check and which tools to use.
#[derive(Debug, Clone)]
pub struct PreflightOptions {
  /// Compiler to probe and drive (`go` or an absolute path).
  pub compiler: String,

  /// Entry file the compile step will be pointed at.
  pub entry: PathBuf,

  /// Clone dependencies into `vendor/` before tidying.
  pub vendor: bool,
}

impl Default for PreflightOptions {
  fn default() -> Self {
    Self {
      compiler: "go".to_string(),
      entry: PathBuf::from("./main.go"),
      vendor: false,
    }
  }
}

/// Run the full check sequence against the project at `dir`.
pub async fn run_preflight(options: &PreflightOptions, dir: &Path) -> Result<(), PreflightError> {
  check_toolchain(&options.compiler, dir).await?;

  if !dir.join("go.mod").is_file() {
    return Err(PreflightError::ManifestMissing(dir.to_path_buf()));
  }
  info!("go.mod present");

  let entry = if options.entry.is_absolute() {
    options.entry.clone()
  } else {
    dir.join(&options.entry)
  };
  if !entry.is_file() {
    return Err(PreflightError::EntryFileMissing(options.entry.clone()));
  }
  info!(entry = %options.entry.display(), "entry file present");

  if options.vendor {
    let output = process::run_capture(&options.compiler, &["mod", "vendor"], Some(dir), None).await?;
    if !output.status.success() {
      return Err(PreflightError::VendorFailed {
        stderr: process::stderr_text(&output),
      });
    }
    info!("dependencies vendored");
  }

  let tidy_args: &[&str] = if options.vendor { &["mod", "tidy", "-v"] } else { &["mod", "tidy"] };
  let output = process::run_capture(&options.compiler, tidy_args, Some(dir), None).await?;
  if !output.status.success() {
    return Err(PreflightError::DependencyResolutionFailed {
      stderr: process::stderr_text(&output),
    });
  }
  info!("go mod tidy ok");

  let output = process::run_capture(&options.compiler, &["vet", "./..."], Some(dir), None).await?;
  if !output.status.success() {
    return Err(PreflightError::StaticAnalysisFailed {
      stderr: process::stderr_text(&output),
    });
  }
  info!("go vet ok");

  let output = process::run_capture(&options.compiler, &["fmt", "./..."], Some(dir), None).await?;
  if !output.status.success() {
    return Err(PreflightError::FormatFailed {
      stderr: process::stderr_text(&output),
    });
  }
  info!("go fmt ok");

  Ok(())
}

async fn check_toolchain(compiler: &str, dir: &Path) -> Result<(), PreflightError> {
  let available = match process::run_capture(compiler, &["version"], Some(dir), None).await {
    Ok(output) => output.status.success(),
    Err(_) => false,
  };

  if !available {
    return Err(PreflightError::ToolchainUnavailable {
      compiler: compiler.to_string(),
    });
  }

  info!(compiler = %compiler, "toolchain available");
  Ok(())
}
