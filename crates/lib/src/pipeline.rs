//! The single-build pipeline: one compile invocation with fully resolved
//! flags and environment, then optional archiving and installation.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::PathBuf;

use thiserror::Error;
use tracing::{info, warn};

use crate::archive::{self, ArchiveError};
use crate::install;
use crate::process;
use crate::target::Target;

/// Errors that fail a build task.
#[derive(Debug, Error)]
pub enum BuildError {
  #[error("vendor directory not found; run the vendor step first")]
  VendorDirectoryMissing,

  #[error("compile failed for {target}: {stderr}")]
  CompileFailed { target: Target, stderr: String },

  #[error("GOPATH is not set; cannot resolve the install directory")]
  InstallPathUnset,

  #[error("install target {0} already exists (use force to overwrite)")]
  InstallTargetExists(PathBuf),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

/// Installation request carried by a build config.
#[derive(Debug, Clone, Copy, Default)]
pub struct InstallOptions {
  pub force: bool,
}

/// Everything one compile invocation needs. Constructed per task, never
/// mutated afterwards, owned exclusively by the invocation that built it.
#[derive(Debug, Clone)]
pub struct BuildConfig {
  /// Compiler to invoke (`go` or an absolute path).
  pub compiler: String,

  /// The pair this build is for.
  pub target: Target,

  /// Project directory the compiler runs in.
  pub dir: PathBuf,

  /// Output binary path.
  pub output: PathBuf,

  /// Entry file passed to the compiler.
  pub entry: PathBuf,

  /// Fully rendered linker flags.
  pub ldflags: String,

  /// Compile with `-mod=vendor`; requires an existing vendor directory.
  pub vendor_build: bool,

  /// Complete environment for the compile subprocess.
  pub env: BTreeMap<String, String>,

  /// Archive destination; when set the raw binary is deleted after a
  /// successful archive.
  pub archive: Option<PathBuf>,

  /// Install the final artifact into `$GOPATH/bin`.
  pub install: Option<InstallOptions>,
}

/// What a successful build produced.
#[derive(Debug)]
pub struct BuildOutcome {
  /// The surviving artifact: the archive if archiving succeeded, otherwise
  /// the raw binary.
  pub artifact: PathBuf,

  /// Archive failure after a successful compile. Reported, but it does not
  /// revert the compile's success classification.
  pub archive_error: Option<ArchiveError>,

  /// Where the artifact was installed, if requested.
  pub installed: Option<PathBuf>,
}

/// Run one build: vendor gate, compile, optional archive, optional install.
pub async fn build(config: &BuildConfig) -> Result<BuildOutcome, BuildError> {
  if config.vendor_build && !config.dir.join("vendor").is_dir() {
    return Err(BuildError::VendorDirectoryMissing);
  }

  compile(config).await?;
  info!(target = %config.target, output = %config.output.display(), "compile succeeded");

  let mut artifact = config.output.clone();
  let mut archive_error = None;

  if let Some(dest) = &config.archive {
    match archive::write_zip(&config.output, dest) {
      Ok(()) => {
        std::fs::remove_file(&config.output)?;
        artifact = dest.clone();
      }
      Err(e) => {
        warn!(target = %config.target, error = %e, "archive failed after successful compile");
        archive_error = Some(e);
      }
    }
  }

  let installed = match config.install {
    Some(options) => {
      let bin_dir = install::resolve_install_dir()?;
      Some(install::install_binary(&artifact, &bin_dir, options.force)?)
    }
    None => None,
  };

  Ok(BuildOutcome {
    artifact,
    archive_error,
    installed,
  })
}

async fn compile(config: &BuildConfig) -> Result<(), BuildError> {
  let mut args: Vec<OsString> = vec![
    "build".into(),
    "-o".into(),
    config.output.as_os_str().to_owned(),
    "-ldflags".into(),
    config.ldflags.clone().into(),
  ];
  if config.vendor_build {
    args.push("-mod=vendor".into());
  }
  args.push(config.entry.as_os_str().to_owned());

  let output = process::run_capture(&config.compiler, &args, Some(&config.dir), Some(&config.env)).await?;

  if !output.status.success() {
    return Err(BuildError::CompileFailed {
      target: config.target,
      stderr: process::stderr_text(&output),
    });
  }

  Ok(())
}
