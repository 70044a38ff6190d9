//! Deterministic artifact naming.
//!
//! All binaries and archives land under one output directory, created
//! idempotently. Names are derived from the base name, the target
//! descriptor, and an optional version string; per target the scheme is
//! injective, so concurrent tasks never write to the same path.

use std::path::{Path, PathBuf};

use crate::target::{Os, Target};

/// Derives output paths under a fixed output directory.
#[derive(Debug, Clone)]
pub struct Namer {
  dir: PathBuf,
}

impl Namer {
  /// Default output directory name, relative to the project.
  pub const DEFAULT_DIR: &'static str = "output";

  /// Create a namer rooted at `dir`, creating the directory if absent.
  pub fn new(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
    let dir = dir.into();
    std::fs::create_dir_all(&dir)?;
    Ok(Self { dir })
  }

  pub fn dir(&self) -> &Path {
    &self.dir
  }

  /// Output binary path: `<base>[_<os>_<arch>][_<version>]` plus `.exe` on
  /// windows. The os/arch infix is omitted when `simple` is set.
  pub fn binary_name(&self, base: &str, target: Target, version: Option<&str>, simple: bool) -> PathBuf {
    let mut name = String::from(base);
    if !simple {
      name.push('_');
      name.push_str(target.os.as_str());
      name.push('_');
      name.push_str(target.arch.as_str());
    }
    if let Some(version) = version {
      name.push('_');
      name.push_str(version);
    }
    if target.os == Os::Windows {
      name.push_str(".exe");
    }
    self.dir.join(name)
  }

  /// Archive path: `<base>_<os>_<arch>[_<version>].zip`.
  pub fn archive_name(&self, base: &str, target: Target, version: Option<&str>) -> PathBuf {
    let mut name = format!("{base}_{}_{}", target.os, target.arch);
    if let Some(version) = version {
      name.push('_');
      name.push_str(version);
    }
    name.push_str(".zip");
    self.dir.join(name)
  }
}
