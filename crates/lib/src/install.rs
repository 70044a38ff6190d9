//! Installing artifacts into the toolchain's global binary directory.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::pipeline::BuildError;

/// Resolve `$GOPATH/bin`. GOPATH being unset is a fatal, reported error.
pub fn resolve_install_dir() -> Result<PathBuf, BuildError> {
  let gopath = std::env::var_os("GOPATH").ok_or(BuildError::InstallPathUnset)?;
  Ok(Path::new(&gopath).join("bin"))
}

/// Move `artifact` into `bin_dir`, keeping its file name.
///
/// Refuses to overwrite an existing file unless `force` is set; with force,
/// the pre-existing file is removed first. Falls back to copy-and-remove
/// when a rename crosses filesystems.
pub fn install_binary(artifact: &Path, bin_dir: &Path, force: bool) -> Result<PathBuf, BuildError> {
  std::fs::create_dir_all(bin_dir)?;

  let name = artifact
    .file_name()
    .ok_or_else(|| BuildError::Io(std::io::Error::other(format!("{} has no file name", artifact.display()))))?;
  let dest = bin_dir.join(name);

  if dest.exists() {
    if !force {
      return Err(BuildError::InstallTargetExists(dest));
    }
    std::fs::remove_file(&dest)?;
  }

  if std::fs::rename(artifact, &dest).is_err() {
    std::fs::copy(artifact, &dest)?;
    std::fs::remove_file(artifact)?;
  }

  info!(dest = %dest.display(), "installed artifact");
  Ok(dest)
}
