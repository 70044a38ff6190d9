//! Zip archiving of built binaries.
//!
//! Each archive holds a single deflate-compressed entry named after the
//! binary's file name.

use std::fs::File;
use std::path::Path;

use thiserror::Error;
use tracing::info;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

#[derive(Debug, Error)]
pub enum ArchiveError {
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("zip error: {0}")]
  Zip(#[from] zip::result::ZipError),

  #[error("binary path {0} has no file name")]
  BadBinaryPath(std::path::PathBuf),
}

/// Write `binary` into a fresh zip archive at `dest`.
///
/// The raw binary is left in place; the caller decides whether to delete it
/// after a successful archive.
pub fn write_zip(binary: &Path, dest: &Path) -> Result<(), ArchiveError> {
  let entry_name = binary
    .file_name()
    .and_then(|n| n.to_str())
    .ok_or_else(|| ArchiveError::BadBinaryPath(binary.to_path_buf()))?;

  let file = File::create(dest)?;
  let mut writer = ZipWriter::new(file);
  let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

  writer.start_file(entry_name, options)?;
  let mut source = File::open(binary)?;
  std::io::copy(&mut source, &mut writer)?;
  writer.finish()?;

  info!(binary = %binary.display(), archive = %dest.display(), "archived binary");
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Read;
  use tempfile::TempDir;

  #[test]
  fn round_trips_a_single_entry() {
    let temp = TempDir::new().unwrap();
    let binary = temp.path().join("myapp_linux_amd64");
    std::fs::write(&binary, b"fake elf bytes").unwrap();
    let dest = temp.path().join("myapp_linux_amd64.zip");

    write_zip(&binary, &dest).unwrap();
    assert!(binary.exists(), "archiving must not delete the binary itself");

    let mut archive = zip::ZipArchive::new(File::open(&dest).unwrap()).unwrap();
    assert_eq!(archive.len(), 1);

    let mut entry = archive.by_index(0).unwrap();
    assert_eq!(entry.name(), "myapp_linux_amd64");
    assert_eq!(entry.compression(), CompressionMethod::Deflated);

    let mut contents = Vec::new();
    entry.read_to_end(&mut contents).unwrap();
    assert_eq!(contents, b"fake elf bytes");
  }

  #[test]
  fn missing_binary_is_an_error() {
    let temp = TempDir::new().unwrap();
    let result = write_zip(&temp.path().join("nope"), &temp.path().join("nope.zip"));
    assert!(matches!(result, Err(ArchiveError::Io(_))));
  }

  #[test]
  fn unwritable_destination_is_an_error() {
    let temp = TempDir::new().unwrap();
    let binary = temp.path().join("app");
    std::fs::write(&binary, b"x").unwrap();
    let result = write_zip(&binary, &temp.path().join("no-such-dir").join("app.zip"));
    assert!(matches!(result, Err(ArchiveError::Io(_))));
  }
}
