//! Build target descriptors.
//!
//! A [`Target`] names the (platform, architecture) pair a binary is compiled
//! for. It is the single source of truth threaded through naming, environment
//! resolution, and the batch orchestrator; output filenames are rendered from
//! it, never parsed back into one.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Errors from parsing platform or architecture tokens.
#[derive(Debug, Error)]
pub enum TargetParseError {
  #[error("unknown operating system `{0}` (expected windows, linux, or darwin)")]
  UnknownOs(String),

  #[error("unknown architecture `{0}` (expected amd64, arm64, 386, or arm)")]
  UnknownArch(String),
}

/// Operating systems the Go toolchain is asked to compile for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Os {
  Windows,
  Linux,
  Darwin,
}

impl Os {
  /// All supported operating systems, in enumeration order.
  pub const ALL: [Os; 3] = [Os::Windows, Os::Linux, Os::Darwin];

  /// Detect the current operating system at runtime.
  pub fn current() -> Option<Self> {
    match std::env::consts::OS {
      "windows" => Some(Self::Windows),
      "linux" => Some(Self::Linux),
      "macos" => Some(Self::Darwin),
      _ => None,
    }
  }

  /// Returns the GOOS token for this operating system.
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Windows => "windows",
      Self::Linux => "linux",
      Self::Darwin => "darwin",
    }
  }
}

impl fmt::Display for Os {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

impl FromStr for Os {
  type Err = TargetParseError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "windows" => Ok(Self::Windows),
      "linux" => Ok(Self::Linux),
      "darwin" | "macos" => Ok(Self::Darwin),
      other => Err(TargetParseError::UnknownOs(other.to_string())),
    }
  }
}

/// CPU architectures the Go toolchain is asked to compile for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Arch {
  Amd64,
  Arm64,
  X86,
  Arm,
}

impl Arch {
  /// All supported architectures, in enumeration order.
  pub const ALL: [Arch; 4] = [Arch::Amd64, Arch::Arm64, Arch::X86, Arch::Arm];

  /// Detect the current CPU architecture at runtime.
  pub fn current() -> Option<Self> {
    Self::from_machine(std::env::consts::ARCH)
  }

  /// Normalize a host machine string to the canonical architecture.
  ///
  /// Accepts both Rust's `ARCH` constants and the raw machine names uname
  /// reports on common systems.
  pub fn from_machine(machine: &str) -> Option<Self> {
    match machine {
      "x86_64" | "amd64" => Some(Self::Amd64),
      "aarch64" | "arm64" => Some(Self::Arm64),
      "x86" | "i386" | "i686" | "386" => Some(Self::X86),
      "arm" | "armv6l" | "armv7l" => Some(Self::Arm),
      _ => None,
    }
  }

  /// Returns the GOARCH token for this architecture.
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Amd64 => "amd64",
      Self::Arm64 => "arm64",
      Self::X86 => "386",
      Self::Arm => "arm",
    }
  }
}

impl fmt::Display for Arch {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

impl FromStr for Arch {
  type Err = TargetParseError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Self::from_machine(s).ok_or_else(|| TargetParseError::UnknownArch(s.to_string()))
  }
}

/// A (platform, architecture) pair to compile for. Immutable once created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Target {
  pub os: Os,
  pub arch: Arch,
}

impl Target {
  pub fn new(os: Os, arch: Arch) -> Self {
    Self { os, arch }
  }

  /// The target describing the host machine, if it is a supported pair.
  pub fn host() -> Option<Self> {
    Some(Self::new(Os::current()?, Arch::current()?))
  }

  /// Whether the Go toolchain can compile for this pair.
  ///
  /// darwin never supported 32-bit targets worth shipping: 386 and arm are
  /// excluded from the matrix.
  pub fn is_supported(&self) -> bool {
    !(self.os == Os::Darwin && matches!(self.arch, Arch::X86 | Arch::Arm))
  }

  /// The full cross product of operating systems and architectures, in
  /// platform-then-architecture enumeration order.
  ///
  /// Unsupported pairs are included so the orchestrator can classify them as
  /// skipped rather than silently dropping them from the report.
  pub fn matrix() -> Vec<Target> {
    let mut targets = Vec::with_capacity(Os::ALL.len() * Arch::ALL.len());
    for os in Os::ALL {
      for arch in Arch::ALL {
        targets.push(Target::new(os, arch));
      }
    }
    targets
  }
}

impl fmt::Display for Target {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}/{}", self.os, self.arch)
  }
}
