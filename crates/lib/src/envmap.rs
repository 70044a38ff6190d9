//! Compiler environment resolution.
//!
//! The compile subprocess receives a fully resolved environment map built by
//! layering, in order: the inherited process environment, fixed defaults,
//! cross-toolchain overrides for arm64 targets, the GOOS/GOARCH tokens of the
//! target descriptor, and finally user-supplied `KEY=VALUE` overrides. Later
//! layers win, so user overrides can replace anything including GOOS/GOARCH.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::target::{Arch, Target};

/// Module proxy used when the environment does not already configure one.
pub const DEFAULT_GOPROXY: &str = "https://goproxy.cn,direct";

/// C compiler prefix used when cross-compiling for arm64.
const ARM64_CROSS_CC: &str = "aarch64-linux-gnu-gcc";
const ARM64_CROSS_CXX: &str = "aarch64-linux-gnu-g++";

/// A user override that is not of the `KEY=VALUE` form.
#[derive(Debug, Error)]
#[error("environment override `{0}` is not of the form KEY=VALUE")]
pub struct OverrideError(pub String);

/// Split a `KEY=VALUE` override into its parts.
///
/// The value may itself contain `=`; only the first separator is significant.
/// An empty key is rejected.
pub fn parse_override(s: &str) -> Result<(String, String), OverrideError> {
  match s.split_once('=') {
    Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
    _ => Err(OverrideError(s.to_string())),
  }
}

/// Cross-toolchain overrides for the given target.
///
/// Triggered when the target architecture is arm64 and the host is not
/// already arm64: the C/C++ compilers are substituted with the aarch64 cross
/// prefix and cgo is re-enabled so the substitution takes effect.
fn cross_overrides(target: Target, host_arch: Option<Arch>) -> Vec<(&'static str, &'static str)> {
  if target.arch == Arch::Arm64 && host_arch != Some(Arch::Arm64) {
    vec![
      ("CC", ARM64_CROSS_CC),
      ("CXX", ARM64_CROSS_CXX),
      ("CGO_ENABLED", "1"),
    ]
  } else {
    Vec::new()
  }
}

/// Resolve the full environment map for a compile invocation.
///
/// The returned map is complete: the compile subprocess runs with a cleared
/// environment and exactly these variables.
pub fn resolve_env(target: Target, overrides: &[(String, String)]) -> BTreeMap<String, String> {
  resolve_env_with_host(target, overrides, Arch::current())
}

fn resolve_env_with_host(
  target: Target,
  overrides: &[(String, String)],
  host_arch: Option<Arch>,
) -> BTreeMap<String, String> {
  let mut env: BTreeMap<String, String> = std::env::vars().collect();

  // Fixed defaults
  env.insert("GOPROXY".to_string(), DEFAULT_GOPROXY.to_string());
  env.insert("CGO_ENABLED".to_string(), "0".to_string());

  for (key, value) in cross_overrides(target, host_arch) {
    env.insert(key.to_string(), value.to_string());
  }

  env.insert("GOOS".to_string(), target.os.as_str().to_string());
  env.insert("GOARCH".to_string(), target.arch.as_str().to_string());

  // User overrides win over every earlier layer.
  for (key, value) in overrides {
    env.insert(key.clone(), value.clone());
  }

  env
}
