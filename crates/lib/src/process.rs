//! Subprocess helper shared by the pre-flight checker, the metadata probe,
//! and the compile pipeline.

use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::path::Path;
use std::process::Output;

use tokio::process::Command;
use tracing::debug;

/// Run a program and capture its output.
///
/// When `env` is `Some`, the child runs with a cleared environment containing
/// exactly those variables (the resolved map from [`crate::envmap`] already
/// layers the inherited environment in). When `None`, the child inherits the
/// process environment.
///
/// The child is killed if the returned future is dropped, which is what
/// bounds a timed-out build task.
pub async fn run_capture<S: AsRef<OsStr>>(
  program: &str,
  args: &[S],
  cwd: Option<&Path>,
  env: Option<&BTreeMap<String, String>>,
) -> std::io::Result<Output> {
  let mut command = Command::new(program);
  command.args(args).kill_on_drop(true);

  if let Some(dir) = cwd {
    command.current_dir(dir);
  }

  if let Some(env) = env {
    command.env_clear();
    for (key, value) in env {
      command.env(key, value);
    }
  }

  debug!(program = %program, "spawning process");

  let output = command.output().await?;

  if !output.status.success() {
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.is_empty() {
      debug!(program = %program, stderr = %stderr, "process stderr");
    }
  }

  Ok(output)
}

/// Captured stderr as trimmed text, for surfacing verbatim in errors.
pub fn stderr_text(output: &Output) -> String {
  String::from_utf8_lossy(&output.stderr).trim().to_string()
}

/// Captured stdout as trimmed text.
pub fn stdout_text(output: &Output) -> String {
  String::from_utf8_lossy(&output.stdout).trim().to_string()
}
