//! Git metadata capture and linker-flag rendering.
//!
//! The version descriptor baked into release binaries comes from four
//! read-only git queries (describe, short hash, commit time, porcelain
//! status), each bounded by a fixed timeout. The result is memoized
//! process-wide: the batch orchestrator captures it once before fan-out and
//! injects the rendered linker flags into every task's config, so workers
//! never touch git themselves.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::process;

/// Default linker flags when git injection is disabled: strip symbol table
/// and DWARF debug info.
pub const STRIP_LDFLAGS: &str = "-s -w";

/// Errors from capturing git metadata. Reported, never retried.
#[derive(Debug, Error)]
pub enum MetadataError {
  /// The query exited nonzero: not a repository, or git itself is broken.
  #[error("git {query} failed: {stderr}")]
  Unavailable { query: String, stderr: String },

  /// The query exceeded the probe timeout.
  #[error("git {query} timed out after {}s", timeout.as_secs())]
  Timedout { query: String, timeout: Duration },

  /// The commit timestamp did not match git's iso date format.
  #[error("unrecognized commit timestamp `{0}`")]
  BadTimestamp(String),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

/// Whether the working tree had uncommitted changes at capture time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeState {
  Clean,
  Dirty,
}

impl TreeState {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Clean => "clean",
      Self::Dirty => "dirty",
    }
  }
}

impl fmt::Display for TreeState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

/// Version-control descriptors captured once per process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionMetadata {
  /// `git describe --tags --always --dirty` output.
  pub describe: String,

  /// Short commit hash.
  pub commit: String,

  /// Commit time rendered as UTC `%Y-%m-%dT%H:%M:%SZ`.
  pub commit_time: String,

  pub tree_state: TreeState,
}

/// Runs the git queries against a repository directory.
#[derive(Debug, Clone)]
pub struct GitProbe {
  /// The git executable to invoke.
  pub program: String,

  /// Per-query timeout.
  pub timeout: Duration,
}

impl Default for GitProbe {
  fn default() -> Self {
    Self {
      program: "git".to_string(),
      timeout: Duration::from_secs(10),
    }
  }
}

impl GitProbe {
  /// Capture the full metadata tuple from the repository at `dir`.
  ///
  /// # Errors
  ///
  /// Fails if `dir` is not under version control, any query exits nonzero,
  /// or any query exceeds the probe timeout.
  pub async fn capture(&self, dir: &Path) -> Result<VersionMetadata, MetadataError> {
    let describe = self.query(dir, &["describe", "--tags", "--always", "--dirty"]).await?;
    let commit = self.query(dir, &["rev-parse", "--short", "HEAD"]).await?;
    let raw_commit_time = self.query(dir, &["log", "-1", "--format=%cd", "--date=iso"]).await?;
    let status = self.query(dir, &["status", "--porcelain"]).await?;

    let tree_state = if status.is_empty() { TreeState::Clean } else { TreeState::Dirty };
    let commit_time = normalize_commit_time(&raw_commit_time)?;

    info!(
      describe = %describe,
      commit = %commit,
      commit_time = %commit_time,
      tree_state = %tree_state,
      "captured git metadata"
    );

    Ok(VersionMetadata {
      describe,
      commit,
      commit_time,
      tree_state,
    })
  }

  async fn query(&self, dir: &Path, args: &[&str]) -> Result<String, MetadataError> {
    debug!(args = ?args, "git query");

    let output = tokio::time::timeout(self.timeout, process::run_capture(&self.program, args, Some(dir), None))
      .await
      .map_err(|_| MetadataError::Timedout {
        query: args.join(" "),
        timeout: self.timeout,
      })??;

    if !output.status.success() {
      return Err(MetadataError::Unavailable {
        query: args.join(" "),
        stderr: process::stderr_text(&output),
      });
    }

    Ok(process::stdout_text(&output))
  }
}

static CACHE: OnceCell<VersionMetadata> = OnceCell::const_new();

/// Capture metadata at most once per process.
///
/// The first successful capture is cached for the process lifetime;
/// subsequent calls return the cached value without re-invoking git, and the
/// probe and directory of later calls are ignored. Failures are not cached.
/// Concurrent first callers are serialized by the cell, so readers observe a
/// fully populated value or an error, never a partial one.
pub async fn cached(probe: &GitProbe, dir: &Path) -> Result<&'static VersionMetadata, MetadataError> {
  CACHE.get_or_try_init(|| probe.capture(dir)).await
}

/// Parse git's offset-aware iso timestamp and render it as UTC.
fn normalize_commit_time(raw: &str) -> Result<String, MetadataError> {
  let parsed = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S %z")
    .map_err(|_| MetadataError::BadTimestamp(raw.to_string()))?;
  Ok(parsed.with_timezone(&Utc).format("%Y-%m-%dT%H:%M:%SZ").to_string())
}

/// The build timestamp substituted into the linker flags.
pub fn build_timestamp() -> String {
  Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Render the linker-flag injection template.
///
/// Six named substitution points on the version package, plus the strip
/// flags appended unconditionally.
pub fn render_ldflags(package: &str, app_name: &str, metadata: &VersionMetadata, build_time: &str) -> String {
  format!(
    "-X '{pkg}.appName={app}' -X '{pkg}.gitVersion={version}' -X '{pkg}.gitCommit={commit}' \
     -X '{pkg}.gitCommitTime={commit_time}' -X '{pkg}.buildTime={build_time}' \
     -X '{pkg}.gitTreeState={tree_state}' {strip}",
    pkg = package,
    app = app_name,
    version = metadata.describe,
    commit = metadata.commit,
    commit_time = metadata.commit_time,
    build_time = build_time,
    tree_state = metadata.tree_state,
    strip = STRIP_LDFLAGS,
  )
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn commit_time_in_utc_stays_put() {
    assert_eq!(
      normalize_commit_time("2024-01-02 15:04:05 +0000").unwrap(),
      "2024-01-02T15:04:05Z"
    );
  }

  #[test]
  fn commit_time_offset_is_converted() {
    assert_eq!(
      normalize_commit_time("2024-03-05 12:30:00 +0200").unwrap(),
      "2024-03-05T10:30:00Z"
    );
  }

  #[test]
  fn garbage_commit_time_is_rejected() {
    assert!(matches!(
      normalize_commit_time("last tuesday"),
      Err(MetadataError::BadTimestamp(_))
    ));
  }

  #[test]
  fn ldflags_template_has_six_substitutions_and_strip() {
    let metadata = VersionMetadata {
      describe: "v1.2.3".to_string(),
      commit: "abc1234".to_string(),
      commit_time: "2024-01-02T15:04:05Z".to_string(),
      tree_state: TreeState::Clean,
    };
    let flags = render_ldflags("main", "myapp", &metadata, "2024-06-01T00:00:00Z");

    assert_eq!(flags.matches("-X ").count(), 6);
    assert!(flags.contains("main.appName=myapp"));
    assert!(flags.contains("main.gitVersion=v1.2.3"));
    assert!(flags.contains("main.gitCommit=abc1234"));
    assert!(flags.contains("main.gitCommitTime=2024-01-02T15:04:05Z"));
    assert!(flags.contains("main.buildTime=2024-06-01T00:00:00Z"));
    assert!(flags.contains("main.gitTreeState=clean"));
    assert!(flags.ends_with(STRIP_LDFLAGS));
  }

  #[test]
  fn build_timestamp_is_utc_zulu() {
    let stamp = build_timestamp();
    assert!(stamp.ends_with('Z'));
    assert_eq!(stamp.len(), "2024-01-02T15:04:05Z".len());
  }

  #[cfg(unix)]
  mod probe {
    use super::super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    /// Write an executable stub that stands in for git.
    fn write_stub(dir: &Path, body: &str) -> String {
      let path = dir.join("fake-git");
      std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
      std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
      path.to_string_lossy().into_owned()
    }

    const HAPPY_STUB: &str = r#"case "$1" in
  describe) echo "v1.2.3" ;;
  rev-parse) echo "abc1234" ;;
  log) echo "2024-01-02 15:04:05 +0000" ;;
  status) : ;;
esac"#;

    #[tokio::test]
    async fn capture_assembles_the_tuple() {
      let temp = TempDir::new().unwrap();
      let probe = GitProbe {
        program: write_stub(temp.path(), HAPPY_STUB),
        ..GitProbe::default()
      };

      let metadata = probe.capture(temp.path()).await.unwrap();
      assert_eq!(metadata.describe, "v1.2.3");
      assert_eq!(metadata.commit, "abc1234");
      assert_eq!(metadata.commit_time, "2024-01-02T15:04:05Z");
      assert_eq!(metadata.tree_state, TreeState::Clean);
    }

    #[tokio::test]
    async fn dirty_status_marks_tree_dirty() {
      let temp = TempDir::new().unwrap();
      let stub = r#"case "$1" in
  describe) echo "v1.2.3-dirty" ;;
  rev-parse) echo "abc1234" ;;
  log) echo "2024-01-02 15:04:05 +0000" ;;
  status) echo " M main.go" ;;
esac"#;
      let probe = GitProbe {
        program: write_stub(temp.path(), stub),
        ..GitProbe::default()
      };

      let metadata = probe.capture(temp.path()).await.unwrap();
      assert_eq!(metadata.tree_state, TreeState::Dirty);
    }

    #[tokio::test]
    async fn nonzero_exit_is_unavailable_with_stderr() {
      let temp = TempDir::new().unwrap();
      let stub = r#"echo "fatal: not a git repository" >&2
exit 128"#;
      let probe = GitProbe {
        program: write_stub(temp.path(), stub),
        ..GitProbe::default()
      };

      match probe.capture(temp.path()).await {
        Err(MetadataError::Unavailable { stderr, .. }) => {
          assert!(stderr.contains("not a git repository"));
        }
        other => panic!("expected Unavailable, got {other:?}"),
      }
    }

    #[tokio::test]
    async fn slow_query_times_out() {
      let temp = TempDir::new().unwrap();
      let probe = GitProbe {
        program: write_stub(temp.path(), "sleep 1"),
        timeout: Duration::from_millis(100),
      };

      assert!(matches!(
        probe.capture(temp.path()).await,
        Err(MetadataError::Timedout { .. })
      ));
    }

    // The cache is a process-wide singleton; this is the only test that may
    // touch `cached`.
    #[tokio::test]
    async fn cached_invokes_git_at_most_once() {
      let temp = TempDir::new().unwrap();
      let counter = temp.path().join("describe-count");
      let stub = format!(
        r#"case "$1" in
  describe) echo x >> "{counter}"; echo "v1.2.3" ;;
  rev-parse) echo "abc1234" ;;
  log) echo "2024-01-02 15:04:05 +0000" ;;
  status) : ;;
esac"#,
        counter = counter.display()
      );
      let probe = GitProbe {
        program: write_stub(temp.path(), &stub),
        ..GitProbe::default()
      };

      let (a, b, c) = tokio::join!(
        cached(&probe, temp.path()),
        cached(&probe, temp.path()),
        cached(&probe, temp.path()),
      );
      let first = a.unwrap();
      assert_eq!(first, b.unwrap());
      assert_eq!(first, c.unwrap());

      let invocations = std::fs::read_to_string(&counter).unwrap();
      assert_eq!(invocations.lines().count(), 1);
    }
  }
}
