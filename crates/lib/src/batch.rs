//! Batch build orchestration.
//!
//! Enumerates the full cross product of supported platforms and
//! architectures, classifies unsupported or restricted pairs as skipped
//! without running them, and fans the rest out as independent build tasks
//! over a semaphore-bounded worker pool. Each task runs under its own
//! timeout; outcomes are recorded on a mutex-guarded scoreboard whose
//! increment and progress line are atomic, so observers never see counters
//! lagging the transitions they were printed for.
//!
//! Git metadata is captured once, before any worker spawns, and the rendered
//! linker flags are injected into every task's config; workers never touch
//! the cache. There is no cross-task cancellation: one task's failure does
//! not abort its siblings. A timed-out task's compiler subprocess is killed
//! on a best-effort basis when its future is dropped.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::envmap;
use crate::naming::Namer;
use crate::pipeline::{self, BuildConfig};
use crate::target::Target;
use crate::vcs::{self, GitProbe};

/// Errors that abort a batch before any task runs.
#[derive(Debug, Error)]
pub enum BatchError {
  #[error("git metadata unavailable: {0}")]
  Metadata(#[from] vcs::MetadataError),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

/// Why a pair was classified as skipped without being submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
  /// A known-unsupported combination (darwin with a 32-bit architecture).
  UnsupportedPair,

  /// The current-platform-only restriction is active and the pair's
  /// platform differs from the host's.
  ForeignPlatform,
}

impl fmt::Display for SkipReason {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::UnsupportedPair => write!(f, "unsupported combination"),
      Self::ForeignPlatform => write!(f, "not the current platform"),
    }
  }
}

/// Terminal state of one batch task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
  Success,
  Failure(String),
  Skipped(SkipReason),
}

impl TaskOutcome {
  pub fn label(&self) -> &'static str {
    match self {
      Self::Success => "success",
      Self::Failure(_) => "failure",
      Self::Skipped(_) => "skipped",
    }
  }

  /// Failure detail or skip reason, when there is one.
  pub fn detail(&self) -> Option<String> {
    match self {
      Self::Success => None,
      Self::Failure(reason) => Some(reason.clone()),
      Self::Skipped(reason) => Some(reason.to_string()),
    }
  }
}

/// One task's terminal state.
#[derive(Debug)]
pub struct TaskResult {
  pub target: Target,
  pub outcome: TaskOutcome,
  pub elapsed: Duration,
}

/// Aggregate of a completed batch run.
#[derive(Debug)]
pub struct BatchReport {
  /// Per-task results, in platform-then-architecture order.
  pub results: Vec<TaskResult>,

  pub succeeded: usize,
  pub failed: usize,
  pub skipped: usize,
  pub elapsed: Duration,
}

impl BatchReport {
  /// True when no task ended in failure. Skips do not fail a batch.
  pub fn is_success(&self) -> bool {
    self.failed == 0
  }

  pub fn total(&self) -> usize {
    self.results.len()
  }
}

/// Worker-pool size: host logical cores minus one, at least one.
pub fn default_jobs() -> usize {
  std::thread::available_parallelism()
    .map(|p| p.get().saturating_sub(1))
    .unwrap_or(1)
    .max(1)
}

/// Configuration for a batch run.
#[derive(Debug, Clone)]
pub struct BatchOptions {
  /// Compiler to invoke for every task.
  pub compiler: String,

  /// Project directory (manifest, entry file, vendor directory).
  pub dir: PathBuf,

  pub entry: PathBuf,

  /// Base output name; target tokens and version are appended per task.
  pub base_name: String,

  pub output_dir: PathBuf,

  /// Application name substituted into the linker flags.
  pub app_name: String,

  /// Go package the version symbols live in.
  pub ldflags_package: String,

  /// Version string inserted into artifact names.
  pub version: Option<String>,

  /// Drop the os/arch infix from binary names.
  pub simple_name: bool,

  /// Capture git metadata and inject it via linker flags.
  pub inject_git: bool,

  pub probe: GitProbe,

  /// Compile with `-mod=vendor`.
  pub vendor_build: bool,

  /// Archive each binary and delete the raw output.
  pub archive: bool,

  /// `KEY=VALUE` overrides layered on top of every task's environment.
  pub env_overrides: Vec<(String, String)>,

  /// Worker-pool size.
  pub jobs: usize,

  /// Per-task timeout, measured from when the task starts running (queue
  /// wait behind the pool does not count against it).
  pub task_timeout: Duration,

  /// Only build pairs whose platform matches the host.
  pub current_platform_only: bool,
}

impl Default for BatchOptions {
  fn default() -> Self {
    Self {
      compiler: "go".to_string(),
      dir: PathBuf::from("."),
      entry: PathBuf::from("./main.go"),
      base_name: "myapp".to_string(),
      output_dir: PathBuf::from(Namer::DEFAULT_DIR),
      app_name: "myapp".to_string(),
      ldflags_package: "main".to_string(),
      version: None,
      simple_name: false,
      inject_git: true,
      probe: GitProbe::default(),
      vendor_build: false,
      archive: false,
      env_overrides: Vec::new(),
      jobs: default_jobs(),
      task_timeout: Duration::from_secs(1800),
      current_platform_only: false,
    }
  }
}

/// Shared counters for the fan-out phase. Every read-modify-write happens
/// under one lock acquisition together with the progress line it produces.
struct Scoreboard {
  total: usize,
  completed: usize,
  succeeded: usize,
  failed: usize,
  skipped: usize,
}

impl Scoreboard {
  fn new(total: usize) -> Self {
    Self {
      total,
      completed: 0,
      succeeded: 0,
      failed: 0,
      skipped: 0,
    }
  }

  fn record(&mut self, outcome: &TaskOutcome) -> (usize, usize) {
    self.completed += 1;
    match outcome {
      TaskOutcome::Success => self.succeeded += 1,
      TaskOutcome::Failure(_) => self.failed += 1,
      TaskOutcome::Skipped(_) => self.skipped += 1,
    }
    (self.completed, self.total)
  }
}

/// Record one terminal transition and emit its progress line while still
/// holding the lock, keeping the counter and the line consistent.
fn report_progress(board: &Mutex<Scoreboard>, target: Target, outcome: &TaskOutcome) {
  let mut board = board.lock().unwrap();
  let (completed, total) = board.record(outcome);
  match outcome {
    TaskOutcome::Success => println!("[{completed}/{total}] ok   {target}"),
    TaskOutcome::Failure(reason) => println!("[{completed}/{total}] fail {target}: {reason}"),
    TaskOutcome::Skipped(reason) => println!("[{completed}/{total}] skip {target} ({reason})"),
  }
}

/// Run one batch: enumerate, classify, fan out, aggregate.
///
/// Returns the aggregate report; callers decide the process exit status from
/// [`BatchReport::is_success`]. Pre-flight checks are the caller's job and
/// run once per invocation, not once per task.
pub async fn run_batch(options: &BatchOptions) -> Result<BatchReport, BatchError> {
  let started = Instant::now();

  // Metadata is captured exactly once, before any worker exists.
  let ldflags = if options.inject_git {
    let metadata = vcs::cached(&options.probe, &options.dir).await?;
    vcs::render_ldflags(&options.ldflags_package, &options.app_name, metadata, &vcs::build_timestamp())
  } else {
    vcs::STRIP_LDFLAGS.to_string()
  };

  let namer = Namer::new(&options.output_dir)?;
  let host_os = Target::host().map(|t| t.os);
  let matrix = Target::matrix();
  let total = matrix.len();

  info!(total, jobs = options.jobs, "starting batch build");

  let board = Arc::new(Mutex::new(Scoreboard::new(total)));
  let semaphore = Arc::new(Semaphore::new(options.jobs.max(1)));
  let mut join_set = JoinSet::new();
  let mut spawned: HashMap<tokio::task::Id, Target> = HashMap::new();
  let mut results: Vec<TaskResult> = Vec::with_capacity(total);

  for target in matrix {
    let skip = if !target.is_supported() {
      Some(SkipReason::UnsupportedPair)
    } else if options.current_platform_only && host_os != Some(target.os) {
      Some(SkipReason::ForeignPlatform)
    } else {
      None
    };

    if let Some(reason) = skip {
      let outcome = TaskOutcome::Skipped(reason);
      report_progress(&board, target, &outcome);
      results.push(TaskResult {
        target,
        outcome,
        elapsed: Duration::ZERO,
      });
      continue;
    }

    let config = task_config(options, &namer, target, &ldflags);
    let semaphore = semaphore.clone();
    let board = board.clone();
    let task_timeout = options.task_timeout;

    let handle = join_set.spawn(async move {
      let _permit = semaphore.acquire().await.unwrap();
      let task_started = Instant::now();
      debug!(target = %target, "task running");

      let outcome = match tokio::time::timeout(task_timeout, pipeline::build(&config)).await {
        Ok(Ok(built)) => {
          if let Some(e) = &built.archive_error {
            warn!(target = %target, error = %e, "archive failed; compile still counts as success");
          }
          TaskOutcome::Success
        }
        Ok(Err(e)) => TaskOutcome::Failure(e.to_string()),
        Err(_) => TaskOutcome::Failure(format!("timed out after {}s", task_timeout.as_secs())),
      };

      report_progress(&board, target, &outcome);
      TaskResult {
        target,
        outcome,
        elapsed: task_started.elapsed(),
      }
    });
    spawned.insert(handle.id(), target);
  }

  while let Some(joined) = join_set.join_next_with_id().await {
    match joined {
      Ok((id, result)) => {
        spawned.remove(&id);
        results.push(result);
      }
      Err(e) => {
        // A panicked task still gets a terminal state, attributed to its pair.
        match spawned.remove(&e.id()) {
          Some(target) => {
            error!(target = %target, error = %e, "build task panicked");
            let outcome = TaskOutcome::Failure(format!("task panicked: {e}"));
            report_progress(&board, target, &outcome);
            results.push(TaskResult {
              target,
              outcome,
              elapsed: Duration::ZERO,
            });
          }
          None => error!(error = %e, "panicked task has no recorded target"),
        }
      }
    }
  }

  results.sort_by_key(|r| r.target);

  let succeeded = results.iter().filter(|r| r.outcome == TaskOutcome::Success).count();
  let failed = results
    .iter()
    .filter(|r| matches!(r.outcome, TaskOutcome::Failure(_)))
    .count();
  let skipped = results
    .iter()
    .filter(|r| matches!(r.outcome, TaskOutcome::Skipped(_)))
    .count();

  info!(succeeded, failed, skipped, "batch complete");

  Ok(BatchReport {
    results,
    succeeded,
    failed,
    skipped,
    elapsed: started.elapsed(),
  })
}

fn task_config(options: &BatchOptions, namer: &Namer, target: Target, ldflags: &str) -> BuildConfig {
  let version = options.version.as_deref();
  BuildConfig {
    compiler: options.compiler.clone(),
    target,
    dir: options.dir.clone(),
    output: namer.binary_name(&options.base_name, target, version, options.simple_name),
    entry: options.entry.clone(),
    ldflags: ldflags.to_string(),
    vendor_build: options.vendor_build,
    env: envmap::resolve_env(target, &options.env_overrides),
    archive: options
      .archive
      .then(|| namer.archive_name(&options.base_name, target, version)),
    install: None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn scoreboard_counters_always_sum_to_completed() {
    let mut board = Scoreboard::new(5);
    let outcomes = [
      TaskOutcome::Success,
      TaskOutcome::Failure("boom".to_string()),
      TaskOutcome::Skipped(SkipReason::UnsupportedPair),
      TaskOutcome::Success,
    ];

    let mut last_completed = 0;
    for outcome in &outcomes {
      let (completed, total) = board.record(outcome);
      assert_eq!(total, 5);
      assert!(completed > last_completed, "progress must be monotonic");
      last_completed = completed;
      assert_eq!(board.succeeded + board.failed + board.skipped, board.completed);
    }

    assert_eq!(board.succeeded, 2);
    assert_eq!(board.failed, 1);
    assert_eq!(board.skipped, 1);
  }

  #[test]
  fn default_jobs_is_at_least_one() {
    assert!(default_jobs() >= 1);
  }

  #[cfg(unix)]
  mod runs {
    use super::super::*;
    use crate::target::{Arch, Os};
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use tempfile::TempDir;

    const OK_COMPILER: &str = r#"out=""
prev=""
for a in "$@"; do
  if [ "$prev" = "-o" ]; then out="$a"; fi
  prev="$a"
done
printf 'binary' > "$out"
"#;

    fn write_stub(dir: &Path, body: &str) -> String {
      let path = dir.join("fake-go");
      std::fs::write(&path, format!("#!/bin/sh\n{body}")).unwrap();
      std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
      path.to_string_lossy().into_owned()
    }

    fn options(temp: &TempDir, compiler: String) -> BatchOptions {
      BatchOptions {
        compiler,
        dir: temp.path().to_path_buf(),
        output_dir: temp.path().join("output"),
        inject_git: false,
        ..BatchOptions::default()
      }
    }

    #[tokio::test]
    async fn succeeding_compiler_yields_one_success_per_supported_pair() {
      let temp = TempDir::new().unwrap();
      let options = options(&temp, write_stub(temp.path(), OK_COMPILER));

      let report = run_batch(&options).await.unwrap();
      assert_eq!(report.total(), 12);
      assert_eq!(report.succeeded, 10);
      assert_eq!(report.failed, 0);
      assert_eq!(report.skipped, 2);
      assert!(report.is_success());
      assert_eq!(report.succeeded + report.failed + report.skipped, report.total());
    }

    #[tokio::test]
    async fn darwin_32_bit_is_always_skipped() {
      let temp = TempDir::new().unwrap();
      let mut options = options(&temp, write_stub(temp.path(), OK_COMPILER));
      options.jobs = 1;

      let report = run_batch(&options).await.unwrap();
      for pair in [Target::new(Os::Darwin, Arch::X86), Target::new(Os::Darwin, Arch::Arm)] {
        let result = report.results.iter().find(|r| r.target == pair).unwrap();
        assert_eq!(result.outcome, TaskOutcome::Skipped(SkipReason::UnsupportedPair));
        // A skipped pair never ran, so no output file may exist for it.
        assert!(!options.output_dir.join(format!("myapp_darwin_{}", pair.arch)).exists());
      }
    }

    #[tokio::test]
    async fn failing_compiler_fails_every_submitted_task() {
      let temp = TempDir::new().unwrap();
      let stub = write_stub(temp.path(), "echo 'compile error' >&2\nexit 1\n");
      let options = options(&temp, stub);

      let report = run_batch(&options).await.unwrap();
      assert_eq!(report.failed, 10);
      assert_eq!(report.skipped, 2);
      assert_eq!(report.succeeded, 0);
      assert!(!report.is_success());

      let failure = report
        .results
        .iter()
        .find(|r| matches!(r.outcome, TaskOutcome::Failure(_)))
        .unwrap();
      assert!(failure.outcome.detail().unwrap().contains("compile error"));
    }

    #[tokio::test]
    async fn one_failure_does_not_abort_siblings() {
      let temp = TempDir::new().unwrap();
      // Fail only when GOOS is windows; everything else builds.
      let stub = write_stub(
        temp.path(),
        &format!(r#"if [ "$GOOS" = "windows" ]; then exit 1; fi
{OK_COMPILER}"#),
      );
      let options = options(&temp, stub);

      let report = run_batch(&options).await.unwrap();
      assert_eq!(report.failed, 4);
      assert_eq!(report.succeeded, 6);
      assert_eq!(report.skipped, 2);
    }

    #[tokio::test]
    async fn current_platform_only_skips_foreign_pairs() {
      let temp = TempDir::new().unwrap();
      let mut options = options(&temp, write_stub(temp.path(), OK_COMPILER));
      options.current_platform_only = true;

      let host = Target::host().unwrap();
      let expected: usize = Target::matrix()
        .iter()
        .filter(|t| t.os == host.os && t.is_supported())
        .count();

      let report = run_batch(&options).await.unwrap();
      assert_eq!(report.succeeded, expected);
      assert_eq!(report.failed, 0);
      assert_eq!(report.skipped, 12 - expected);
    }

    #[tokio::test]
    async fn slow_task_times_out_without_hanging_the_batch() {
      let temp = TempDir::new().unwrap();
      let mut options = options(&temp, write_stub(temp.path(), "sleep 5\n"));
      options.jobs = 12;
      options.task_timeout = Duration::from_millis(300);

      let started = Instant::now();
      let report = run_batch(&options).await.unwrap();

      assert!(started.elapsed() < Duration::from_secs(4), "orchestrator must not wait out the sleep");
      assert_eq!(report.failed, 10);
      for result in report.results.iter().filter(|r| matches!(r.outcome, TaskOutcome::Failure(_))) {
        assert!(result.outcome.detail().unwrap().contains("timed out"));
      }
    }

    #[tokio::test]
    async fn binaries_land_under_the_output_dir_with_target_names() {
      let temp = TempDir::new().unwrap();
      let options = options(&temp, write_stub(temp.path(), OK_COMPILER));

      run_batch(&options).await.unwrap();

      assert!(options.output_dir.join("myapp_linux_amd64").is_file());
      assert!(options.output_dir.join("myapp_windows_amd64.exe").is_file());
      assert!(options.output_dir.join("myapp_darwin_arm64").is_file());
    }

    #[tokio::test]
    async fn archiving_replaces_binaries_with_zips() {
      let temp = TempDir::new().unwrap();
      let mut options = options(&temp, write_stub(temp.path(), OK_COMPILER));
      options.archive = true;
      options.version = Some("v2.0.0".to_string());

      let report = run_batch(&options).await.unwrap();
      assert!(report.is_success());

      assert!(options.output_dir.join("myapp_linux_amd64_v2.0.0.zip").is_file());
      assert!(!options.output_dir.join("myapp_linux_amd64_v2.0.0").exists());
    }

    #[tokio::test]
    async fn single_worker_still_completes_the_whole_matrix() {
      let temp = TempDir::new().unwrap();
      let mut options = options(&temp, write_stub(temp.path(), OK_COMPILER));
      options.jobs = 1;

      let report = run_batch(&options).await.unwrap();
      assert_eq!(report.succeeded, 10);
      assert_eq!(report.total(), 12);
    }
  }
}
