//! Build orchestration library for goforge.
//!
//! goforge drives the Go toolchain as a set of subprocesses: it runs
//! pre-flight checks, captures git metadata for linker-flag injection,
//! compiles for one or many (platform, architecture) targets, and optionally
//! archives and installs the result. The batch orchestrator in [`batch`]
//! fans out independent targets across a bounded worker pool with per-task
//! timeouts.

pub mod archive;
pub mod batch;
pub mod envmap;
pub mod install;
pub mod naming;
pub mod pipeline;
pub mod preflight;
pub mod process;
pub mod target;
pub mod vcs;

pub use batch::{BatchError, BatchOptions, BatchReport, SkipReason, TaskOutcome, TaskResult, run_batch};
pub use naming::Namer;
pub use pipeline::{BuildConfig, BuildError, BuildOutcome, build};
pub use preflight::{PreflightError, PreflightOptions, run_preflight};
pub use target::{Arch, Os, Target};
pub use vcs::{GitProbe, MetadataError, TreeState, VersionMetadata};
