//! goose - run hooks over your source tree inside managed environments
//!
//! A hook runner (linters, formatters, checkers) whose hooks execute inside
//! isolated, reproducible *environments*: sandboxes whose dependencies are
//! pinned by committed lock files and installed automatically, similar in
//! spirit to how Cargo pins and restores a dependency graph.
//!
//! # Architecture Overview
//!
//! Two cores carry the design:
//!
//! - **Environment lifecycle** — a per-environment state machine
//!   (`bootstrap → freeze → sync`) that decides, from a content-addressed
//!   manifest over the lock files, which steps are actually needed. An
//!   up-to-date environment prepares with zero subprocess calls.
//! - **File-set-aware scheduler** — hooks are split into per-core units of
//!   work, and units are admitted to run only when their file sets cannot
//!   race with the units already running (read-only hooks are exempt and
//!   run freely in parallel).
//!
//! Control flow of a run: load configuration → construct environments →
//! prepare them in parallel → enumerate and filter target files from git →
//! plan units → drive the scheduler's event stream → classify the overall
//! outcome into an exit code.
//!
//! # Core Modules
//!
//! - [`config`] - `goose.yaml` schema, validation, and pattern matching
//! - [`manifest`] - content-addressed lock manifests and drift detection
//! - [`environment`] - sandbox state store, lifecycle state machine
//! - [`backend`] - per-ecosystem recipes (python, node, system)
//! - [`targets`] - git-backed file selection and the include/exclude pipeline
//! - [`planner`] - splitting hooks into executable units
//! - [`scheduler`] - admission-controlled concurrent unit runner
//! - [`git`] - status snapshots, shared plumbing, the pre-push protocol
//! - [`cli`] - the `goose` command set
//!
//! # Configuration Example
//!
//! ```yaml
//! version: 0
//! environments:
//!   - id: python
//!     ecosystem:
//!       language: python
//!       version: "3.12"
//!     dependencies: [ruff]
//! hooks:
//!   - id: ruff-check
//!     environment: python
//!     command: ruff
//!     args: [check, --fix]
//!     types: [python]
//!   - id: ruff-format
//!     environment: python
//!     command: ruff
//!     args: [format]
//!     types: [python]
//! ```
//!
//! Running `goose run` prepares the `python` sandbox (first run: create a
//! virtualenv, resolve `ruff` into a hash-pinned lock file, install it),
//! splits the changed python files across cores, and runs both hooks —
//! serialized against each other where their file batches overlap, since
//! both may rewrite files.
//!
//! # State on Disk
//!
//! - `.goose/<env>/` (committed) — lock files plus `manifest.json`
//! - `<cache>/goose/<checkout-hash>/<env>/` — the sandbox, with its
//!   `goose-state.json` stage record
//!
//! Every decision the lifecycle makes is re-derivable from those two
//! places; deleting either merely causes the corresponding work to be
//! redone.

pub mod backend;
pub mod cli;
pub mod config;
pub mod context;
pub mod environment;
pub mod error;
pub mod git;
pub mod manifest;
pub mod orphans;
pub mod paths;
pub mod planner;
pub mod process;
pub mod scheduler;
pub mod tags;
pub mod targets;
pub mod utils;

pub use backend::RunResult;
pub use config::{Config, EnvironmentConfig, HookConfig};
pub use context::{Context, gather_context};
pub use environment::{Environment, EnvironmentState};
pub use error::GooseError;
pub use planner::ExecutableUnit;
pub use scheduler::{Outcome, Scheduler, SchedulerEvent, UnitStatus};
pub use targets::{Selector, Target};
