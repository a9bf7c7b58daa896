//! Managed environments and their persisted state.
//!
//! An environment is an isolated sandbox directory plus a pinned dependency
//! set, associated one-to-one with a configured [`EnvironmentConfig`]. Its
//! lifecycle position is recorded in a small JSON file at the sandbox root:
//!
//! ```text
//! <sandbox>/goose-state.json
//! {"stage":"synced","ecosystem":{...},"bootstrapped_version":"3.12.4","checksum":"sha256:…"}
//! ```
//!
//! An absent file reads as [`EnvironmentState::Uninitialized`]; unknown
//! stage tags are rejected. Writes are atomic (temp + rename), so a crash
//! mid-write is observed as "uninitialized" on the next run — the lifecycle
//! re-verifies everything it cannot trust anyway.
//!
//! [`Environment::run`] is the scheduler's entry point: it executes a unit
//! through the backend and, for hooks that may write, wraps the execution in
//! a pair of git status snapshots to detect modified files.

pub mod lifecycle;

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::backend::{Backend, RunResult, load_backend};
use crate::config::{Config, EcosystemConfig, EnvironmentConfig};
use crate::git::status::git_status;
use crate::planner::ExecutableUnit;
use crate::process::LogSink;
use crate::utils::atomic_write;

/// File name of the persisted state record at the sandbox root.
pub const STATE_FILE: &str = "goose-state.json";

/// Position within the pre-synced half of the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitialStage {
    Bootstrapped,
    Frozen,
}

/// State of an environment that exists but is not synced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitialState {
    pub stage: InitialStage,
    pub ecosystem: EcosystemConfig,
    /// Concrete ecosystem version selected at bootstrap time.
    pub bootstrapped_version: String,
}

/// State of an environment whose sandbox matches a manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncedState {
    pub ecosystem: EcosystemConfig,
    pub bootstrapped_version: String,
    /// Checksum of the manifest the sandbox was last synced against.
    pub checksum: String,
}

/// The full state sum, including the never-persisted uninitialized case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvironmentState {
    Uninitialized,
    Initial(InitialState),
    Synced(SyncedState),
}

impl EnvironmentState {
    /// The ecosystem recorded in the state, if any.
    #[must_use]
    pub fn ecosystem(&self) -> Option<&EcosystemConfig> {
        match self {
            EnvironmentState::Uninitialized => None,
            EnvironmentState::Initial(state) => Some(&state.ecosystem),
            EnvironmentState::Synced(state) => Some(&state.ecosystem),
        }
    }

    /// Short human name for log lines.
    #[must_use]
    pub fn describe(&self) -> &'static str {
        match self {
            EnvironmentState::Uninitialized => "uninitialized",
            EnvironmentState::Initial(InitialState {
                stage: InitialStage::Bootstrapped,
                ..
            }) => "bootstrapped",
            EnvironmentState::Initial(InitialState {
                stage: InitialStage::Frozen,
                ..
            }) => "frozen",
            EnvironmentState::Synced(_) => "synced",
        }
    }
}

/// On-disk representation: the persisted half of the sum, discriminated by
/// the `stage` field.
#[derive(Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case", deny_unknown_fields)]
enum StateOnDisk {
    Bootstrapped {
        ecosystem: EcosystemConfig,
        bootstrapped_version: String,
    },
    Frozen {
        ecosystem: EcosystemConfig,
        bootstrapped_version: String,
    },
    Synced {
        ecosystem: EcosystemConfig,
        bootstrapped_version: String,
        checksum: String,
    },
}

impl From<StateOnDisk> for EnvironmentState {
    fn from(disk: StateOnDisk) -> Self {
        match disk {
            StateOnDisk::Bootstrapped {
                ecosystem,
                bootstrapped_version,
            } => EnvironmentState::Initial(InitialState {
                stage: InitialStage::Bootstrapped,
                ecosystem,
                bootstrapped_version,
            }),
            StateOnDisk::Frozen {
                ecosystem,
                bootstrapped_version,
            } => EnvironmentState::Initial(InitialState {
                stage: InitialStage::Frozen,
                ecosystem,
                bootstrapped_version,
            }),
            StateOnDisk::Synced {
                ecosystem,
                bootstrapped_version,
                checksum,
            } => EnvironmentState::Synced(SyncedState {
                ecosystem,
                bootstrapped_version,
                checksum,
            }),
        }
    }
}

impl EnvironmentState {
    fn to_disk(&self) -> Option<StateOnDisk> {
        match self {
            EnvironmentState::Uninitialized => None,
            EnvironmentState::Initial(state) => Some(match state.stage {
                InitialStage::Bootstrapped => StateOnDisk::Bootstrapped {
                    ecosystem: state.ecosystem.clone(),
                    bootstrapped_version: state.bootstrapped_version.clone(),
                },
                InitialStage::Frozen => StateOnDisk::Frozen {
                    ecosystem: state.ecosystem.clone(),
                    bootstrapped_version: state.bootstrapped_version.clone(),
                },
            }),
            EnvironmentState::Synced(state) => Some(StateOnDisk::Synced {
                ecosystem: state.ecosystem.clone(),
                bootstrapped_version: state.bootstrapped_version.clone(),
                checksum: state.checksum.clone(),
            }),
        }
    }
}

/// Load the persisted state from a sandbox directory.
pub fn read_state(env_dir: &Path) -> Result<EnvironmentState> {
    let path = env_dir.join(STATE_FILE);
    let raw = match std::fs::read(&path) {
        Ok(raw) => raw,
        Err(error) if error.kind() == ErrorKind::NotFound => {
            return Ok(EnvironmentState::Uninitialized);
        }
        Err(error) => {
            return Err(error)
                .with_context(|| format!("failed reading state file {}", path.display()));
        }
    };
    let disk: StateOnDisk = serde_json::from_slice(&raw)
        .with_context(|| format!("failed parsing state file {}", path.display()))?;
    Ok(disk.into())
}

/// Persist the state into a sandbox directory.
///
/// Writing [`EnvironmentState::Uninitialized`] removes the record, which is
/// how teardown leaves a readable store behind.
pub fn write_state(env_dir: &Path, state: &EnvironmentState) -> Result<()> {
    let path = env_dir.join(STATE_FILE);
    match state.to_disk() {
        Some(disk) => {
            let serialized =
                serde_json::to_vec(&disk).context("failed serializing environment state")?;
            atomic_write(&path, &serialized)?;
        }
        None => match std::fs::remove_file(&path) {
            Ok(()) => {}
            Err(error) if error.kind() == ErrorKind::NotFound => {}
            Err(error) => {
                return Err(error)
                    .with_context(|| format!("failed removing state file {}", path.display()));
            }
        },
    }
    Ok(())
}

/// Runtime handle to one managed environment.
///
/// Owns the sandbox directory and the environment's lockfiles directory.
/// The state cell is mutated only by lifecycle operations, which run
/// strictly sequentially per environment; the scheduler shares the handle
/// read-only and calls [`Environment::run`].
pub struct Environment {
    config: EnvironmentConfig,
    root: PathBuf,
    lock_files_dir: PathBuf,
    state: Mutex<EnvironmentState>,
    backend: Arc<dyn Backend>,
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("id", &self.config.id)
            .field("ecosystem", &self.config.ecosystem)
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl Environment {
    /// Construct the handle, discovering the persisted state.
    ///
    /// The discovered state is read from the file system, so it is not
    /// entirely trusted: each lifecycle stage re-verifies what it depends
    /// on.
    pub fn new(
        config: EnvironmentConfig,
        environments_root: &Path,
        lock_files_root: &Path,
    ) -> Result<Self> {
        let backend = load_backend(&config.ecosystem);
        Self::with_backend(config, environments_root, lock_files_root, backend)
    }

    /// Construct with an explicit backend (tests inject recording fakes).
    pub fn with_backend(
        config: EnvironmentConfig,
        environments_root: &Path,
        lock_files_root: &Path,
        backend: Arc<dyn Backend>,
    ) -> Result<Self> {
        let root = environments_root.join(&config.id);
        let lock_files_dir = lock_files_root.join(&config.id);
        let state = read_state(&root)?;
        Ok(Self {
            config,
            root,
            lock_files_dir,
            state: Mutex::new(state),
            backend,
        })
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.config.id
    }

    #[must_use]
    pub fn config(&self) -> &EnvironmentConfig {
        &self.config
    }

    /// Sandbox directory, exclusively owned by this environment.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// This environment's lockfiles directory (`<lockfiles_root>/<id>/`).
    #[must_use]
    pub fn lock_files_dir(&self) -> &Path {
        &self.lock_files_dir
    }

    /// Snapshot of the current state.
    #[must_use]
    pub fn state(&self) -> EnvironmentState {
        self.state.lock().expect("state lock poisoned").clone()
    }

    /// Persist and adopt a new state. Lifecycle-internal.
    fn set_state(&self, state: EnvironmentState) -> Result<()> {
        write_state(&self.root, &state)?;
        *self.state.lock().expect("state lock poisoned") = state;
        Ok(())
    }

    /// Adopt a state without touching disk (teardown removed the directory).
    fn forget_state(&self) {
        *self.state.lock().expect("state lock poisoned") = EnvironmentState::Uninitialized;
    }

    /// Execute one unit, detecting file modifications for writing hooks.
    ///
    /// Read-only hooks skip change detection entirely. For the rest, a git
    /// status snapshot over the unit's targets is taken before and after the
    /// backend run; a backend error passes through untouched, and a changed
    /// snapshot turns an `ok` result into `modified`.
    pub async fn run(&self, unit: &ExecutableUnit, log: &LogSink) -> Result<RunResult> {
        if unit.hook.read_only {
            return self
                .backend
                .run(&self.config, &self.root, unit, log)
                .await;
        }

        let status_prior = git_status(&unit.targets).await?;
        let result = self
            .backend
            .run(&self.config, &self.root, unit, log)
            .await?;
        if result == RunResult::Error {
            return Ok(result);
        }
        let status_post = git_status(&unit.targets).await?;
        if status_prior != status_post {
            return Ok(RunResult::Modified);
        }
        Ok(result)
    }
}

/// Build the environment handle for every configured environment.
pub fn build_environments(
    config: &Config,
    environments_root: &Path,
    lock_files_root: &Path,
) -> Result<BTreeMap<String, Arc<Environment>>> {
    config
        .environments
        .iter()
        .map(|environment_config| {
            let environment = Environment::new(
                environment_config.clone(),
                environments_root,
                lock_files_root,
            )?;
            Ok((environment_config.id.clone(), Arc::new(environment)))
        })
        .collect()
}
