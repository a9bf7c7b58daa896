//! The per-environment lifecycle state machine.
//!
//! [`prepare_environment`] drives one environment from whatever state it was
//! discovered in to `Synced`, doing the least work the on-disk evidence
//! allows:
//!
//! ```text
//! Uninitialized ──bootstrap──▶ Initial{bootstrapped}
//! Initial{*} ──(ecosystem drift)──▶ teardown ──▶ Uninitialized
//! Initial{bootstrapped} ──freeze──▶ Initial{frozen}
//! Initial{frozen} ──sync──▶ Synced
//! Synced ──(lockfile drift)──▶ sync ──▶ Synced
//! Synced ──(config drift)──▶ freeze ──▶ Initial{frozen} ──▶ sync
//! ```
//!
//! The decision steps run in a fixed order (teardown, bootstrap, freeze,
//! sync), each consulting [`check_lock_files`] with exactly the inputs it is
//! entitled to trust. Freezing is only performed when explicitly requested
//! via `upgrade`; a run that *needs* freezing without having asked for it
//! fails with [`GooseError::NeedsFreeze`] so lock files never change under
//! the user silently.

use std::sync::Arc;

use anyhow::{Context, Result};
use futures::future::try_join_all;

use crate::error::GooseError;
use crate::manifest::{LockFileStatus, check_lock_files, read_manifest, write_manifest};

use super::{Environment, EnvironmentState};

impl Environment {
    /// Whether the sandbox must be torn down: it exists, but was built for a
    /// different ecosystem than the configuration now requests.
    fn check_should_teardown(&self) -> bool {
        match self.state().ecosystem() {
            None => false,
            Some(ecosystem) => *ecosystem != self.config().ecosystem,
        }
    }

    fn check_should_bootstrap(&self) -> bool {
        matches!(self.state(), EnvironmentState::Uninitialized)
    }

    /// Whether lock files are out of date with the configured dependencies.
    ///
    /// Consults the lock file check without a state checksum: whether the
    /// sandbox is in sync is irrelevant here, only whether the lock files
    /// still describe the configuration.
    fn check_should_freeze(&self) -> Result<bool> {
        let status = check_lock_files(self.lock_files_dir(), None, self.config())?;
        Ok(match status {
            LockFileStatus::MissingLockFile
            | LockFileStatus::ManifestLockFileMismatch
            | LockFileStatus::ConfigManifestMismatch => true,
            // A state/manifest mismatch means sync must run, not freeze; it
            // cannot surface without a state checksum anyway.
            LockFileStatus::Matching | LockFileStatus::StateManifestMismatch => false,
        })
    }

    /// Whether the sandbox must be (re)synced against the manifest.
    ///
    /// Freezing has already been settled by the time this runs, so config
    /// and lock-file mismatches here are programmer bugs, not drift.
    fn check_should_sync(&self) -> Result<bool> {
        let synced = match self.state() {
            EnvironmentState::Synced(synced) => synced,
            _ => return Ok(true),
        };

        let status =
            check_lock_files(self.lock_files_dir(), Some(&synced.checksum), self.config())?;
        match status {
            LockFileStatus::Matching => Ok(false),
            LockFileStatus::MissingLockFile => {
                tracing::warn!(environment = %self.id(), "expected lock file is missing");
                Ok(true)
            }
            LockFileStatus::StateManifestMismatch => {
                tracing::warn!(
                    environment = %self.id(),
                    "environment state does not match manifest"
                );
                Ok(true)
            }
            LockFileStatus::ManifestLockFileMismatch | LockFileStatus::ConfigManifestMismatch => {
                Err(GooseError::LockfileChecksumMismatch {
                    id: self.id().to_string(),
                    detail: format!("{status:?}"),
                }
                .into())
            }
        }
    }

    async fn teardown(&self) -> Result<()> {
        tokio::fs::remove_dir_all(self.root())
            .await
            .with_context(|| format!("failed removing sandbox {}", self.root().display()))?;
        self.forget_state();
        Ok(())
    }

    async fn bootstrap(&self) -> Result<()> {
        // A readable manifest pins the ecosystem version the lock files were
        // resolved against; bootstrap re-selects it rather than drifting to
        // a newer interpreter.
        let prior_manifest = read_manifest(self.lock_files_dir()).ok();
        let state = self
            .backend
            .bootstrap(self.config(), self.root(), prior_manifest.as_ref())
            .await?;
        self.set_state(EnvironmentState::Initial(state))
    }

    async fn freeze(&self) -> Result<()> {
        let (state, manifest) = self
            .backend
            .freeze(self.config(), self.root(), self.lock_files_dir())
            .await?;
        // Flush the manifest before the state record so a concurrent reader
        // never observes a state pointing at a manifest that is not there
        // yet. Both writes are atomic and fsynced.
        write_manifest(self.lock_files_dir(), &manifest)?;
        self.set_state(EnvironmentState::Initial(state))
    }

    async fn sync(&self) -> Result<()> {
        let manifest = read_manifest(self.lock_files_dir())?;
        let state = self
            .backend
            .sync(self.config(), self.root(), self.lock_files_dir(), &manifest)
            .await?;
        self.set_state(EnvironmentState::Synced(state))
    }
}

/// Drive one environment to `Synced`.
///
/// With `upgrade` set, dependencies are re-frozen unconditionally (upgrade
/// means re-freeze, period); otherwise a needed freeze fails with
/// [`GooseError::NeedsFreeze`]. Steps already satisfied by the on-disk
/// evidence are skipped, so preparing an up-to-date environment performs no
/// backend calls at all.
pub async fn prepare_environment(environment: &Environment, upgrade: bool) -> Result<()> {
    let id = environment.id().to_string();

    if environment.check_should_teardown() {
        tracing::info!(environment = %id, "environment needs rebuilding, tearing down");
        environment.teardown().await?;
        tracing::info!(environment = %id, "environment deleted");
    }

    if environment.check_should_bootstrap() {
        tracing::info!(environment = %id, "bootstrapping environment");
        environment.bootstrap().await?;
        tracing::info!(environment = %id, "bootstrapping done");
    } else {
        tracing::debug!(environment = %id, "found previously bootstrapped environment");
    }

    if upgrade {
        tracing::info!(environment = %id, "freezing dependencies");
        environment.freeze().await?;
        tracing::info!(environment = %id, "freezing done");
    } else if environment.check_should_freeze()? {
        return Err(GooseError::NeedsFreeze { id }.into());
    } else {
        tracing::debug!(environment = %id, "found existing lock files up-to-date");
    }

    if environment.check_should_sync()? {
        tracing::info!(environment = %id, "syncing dependencies");
        environment.sync().await?;
        tracing::info!(environment = %id, "syncing done");
    } else {
        tracing::debug!(environment = %id, "found dependencies up-to-date");
    }

    Ok(())
}

/// Prepare every environment concurrently.
///
/// Environments own disjoint directory trees, so they prepare in parallel;
/// the first failure cancels the remaining preparations and is returned.
pub async fn prepare_environments<'a, I>(environments: I, upgrade: bool) -> Result<()>
where
    I: IntoIterator<Item = &'a Arc<Environment>>,
{
    try_join_all(
        environments
            .into_iter()
            .map(|environment| prepare_environment(environment, upgrade)),
    )
    .await?;
    Ok(())
}
