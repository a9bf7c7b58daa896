//! The node ecosystem backend: npm sandboxes locked with package-lock.json.
//!
//! Freeze writes a `package.json` requesting the configured dependencies and
//! lets `npm install --package-lock-only` resolve it into a lock file; sync
//! is a clean `npm ci` into the sandbox, which installs exactly the lock and
//! drops anything extraneous. Hooks run through `npm exec` against the
//! sandbox prefix.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use tokio::process::Command;

use crate::config::{EnvironmentConfig, Language};
use crate::environment::{InitialStage, InitialState, SyncedState};
use crate::manifest::{LockManifest, build_manifest};
use crate::planner::ExecutableUnit;
use crate::process::{LogSink, run_step, stream_command};
use crate::utils::{atomic_write, ensure_dir};

use super::{
    Backend, RunResult, apply_hook_env, capture_version_line, push_unit_args, verify_version,
};

pub struct NodeBackend;

#[derive(Serialize)]
struct PackageJson {
    private: bool,
    dependencies: BTreeMap<String, String>,
}

async fn node_version() -> Result<String> {
    let mut command = Command::new("node");
    command.arg("--version");
    let raw = capture_version_line(command, "probing node version").await?;
    Ok(raw.trim_start_matches('v').to_string())
}

fn write_package_json(config: &EnvironmentConfig, lock_files_path: &Path) -> Result<()> {
    let package_json = PackageJson {
        private: true,
        dependencies: config
            .dependencies
            .iter()
            .map(|dependency| (dependency.clone(), "*".to_string()))
            .collect(),
    };
    let serialized = serde_json::to_vec(&package_json).context("failed serializing package.json")?;
    atomic_write(&lock_files_path.join("package.json"), &serialized)
}

#[async_trait]
impl Backend for NodeBackend {
    fn language(&self) -> Language {
        Language::Node
    }

    async fn bootstrap(
        &self,
        config: &EnvironmentConfig,
        env_path: &Path,
        prior_manifest: Option<&LockManifest>,
    ) -> Result<InitialState> {
        ensure_dir(env_path)?;
        let version = node_version().await?;
        verify_version(config, prior_manifest, &version, "bootstrapping node")?;
        Ok(InitialState {
            stage: InitialStage::Bootstrapped,
            ecosystem: config.ecosystem.clone(),
            bootstrapped_version: version,
        })
    }

    async fn freeze(
        &self,
        config: &EnvironmentConfig,
        _env_path: &Path,
        lock_files_path: &Path,
    ) -> Result<(InitialState, LockManifest)> {
        let log = LogSink::stderr();
        let prefix = format!("[{}] ", config.id);
        ensure_dir(lock_files_path)?;

        write_package_json(config, lock_files_path)?;

        let mut command = Command::new("npm");
        command
            .args(["install", "--package-lock-only"])
            .current_dir(lock_files_path);
        run_step(command, &prefix, &log, "freezing dependencies").await?;

        let version = node_version().await?;
        let manifest = build_manifest(
            &config.ecosystem,
            &config.dependencies,
            &[
                lock_files_path.join("package.json"),
                lock_files_path.join("package-lock.json"),
            ],
            lock_files_path,
            &version,
        )?;
        let state = InitialState {
            stage: InitialStage::Frozen,
            ecosystem: config.ecosystem.clone(),
            bootstrapped_version: version,
        };
        Ok((state, manifest))
    }

    async fn sync(
        &self,
        config: &EnvironmentConfig,
        env_path: &Path,
        lock_files_path: &Path,
        manifest: &LockManifest,
    ) -> Result<SyncedState> {
        let log = LogSink::stderr();
        let prefix = format!("[{}] ", config.id);
        ensure_dir(env_path)?;

        for name in ["package.json", "package-lock.json"] {
            std::fs::copy(lock_files_path.join(name), env_path.join(name))
                .with_context(|| format!("failed copying {name} into sandbox"))?;
        }

        // Clean install: exactly the lock file, nothing else survives.
        let mut command = Command::new("npm");
        command.args(["ci"]).current_dir(env_path);
        run_step(command, &prefix, &log, "syncing dependencies").await?;

        Ok(SyncedState {
            ecosystem: config.ecosystem.clone(),
            bootstrapped_version: node_version().await?,
            checksum: manifest.checksum.clone(),
        })
    }

    async fn run(
        &self,
        _config: &EnvironmentConfig,
        env_path: &Path,
        unit: &ExecutableUnit,
        log: &LogSink,
    ) -> Result<RunResult> {
        let mut command = Command::new("npm");
        command
            .arg("exec")
            .arg(format!("--prefix={}", env_path.display()))
            .arg(&unit.hook.command)
            .arg("--");
        push_unit_args(&mut command, unit);
        apply_hook_env(&mut command, unit);

        let status = stream_command(command, &unit.log_prefix(), log).await?;
        Ok(if status.success() {
            RunResult::Ok
        } else {
            RunResult::Error
        })
    }
}
