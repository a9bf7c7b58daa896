//! The system ecosystem backend: hooks that run whatever the host provides.
//!
//! There is nothing to install, so the sandbox is an empty directory and the
//! "lock file" is a pin list recording which system commands the environment
//! declared — enough to give the manifest real content and to notice when
//! the declaration changes.

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use tokio::process::Command;

use crate::config::{EnvironmentConfig, Language};
use crate::environment::{InitialStage, InitialState, SyncedState};
use crate::manifest::{LockManifest, build_manifest};
use crate::planner::ExecutableUnit;
use crate::process::{LogSink, stream_command};
use crate::utils::{atomic_write, ensure_dir};

use super::{Backend, RunResult, apply_hook_env, push_unit_args};

pub struct SystemBackend;

/// File recording the declared system dependencies.
const LOCK_FILE_NAME: &str = "system.lock";

fn host_version() -> String {
    format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH)
}

#[async_trait]
impl Backend for SystemBackend {
    fn language(&self) -> Language {
        Language::System
    }

    async fn bootstrap(
        &self,
        config: &EnvironmentConfig,
        env_path: &Path,
        _prior_manifest: Option<&LockManifest>,
    ) -> Result<InitialState> {
        ensure_dir(env_path)?;
        Ok(InitialState {
            stage: InitialStage::Bootstrapped,
            ecosystem: config.ecosystem.clone(),
            bootstrapped_version: host_version(),
        })
    }

    async fn freeze(
        &self,
        config: &EnvironmentConfig,
        _env_path: &Path,
        lock_files_path: &Path,
    ) -> Result<(InitialState, LockManifest)> {
        ensure_dir(lock_files_path)?;

        let mut pins: Vec<&str> = config.dependencies.iter().map(String::as_str).collect();
        pins.sort_unstable();
        pins.dedup();
        let mut listed = pins.join("\n");
        listed.push('\n');
        let lock_path = lock_files_path.join(LOCK_FILE_NAME);
        atomic_write(&lock_path, listed.as_bytes())?;

        let version = host_version();
        let manifest = build_manifest(
            &config.ecosystem,
            &config.dependencies,
            &[lock_path],
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
        _lock_files_path: &Path,
        manifest: &LockManifest,
    ) -> Result<SyncedState> {
        // Nothing to install; the host already provides the commands.
        ensure_dir(env_path)?;
        Ok(SyncedState {
            ecosystem: config.ecosystem.clone(),
            bootstrapped_version: host_version(),
            checksum: manifest.checksum.clone(),
        })
    }

    async fn run(
        &self,
        _config: &EnvironmentConfig,
        _env_path: &Path,
        unit: &ExecutableUnit,
        log: &LogSink,
    ) -> Result<RunResult> {
        let mut command = Command::new(&unit.hook.command);
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EcosystemConfig;
    use tempfile::TempDir;

    fn config() -> EnvironmentConfig {
        EnvironmentConfig {
            id: "host".to_string(),
            ecosystem: EcosystemConfig {
                language: Language::System,
                version: None,
            },
            dependencies: vec!["shellcheck".to_string(), "actionlint".to_string()],
        }
    }

    #[tokio::test]
    async fn freeze_writes_a_sorted_pin_list() {
        let dir = TempDir::new().unwrap();
        let env = dir.path().join("env");
        let locks = dir.path().join("locks");

        let backend = SystemBackend;
        let (state, manifest) = backend.freeze(&config(), &env, &locks).await.unwrap();

        assert_eq!(state.stage, InitialStage::Frozen);
        let pins = std::fs::read_to_string(locks.join(LOCK_FILE_NAME)).unwrap();
        assert_eq!(pins, "actionlint\nshellcheck\n");
        assert_eq!(manifest.lock_files.len(), 1);
        assert_eq!(manifest.lock_files[0].path, LOCK_FILE_NAME);
    }

    #[tokio::test]
    async fn bootstrap_then_sync_round_trips_the_checksum() {
        let dir = TempDir::new().unwrap();
        let env = dir.path().join("env");
        let locks = dir.path().join("locks");

        let backend = SystemBackend;
        let initial = backend.bootstrap(&config(), &env, None).await.unwrap();
        assert_eq!(initial.stage, InitialStage::Bootstrapped);

        let (_, manifest) = backend.freeze(&config(), &env, &locks).await.unwrap();
        let synced = backend
            .sync(&config(), &env, &locks, &manifest)
            .await
            .unwrap();
        assert_eq!(synced.checksum, manifest.checksum);
    }

    #[tokio::test]
    async fn run_appends_targets_for_parameterized_hooks() {
        use std::sync::Arc;

        let dir = TempDir::new().unwrap();
        let hook: crate::config::HookConfig = serde_yaml::from_str(
            r#"
            id: echo
            environment: host
            command: echo
            args: [before]
            "#,
        )
        .unwrap();
        let unit = ExecutableUnit {
            id: 0,
            hook: Arc::new(hook),
            targets: [std::path::PathBuf::from("a.txt")].into_iter().collect(),
        };

        let log = LogSink::memory();
        let backend = SystemBackend;
        let result = backend
            .run(&config(), dir.path(), &unit, &log)
            .await
            .unwrap();
        assert_eq!(result, RunResult::Ok);
        assert_eq!(log.captured(), vec!["[echo@0] [stdout] before a.txt"]);
    }
}
