//! The python ecosystem backend: virtualenv sandboxes locked with pip-tools.
//!
//! Bootstrap creates a virtualenv and installs pip-tools into it; freeze
//! compiles the configured dependencies into a hash-pinned
//! `requirements.txt`; sync drives `pip-sync`, which installs exactly the
//! compiled set and uninstalls everything else. Hooks run with the
//! virtualenv's `bin` directory prepended to `PATH`.

use std::path::{Path, PathBuf};

use anyhow::Result;
use async_trait::async_trait;
use tokio::process::Command;

use crate::config::{EnvironmentConfig, Language};
use crate::environment::{InitialStage, InitialState, SyncedState};
use crate::manifest::{LockManifest, build_manifest};
use crate::planner::ExecutableUnit;
use crate::process::{LogSink, run_step, stream_command};
use crate::utils::ensure_dir;

use super::{
    Backend, RunResult, apply_hook_env, capture_version_line, push_unit_args, verify_version,
};

pub struct PythonBackend;

fn venv_bin(env_path: &Path) -> PathBuf {
    env_path.join("bin")
}

fn venv_python(env_path: &Path) -> PathBuf {
    venv_bin(env_path).join("python")
}

/// Environment for pip invocations during bootstrap/freeze/sync.
fn pip_env(command: &mut Command) {
    command
        .env("PYTHONUNBUFFERED", "1")
        .env("PIP_REQUIRE_VIRTUALENV", "true")
        .env("PIP_DISABLE_PIP_VERSION_CHECK", "true");
}

async fn interpreter_version(env_path: &Path) -> Result<String> {
    let mut command = Command::new(venv_python(env_path));
    command.args(["-c", "import platform; print(platform.python_version())"]);
    capture_version_line(command, "probing python version").await
}

#[async_trait]
impl Backend for PythonBackend {
    fn language(&self) -> Language {
        Language::Python
    }

    async fn bootstrap(
        &self,
        config: &EnvironmentConfig,
        env_path: &Path,
        prior_manifest: Option<&LockManifest>,
    ) -> Result<InitialState> {
        let log = LogSink::stderr();
        let prefix = format!("[{}] ", config.id);

        if !venv_python(env_path).exists() {
            let mut command = Command::new("python3");
            command.arg("-m").arg("venv").arg(env_path);
            pip_env(&mut command);
            run_step(command, &prefix, &log, "creating virtualenv").await?;
        }

        let mut command = Command::new(venv_python(env_path));
        command.args(["-m", "pip", "install", "pip-tools"]);
        pip_env(&mut command);
        run_step(command, &prefix, &log, "installing pip-tools").await?;

        let version = interpreter_version(env_path).await?;
        verify_version(config, prior_manifest, &version, "bootstrapping python")?;

        Ok(InitialState {
            stage: InitialStage::Bootstrapped,
            ecosystem: config.ecosystem.clone(),
            bootstrapped_version: version,
        })
    }

    async fn freeze(
        &self,
        config: &EnvironmentConfig,
        env_path: &Path,
        lock_files_path: &Path,
    ) -> Result<(InitialState, LockManifest)> {
        let log = LogSink::stderr();
        let prefix = format!("[{}] ", config.id);
        ensure_dir(lock_files_path)?;

        let requirements_in = lock_files_path.join("requirements.in");
        let requirements_txt = lock_files_path.join("requirements.txt");

        let mut listed = config.dependencies.join("\n");
        listed.push('\n');
        std::fs::write(&requirements_in, listed)?;

        let mut command = Command::new(venv_bin(env_path).join("pip-compile"));
        command
            .arg("--upgrade")
            .arg("--strip-extras")
            .arg("--generate-hashes")
            .arg("--resolver=backtracking")
            .arg("--no-annotate")
            .arg("--no-header")
            .arg("--allow-unsafe")
            .arg(format!("--output-file={}", requirements_txt.display()))
            .arg(&requirements_in);
        pip_env(&mut command);
        let compiled = run_step(command, &prefix, &log, "freezing dependencies").await;
        // The requirements listing is an input, not a lock file; it never
        // outlives the freeze.
        let _ = std::fs::remove_file(&requirements_in);
        compiled?;

        let version = interpreter_version(env_path).await?;
        let manifest = build_manifest(
            &config.ecosystem,
            &config.dependencies,
            &[requirements_txt],
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

        let mut command = Command::new(venv_bin(env_path).join("pip-sync"));
        command.arg(lock_files_path.join("requirements.txt"));
        pip_env(&mut command);
        run_step(command, &prefix, &log, "syncing dependencies").await?;

        Ok(SyncedState {
            ecosystem: config.ecosystem.clone(),
            bootstrapped_version: interpreter_version(env_path).await?,
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
        let mut command = Command::new(&unit.hook.command);
        push_unit_args(&mut command, unit);
        apply_hook_env(&mut command, unit);

        // The virtualenv wins over any system installation of the hook.
        let mut paths = vec![venv_bin(env_path)];
        paths.extend(std::env::split_paths(
            &std::env::var_os("PATH").unwrap_or_default(),
        ));
        command.env("PATH", std::env::join_paths(paths)?);

        let status = stream_command(command, &unit.log_prefix(), log).await?;
        Ok(if status.success() {
            RunResult::Ok
        } else {
            RunResult::Error
        })
    }
}
