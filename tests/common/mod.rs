//! Shared fixtures for the integration tests.
//!
//! [`TestProject`] drives the built `goose` binary against a throwaway git
//! repository with an isolated cache home. [`RecordingBackend`] is an
//! in-process backend that counts lifecycle calls and fakes freeze output,
//! for exercising the lifecycle state machine without real ecosystems.

// Utilities are shared across test binaries; not every binary uses them all.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use tempfile::TempDir;

use goose_cli::backend::{Backend, RunResult};
use goose_cli::config::{EnvironmentConfig, Language};
use goose_cli::environment::{InitialStage, InitialState, SyncedState};
use goose_cli::manifest::{LockManifest, build_manifest};
use goose_cli::planner::ExecutableUnit;
use goose_cli::process::LogSink;

/// Git command wrapper for building repository fixtures.
pub struct TestGit {
    repo_path: PathBuf,
}

impl TestGit {
    pub fn new(repo_path: impl Into<PathBuf>) -> Self {
        Self {
            repo_path: repo_path.into(),
        }
    }

    fn run_git(&self, args: &[&str], action: &str) -> Result<std::process::Output> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.repo_path)
            .output()
            .with_context(|| action.to_string())?;
        if !output.status.success() {
            bail!("{action} failed: {}", String::from_utf8_lossy(&output.stderr));
        }
        Ok(output)
    }

    pub fn init(&self) -> Result<()> {
        self.run_git(&["init", "--initial-branch=main"], "git init")?;
        Ok(())
    }

    pub fn config_user(&self) -> Result<()> {
        self.run_git(
            &["config", "user.email", "goose@example.test"],
            "git config user.email",
        )?;
        self.run_git(&["config", "user.name", "Goose Tests"], "git config user.name")?;
        Ok(())
    }

    pub fn add(&self, path: &str) -> Result<()> {
        self.run_git(&["add", path], "git add")?;
        Ok(())
    }

    pub fn commit(&self, message: &str) -> Result<()> {
        self.run_git(&["commit", "-m", message, "--no-gpg-sign"], "git commit")?;
        Ok(())
    }

    pub fn rev_parse(&self, reference: &str) -> Result<String> {
        let output = self.run_git(&["rev-parse", reference], "git rev-parse")?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    pub fn remote_add(&self, name: &str, url: &str) -> Result<()> {
        self.run_git(&["remote", "add", name, url], "git remote add")?;
        Ok(())
    }

    pub fn push(&self, remote: &str, reference: &str) -> Result<()> {
        self.run_git(&["push", remote, reference], "git push")?;
        Ok(())
    }

    pub fn switch_new_branch(&self, name: &str) -> Result<()> {
        self.run_git(&["switch", "--create", name], "git switch --create")?;
        Ok(())
    }
}

/// Output of one binary invocation.
pub struct CommandOutput {
    pub status: std::process::ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn assert_success(&self) -> &Self {
        assert!(
            self.status.success(),
            "expected success, got {:?}\nstdout:\n{}\nstderr:\n{}",
            self.status.code(),
            self.stdout,
            self.stderr
        );
        self
    }

    pub fn assert_exit_code(&self, expected: i32) -> &Self {
        assert_eq!(
            self.status.code(),
            Some(expected),
            "stdout:\n{}\nstderr:\n{}",
            self.stdout,
            self.stderr
        );
        self
    }

    pub fn assert_stdout_contains(&self, needle: &str) -> &Self {
        assert!(
            self.stdout.contains(needle),
            "stdout does not contain {needle:?}:\n{}",
            self.stdout
        );
        self
    }

    pub fn assert_stderr_contains(&self, needle: &str) -> &Self {
        assert!(
            self.stderr.contains(needle),
            "stderr does not contain {needle:?}:\n{}",
            self.stderr
        );
        self
    }

    /// Indices of stdout lines containing `needle`, for ordering checks.
    pub fn stdout_line_positions(&self, needle: &str) -> Vec<usize> {
        self.stdout
            .lines()
            .enumerate()
            .filter(|(_, line)| line.contains(needle))
            .map(|(index, _)| index)
            .collect()
    }

    pub fn first_stdout_position(&self, needle: &str) -> usize {
        *self
            .stdout_line_positions(needle)
            .first()
            .unwrap_or_else(|| panic!("stdout does not contain {needle:?}:\n{}", self.stdout))
    }
}

/// A throwaway git repository plus isolated cache home, driven through the
/// built `goose` binary.
pub struct TestProject {
    root: TempDir,
}

impl TestProject {
    pub fn new() -> Result<Self> {
        let root = TempDir::new()?;
        std::fs::create_dir(root.path().join("repo"))?;
        std::fs::create_dir(root.path().join("cache"))?;
        let project = Self { root };
        let git = project.git();
        git.init()?;
        git.config_user()?;
        Ok(project)
    }

    pub fn repo_path(&self) -> PathBuf {
        self.root.path().join("repo")
    }

    fn cache_path(&self) -> PathBuf {
        self.root.path().join("cache")
    }

    pub fn git(&self) -> TestGit {
        TestGit::new(self.repo_path())
    }

    pub fn write_file(&self, relative: &str, contents: &str) -> Result<PathBuf> {
        let path = self.repo_path().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, contents)?;
        Ok(path)
    }

    pub fn write_config(&self, contents: &str) -> Result<PathBuf> {
        self.write_file("goose.yaml", contents)
    }

    /// Add and commit a file in one step.
    pub fn commit_file(&self, relative: &str, contents: &str) -> Result<()> {
        self.write_file(relative, contents)?;
        let git = self.git();
        git.add(relative)?;
        git.commit(&format!("add {relative}"))
    }

    /// Create a bare repository next to the project, usable as a remote.
    pub fn create_bare_remote(&self, name: &str) -> Result<PathBuf> {
        let path = self.root.path().join(name);
        let output = Command::new("git")
            .args(["init", "--bare", "--initial-branch=main"])
            .arg(&path)
            .output()
            .context("failed creating bare repository")?;
        if !output.status.success() {
            bail!("git init --bare failed: {}", String::from_utf8_lossy(&output.stderr));
        }
        Ok(path)
    }

    /// Run the `goose` binary inside the repository.
    pub fn run_goose(&self, args: &[&str]) -> Result<CommandOutput> {
        self.run_goose_with_stdin(args, "")
    }

    /// Same, feeding `input` on standard input (the pre-push protocol).
    pub fn run_goose_with_stdin(&self, args: &[&str], input: &str) -> Result<CommandOutput> {
        use std::io::Write;
        use std::process::Stdio;

        let mut child = Command::new(env!("CARGO_BIN_EXE_goose"))
            .args(args)
            .current_dir(self.repo_path())
            .env("XDG_CACHE_HOME", self.cache_path())
            .env("NO_COLOR", "1")
            .env("GOOSE_LOG", "info")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .context("failed spawning goose binary")?;
        child
            .stdin
            .take()
            .expect("stdin was piped")
            .write_all(input.as_bytes())
            .context("failed writing goose stdin")?;
        let output = child
            .wait_with_output()
            .context("failed running goose binary")?;
        Ok(CommandOutput {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// In-process backend that records lifecycle calls.
///
/// Freeze writes a single `deps.lock` file listing the configured
/// dependencies, so manifests behave exactly like real ones (checksums
/// change when dependencies change).
pub struct RecordingBackend {
    language: Language,
    pub bootstrap_calls: AtomicUsize,
    pub freeze_calls: AtomicUsize,
    pub sync_calls: AtomicUsize,
    pub run_calls: AtomicUsize,
}

impl RecordingBackend {
    pub fn new(language: Language) -> Arc<Self> {
        Arc::new(Self {
            language,
            bootstrap_calls: AtomicUsize::new(0),
            freeze_calls: AtomicUsize::new(0),
            sync_calls: AtomicUsize::new(0),
            run_calls: AtomicUsize::new(0),
        })
    }

    /// `(bootstrap, freeze, sync, run)` call counts so far.
    pub fn counts(&self) -> (usize, usize, usize, usize) {
        (
            self.bootstrap_calls.load(Ordering::SeqCst),
            self.freeze_calls.load(Ordering::SeqCst),
            self.sync_calls.load(Ordering::SeqCst),
            self.run_calls.load(Ordering::SeqCst),
        )
    }
}

#[async_trait]
impl Backend for RecordingBackend {
    fn language(&self) -> Language {
        self.language
    }

    async fn bootstrap(
        &self,
        config: &EnvironmentConfig,
        env_path: &Path,
        _prior_manifest: Option<&LockManifest>,
    ) -> Result<InitialState> {
        self.bootstrap_calls.fetch_add(1, Ordering::SeqCst);
        std::fs::create_dir_all(env_path)?;
        Ok(InitialState {
            stage: InitialStage::Bootstrapped,
            ecosystem: config.ecosystem.clone(),
            bootstrapped_version: "1.0.0".to_string(),
        })
    }

    async fn freeze(
        &self,
        config: &EnvironmentConfig,
        _env_path: &Path,
        lock_files_path: &Path,
    ) -> Result<(InitialState, LockManifest)> {
        self.freeze_calls.fetch_add(1, Ordering::SeqCst);
        std::fs::create_dir_all(lock_files_path)?;
        let lock_path = lock_files_path.join("deps.lock");
        std::fs::write(&lock_path, format!("{}\n", config.dependencies.join("\n")))?;
        let manifest = build_manifest(
            &config.ecosystem,
            &config.dependencies,
            &[lock_path],
            lock_files_path,
            "1.0.0",
        )?;
        let state = InitialState {
            stage: InitialStage::Frozen,
            ecosystem: config.ecosystem.clone(),
            bootstrapped_version: "1.0.0".to_string(),
        };
        Ok((state, manifest))
    }

    async fn sync(
        &self,
        config: &EnvironmentConfig,
        _env_path: &Path,
        _lock_files_path: &Path,
        manifest: &LockManifest,
    ) -> Result<SyncedState> {
        self.sync_calls.fetch_add(1, Ordering::SeqCst);
        Ok(SyncedState {
            ecosystem: config.ecosystem.clone(),
            bootstrapped_version: "1.0.0".to_string(),
            checksum: manifest.checksum.clone(),
        })
    }

    async fn run(
        &self,
        _config: &EnvironmentConfig,
        _env_path: &Path,
        _unit: &ExecutableUnit,
        _log: &LogSink,
    ) -> Result<RunResult> {
        self.run_calls.fetch_add(1, Ordering::SeqCst);
        Ok(RunResult::Ok)
    }
}

/// Parse an [`EnvironmentConfig`] from YAML.
pub fn environment_config(yaml: &str) -> EnvironmentConfig {
    serde_yaml::from_str(yaml).expect("valid environment config")
}
