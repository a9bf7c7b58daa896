//! Ecosystem backends.
//!
//! A backend is the plugin for one language family, providing the four
//! capabilities the environment lifecycle drives: `bootstrap` (create the
//! sandbox and pin a concrete ecosystem version), `freeze` (resolve
//! dependencies into deterministic lock files and describe them in a
//! manifest), `sync` (make the sandbox contain exactly what the manifest
//! pins), and `run` (execute a hook command inside the sandbox).
//!
//! Nothing ecosystem-specific leaks past this interface: the lifecycle and
//! the scheduler only ever talk to `dyn Backend`.

pub mod node;
pub mod python;
pub mod system;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::config::{EcosystemConfig, EnvironmentConfig, Language};
use crate::environment::{InitialState, SyncedState};
use crate::manifest::LockManifest;
use crate::planner::ExecutableUnit;
use crate::process::LogSink;

/// Terminal outcome of one executable unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunResult {
    /// The hook exited zero and left the tree untouched.
    Ok,
    /// The hook exited non-zero.
    Error,
    /// The hook exited zero but changed tracked files.
    Modified,
}

impl std::fmt::Display for RunResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RunResult::Ok => "ok",
            RunResult::Error => "error",
            RunResult::Modified => "modified",
        };
        f.write_str(name)
    }
}

/// Capability set every ecosystem provides.
///
/// All operations receive the environment's configuration and sandbox path;
/// freeze and sync additionally receive the environment's lockfiles
/// directory. Implementations must be idempotent where the lifecycle retries
/// them (`bootstrap` over an existing sandbox is a no-op apart from version
/// verification).
#[async_trait]
pub trait Backend: Send + Sync {
    /// The language family this backend owns.
    fn language(&self) -> Language;

    /// Create the sandbox if needed and pin a concrete ecosystem version.
    ///
    /// The version must satisfy the configured constraint — or match the
    /// version already pinned in `prior_manifest` when one is supplied, so a
    /// re-bootstrapped sandbox keeps running what the lock files were
    /// resolved against.
    async fn bootstrap(
        &self,
        config: &EnvironmentConfig,
        env_path: &Path,
        prior_manifest: Option<&LockManifest>,
    ) -> Result<InitialState>;

    /// Resolve the configured dependencies and write deterministic lock
    /// files under `lock_files_path`.
    ///
    /// The returned manifest describes exactly the files that exist on disk
    /// when the call returns; the lifecycle persists it.
    async fn freeze(
        &self,
        config: &EnvironmentConfig,
        env_path: &Path,
        lock_files_path: &Path,
    ) -> Result<(InitialState, LockManifest)>;

    /// Install exactly what `manifest` pins, removing anything extraneous.
    async fn sync(
        &self,
        config: &EnvironmentConfig,
        env_path: &Path,
        lock_files_path: &Path,
        manifest: &LockManifest,
    ) -> Result<SyncedState>;

    /// Execute the unit's hook command inside the sandbox.
    ///
    /// Target files are appended to the command line iff the hook is
    /// parameterized. A non-zero exit is [`RunResult::Error`], not an
    /// `Err`: hook failures are unit outcomes, not backend failures.
    async fn run(
        &self,
        config: &EnvironmentConfig,
        env_path: &Path,
        unit: &ExecutableUnit,
        log: &LogSink,
    ) -> Result<RunResult>;
}

/// Look up the backend for an ecosystem.
#[must_use]
pub fn load_backend(ecosystem: &EcosystemConfig) -> Arc<dyn Backend> {
    match ecosystem.language {
        Language::Python => Arc::new(python::PythonBackend),
        Language::Node => Arc::new(node::NodeBackend),
        Language::System => Arc::new(system::SystemBackend),
    }
}

/// Whether a resolved version satisfies the requested constraint.
///
/// Constraints are opaque prefixes: `"3.12"` accepts `3.12.4` but not
/// `3.1.2`. No constraint accepts anything.
#[must_use]
pub(crate) fn version_satisfies(resolved: &str, constraint: Option<&str>) -> bool {
    match constraint {
        None => true,
        Some(constraint) => {
            resolved == constraint
                || resolved
                    .strip_prefix(constraint)
                    .is_some_and(|rest| rest.starts_with('.'))
        }
    }
}

/// Append the hook's own arguments, then the unit's target files.
///
/// Non-parameterized units carry an empty target set, so this appends
/// nothing extra for them.
pub(crate) fn push_unit_args(command: &mut tokio::process::Command, unit: &ExecutableUnit) {
    command.args(&unit.hook.args);
    command.args(unit.targets.iter());
}

/// Apply the hook's extra environment variables in declaration order.
pub(crate) fn apply_hook_env(command: &mut tokio::process::Command, unit: &ExecutableUnit) {
    for (key, value) in &unit.hook.env_vars {
        command.env(key, value);
    }
}

/// Run a version-probe command and return its first stdout line.
pub(crate) async fn capture_version_line(
    mut command: tokio::process::Command,
    operation: &str,
) -> Result<String> {
    let output = command
        .output()
        .await
        .with_context(|| format!("{operation}: failed running probe"))?;
    if !output.status.success() {
        return Err(crate::error::GooseError::BackendFailure {
            operation: operation.to_string(),
            detail: format!(
                "{}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        }
        .into());
    }
    let line = String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .unwrap_or_default()
        .trim()
        .to_string();
    if line.is_empty() {
        anyhow::bail!("{operation}: probe produced no output");
    }
    Ok(line)
}

/// Resolve the version constraint to verify against: an existing manifest
/// pins the exact version, otherwise the configured constraint applies.
pub(crate) fn effective_constraint<'a>(
    config: &'a EnvironmentConfig,
    prior_manifest: Option<&'a LockManifest>,
) -> Option<&'a str> {
    prior_manifest
        .map(|manifest| manifest.ecosystem_version.as_str())
        .or(config.ecosystem.version.as_deref())
}

/// Verify a resolved version against the effective constraint.
pub(crate) fn verify_version(
    config: &EnvironmentConfig,
    prior_manifest: Option<&LockManifest>,
    resolved: &str,
    operation: &str,
) -> Result<()> {
    let constraint = effective_constraint(config, prior_manifest);
    if !version_satisfies(resolved, constraint) {
        return Err(crate::error::GooseError::BackendFailure {
            operation: operation.to_string(),
            detail: format!(
                "resolved {} {resolved:?} does not satisfy required {:?}",
                config.ecosystem.language,
                constraint.unwrap_or_default()
            ),
        }
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_backend_maps_languages() {
        for (language, version) in [
            (Language::Python, Some("3.12".to_string())),
            (Language::Node, Some("20".to_string())),
            (Language::System, None),
        ] {
            let ecosystem = EcosystemConfig { language, version };
            assert_eq!(load_backend(&ecosystem).language(), language);
        }
    }

    #[test]
    fn version_constraint_is_a_component_prefix() {
        assert!(version_satisfies("3.12.4", Some("3.12")));
        assert!(version_satisfies("3.12.4", Some("3.12.4")));
        assert!(version_satisfies("3.12", Some("3.12")));
        assert!(!version_satisfies("3.1.2", Some("3.12")));
        assert!(!version_satisfies("3.120.0", Some("3.12")));
        assert!(version_satisfies("anything", None));
    }
}
