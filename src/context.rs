//! Assembled run context: configuration plus environment handles.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;

use crate::config::{Config, load_config};
use crate::environment::{Environment, build_environments};
use crate::paths;

/// Everything a command needs to operate: the loaded configuration, the two
/// directory roots, and one [`Environment`] handle per configured
/// environment.
#[derive(Debug)]
pub struct Context {
    pub config: Config,
    /// Repository-local root holding per-environment lockfiles directories.
    pub lock_files_path: PathBuf,
    /// Cache-home root holding per-environment sandboxes.
    pub environments_path: PathBuf,
    pub environments: BTreeMap<String, Arc<Environment>>,
}

/// Load configuration and discover every environment's persisted state.
pub fn gather_context(config_path: &Path) -> Result<Context> {
    let config = load_config(config_path)?;
    let lock_files_path = paths::lock_files_root()?;
    let environments_path = paths::environments_root()?;
    let environments = build_environments(&config, &environments_path, &lock_files_path)?;
    Ok(Context {
        config,
        lock_files_path,
        environments_path,
        environments,
    })
}
