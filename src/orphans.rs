//! Orphan environment detection.
//!
//! Renaming or deleting an environment in the configuration leaves its old
//! sandbox behind in the cache. The probe points them out on every run and
//! deletes them when asked.

use std::collections::BTreeSet;

use anyhow::{Context, Result};

use crate::context::Context as RunContext;

/// Warn about sandboxes no configured environment owns; delete them when
/// `delete` is set.
pub fn probe_orphan_environments(context: &RunContext, delete: bool) -> Result<()> {
    let configured: BTreeSet<&str> = context
        .environments
        .keys()
        .map(String::as_str)
        .collect();

    let entries = std::fs::read_dir(&context.environments_path).with_context(|| {
        format!(
            "failed listing environments in {}",
            context.environments_path.display()
        )
    })?;

    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if configured.contains(name.as_str()) {
            continue;
        }
        if delete {
            tracing::info!(environment = %name, "deleting orphan environment");
            std::fs::remove_dir_all(entry.path()).with_context(|| {
                format!("failed deleting orphan environment {}", entry.path().display())
            })?;
        } else {
            tracing::warn!(environment = %name, "orphan environment");
        }
    }
    Ok(())
}
