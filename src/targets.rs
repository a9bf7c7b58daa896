//! Candidate file selection and the include/exclude pipeline.
//!
//! A *target* is a path the run might hand to hooks, together with its
//! classification tags. Targets are enumerated from git under one of three
//! selectors, or handed in directly by the pre-push code path, then filtered
//! through the configuration's `limit`/`exclude` patterns plus the built-in
//! exclude for the tool's own state directory.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use clap::ValueEnum;

use crate::config::{Config, HookConfig, Pattern, path_matches_patterns};
use crate::git::{git_command, git_stdout, nul_split};
use crate::tags::tags_for_path;

/// A candidate file plus its classification tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub path: PathBuf,
    pub tags: BTreeSet<String>,
}

/// Which set of git-known paths to enumerate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Selector {
    /// Every tracked file.
    All,
    /// Worktree changes against HEAD (added/copied/modified/renamed).
    Diff,
    /// Index changes against HEAD, same filter.
    Staged,
}

/// Paths under the tool's own state directory are never hook targets.
static BUILTIN_EXCLUDES: LazyLock<Vec<Pattern>> = LazyLock::new(|| {
    vec![Pattern::new(r"^\.goose/.*").expect("builtin exclude pattern is valid")]
});

async fn git_file_list(selector: Selector) -> Result<Vec<PathBuf>> {
    let args: &[&str] = match selector {
        Selector::All => &["ls-files", "-z"],
        Selector::Diff => &["diff", "--name-only", "-z", "--diff-filter=ACMR", "HEAD"],
        Selector::Staged => &["diff", "--name-only", "-z", "--diff-filter=ACMR", "--cached"],
    };
    let stdout = git_stdout(git_command(args.iter().copied()))
        .await
        .context("failed listing files from git")?;
    Ok(nul_split(&stdout).into_iter().map(PathBuf::from).collect())
}

/// Whether the top-level filtering pipeline includes `path`.
fn included(config: &Config, path: &Path) -> bool {
    if !config.limit.is_empty() && !path_matches_patterns(path, &config.limit) {
        return false;
    }
    if path_matches_patterns(path, &config.exclude) {
        return false;
    }
    !path_matches_patterns(path, &BUILTIN_EXCLUDES)
}

fn as_target(path: PathBuf) -> Target {
    let tags = tags_for_path(&path);
    Target { path, tags }
}

/// Enumerate, filter, and tag candidate files from git.
///
/// Paths git knows about but which are absent on disk (deleted but still
/// tracked under [`Selector::All`]) are skipped.
pub async fn select_targets(config: &Config, selector: Selector) -> Result<Vec<Target>> {
    let targets = git_file_list(selector)
        .await?
        .into_iter()
        .filter(|path| path.exists())
        .filter(|path| included(config, path))
        .map(as_target)
        .collect();
    Ok(targets)
}

/// Filter and tag an externally supplied path set (the pre-push code path).
#[must_use]
pub fn targets_from_paths(
    config: &Config,
    paths: impl IntoIterator<Item = PathBuf>,
) -> Vec<Target> {
    paths
        .into_iter()
        .filter(|path| path.exists())
        .filter(|path| included(config, path))
        .map(as_target)
        .collect()
}

/// The file set one hook actually runs over.
///
/// Non-parameterized hooks take no files at all. Parameterized hooks take
/// the already-filtered targets, restricted by the hook's type tags and its
/// own `limit`/`exclude` patterns. The result is sorted, which fixes the
/// unit partition order downstream.
#[must_use]
pub fn filter_hook_targets(hook: &HookConfig, targets: &[Target]) -> BTreeSet<PathBuf> {
    if !hook.parameterize {
        return BTreeSet::new();
    }

    targets
        .iter()
        .filter(|target| {
            hook.types.is_empty() || target.tags.iter().any(|tag| hook.types.contains(tag))
        })
        .filter(|target| {
            hook.limit.is_empty() || path_matches_patterns(&target.path, &hook.limit)
        })
        .filter(|target| !path_matches_patterns(&target.path, &hook.exclude))
        .map(|target| target.path.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    fn config(yaml: &str) -> Config {
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        config.validate().unwrap();
        config
    }

    fn base_config() -> Config {
        config(indoc! {r#"
            version: 0
            environments:
              - id: python
                ecosystem: {language: python, version: "3.12"}
                dependencies: [ruff]
            hooks:
              - id: ruff
                environment: python
                command: ruff
        "#})
    }

    fn target(path: &str) -> Target {
        as_target(PathBuf::from(path))
    }

    #[test]
    fn state_directory_is_always_excluded() {
        let config = base_config();
        assert!(!included(&config, Path::new(".goose/python/manifest.json")));
        assert!(included(&config, Path::new("src/app.py")));
    }

    #[test]
    fn top_level_limit_restricts_candidates() {
        let mut config = base_config();
        config.limit = vec![Pattern::new(r"^src/").unwrap()];
        assert!(included(&config, Path::new("src/app.py")));
        assert!(!included(&config, Path::new("docs/guide.md")));
    }

    #[test]
    fn top_level_exclude_drops_candidates() {
        let mut config = base_config();
        config.exclude = vec![Pattern::new(r"^vendored/").unwrap()];
        assert!(!included(&config, Path::new("vendored/lib.py")));
        assert!(included(&config, Path::new("src/app.py")));
    }

    #[test]
    fn hook_types_intersect_target_tags() {
        let mut hook = base_config().hooks[0].clone();
        hook.types = ["python".to_string()].into_iter().collect();
        let targets = vec![target("src/app.py"), target("README.md")];
        let selected = filter_hook_targets(&hook, &targets);
        assert_eq!(
            selected.into_iter().collect::<Vec<_>>(),
            vec![PathBuf::from("src/app.py")]
        );
    }

    #[test]
    fn hook_without_types_takes_everything() {
        let hook = base_config().hooks[0].clone();
        let targets = vec![target("src/app.py"), target("README.md")];
        assert_eq!(filter_hook_targets(&hook, &targets).len(), 2);
    }

    #[test]
    fn hook_limit_and_exclude_apply() {
        let mut hook = base_config().hooks[0].clone();
        hook.limit = vec![Pattern::new(r"\.py$").unwrap()];
        hook.exclude = vec![Pattern::new(r"^tests/").unwrap()];
        let targets = vec![
            target("src/app.py"),
            target("tests/test_app.py"),
            target("README.md"),
        ];
        let selected = filter_hook_targets(&hook, &targets);
        assert_eq!(
            selected.into_iter().collect::<Vec<_>>(),
            vec![PathBuf::from("src/app.py")]
        );
    }

    #[test]
    fn non_parameterized_hook_takes_no_files() {
        let mut hook = base_config().hooks[0].clone();
        hook.parameterize = false;
        let targets = vec![target("src/app.py")];
        assert!(filter_hook_targets(&hook, &targets).is_empty());
    }
}
