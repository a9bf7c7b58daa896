//! Splitting hooks into executable units.
//!
//! A hook that takes files is split into one unit per core (at most), each
//! carrying an equal-ish batch of the hook's filtered target set. Hooks that
//! take no files become a single unit with an empty file set.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::HookConfig;
use crate::targets::{Target, filter_hook_targets};

/// One concrete execution of a hook over one batch of target files.
///
/// `id` is unique within the hook, counting from zero in partition order.
/// `targets` is empty exactly when the hook is non-parameterized.
#[derive(Debug, Clone)]
pub struct ExecutableUnit {
    pub id: u32,
    pub hook: Arc<HookConfig>,
    pub targets: BTreeSet<PathBuf>,
}

/// Identity of a unit within a plan: hook id plus unit id.
pub type UnitKey = (String, u32);

impl ExecutableUnit {
    /// Identity within the plan.
    #[must_use]
    pub fn key(&self) -> UnitKey {
        (self.hook.id.clone(), self.id)
    }

    /// Stable prefix for every log line the unit produces.
    #[must_use]
    pub fn log_prefix(&self) -> String {
        format!("[{}@{}] ", self.hook.id, self.id)
    }

    /// Whether this unit shares any target file with `other`.
    #[must_use]
    pub fn overlaps(&self, other: &BTreeSet<PathBuf>) -> bool {
        self.targets.intersection(other).next().is_some()
    }
}

impl PartialEq for ExecutableUnit {
    fn eq(&self, other: &Self) -> bool {
        self.hook.id == other.hook.id && self.id == other.id
    }
}

impl Eq for ExecutableUnit {}

/// Number of units to aim for: one per core, floored at two.
#[must_use]
pub fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(std::num::NonZero::get)
        .unwrap_or(2)
        .max(2)
}

/// Split `hook` over the (already top-level-filtered) targets.
///
/// Non-parameterized hooks always yield a single unit with no files.
/// Parameterized hooks whose filtered file set is empty yield nothing — the
/// hook is skipped for this run. Otherwise the sorted file set is cut into
/// `ceil(n / P)`-sized batches, one unit each, in partition order.
#[must_use]
pub fn hook_as_executable_units(hook: &Arc<HookConfig>, targets: &[Target]) -> Vec<ExecutableUnit> {
    if !hook.parameterize {
        return vec![ExecutableUnit {
            id: 0,
            hook: Arc::clone(hook),
            targets: BTreeSet::new(),
        }];
    }

    let target_files = filter_hook_targets(hook, targets);
    if target_files.is_empty() {
        tracing::info!(hook = %hook.id, "skipped: no matching files");
        return Vec::new();
    }

    let parallelism = default_parallelism();
    let batch_size = target_files.len().div_ceil(parallelism);
    let files: Vec<PathBuf> = target_files.into_iter().collect();
    files
        .chunks(batch_size)
        .enumerate()
        .map(|(id, batch)| ExecutableUnit {
            id: u32::try_from(id).expect("unit count fits in u32"),
            hook: Arc::clone(hook),
            targets: batch.iter().cloned().collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use indoc::indoc;

    fn hook(yaml_override: &str) -> Arc<HookConfig> {
        let yaml = format!(
            indoc! {r#"
                version: 0
                environments:
                  - id: python
                    ecosystem: {{language: python, version: "3.12"}}
                    dependencies: [ruff]
                hooks:
                  - id: ruff
                    environment: python
                    command: ruff
                    {}
            "#},
            yaml_override
        );
        let config: Config = serde_yaml::from_str(&yaml).unwrap();
        Arc::new(config.hooks[0].clone())
    }

    fn python_targets(count: usize) -> Vec<Target> {
        (0..count)
            .map(|index| {
                let path = PathBuf::from(format!("src/module_{index:03}.py"));
                let tags = crate::tags::tags_for_path(&path);
                Target { path, tags }
            })
            .collect()
    }

    #[test]
    fn non_parameterized_hook_yields_single_empty_unit() {
        let hook = hook("parameterize: false");
        let units = hook_as_executable_units(&hook, &python_targets(10));
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].id, 0);
        assert!(units[0].targets.is_empty());
    }

    #[test]
    fn parameterized_hook_with_no_files_is_skipped() {
        let hook = hook("types: [rust]");
        let units = hook_as_executable_units(&hook, &python_targets(10));
        assert!(units.is_empty());
    }

    #[test]
    fn units_partition_all_files_without_overlap() {
        let hook = hook("");
        let targets = python_targets(25);
        let units = hook_as_executable_units(&hook, &targets);

        assert!(!units.is_empty());
        assert!(units.len() <= default_parallelism());
        let ids: Vec<u32> = units.iter().map(|unit| unit.id).collect();
        assert_eq!(ids, (0..units.len() as u32).collect::<Vec<_>>());

        let mut seen = BTreeSet::new();
        for unit in &units {
            for path in &unit.targets {
                assert!(seen.insert(path.clone()), "{} batched twice", path.display());
            }
        }
        assert_eq!(seen.len(), targets.len());
    }

    #[test]
    fn batch_sizes_are_balanced() {
        let hook = hook("");
        let units = hook_as_executable_units(&hook, &python_targets(7));
        let batch_size = 7usize.div_ceil(default_parallelism());
        assert!(units.iter().all(|unit| unit.targets.len() <= batch_size));
    }

    #[test]
    fn log_prefix_names_hook_and_unit() {
        let hook = hook("");
        let units = hook_as_executable_units(&hook, &python_targets(3));
        assert_eq!(units[0].log_prefix(), "[ruff@0] ");
    }
}
