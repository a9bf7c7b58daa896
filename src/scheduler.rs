//! The file-set-aware concurrent scheduler.
//!
//! The scheduler turns the configured hooks and the selected targets into a
//! plan of [`ExecutableUnit`]s, then drives them to completion under two
//! constraints: never more than `max_running` units at once, and never two
//! units that could race on the same file. Admission is first-fit in plan
//! order — for each candidate, in order, admit it when
//!
//! 1. nothing is running, or
//! 2. its file set is disjoint from the union of all running file sets, or
//! 3. it and every running unit are read-only.
//!
//! Rule 2 prevents two hooks from racing on a file; rule 3 lets read-only
//! hooks that merely share inputs run in parallel anyway. Candidates that
//! fail admission stay queued and are reconsidered every time a slot frees
//! up, so progress is guaranteed: each wait completes at least one unit.
//! First-fit in plan order is deliberate; no fairness between starving units
//! is promised.
//!
//! All bookkeeping happens on the calling task. Parallelism comes solely
//! from the spawned unit tasks, which communicate only by completion, so
//! there is no shared mutable state to guard. Consumers observe a totally
//! ordered event stream: exactly one [`SchedulerEvent::UnitScheduled`]
//! before exactly one [`SchedulerEvent::UnitFinished`] per unit.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use futures::future::select_all;
use tokio::task::JoinHandle;

use crate::backend::RunResult;
use crate::config::HookConfig;
use crate::context::Context;
use crate::error::GooseError;
use crate::planner::{ExecutableUnit, UnitKey, default_parallelism, hook_as_executable_units};
use crate::process::LogSink;
use crate::targets::Target;

/// One step of scheduler progress.
#[derive(Debug, Clone)]
pub enum SchedulerEvent {
    /// The unit was admitted and its task started.
    UnitScheduled(ExecutableUnit),
    /// The unit's task completed with a terminal outcome.
    UnitFinished(ExecutableUnit, RunResult),
}

/// Where a unit currently is, as reported by [`Scheduler::state`].
///
/// An opaque status token instead of a task handle: displays only need the
/// three-way distinction, and handles stay under the scheduler's exclusive
/// ownership.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitStatus {
    Pending,
    Running,
    Done(RunResult),
}

/// Aggregate outcome over every unit of a completed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// No unit failed, but at least one modified tracked files.
    Modified,
    /// At least one unit failed.
    Error,
}

impl Outcome {
    /// Process exit code under the exit discipline.
    #[must_use]
    pub fn exit_code(self) -> i32 {
        match self {
            Outcome::Success => 0,
            Outcome::Modified | Outcome::Error => 1,
        }
    }
}

struct RunningUnit {
    unit: ExecutableUnit,
    handle: JoinHandle<Result<RunResult>>,
}

/// Admission-controlled runner for one plan of units.
pub struct Scheduler {
    environments: BTreeMap<String, Arc<crate::environment::Environment>>,
    plan: Vec<(Arc<HookConfig>, Vec<ExecutableUnit>)>,
    remaining: Vec<ExecutableUnit>,
    running: Vec<RunningUnit>,
    results: BTreeMap<UnitKey, RunResult>,
    max_running: usize,
    log: LogSink,
}

impl Scheduler {
    /// Plan the run up front.
    ///
    /// Every configured hook (or just `selected_hook`) is split into units
    /// over `targets`. An unknown selection — or a configuration with no
    /// hooks at all — is a fatal configuration error, not an empty run.
    pub fn new(
        context: &Context,
        targets: &[Target],
        selected_hook: Option<&str>,
        max_running: Option<usize>,
        log: LogSink,
    ) -> Result<Self> {
        let plan: Vec<(Arc<HookConfig>, Vec<ExecutableUnit>)> = context
            .config
            .hooks
            .iter()
            .filter(|hook| selected_hook.is_none_or(|selected| hook.id == selected))
            .map(|hook| {
                let hook = Arc::new(hook.clone());
                let units = hook_as_executable_units(&hook, targets);
                (hook, units)
            })
            .collect();

        if plan.is_empty() {
            let reason = match selected_hook {
                None => "no hooks configured".to_string(),
                Some(selected) => format!("unknown hook id: {selected:?}"),
            };
            return Err(GooseError::ConfigurationInvalid { reason }.into());
        }

        let remaining = plan
            .iter()
            .flat_map(|(_, units)| units.iter().cloned())
            .collect();

        Ok(Self {
            environments: context.environments.clone(),
            plan,
            remaining,
            running: Vec::new(),
            results: BTreeMap::new(),
            // Below one slot nothing could ever run.
            max_running: max_running.unwrap_or_else(default_parallelism).max(1),
            log,
        })
    }

    /// Union of the target files of every running unit.
    fn running_file_set(&self) -> BTreeSet<PathBuf> {
        self.running
            .iter()
            .flat_map(|running| running.unit.targets.iter().cloned())
            .collect()
    }

    fn can_admit(&self, unit: &ExecutableUnit) -> bool {
        if self.running.is_empty() {
            return true;
        }
        // Recomputed per admission attempt; plans are tens of units over
        // hundreds of files, where the naive recompute is cheap.
        if !unit.overlaps(&self.running_file_set()) {
            return true;
        }
        unit.hook.read_only
            && self
                .running
                .iter()
                .all(|running| running.unit.hook.read_only)
    }

    fn spawn_unit(&mut self, index: usize) -> SchedulerEvent {
        let unit = self.remaining.remove(index);
        let environment = self
            .environments
            .get(&unit.hook.environment)
            .expect("config validation guarantees the hook's environment exists");
        let handle = tokio::spawn({
            let environment = Arc::clone(environment);
            let task_unit = unit.clone();
            let log = self.log.clone();
            async move { environment.run(&task_unit, &log).await }
        });
        self.running.push(RunningUnit {
            unit: unit.clone(),
            handle,
        });
        tracing::debug!(unit = %unit.log_prefix().trim(), "scheduled");
        SchedulerEvent::UnitScheduled(unit)
    }

    /// Admit as many queued units as the rules allow right now.
    fn schedule_max(&mut self) -> Vec<SchedulerEvent> {
        let mut events = Vec::new();
        let mut index = 0;
        while index < self.remaining.len() {
            if self.running.len() >= self.max_running {
                break;
            }
            if self.can_admit(&self.remaining[index]) {
                events.push(self.spawn_unit(index));
                // The next candidate slid into `index`.
            } else {
                index += 1;
            }
        }
        debug_assert!(self.running.len() <= self.max_running);
        events
    }

    fn record_finish(
        &mut self,
        unit: ExecutableUnit,
        joined: std::result::Result<Result<RunResult>, tokio::task::JoinError>,
    ) -> Result<SchedulerEvent> {
        let result =
            joined.with_context(|| format!("unit task {} died", unit.log_prefix().trim()))??;
        self.results.insert(unit.key(), result);
        tracing::debug!(unit = %unit.log_prefix().trim(), result = %result, "finished");
        Ok(SchedulerEvent::UnitFinished(unit, result))
    }

    /// Wait for the first running unit to complete, then harvest every unit
    /// that is done by that point.
    async fn wait_next(&mut self) -> Result<Vec<SchedulerEvent>> {
        debug_assert!(!self.running.is_empty());
        let (joined, index, _) = {
            let futures = self.running.iter_mut().map(|running| &mut running.handle);
            select_all(futures).await
        };
        let RunningUnit { unit, .. } = self.running.swap_remove(index);
        let mut events = vec![self.record_finish(unit, joined)?];

        let mut cursor = 0;
        while cursor < self.running.len() {
            if self.running[cursor].handle.is_finished() {
                let RunningUnit { unit, handle } = self.running.swap_remove(cursor);
                let joined = handle.await;
                events.push(self.record_finish(unit, joined)?);
            } else {
                cursor += 1;
            }
        }
        Ok(events)
    }

    /// Drive the plan to completion, reporting each event to `observer`.
    ///
    /// Repeatedly admits everything admissible, then waits for the next
    /// completion. Within one iteration all `UnitScheduled` events are
    /// delivered before any `UnitFinished`.
    pub async fn until_complete<F>(&mut self, mut observer: F) -> Result<()>
    where
        F: FnMut(&SchedulerEvent),
    {
        while !self.remaining.is_empty() {
            for event in self.schedule_max() {
                observer(&event);
            }
            if self.remaining.is_empty() {
                break;
            }
            for event in self.wait_next().await? {
                observer(&event);
            }
        }

        while !self.running.is_empty() {
            for event in self.wait_next().await? {
                observer(&event);
            }
        }
        Ok(())
    }

    /// Cheap, non-blocking snapshot of every unit's position, grouped by
    /// hook in plan order.
    #[must_use]
    pub fn state(&self) -> Vec<(Arc<HookConfig>, Vec<(ExecutableUnit, UnitStatus)>)> {
        self.plan
            .iter()
            .map(|(hook, units)| {
                let statuses = units
                    .iter()
                    .map(|unit| {
                        let status = if let Some(result) = self.results.get(&unit.key()) {
                            UnitStatus::Done(*result)
                        } else if self.running.iter().any(|running| running.unit == *unit) {
                            UnitStatus::Running
                        } else {
                            UnitStatus::Pending
                        };
                        (unit.clone(), status)
                    })
                    .collect();
                (Arc::clone(hook), statuses)
            })
            .collect()
    }

    /// Classify the aggregate outcome after [`Scheduler::until_complete`]
    /// has drained.
    #[must_use]
    pub fn outcome(&self) -> Outcome {
        let results = self.results.values();
        if results.clone().any(|result| *result == RunResult::Error) {
            Outcome::Error
        } else if results
            .clone()
            .any(|result| *result == RunResult::Modified)
        {
            Outcome::Modified
        } else {
            Outcome::Success
        }
    }
}

impl Drop for Scheduler {
    /// Aborting the run aborts outstanding unit tasks; their child
    /// processes die with them (kill-on-drop) and are reaped by the
    /// runtime. Units cancel independently of one another.
    fn drop(&mut self) {
        for running in &self.running {
            running.handle.abort();
        }
    }
}
