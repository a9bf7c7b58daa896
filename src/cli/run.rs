//! The `goose run` command.

use anyhow::{Context as _, Result};
use clap::Args;
use colored::Colorize;

use crate::backend::RunResult;
use crate::context::gather_context;
use crate::environment::lifecycle::prepare_environments;
use crate::orphans::probe_orphan_environments;
use crate::process::LogSink;
use crate::scheduler::{Scheduler, SchedulerEvent};
use crate::targets::{Selector, select_targets};

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Run only this hook instead of every configured one.
    #[arg(value_name = "HOOK")]
    pub hook: Option<String>,

    #[command(flatten)]
    pub config: super::ConfigOption,

    /// Which files to run over.
    #[arg(long, value_enum, default_value_t = Selector::Diff)]
    pub select: Selector,

    /// Delete sandboxes no configured environment owns.
    #[arg(long)]
    pub delete_orphan_environments: bool,

    /// Maximum units running at once (default: one per core, minimum 2).
    #[arg(long, value_name = "N")]
    pub max_running: Option<usize>,
}

/// Print one line per scheduler event.
pub(crate) fn print_event(event: &SchedulerEvent) {
    match event {
        SchedulerEvent::UnitScheduled(unit) => {
            let files = unit.targets.len();
            println!(
                "{} {}started ({files} {})",
                "·".dimmed(),
                unit.log_prefix(),
                if files == 1 { "file" } else { "files" }
            );
        }
        SchedulerEvent::UnitFinished(unit, result) => {
            let marker = match result {
                RunResult::Ok => "✓".green(),
                RunResult::Error => "✗".red(),
                RunResult::Modified => "~".yellow(),
            };
            println!("{marker} {}{result}", unit.log_prefix());
        }
    }
}

pub async fn execute(args: RunArgs) -> Result<i32> {
    let context = gather_context(&args.config.config)?;

    // Enumerate targets concurrently with environment preparation; both can
    // take a while and neither depends on the other.
    let targets_task = tokio::spawn({
        let config = context.config.clone();
        let select = args.select;
        async move { select_targets(&config, select).await }
    });

    probe_orphan_environments(&context, args.delete_orphan_environments)?;

    prepare_environments(context.environments.values(), false).await?;
    tracing::info!("all environments ready");

    let targets = targets_task.await.context("target listing task died")??;

    let mut scheduler = Scheduler::new(
        &context,
        &targets,
        args.hook.as_deref(),
        args.max_running,
        LogSink::stderr(),
    )?;
    scheduler.until_complete(print_event).await?;
    Ok(scheduler.outcome().exit_code())
}
