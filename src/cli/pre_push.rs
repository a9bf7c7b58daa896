//! The `goose exec-pre-push` command.
//!
//! Invoked by the installed pre-push script with the ref protocol on stdin.
//! Every pushed ref contributes its affected paths; hooks then run over the
//! union, exactly as `goose run` would over a selector.

use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use crate::context::gather_context;
use crate::environment::lifecycle::prepare_environments;
use crate::git::pre_push::{parse_push_events, paths_for_event};
use crate::process::LogSink;
use crate::scheduler::Scheduler;
use crate::targets::targets_from_paths;

#[derive(Debug, Args)]
pub struct PrePushArgs {
    /// Name of the remote being pushed to (first hook argument).
    #[arg(long)]
    pub remote: String,

    #[command(flatten)]
    pub config: super::ConfigOption,

    /// Maximum units running at once (default: one per core, minimum 2).
    #[arg(long, value_name = "N")]
    pub max_running: Option<usize>,
}

pub async fn execute(args: PrePushArgs) -> Result<i32> {
    let context = gather_context(&args.config.config)?;

    let events = parse_push_events(std::io::stdin().lock())?;
    let mut paths: BTreeSet<PathBuf> = BTreeSet::new();
    for event in &events {
        paths.extend(paths_for_event(&args.remote, event).await?);
    }
    let targets = targets_from_paths(&context.config, paths);

    prepare_environments(context.environments.values(), false).await?;

    let mut scheduler = Scheduler::new(
        &context,
        &targets,
        None,
        args.max_running,
        LogSink::stderr(),
    )?;
    scheduler.until_complete(super::run::print_event).await?;
    Ok(scheduler.outcome().exit_code())
}
