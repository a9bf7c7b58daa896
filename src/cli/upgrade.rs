//! The `goose upgrade` command: re-freeze dependencies in every environment.
//!
//! Upgrade always re-resolves and re-freezes, then syncs — the only path
//! through which committed lock files legitimately change.

use anyhow::Result;
use clap::Args;

use crate::context::gather_context;
use crate::environment::lifecycle::prepare_environments;

#[derive(Debug, Args)]
pub struct UpgradeArgs {
    #[command(flatten)]
    pub config: super::ConfigOption,
}

pub async fn execute(args: UpgradeArgs) -> Result<i32> {
    let context = gather_context(&args.config.config)?;
    prepare_environments(context.environments.values(), true).await?;
    tracing::info!("all environments up-to-date");
    Ok(0)
}
