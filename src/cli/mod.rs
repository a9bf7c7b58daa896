//! Command-line interface.
//!
//! One module per subcommand, each owning its clap `Args` struct and an
//! `execute` function returning the process exit code:
//!
//! - [`run`] — run hooks over a selection of files
//! - [`upgrade`] — re-freeze and sync every environment
//! - [`pre_push`] — run hooks over the change set of a push (`exec-pre-push`)
//! - [`git_hooks`] — install the pre-commit / pre-push scripts
//!
//! Exit discipline: `0` success, `1` hook error or modified files (and any
//! fatal error), `2` usage errors via clap, `3` stale lock files
//! ([`GooseError::NeedsFreeze`](crate::error::GooseError::NeedsFreeze)).

pub mod git_hooks;
pub mod pre_push;
pub mod run;
pub mod upgrade;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use crate::error::error_exit_code;

/// Run hooks over your source tree inside managed environments.
#[derive(Debug, Parser)]
#[command(name = "goose", version, about)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run hooks over the selected files.
    Run(run::RunArgs),
    /// Re-freeze dependencies and sync every environment.
    Upgrade(upgrade::UpgradeArgs),
    /// Run hooks over the change set of a push (invoked by the pre-push
    /// hook; reads the ref protocol from stdin).
    #[command(name = "exec-pre-push")]
    ExecPrePush(pre_push::PrePushArgs),
    /// Write the pre-commit and pre-push scripts into .git/hooks.
    InstallHooks(git_hooks::InstallHooksArgs),
}

/// Shared `--config` option.
#[derive(Debug, Args)]
pub struct ConfigOption {
    /// Path to the configuration file.
    #[arg(long = "config", value_name = "PATH", default_value = "goose.yaml")]
    pub config: PathBuf,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("GOOSE_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Parse arguments, dispatch, and map the result onto an exit code.
pub async fn run_cli() -> i32 {
    init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run(args) => run::execute(args).await,
        Commands::Upgrade(args) => upgrade::execute(args).await,
        Commands::ExecPrePush(args) => pre_push::execute(args).await,
        Commands::InstallHooks(args) => git_hooks::execute(args).await,
    };

    match result {
        Ok(code) => code,
        Err(error) => {
            eprintln!("{} {error:#}", "error:".red().bold());
            error_exit_code(&error)
        }
    }
}
