//! The `goose install-hooks` command: wire goose into git.
//!
//! Writes a pre-commit script running the staged selection and a pre-push
//! script feeding the ref protocol into `exec-pre-push`. Both scripts pin
//! the current executable and the resolved config path.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;

use crate::git::{git_command, git_stdout};
use crate::utils::{atomic_write, ensure_dir, sh_quote};

#[derive(Debug, Args)]
pub struct InstallHooksArgs {
    #[command(flatten)]
    pub config: super::ConfigOption,
}

fn pre_commit_script(executable: &str, config_path: &str) -> String {
    format!(
        "#!/bin/sh\n\
         set -e\n\
         GOOSE={goose}\n\
         CONFIG={config}\n\
         \"$GOOSE\" run --config \"$CONFIG\" --select staged \"$@\" < /dev/stdin\n",
        goose = sh_quote(executable),
        config = sh_quote(config_path),
    )
}

fn pre_push_script(executable: &str, config_path: &str) -> String {
    format!(
        "#!/bin/sh\n\
         set -e\n\
         GOOSE={goose}\n\
         CONFIG={config}\n\
         \"$GOOSE\" exec-pre-push --remote \"$1\" --config \"$CONFIG\" < /dev/stdin\n",
        goose = sh_quote(executable),
        config = sh_quote(config_path),
    )
}

fn install_script(hooks_dir: &Path, name: &str, contents: &str) -> Result<()> {
    let path = hooks_dir.join(name);
    atomic_write(&path, contents.as_bytes())?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
            .with_context(|| format!("failed marking {} executable", path.display()))?;
    }
    println!("installed {}", path.display());
    Ok(())
}

pub async fn execute(args: InstallHooksArgs) -> Result<i32> {
    // Validate the config before pinning it into the scripts.
    crate::config::load_config(&args.config.config)?;
    let config_path = args
        .config
        .config
        .canonicalize()
        .context("failed resolving config path")?;

    let stdout = git_stdout(git_command(["rev-parse", "--git-dir"])).await?;
    let git_dir = PathBuf::from(String::from_utf8_lossy(&stdout).trim());
    let hooks_dir = git_dir.join("hooks");
    ensure_dir(&hooks_dir)?;

    let executable = std::env::current_exe().context("cannot determine own executable path")?;
    let executable = executable.to_string_lossy();
    let config_path = config_path.to_string_lossy();

    install_script(
        &hooks_dir,
        "pre-commit",
        &pre_commit_script(&executable, &config_path),
    )?;
    install_script(
        &hooks_dir,
        "pre-push",
        &pre_push_script(&executable, &config_path),
    )?;
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripts_quote_awkward_paths() {
        let script = pre_commit_script("/opt/my tools/goose", "/repo/goose.yaml");
        assert!(script.contains("GOOSE='/opt/my tools/goose'"));
        assert!(script.contains("CONFIG=/repo/goose.yaml"));
        assert!(script.starts_with("#!/bin/sh\n"));
    }

    #[test]
    fn pre_push_script_forwards_remote_and_stdin() {
        let script = pre_push_script("/usr/bin/goose", "/repo/goose.yaml");
        assert!(script.contains(r#"exec-pre-push --remote "$1""#));
        assert!(script.contains("< /dev/stdin"));
    }
}
