//! Git plumbing shared by target selection, change detection, and the
//! pre-push protocol.
//!
//! All invocations go through [`git_command`], which sets
//! `GIT_OPTIONAL_LOCKS=0` so status queries never take the index lock behind
//! the user's back, and through [`git_stdout`], which captures stdout and
//! relays stderr to the debug log.

pub mod pre_push;
pub mod status;

use std::path::Path;

use anyhow::{Context, Result, bail};
use tokio::process::Command;

/// A `git` command with the shared environment applied.
#[must_use]
pub fn git_command<I, S>(args: I) -> Command
where
    I: IntoIterator<Item = S>,
    S: AsRef<std::ffi::OsStr>,
{
    let mut command = Command::new("git");
    command.args(args);
    // https://git-scm.com/docs/git-status#_background_refresh
    command.env("GIT_OPTIONAL_LOCKS", "0");
    command.kill_on_drop(true);
    command
}

/// Run a git command and return its raw stdout.
///
/// Non-zero exit is an error carrying the command's stderr; on success any
/// stderr chatter goes to the debug log.
pub async fn git_stdout(mut command: Command) -> Result<Vec<u8>> {
    let output = command.output().await.context("failed running git")?;
    if !output.status.success() {
        bail!(
            "git exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    if !output.stderr.is_empty() {
        tracing::debug!(stderr = %String::from_utf8_lossy(&output.stderr).trim(), "git");
    }
    Ok(output.stdout)
}

/// Split nul-separated output into non-empty trimmed strings.
///
/// Also tolerates trailing newlines, which some git commands emit after the
/// final nul.
#[must_use]
pub fn nul_split(joined: &[u8]) -> Vec<String> {
    joined
        .split(|&byte| byte == 0)
        .map(|chunk| String::from_utf8_lossy(chunk).trim().to_string())
        .filter(|chunk| !chunk.is_empty())
        .collect()
}

/// Content hash of a working-tree file, as git would store it.
pub async fn hash_object(path: &Path) -> Result<String> {
    let path_arg = path.to_string_lossy();
    let stdout = git_stdout(git_command(["hash-object", path_arg.as_ref()])).await?;
    let hash = String::from_utf8_lossy(&stdout).trim().to_string();
    if hash.is_empty() {
        bail!("failed getting hash-object for file {}", path.display());
    }
    Ok(hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nul_split_handles_plain_and_terminated_output() {
        assert_eq!(nul_split(b""), Vec::<String>::new());
        assert_eq!(nul_split(b"foo"), vec!["foo"]);
        assert_eq!(nul_split(b"hello\n"), vec!["hello"]);
        assert_eq!(nul_split(b"foo\0bar\n"), vec!["foo", "bar"]);
        assert_eq!(nul_split(b"foo\0 bar\0baz \n"), vec!["foo", "bar", "baz"]);
        assert_eq!(nul_split(b"foo\0\0bar"), vec!["foo", "bar"]);
    }
}
