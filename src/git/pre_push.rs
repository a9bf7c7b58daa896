//! The pre-push change-set protocol.
//!
//! Git's pre-push hook feeds one line per ref being pushed on standard
//! input: `<local_ref> <local_oid> <remote_ref> <remote_oid>`, where either
//! object id may be the 40-zero sentinel meaning "no such object". Each line
//! translates into a [`PushEvent`]; the affected paths of every event are
//! resolved through git and handed to target selection.

use std::collections::BTreeSet;
use std::io::BufRead;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};

use super::{git_command, git_stdout, nul_split};

/// Object id sentinel denoting a nonexistent object.
pub const ZERO_OID: &str = "0000000000000000000000000000000000000000";

/// One ref update of a push, classified by which side exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushEvent {
    /// The remote ref is being deleted; no local object.
    Delete {
        remote_ref: String,
        remote_oid: String,
    },
    /// A ref new to the remote; no remote object to diff against.
    New {
        local_ref: String,
        local_oid: String,
        remote_ref: String,
    },
    /// A ref that exists on both sides.
    Update {
        local_ref: String,
        local_oid: String,
        remote_ref: String,
        remote_oid: String,
    },
}

/// Parse the pre-push stdin protocol.
pub fn parse_push_events(reader: impl BufRead) -> Result<Vec<PushEvent>> {
    let mut events = Vec::new();
    for line in reader.lines() {
        let line = line.context("failed reading pre-push input")?;
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        let [local_ref, local_oid, remote_ref, remote_oid] = fields[..] else {
            bail!("failed to parse pre-push change event from stdin; failing line: {line:?}");
        };
        let event = if local_oid == ZERO_OID {
            PushEvent::Delete {
                remote_ref: remote_ref.to_string(),
                remote_oid: remote_oid.to_string(),
            }
        } else if remote_oid == ZERO_OID {
            PushEvent::New {
                local_ref: local_ref.to_string(),
                local_oid: local_oid.to_string(),
                remote_ref: remote_ref.to_string(),
            }
        } else {
            PushEvent::Update {
                local_ref: local_ref.to_string(),
                local_oid: local_oid.to_string(),
                remote_ref: remote_ref.to_string(),
                remote_oid: remote_oid.to_string(),
            }
        };
        events.push(event);
    }
    Ok(events)
}

/// Paths touched by commits that are new to `remote`.
///
/// Walks every commit reachable from `local_oid` but from no ref of the
/// remote, collecting the files each commit touches.
async fn new_branch_paths(remote: &str, local_oid: &str) -> Result<BTreeSet<PathBuf>> {
    let revisions = git_stdout(git_command([
        "rev-list",
        local_oid,
        "--topo-order",
        "--reverse",
        "--not",
        &format!("--remotes={remote}"),
    ]))
    .await?;

    let mut paths = BTreeSet::new();
    for revision in String::from_utf8_lossy(&revisions).split_whitespace() {
        let shown = git_stdout(git_command([
            "show",
            "--name-only",
            "--pretty=",
            "-z",
            revision,
        ]))
        .await?;
        paths.extend(nul_split(&shown).into_iter().map(PathBuf::from));
    }
    Ok(paths)
}

/// Paths changed between the remote and local tips of an updated ref.
async fn updated_branch_paths(remote_oid: &str, local_oid: &str) -> Result<BTreeSet<PathBuf>> {
    let stdout = git_stdout(git_command([
        "diff",
        "--name-only",
        "-z",
        "--diff-filter=ACMR",
        &format!("{remote_oid}..{local_oid}"),
    ]))
    .await?;
    Ok(nul_split(&stdout).into_iter().map(PathBuf::from).collect())
}

/// Resolve the paths affected by one push event.
///
/// Deletions contribute nothing: there is no local content to check.
pub async fn paths_for_event(remote: &str, event: &PushEvent) -> Result<BTreeSet<PathBuf>> {
    match event {
        PushEvent::Delete { .. } => Ok(BTreeSet::new()),
        PushEvent::New { local_oid, .. } => new_branch_paths(remote, local_oid).await,
        PushEvent::Update {
            local_oid,
            remote_oid,
            ..
        } => updated_branch_paths(remote_oid, local_oid).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OID_A: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const OID_B: &str = "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";

    #[test]
    fn classifies_update() {
        let input = format!("refs/heads/main {OID_A} refs/heads/main {OID_B}\n");
        let events = parse_push_events(input.as_bytes()).unwrap();
        assert_eq!(
            events,
            vec![PushEvent::Update {
                local_ref: "refs/heads/main".to_string(),
                local_oid: OID_A.to_string(),
                remote_ref: "refs/heads/main".to_string(),
                remote_oid: OID_B.to_string(),
            }]
        );
    }

    #[test]
    fn classifies_new_branch() {
        let input = format!("refs/heads/feature {OID_A} refs/heads/feature {ZERO_OID}\n");
        let events = parse_push_events(input.as_bytes()).unwrap();
        assert!(matches!(events[0], PushEvent::New { .. }));
    }

    #[test]
    fn classifies_deletion() {
        let input = format!("(delete) {ZERO_OID} refs/heads/old {OID_B}\n");
        let events = parse_push_events(input.as_bytes()).unwrap();
        assert!(matches!(events[0], PushEvent::Delete { .. }));
    }

    #[test]
    fn rejects_malformed_lines() {
        let error = parse_push_events("one two three\n".as_bytes()).unwrap_err();
        assert!(error.to_string().contains("failing line"));
    }

    #[test]
    fn skips_blank_lines() {
        let input = format!("\nrefs/heads/main {OID_A} refs/heads/main {OID_B}\n\n");
        assert_eq!(parse_push_events(input.as_bytes()).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn deletion_contributes_no_paths() {
        let event = PushEvent::Delete {
            remote_ref: "refs/heads/old".to_string(),
            remote_oid: OID_B.to_string(),
        };
        assert!(paths_for_event("origin", &event).await.unwrap().is_empty());
    }
}
