//! Working-tree status snapshots for post-run change detection.
//!
//! A snapshot is the sorted list of changed files (relative to HEAD and the
//! index) restricted to a unit's targets, each with three object ids: HEAD,
//! index, and worktree. Two snapshots taken around a hook run differ exactly
//! when the hook touched tracked content, which is what the scheduler
//! reports as a `modified` outcome.
//!
//! The parser consumes `git status --porcelain=v2 -z` records. The worktree
//! object id is not part of the porcelain output; it is derived per entry:
//! hashed from the working tree when the two-letter status says the worktree
//! may differ from the index, taken from the index when they agree, and the
//! entry is skipped entirely when the file is deleted. Submodules, unmerged
//! entries, and untracked entries are out of scope and rejected.

use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::error::GooseError;

use super::{git_command, git_stdout, hash_object, nul_split};

/// Worktree status codes meaning the working tree may differ from the
/// index, so the content must be hashed from disk.
const READ_WORKTREE_CODES: &[&str] = &[
    // Not updated.
    ".A", ".M",
    // Updated in index.
    "MM", "MT",
    // Type changed in index.
    "TM", "TT",
    // Added to index.
    "AM", "AT",
    // Renamed in index.
    "RM", "RT",
    // Copied in index.
    "CM", "CT",
    // Type changed in work tree since index.
    ".T",
    // Renamed in worktree.
    ".R",
    // Copied in worktree.
    ".C",
];

/// Worktree status codes meaning index and worktree agree.
const USE_INDEX_CODES: &[&str] = &["M.", "T.", "A.", "R.", "C."];

/// Worktree status codes for deleted files, which have no worktree content.
const SKIP_CODES: &[&str] = &[
    // Deleted in worktree.
    ".D", "MD", "TD", "AD", "RD", "CD",
    // Deleted from index.
    "D.",
];

/// One changed file in a status snapshot.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ChangedFile {
    pub path: PathBuf,
    pub head_oid: String,
    pub index_oid: String,
    pub worktree_oid: String,
}

#[derive(Debug, PartialEq, Eq)]
enum WorktreeSource {
    HashWorkingTree,
    UseIndex,
}

#[derive(Debug, PartialEq, Eq)]
struct RawEntry {
    path: PathBuf,
    head_oid: String,
    index_oid: String,
    source: WorktreeSource,
}

fn not_supported(what: &str) -> anyhow::Error {
    GooseError::NotSupported(what.to_string()).into()
}

/// Parse nul-separated porcelain v2 records into raw entries.
///
/// Rename records (`2 …`) are followed by a separate nul-terminated origin
/// path, which is consumed and discarded.
fn parse_entries(raw: &[u8]) -> Result<Vec<RawEntry>> {
    let records = nul_split(raw);
    let mut entries = Vec::new();
    let mut iter = records.iter();

    while let Some(record) = iter.next() {
        let (kind, rest) = match record.split_once(' ') {
            Some(split) => split,
            // Headers like "# branch.oid …" have no payload we care about.
            None => continue,
        };

        let field_count = match kind {
            // "1 XY sub mH mI mW hH hI path"
            "1" => 8,
            // "2 XY sub mH mI mW hH hI Xscore path", origin path follows.
            "2" => 9,
            "u" => return Err(not_supported("unmerged entries")),
            "?" => return Err(not_supported("untracked entries")),
            "#" | "!" => continue,
            other => {
                return Err(not_supported(&format!(
                    "unexpected status record type {other:?}"
                )));
            }
        };

        let fields: Vec<&str> = rest.splitn(field_count, ' ').collect();
        if fields.len() != field_count {
            anyhow::bail!("malformed status record: {record:?}");
        }
        let status = fields[0];
        let submodule_state = fields[1];
        let head_oid = fields[5];
        let index_oid = fields[6];
        let path = fields[field_count - 1];

        if submodule_state != "N..." {
            return Err(not_supported("submodules"));
        }
        if kind == "2" {
            // Consume the origin path of the rename.
            iter.next();
        }

        let source = if READ_WORKTREE_CODES.contains(&status) {
            WorktreeSource::HashWorkingTree
        } else if USE_INDEX_CODES.contains(&status) {
            WorktreeSource::UseIndex
        } else if SKIP_CODES.contains(&status) {
            continue;
        } else {
            return Err(not_supported(&format!("unexpected file status {status:?}")));
        };

        entries.push(RawEntry {
            path: PathBuf::from(path),
            head_oid: head_oid.to_string(),
            index_oid: index_oid.to_string(),
            source,
        });
    }

    Ok(entries)
}

/// Snapshot the status of `targets` (the whole tree when empty).
pub async fn git_status(targets: &BTreeSet<PathBuf>) -> Result<Vec<ChangedFile>> {
    let mut args: Vec<String> = vec![
        "status".to_string(),
        // https://git-scm.com/docs/git-status#_untracked_files_and_performance
        "--untracked-files=no".to_string(),
        "--porcelain=v2".to_string(),
        "-z".to_string(),
        "--".to_string(),
    ];
    args.extend(targets.iter().map(|path| path.to_string_lossy().into_owned()));

    let stdout = git_stdout(git_command(args))
        .await
        .context("failed reading git status")?;

    let mut changed = Vec::new();
    for entry in parse_entries(&stdout)? {
        let worktree_oid = match entry.source {
            WorktreeSource::HashWorkingTree => hash_object(&entry.path).await?,
            WorktreeSource::UseIndex => entry.index_oid.clone(),
        };
        changed.push(ChangedFile {
            path: entry.path,
            head_oid: entry.head_oid,
            index_oid: entry.index_oid,
            worktree_oid,
        });
    }
    changed.sort();
    Ok(changed)
}
