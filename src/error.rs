//! Typed failure taxonomy for goose operations.
//!
//! Most call sites propagate [`anyhow::Error`] with context attached; the
//! variants here exist for the failures callers need to tell apart — most
//! importantly [`GooseError::NeedsFreeze`], which maps to its own exit code so
//! shell hooks can tell "your hooks failed" apart from "your lock files are
//! stale, run `goose upgrade`".

use std::path::PathBuf;

use thiserror::Error;

/// Errors with semantics beyond "something went wrong".
///
/// Unit-level outcomes (a hook exiting non-zero, a hook modifying files) are
/// *not* errors: they are recovered locally as
/// [`RunResult`](crate::backend::RunResult) values and only influence the
/// overall exit code.
#[derive(Debug, Error)]
pub enum GooseError {
    /// Lock files are missing or out of date with the configured dependencies
    /// and the caller did not request an upgrade.
    #[error(
        "environment {id:?} needs freezing: lock files are missing or do not \
         match the configured dependencies (run `goose upgrade`)"
    )]
    NeedsFreeze {
        /// Environment that needs freezing.
        id: String,
    },

    /// The configuration document is structurally valid YAML but violates a
    /// schema invariant (unknown environment reference, duplicate id, ...).
    #[error("invalid configuration: {reason}")]
    ConfigurationInvalid {
        /// Human-readable description of the violated invariant.
        reason: String,
    },

    /// A persisted lock manifest failed validation, indicating on-disk
    /// corruption or manual editing.
    #[error("invalid lock manifest at {path}: {reason}")]
    ManifestInvalid {
        /// Path of the offending manifest file.
        path: PathBuf,
        /// What the validator rejected.
        reason: String,
    },

    /// Lock files changed between the freeze check and the sync check.
    ///
    /// The lifecycle always evaluates freezing before syncing, so observing
    /// a config or lock-file mismatch at sync time is a programmer bug, not
    /// a user-recoverable condition.
    #[error(
        "environment {id:?}: lock files do not match the manifest during \
         sync ({detail}); freezing is always checked before syncing, so this \
         should not occur"
    )]
    LockfileChecksumMismatch {
        /// Environment whose sync pre-check failed.
        id: String,
        /// The mismatch the pre-check reported.
        detail: String,
    },

    /// An ecosystem recipe subprocess failed.
    #[error("{operation} failed: {detail}")]
    BackendFailure {
        /// The lifecycle step or command that failed.
        operation: String,
        /// Exit status or failure description.
        detail: String,
    },

    /// The working tree is in a shape the status parser does not handle
    /// (submodules, unmerged entries).
    #[error("not supported: {0}")]
    NotSupported(String),
}

/// Exit code for a fatal error, honoring the exit discipline.
///
/// [`GooseError::NeedsFreeze`] gets a distinct code so callers can prompt for
/// `goose upgrade`; everything else is a plain failure. Usage errors exit 2
/// via clap before any of this runs.
#[must_use]
pub fn error_exit_code(error: &anyhow::Error) -> i32 {
    match error.downcast_ref::<GooseError>() {
        Some(GooseError::NeedsFreeze { .. }) => 3,
        _ => 1,
    }
}
