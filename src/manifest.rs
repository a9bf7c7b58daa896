//! Content-addressed lock manifests.
//!
//! Every environment owns a lockfiles directory (`.goose/<env_id>/`) holding
//! the ecosystem's lock files plus a `manifest.json` describing them: which
//! ecosystem and dependency set produced them, which concrete ecosystem
//! version was pinned, and a SHA-256 checksum per file. The manifest's own
//! checksum accumulates the per-file checksums in sorted order, so a single
//! string identifies the entire locked state. The lifecycle compares that
//! string against the persisted environment state to decide whether a sync
//! is needed at all.
//!
//! Checksums use the `"sha256:" + lowercase_hex` format throughout.
//!
//! [`check_lock_files`] is the heart of the module: a pure decision function
//! over the lockfiles directory that classifies drift, ordered so the most
//! actionable cause wins (configuration drift before lock-file tampering,
//! tampering before a stale state record).

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::{EcosystemConfig, EnvironmentConfig};
use crate::error::GooseError;

/// File name of the manifest inside an environment's lockfiles directory.
pub const MANIFEST_FILE: &str = "manifest.json";

/// One lock file as recorded in a manifest.
///
/// Ordering and equality consider the path only; two entries for the same
/// path are the same lock file, possibly with different contents. Content
/// comparisons are explicit checksum comparisons.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockFileEntry {
    /// Path relative to the environment's lockfiles directory.
    pub path: String,
    /// `"sha256:<hex>"` digest of the file contents.
    pub checksum: String,
}

impl PartialEq for LockFileEntry {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for LockFileEntry {}

impl PartialOrd for LockFileEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LockFileEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.path.cmp(&other.path)
    }
}

/// Content-addressed description of a locked environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockManifest {
    /// Ecosystem the lock files were resolved for.
    pub source_ecosystem: EcosystemConfig,
    /// Dependency requests the lock files were resolved from, sorted and
    /// de-duplicated.
    pub source_dependencies: Vec<String>,
    /// Concrete ecosystem version pinned at freeze time.
    pub ecosystem_version: String,
    /// Lock files on disk, sorted by path.
    pub lock_files: Vec<LockFileEntry>,
    /// Accumulation of the per-file checksums, in sorted order.
    pub checksum: String,
}

impl LockManifest {
    /// Validate the structural invariants: sorted-unique non-empty
    /// dependency and lock-file collections, and a top-level checksum that
    /// matches the accumulation of the per-file checksums.
    pub fn validate(&self) -> Result<(), String> {
        validate_sorted_unique_non_empty(&self.source_dependencies, "source_dependencies")?;
        let paths: Vec<&String> = self.lock_files.iter().map(|entry| &entry.path).collect();
        validate_sorted_unique_non_empty(&paths, "lock_files")?;
        let expected = accumulated_checksum(&self.lock_files);
        if self.checksum != expected {
            return Err(
                "checksum does not match accumulation of lock file checksums".to_string(),
            );
        }
        Ok(())
    }
}

fn validate_sorted_unique_non_empty<T: Ord + std::fmt::Debug>(
    values: &[T],
    field: &str,
) -> Result<(), String> {
    if values.is_empty() {
        return Err(format!("{field} must not be empty"));
    }
    for pair in values.windows(2) {
        match pair[0].cmp(&pair[1]) {
            Ordering::Less => {}
            Ordering::Equal => return Err(format!("{field} must be unique")),
            Ordering::Greater => return Err(format!("{field} must be sorted")),
        }
    }
    Ok(())
}

/// SHA-256 of a file's raw bytes in `"sha256:<hex>"` form.
pub fn file_checksum(path: &Path) -> Result<String> {
    let content = std::fs::read(path)
        .with_context(|| format!("cannot read file for checksum: {}", path.display()))?;
    let digest = Sha256::digest(&content);
    Ok(format!("sha256:{}", hex::encode(digest)))
}

/// Accumulate per-file checksums into the manifest checksum.
///
/// Hashes the checksum *strings* in iteration order; callers pass entries in
/// sorted order to make the result content-addressed.
#[must_use]
pub fn accumulated_checksum(lock_files: &[LockFileEntry]) -> String {
    let mut hasher = Sha256::new();
    for entry in lock_files {
        hasher.update(entry.checksum.as_bytes());
    }
    format!("sha256:{}", hex::encode(hasher.finalize()))
}

/// Read one lock file from disk into a manifest entry.
pub fn read_lock_file(lock_files_dir: &Path, path: &Path) -> Result<LockFileEntry> {
    let relative = path.strip_prefix(lock_files_dir).with_context(|| {
        format!(
            "lock file {} is not under {}",
            path.display(),
            lock_files_dir.display()
        )
    })?;
    Ok(LockFileEntry {
        path: relative.to_string_lossy().into_owned(),
        checksum: file_checksum(path)?,
    })
}

/// Assemble a manifest from lock files freshly written by a backend.
///
/// Reads and checksums every listed file, sorts and de-duplicates both
/// collections, and validates the result before returning it.
pub fn build_manifest(
    source_ecosystem: &EcosystemConfig,
    source_dependencies: &[String],
    lock_file_paths: &[PathBuf],
    lock_files_dir: &Path,
    ecosystem_version: &str,
) -> Result<LockManifest> {
    let mut lock_files: Vec<LockFileEntry> = lock_file_paths
        .iter()
        .map(|path| read_lock_file(lock_files_dir, path))
        .collect::<Result<_>>()?;
    lock_files.sort();
    lock_files.dedup();

    let mut dependencies: Vec<String> = source_dependencies.to_vec();
    dependencies.sort();
    dependencies.dedup();

    let checksum = accumulated_checksum(&lock_files);
    let manifest = LockManifest {
        source_ecosystem: source_ecosystem.clone(),
        source_dependencies: dependencies,
        ecosystem_version: ecosystem_version.to_string(),
        lock_files,
        checksum,
    };
    manifest.validate().map_err(|reason| GooseError::ManifestInvalid {
        path: lock_files_dir.join(MANIFEST_FILE),
        reason,
    })?;
    Ok(manifest)
}

/// Write `manifest.json`, atomically and durably.
///
/// Serialization is deterministic (fixed field order, sorted collections),
/// so equal manifests are byte-equal on disk. The file is written to a
/// temporary sibling, fsynced, and renamed over the destination so readers
/// in other processes observe either the old or the new manifest, never a
/// torn one.
pub fn write_manifest(lock_files_dir: &Path, manifest: &LockManifest) -> Result<()> {
    let path = lock_files_dir.join(MANIFEST_FILE);
    let serialized = serde_json::to_vec(manifest).context("failed serializing manifest")?;
    crate::utils::atomic_write(&path, &serialized)
        .with_context(|| format!("failed writing manifest {}", path.display()))?;
    tracing::debug!(path = %path.display(), "wrote manifest");
    Ok(())
}

/// Read and validate `manifest.json` from an environment's lockfiles
/// directory.
///
/// A missing file surfaces as the underlying [`std::io::Error`] with kind
/// `NotFound` so [`check_lock_files`] can classify it; any other read or
/// validation failure is [`GooseError::ManifestInvalid`].
pub fn read_manifest(lock_files_dir: &Path) -> Result<LockManifest> {
    let path = lock_files_dir.join(MANIFEST_FILE);
    let raw = match std::fs::read(&path) {
        Ok(raw) => raw,
        Err(error) if error.kind() == ErrorKind::NotFound => {
            return Err(anyhow::Error::new(error));
        }
        Err(error) => {
            return Err(anyhow::Error::new(GooseError::ManifestInvalid {
                path,
                reason: error.to_string(),
            }));
        }
    };
    let manifest: LockManifest =
        serde_json::from_slice(&raw).map_err(|error| GooseError::ManifestInvalid {
            path: path.clone(),
            reason: error.to_string(),
        })?;
    manifest
        .validate()
        .map_err(|reason| GooseError::ManifestInvalid { path, reason })?;
    Ok(manifest)
}

fn manifest_file_missing(error: &anyhow::Error) -> bool {
    error
        .downcast_ref::<std::io::Error>()
        .is_some_and(|io| io.kind() == ErrorKind::NotFound)
}

/// Classification of an environment's lock files against configuration and
/// persisted state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockFileStatus {
    /// A lock file listed in the manifest is absent on disk.
    MissingLockFile,
    /// The supplied state checksum disagrees with the manifest checksum.
    StateManifestMismatch,
    /// A lock file's current contents disagree with the manifest.
    ManifestLockFileMismatch,
    /// The manifest is absent, or was produced from a different ecosystem
    /// or dependency set than the current configuration.
    ConfigManifestMismatch,
    /// Everything agrees.
    Matching,
}

/// Classify the lockfiles directory against `config` and, when supplied,
/// against a persisted state checksum.
///
/// Evaluation order is significant and makes the most specific failure win:
///
/// 1. manifest absent → [`ConfigManifestMismatch`](LockFileStatus::ConfigManifestMismatch)
/// 2. manifest ecosystem ≠ configured ecosystem → same
/// 3. manifest dependency set ≠ configured dependency set → same
/// 4. listed lock file absent on disk → [`MissingLockFile`](LockFileStatus::MissingLockFile)
/// 5. listed lock file's recomputed checksum differs → [`ManifestLockFileMismatch`](LockFileStatus::ManifestLockFileMismatch)
/// 6. `state_checksum` supplied and ≠ manifest checksum → [`StateManifestMismatch`](LockFileStatus::StateManifestMismatch)
/// 7. otherwise → [`Matching`](LockFileStatus::Matching)
///
/// Config drift surfaces first because only a freeze can fix it; lock-file
/// absence is distinguished from tampering so the lifecycle can pick sync
/// over freeze. The function is a pure function of the directory contents
/// and its arguments.
pub fn check_lock_files(
    lock_files_dir: &Path,
    state_checksum: Option<&str>,
    config: &EnvironmentConfig,
) -> Result<LockFileStatus> {
    let manifest = match read_manifest(lock_files_dir) {
        Ok(manifest) => manifest,
        Err(error) if manifest_file_missing(&error) => {
            return Ok(LockFileStatus::ConfigManifestMismatch);
        }
        Err(error) => return Err(error),
    };

    if manifest.source_ecosystem != config.ecosystem {
        return Ok(LockFileStatus::ConfigManifestMismatch);
    }

    let configured: BTreeSet<&str> = config.dependencies.iter().map(String::as_str).collect();
    let recorded: BTreeSet<&str> = manifest
        .source_dependencies
        .iter()
        .map(String::as_str)
        .collect();
    if configured != recorded {
        return Ok(LockFileStatus::ConfigManifestMismatch);
    }

    for persisted in &manifest.lock_files {
        let path = lock_files_dir.join(&persisted.path);
        if !path.exists() {
            return Ok(LockFileStatus::MissingLockFile);
        }
        let actual = read_lock_file(lock_files_dir, &path)?;
        if actual.checksum != persisted.checksum {
            return Ok(LockFileStatus::ManifestLockFileMismatch);
        }
    }

    if let Some(state_checksum) = state_checksum {
        if state_checksum != manifest.checksum {
            return Ok(LockFileStatus::StateManifestMismatch);
        }
    }

    Ok(LockFileStatus::Matching)
}
