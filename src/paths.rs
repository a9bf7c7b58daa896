//! Where environments live on disk.
//!
//! Sandboxes are kept out of the repository, under the user's cache
//! directory, keyed by a hash of the checkout's absolute path so distinct
//! checkouts never share sandboxes:
//!
//! ```text
//! $XDG_CACHE_HOME/goose/<sha256(cwd)>/<environment_id>/
//! ```
//!
//! Lock files, by contrast, belong to the repository (they are committed),
//! under `./.goose/<environment_id>/`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

use crate::utils::ensure_dir;

fn cache_home() -> Result<PathBuf> {
    if let Some(xdg_home) = std::env::var_os("XDG_CACHE_HOME") {
        return Ok(PathBuf::from(xdg_home));
    }
    let home = home::home_dir().context("cannot determine home directory")?;
    Ok(home.join(".cache"))
}

/// The environments root for the current checkout, created if absent.
pub fn environments_root() -> Result<PathBuf> {
    let cwd = std::env::current_dir()
        .context("cannot determine working directory")?
        .canonicalize()
        .context("cannot canonicalize working directory")?;
    let digest = Sha256::digest(cwd.as_os_str().as_encoded_bytes());
    let root = cache_home()?.join("goose").join(hex::encode(digest));
    ensure_dir(&root)?;
    Ok(root)
}

/// The lock files root inside the repository, created if absent.
pub fn lock_files_root() -> Result<PathBuf> {
    let root = std::env::current_dir()
        .context("cannot determine working directory")?
        .join(".goose");
    ensure_dir(&root)?;
    Ok(root)
}
