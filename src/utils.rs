//! Small filesystem and shell helpers shared across modules.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};

/// Write `contents` to `path` atomically and durably.
///
/// The bytes go to a temporary sibling first, are fsynced, and the file is
/// renamed over the destination. A crash mid-write leaves either the old
/// file or no file, never a torn one — the state store relies on this to
/// read a half-written record as "uninitialized" on the next run.
pub fn atomic_write(path: &Path, contents: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("{} has no parent directory", path.display()))?;
    let mut temp = tempfile::NamedTempFile::new_in(parent)
        .with_context(|| format!("failed creating temp file in {}", parent.display()))?;
    temp.write_all(contents)
        .with_context(|| format!("failed writing temp file for {}", path.display()))?;
    temp.as_file()
        .sync_all()
        .with_context(|| format!("failed syncing temp file for {}", path.display()))?;
    temp.persist(path)
        .with_context(|| format!("failed renaming temp file onto {}", path.display()))?;
    Ok(())
}

/// Ensure a directory exists, creating parents as needed.
pub fn ensure_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path)
        .with_context(|| format!("failed creating directory {}", path.display()))
}

/// Quote a string for POSIX shell interpolation.
///
/// Used when rendering git hook scripts; single-quotes the value and escapes
/// embedded single quotes.
#[must_use]
pub fn sh_quote(value: &str) -> String {
    if !value.is_empty()
        && value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.' | b'/' | b'='))
    {
        return value.to_string();
    }
    format!("'{}'", value.replace('\'', r"'\''"))
}
