//! File-type classification tags.
//!
//! Hooks can restrict themselves to file types (`types: [python]`); this
//! module derives those tags from the file name alone — extension tables
//! plus a handful of well-known basenames. Classification never touches the
//! file contents, so it is cheap enough to run over every candidate path.

use std::collections::BTreeSet;
use std::path::Path;

fn tags_for_extension(extension: &str) -> &'static [&'static str] {
    match extension {
        "py" | "pyi" => &["python"],
        "md" | "markdown" => &["markdown"],
        "rs" => &["rust"],
        "js" | "mjs" | "cjs" => &["javascript"],
        "jsx" => &["javascript", "jsx"],
        "ts" | "mts" | "cts" => &["typescript"],
        "tsx" => &["typescript", "tsx"],
        "json" => &["json"],
        "yaml" | "yml" => &["yaml"],
        "toml" => &["toml"],
        "sh" | "bash" => &["shell"],
        "css" => &["css"],
        "html" | "htm" => &["html"],
        "sql" => &["sql"],
        "go" => &["go"],
        "rb" => &["ruby"],
        "c" | "h" => &["c"],
        "cc" | "cpp" | "hpp" | "cxx" => &["c++"],
        "txt" => &["plain-text"],
        _ => &[],
    }
}

fn tags_for_basename(name: &str) -> &'static [&'static str] {
    match name {
        "Dockerfile" => &["dockerfile"],
        "Makefile" => &["makefile"],
        "BUILD" | "WORKSPACE" => &["bazel"],
        _ => &[],
    }
}

/// Classification tags for a path.
///
/// Unknown file types get no tags; hooks with a `types` restriction simply
/// never see them.
#[must_use]
pub fn tags_for_path(path: &Path) -> BTreeSet<String> {
    let mut tags = BTreeSet::new();
    if let Some(name) = path.file_name().and_then(|name| name.to_str()) {
        for tag in tags_for_basename(name) {
            tags.insert((*tag).to_string());
        }
    }
    if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
        for tag in tags_for_extension(&extension.to_ascii_lowercase()) {
            tags.insert((*tag).to_string());
        }
    }
    tags
}
