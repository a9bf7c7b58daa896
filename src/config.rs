//! Configuration loading and schema validation for `goose.yaml`.
//!
//! The configuration document declares *environments* (isolated sandboxes
//! with pinned dependencies) and *hooks* (commands that run inside an
//! environment over a selection of files). It is loaded once at startup and
//! treated as immutable afterwards: every other module borrows pieces of it.
//!
//! # Document shape
//!
//! ```yaml
//! version: 0
//! environments:
//!   - id: python
//!     ecosystem:
//!       language: python
//!       version: "3.12"
//!     dependencies:
//!       - ruff
//! hooks:
//!   - id: ruff-check
//!     environment: python
//!     command: ruff
//!     args: [check, --fix]
//!     types: [python]
//!     read_only: false
//! exclude:
//!   - "^vendored/"
//! ```
//!
//! Patterns (`limit`, `exclude`) are regular expressions matched with
//! *search* semantics: a pattern matches a path if it matches any substring
//! of it. Anchor with `^`/`$` for whole-path matching.

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::GooseError;

/// A compiled regular expression with search semantics over path strings.
///
/// Wraps [`regex::Regex`] to give configuration patterns equality (by source
/// text) and path-oriented matching.
#[derive(Debug, Clone)]
pub struct Pattern(regex::Regex);

impl Pattern {
    /// Compile a pattern from its source text.
    pub fn new(source: &str) -> Result<Self> {
        let regex = regex::Regex::new(source)
            .with_context(|| format!("invalid pattern {source:?}"))?;
        Ok(Self(regex))
    }

    /// Whether the pattern matches anywhere in the string form of `path`.
    #[must_use]
    pub fn matches_path(&self, path: &Path) -> bool {
        self.0.is_match(&path.to_string_lossy())
    }

    /// The original pattern text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for Pattern {}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Pattern {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let source = String::deserialize(deserializer)?;
        Pattern::new(&source).map_err(D::Error::custom)
    }
}

impl Serialize for Pattern {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Whether `path` matches at least one of `patterns`.
#[must_use]
pub fn path_matches_patterns(path: &Path, patterns: &[Pattern]) -> bool {
    patterns.iter().any(|pattern| pattern.matches_path(path))
}

/// Language family owning an environment sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    Node,
    System,
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Language::Python => "python",
            Language::Node => "node",
            Language::System => "system",
        };
        f.write_str(name)
    }
}

/// Language plus optional version constraint for an environment.
///
/// The version is an opaque prefix constraint (`"3.12"` accepts `3.12.4`);
/// backends resolve it to a concrete version at bootstrap time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EcosystemConfig {
    pub language: Language,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// One managed environment: a sandbox identity plus its dependency pins.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnvironmentConfig {
    /// Unique environment id; doubles as the sandbox directory name.
    pub id: String,
    pub ecosystem: EcosystemConfig,
    /// Requested dependencies, in declaration order.
    pub dependencies: Vec<String>,
}

/// One configured hook: a command to run over a selection of files.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HookConfig {
    /// Unique hook id, used for selection and log prefixes.
    pub id: String,
    /// Id of the environment the hook runs in.
    pub environment: String,
    /// Executable to invoke (resolved inside the environment).
    pub command: String,
    /// Arguments placed before the target files.
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra environment variables, applied in declaration order.
    #[serde(default, deserialize_with = "ordered_string_pairs")]
    pub env_vars: Vec<(String, String)>,
    /// Whether target files are appended to the command line. Hooks that
    /// operate on the whole tree (or on nothing) set this to false.
    #[serde(default = "default_true")]
    pub parameterize: bool,
    /// File-type tags the hook applies to; empty means every file.
    #[serde(default)]
    pub types: BTreeSet<String>,
    /// Restrict targets to paths matching at least one of these patterns.
    #[serde(default)]
    pub limit: Vec<Pattern>,
    /// Drop targets matching any of these patterns.
    #[serde(default)]
    pub exclude: Vec<Pattern>,
    /// Hooks declared read-only never mutate their inputs; the scheduler
    /// uses this to run them concurrently even over shared files.
    #[serde(default)]
    pub read_only: bool,
}

/// The root configuration document.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Schema version tag; only `0` is understood.
    pub version: u32,
    pub environments: Vec<EnvironmentConfig>,
    pub hooks: Vec<HookConfig>,
    /// Restrict candidate files to paths matching at least one pattern.
    #[serde(default)]
    pub limit: Vec<Pattern>,
    /// Drop candidate files matching any of these patterns.
    #[serde(default)]
    pub exclude: Vec<Pattern>,
}

fn default_true() -> bool {
    true
}

/// Deserialize a YAML mapping into key/value pairs preserving document order.
fn ordered_string_pairs<'de, D>(deserializer: D) -> Result<Vec<(String, String)>, D::Error>
where
    D: Deserializer<'de>,
{
    let mapping = serde_yaml::Mapping::deserialize(deserializer)?;
    let mut pairs = Vec::with_capacity(mapping.len());
    for (key, value) in mapping {
        let key = key
            .as_str()
            .ok_or_else(|| D::Error::custom("env_vars keys must be strings"))?
            .to_string();
        let value = match value {
            serde_yaml::Value::String(s) => s,
            serde_yaml::Value::Number(n) => n.to_string(),
            serde_yaml::Value::Bool(b) => b.to_string(),
            _ => return Err(D::Error::custom("env_vars values must be scalars")),
        };
        pairs.push((key, value));
    }
    Ok(pairs)
}

impl Config {
    /// Check cross-field invariants the serde schema cannot express.
    ///
    /// Rejects unknown schema versions, duplicate environment or hook ids,
    /// hooks referencing undeclared environments, and environments with no
    /// dependencies (a frozen manifest must pin at least one).
    pub fn validate(&self) -> Result<(), GooseError> {
        let invalid = |reason: String| GooseError::ConfigurationInvalid { reason };

        if self.version != 0 {
            return Err(invalid(format!(
                "unsupported config version {}; expected 0",
                self.version
            )));
        }

        let mut environment_ids = HashSet::new();
        for environment in &self.environments {
            if !environment_ids.insert(environment.id.as_str()) {
                return Err(invalid(format!(
                    "duplicate environment id {:?}",
                    environment.id
                )));
            }
            if environment.dependencies.is_empty() {
                return Err(invalid(format!(
                    "environment {:?} declares no dependencies",
                    environment.id
                )));
            }
        }

        let mut hook_ids = HashSet::new();
        for hook in &self.hooks {
            if !hook_ids.insert(hook.id.as_str()) {
                return Err(invalid(format!("duplicate hook id {:?}", hook.id)));
            }
            if !environment_ids.contains(hook.environment.as_str()) {
                return Err(invalid(format!(
                    "unknown hook environment: {:?}. This must refer to an \
                     environment id defined in top-level environments",
                    hook.environment
                )));
            }
        }

        Ok(())
    }
}

/// Load and validate the configuration document at `path`.
pub fn load_config(path: &Path) -> Result<Config> {
    let raw = std::fs::read(path)
        .with_context(|| format!("failed reading config file {}", path.display()))?;
    let config: Config = serde_yaml::from_slice(&raw)
        .with_context(|| format!("failed parsing config file {}", path.display()))?;
    config.validate()?;
    Ok(config)
}
