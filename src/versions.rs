//! Version resolution for the target runtime and native dependencies.

use regex::Regex;
use serde::Serialize;

use crate::config::{DEFAULT_ELECTRON_VERSION, DEFAULT_NODE_PTY_VERSION, DEFAULT_SQLITE_VERSION};
use crate::package::{SourcePackage, BETTER_SQLITE3, NODE_PTY};

/// Resolved versions, computed once per run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionSet {
    /// Electron ABI target. Always a plain `x.y.z`.
    pub electron_version: String,
    /// Version range, carried verbatim from the source manifest.
    pub node_pty_version: String,
    pub sqlite_version: String,
}

impl VersionSet {
    /// An explicit `electron_override` replaces whatever the source declares.
    pub fn resolve(source: &SourcePackage, electron_override: Option<&str>) -> Self {
        let electron_version = match electron_override {
            Some(version) => version.to_string(),
            None => normalize_semver(source.dev_dependency("electron"), DEFAULT_ELECTRON_VERSION),
        };
        Self {
            electron_version,
            node_pty_version: source
                .dependency(NODE_PTY)
                .unwrap_or(DEFAULT_NODE_PTY_VERSION)
                .to_string(),
            sqlite_version: source
                .dependency(BETTER_SQLITE3)
                .unwrap_or(DEFAULT_SQLITE_VERSION)
                .to_string(),
        }
    }
}

/// First `major.minor.patch` inside a version range, else `fallback`.
pub fn normalize_semver(range: Option<&str>, fallback: &str) -> String {
    range
        .and_then(|range| {
            let re = Regex::new(r"\d+\.\d+\.\d+").ok()?;
            re.find(range).map(|m| m.as_str().to_string())
        })
        .unwrap_or_else(|| fallback.to_string())
}
