//! Application manifests (`package.json`).
//!
//! [`SourcePackage`] is whatever the macOS build declared. Every field is
//! optional because nothing guarantees upstream keeps emitting it.
//! [`RuntimePackage`] is the manifest written into the Windows tree.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::versions::VersionSet;

pub const FALLBACK_NAME: &str = "openai-codex-electron";
pub const FALLBACK_PRODUCT_NAME: &str = "Codex";
pub const FALLBACK_VERSION: &str = "0.0.0";
pub const FALLBACK_DESCRIPTION: &str = "Codex";
pub const FALLBACK_MAIN: &str = ".vite/build/main.js";
pub const FALLBACK_AUTHOR: &str = "OpenAI";
pub const RUNTIME_LICENSE: &str = "UNLICENSED";

/// Native dependencies rebuilt for the target ABI.
pub const NODE_PTY: &str = "node-pty";
pub const BETTER_SQLITE3: &str = "better-sqlite3";

/// Pure-JS helpers the native modules load at runtime.
const RUNTIME_HELPERS: &[(&str, &str)] = &[
    ("bindings", "1.5.0"),
    ("file-uri-to-path", "1.0.0"),
    ("node-addon-api", "8.5.0"),
];

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourcePackage {
    pub name: Option<String>,
    pub product_name: Option<String>,
    pub version: Option<String>,
    pub description: Option<String>,
    pub main: Option<String>,
    /// npm allows a string or a `{ name, email, url }` object.
    pub author: Option<serde_json::Value>,
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
    #[serde(default)]
    pub dev_dependencies: BTreeMap<String, String>,
}

impl SourcePackage {
    pub fn read(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn dependency(&self, name: &str) -> Option<&str> {
        self.dependencies.get(name).map(String::as_str)
    }

    pub fn dev_dependency(&self, name: &str) -> Option<&str> {
        self.dev_dependencies.get(name).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimePackage {
    pub name: String,
    pub product_name: String,
    pub version: String,
    pub description: String,
    pub main: String,
    pub author: serde_json::Value,
    pub license: String,
    pub dependencies: BTreeMap<String, String>,
}

impl RuntimePackage {
    /// Source values where declared, fallbacks everywhere else.
    pub fn from_source(source: &SourcePackage, versions: &VersionSet) -> Self {
        let text = |value: &Option<String>, fallback: &str| {
            value.clone().unwrap_or_else(|| fallback.to_string())
        };

        let mut dependencies = BTreeMap::new();
        dependencies.insert(BETTER_SQLITE3.to_string(), versions.sqlite_version.clone());
        dependencies.insert(NODE_PTY.to_string(), versions.node_pty_version.clone());
        for (name, version) in RUNTIME_HELPERS {
            dependencies.insert(name.to_string(), version.to_string());
        }

        Self {
            name: text(&source.name, FALLBACK_NAME),
            product_name: text(&source.product_name, FALLBACK_PRODUCT_NAME),
            version: text(&source.version, FALLBACK_VERSION),
            description: text(&source.description, FALLBACK_DESCRIPTION),
            main: text(&source.main, FALLBACK_MAIN),
            author: source
                .author
                .clone()
                .unwrap_or_else(|| serde_json::Value::from(FALLBACK_AUTHOR)),
            license: RUNTIME_LICENSE.to_string(),
            dependencies,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn versions() -> VersionSet {
        VersionSet {
            electron_version: "40.0.0".to_string(),
            node_pty_version: "^1.1.0".to_string(),
            sqlite_version: "^12.4.6".to_string(),
        }
    }

    #[test]
    fn empty_source_uses_every_fallback() {
        let runtime = RuntimePackage::from_source(&SourcePackage::default(), &versions());
        let value = serde_json::to_value(&runtime).unwrap();
        assert_eq!(
            value,
            json!({
                "name": "openai-codex-electron",
                "productName": "Codex",
                "version": "0.0.0",
                "description": "Codex",
                "main": ".vite/build/main.js",
                "author": "OpenAI",
                "license": "UNLICENSED",
                "dependencies": {
                    "better-sqlite3": "^12.4.6",
                    "bindings": "1.5.0",
                    "file-uri-to-path": "1.0.0",
                    "node-addon-api": "8.5.0",
                    "node-pty": "^1.1.0"
                }
            })
        );
    }

    #[test]
    fn declared_values_win_and_license_is_fixed() {
        let source: SourcePackage = serde_json::from_value(json!({
            "name": "openai-codex-electron",
            "productName": "Codex",
            "version": "26.212.1",
            "main": "main.js",
            "author": { "name": "OpenAI" },
            "license": "MIT",
            "dependencies": { "node-pty": "^1.2.0", "react": "19.0.0" },
            "devDependencies": { "electron": "^40.1.0" },
            "scripts": { "start": "electron ." }
        }))
        .unwrap();

        let runtime = RuntimePackage::from_source(&source, &versions());
        assert_eq!(runtime.version, "26.212.1");
        assert_eq!(runtime.main, "main.js");
        assert_eq!(runtime.description, "Codex");
        assert_eq!(runtime.author, json!({ "name": "OpenAI" }));
        assert_eq!(runtime.license, "UNLICENSED");
        assert!(!runtime.dependencies.contains_key("react"));
        assert_eq!(source.dev_dependency("electron"), Some("^40.1.0"));
    }
}
