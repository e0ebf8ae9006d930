//! Native module rebuild against the Electron ABI.
//!
//! Compilation itself is npm's business. This module builds the request (a
//! throwaway `package.json` plus `npm_config_*` overrides), runs it, and
//! checks that every requested module directory exists afterwards.

use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::ToolPaths;
use crate::error::RepackError;
use crate::filesystem::{empty_dir, write_json_atomic};
use crate::package::{BETTER_SQLITE3, NODE_PTY};
use crate::process::Cmd;
use crate::versions::VersionSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebuildRequest {
    pub target_abi: String,
    pub headers_url: String,
    /// Module name to version range.
    pub dependencies: BTreeMap<String, String>,
}

#[derive(Serialize)]
struct RebuildManifest<'a> {
    name: &'static str,
    private: bool,
    version: &'static str,
    dependencies: &'a BTreeMap<String, String>,
}

impl RebuildRequest {
    pub fn for_versions(versions: &VersionSet, headers_url: &str) -> Self {
        let dependencies = BTreeMap::from([
            (NODE_PTY.to_string(), versions.node_pty_version.clone()),
            (BETTER_SQLITE3.to_string(), versions.sqlite_version.clone()),
        ]);
        Self {
            target_abi: versions.electron_version.clone(),
            headers_url: headers_url.to_string(),
            dependencies,
        }
    }

    /// Overrides layered on top of the inherited environment.
    pub fn env(&self) -> Vec<(&'static str, String)> {
        vec![
            ("npm_config_runtime", "electron".to_string()),
            ("npm_config_target", self.target_abi.clone()),
            ("npm_config_disturl", self.headers_url.clone()),
        ]
    }

    fn manifest(&self) -> RebuildManifest<'_> {
        RebuildManifest {
            name: "native-rebuild",
            private: true,
            version: "1.0.0",
            dependencies: &self.dependencies,
        }
    }
}

/// Rebuilt modules, one directory per requested dependency.
#[derive(Debug, Clone)]
pub struct NativeBuild {
    modules: BTreeMap<String, PathBuf>,
}

impl NativeBuild {
    pub fn module_dir(&self, name: &str) -> Option<&Path> {
        self.modules.get(name).map(PathBuf::as_path)
    }

    pub fn modules(&self) -> impl Iterator<Item = (&str, &Path)> {
        self.modules
            .iter()
            .map(|(name, dir)| (name.as_str(), dir.as_path()))
    }
}

/// Install `request` into a fresh `dir` with the ABI overrides applied.
pub fn rebuild(tools: &ToolPaths, request: &RebuildRequest, dir: &Path) -> Result<NativeBuild> {
    tracing::info!(
        "Rebuilding {} native module(s) for Electron {}",
        request.dependencies.len(),
        request.target_abi
    );
    empty_dir(dir)?;
    write_json_atomic(&dir.join("package.json"), &request.manifest())?;

    let output = Cmd::new(&tools.npm)
        .args(["install", "--no-audit", "--no-fund"])
        .current_dir(dir)
        .envs(request.env())
        .output()?;
    if !output.success() {
        return Err(RepackError::NativeBuildFailed {
            command: output.command.clone(),
            code: output.code,
            stderr_tail: output.stderr_tail(),
        }
        .into());
    }

    verify_outputs(request, dir)
}

/// Every requested module must exist under `dir/node_modules`.
pub fn verify_outputs(request: &RebuildRequest, dir: &Path) -> Result<NativeBuild> {
    let mut modules = BTreeMap::new();
    for name in request.dependencies.keys() {
        let module_dir = dir.join("node_modules").join(name);
        if !module_dir.is_dir() {
            return Err(RepackError::NativeArtifactMissing {
                module: name.clone(),
                path: module_dir,
            }
            .into());
        }
        modules.insert(name.clone(), module_dir);
    }
    Ok(NativeBuild { modules })
}
