//! Assembly of the Windows application tree.
//!
//! Copies the unpacked macOS application, swaps its native modules for the
//! Electron-ABI builds, rewrites `package.json`, then runs the registered
//! patches in order. Any failure aborts; the half-built tree is never handed
//! on.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::RepackError;
use crate::filesystem::{copy_dir_recursive, empty_dir, write_json_atomic};
use crate::native::NativeBuild;
use crate::package::{RuntimePackage, SourcePackage};
use crate::patch::PatchResult;
use crate::patchset::{apply_all, RegisteredPatch};
use crate::versions::VersionSet;

/// Inputs of one assembly, all produced by earlier stages.
pub struct AssemblyInputs<'a> {
    pub app_unpacked: &'a Path,
    pub source: &'a SourcePackage,
    pub versions: &'a VersionSet,
    pub native: &'a NativeBuild,
    pub patches: &'a [RegisteredPatch],
}

#[derive(Debug, Clone)]
pub struct AssembledTree {
    pub root: PathBuf,
    pub runtime_package: RuntimePackage,
    pub patches: Vec<PatchResult>,
}

pub fn assemble(inputs: &AssemblyInputs<'_>, dest: &Path) -> Result<AssembledTree> {
    tracing::info!("Assembling Windows app tree in {}", dest.display());
    empty_dir(dest)?;
    copy_dir_recursive(inputs.app_unpacked, dest)?;

    replace_native_modules(dest, inputs.native)?;

    let runtime_package = RuntimePackage::from_source(inputs.source, inputs.versions);
    write_json_atomic(&dest.join("package.json"), &runtime_package)?;
    tracing::debug!(version = %runtime_package.version, "runtime package.json written");

    let patches = apply_all(dest, inputs.patches)?;

    Ok(AssembledTree {
        root: dest.to_path_buf(),
        runtime_package,
        patches,
    })
}

/// Every module must already be bundled; all are checked before any is
/// replaced.
fn replace_native_modules(tree: &Path, native: &NativeBuild) -> Result<()> {
    let mut swaps = Vec::new();
    for (name, built) in native.modules() {
        let bundled = tree.join("node_modules").join(name);
        if !bundled.is_dir() {
            return Err(RepackError::input(format!(
                "native module '{name}' missing from the unpacked app: {}",
                bundled.display()
            ))
            .into());
        }
        swaps.push((name, built, bundled));
    }

    for (name, built, bundled) in swaps {
        tracing::info!("Replacing {name} with the Electron build");
        fs::remove_dir_all(&bundled)
            .with_context(|| format!("Failed to remove {}", bundled.display()))?;
        copy_dir_recursive(built, &bundled)?;
    }
    Ok(())
}
