//! The repack run, stage by stage.
//!
//! Each stage reads only what the previous one left in the workspace. The
//! first failure ends the run; the build metadata is written last, so a
//! failed run never leaves one behind.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::archive::{self, APP_ARCHIVE_NAME};
use crate::assemble::{assemble, AssemblyInputs};
use crate::config::RepackConfig;
use crate::extras;
use crate::filesystem::canonical_path;
use crate::installer::{build_installer, BuilderConfig};
use crate::locator::SevenZipListing;
use crate::manifest::{find_installer, now_utc_rfc3339, sha256_file, BuildMetadata, MetadataInputs};
use crate::native::{self, RebuildRequest};
use crate::package::SourcePackage;
use crate::patchset::ordered_patches;
use crate::preflight;
use crate::source::{self, SourceProvenance};
use crate::versions::VersionSet;

/// What a successful run produced.
#[derive(Debug, Clone)]
pub struct BuildOutcome {
    pub installer: PathBuf,
    pub sha256: String,
    pub metadata_path: PathBuf,
    pub metadata: BuildMetadata,
}

pub fn run(config: &RepackConfig) -> Result<BuildOutcome> {
    preflight::check_host_tools(&config.tools)?;
    // Fail on bad patch declarations before any download.
    let patches = ordered_patches(&config.extra_patches)?;

    let provenance = source::plan(&config.source)?;

    let ws = &config.workspace;
    ws.ensure_disjoint_from(&user_inputs(config, &provenance))?;
    ws.reset()?;

    tracing::info!("[1/7] Acquiring input DMG");
    source::acquire(&provenance, &ws.input_archive).context("acquiring input DMG")?;

    tracing::info!("[2/7] Extracting application resources");
    let resources_root = archive::extract_resources(
        &config.tools,
        &SevenZipListing,
        &ws.input_archive,
        &ws.mac_resources,
    )?;
    archive::unpack_app_archive(
        &config.tools,
        &resources_root.join(APP_ARCHIVE_NAME),
        &ws.app_unpacked,
    )?;

    let source_package = SourcePackage::read(&ws.app_unpacked.join("package.json"))?;
    let versions = VersionSet::resolve(&source_package, config.electron_override.as_deref());
    tracing::info!(
        "Electron {}, node-pty {}, better-sqlite3 {}",
        versions.electron_version,
        versions.node_pty_version,
        versions.sqlite_version
    );

    tracing::info!("[3/7] Rebuilding native modules");
    let request = RebuildRequest::for_versions(&versions, &config.headers_url);
    let native = native::rebuild(&config.tools, &request, &ws.native_rebuild)
        .context("rebuilding native modules")?;

    tracing::info!("[4/7] Assembling Windows app tree");
    let tree = assemble(
        &AssemblyInputs {
            app_unpacked: &ws.app_unpacked,
            source: &source_package,
            versions: &versions,
            native: &native,
            patches: &patches,
        },
        &ws.win_app_source,
    )
    .context("assembling Windows app tree")?;

    tracing::info!("[5/7] Staging binaries, resources and icon");
    let staged = extras::stage(
        &config.binaries_package_dir,
        &resources_root,
        &ws.win_binaries,
        &ws.win_extra,
    )
    .context("staging extra resources")?;

    tracing::info!("[6/7] Building NSIS installer");
    let builder = BuilderConfig::new(&config.app, ws, &tree.runtime_package.version, &staged);
    build_installer(&config.tools, &builder, &ws.builder_config, &config.toolkit_root)
        .context("building installer")?;

    tracing::info!("[7/7] Hashing installer and writing build metadata");
    let installer = find_installer(&ws.release, &config.app.installer_prefix)?;
    let installer = canonical_path(&installer)?;
    let sha256 = sha256_file(&installer)?;

    let metadata = BuildMetadata::new(
        &MetadataInputs {
            app_version: &tree.runtime_package.version,
            versions: &versions,
            provenance: &provenance,
            installer: &installer,
            sha256: &sha256,
            patches: &tree.patches,
        },
        now_utc_rfc3339(),
    );
    let metadata_path = ws.metadata_file();
    metadata.write(&metadata_path)?;

    Ok(BuildOutcome {
        installer,
        sha256,
        metadata_path,
        metadata,
    })
}

/// Paths the run reads but must never delete.
fn user_inputs<'a>(config: &'a RepackConfig, provenance: &'a SourceProvenance) -> Vec<&'a Path> {
    let mut inputs = vec![config.toolkit_root.as_path(), config.binaries_package_dir.as_path()];
    if let SourceProvenance::LocalFile(path) = provenance {
        inputs.push(path);
    }
    if let Some(file) = &config.config_file {
        inputs.push(file);
    }
    inputs
}
