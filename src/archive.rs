//! Black-box archive tools: 7-Zip for the disk image, `@electron/asar` for
//! the application archive.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};

use crate::config::ToolPaths;
use crate::locator::{ResourceLocator, APP_ARCHIVE_MARKER};
use crate::process::Cmd;

pub const APP_ARCHIVE_NAME: &str = "app.asar";

/// Table of contents as printed by `7z l`.
pub fn list(tools: &ToolPaths, archive: &Path) -> Result<String> {
    let output = Cmd::new(&tools.seven_zip)
        .arg("l")
        .arg_path(archive)
        .quiet()
        .run()
        .with_context(|| format!("listing {}", archive.display()))?;
    tracing::debug!(bytes = output.stdout.len(), "archive listing captured");
    Ok(output.stdout)
}

/// Extract only the application resource directory from the disk image.
///
/// Returns the extracted resource directory (the one holding `app.asar`).
pub fn extract_resources(
    tools: &ToolPaths,
    locator: &dyn ResourceLocator,
    archive: &Path,
    out_dir: &Path,
) -> Result<PathBuf> {
    let listing = list(tools, archive)?;
    let located = locator.locate(&listing, APP_ARCHIVE_MARKER)?;
    let resource_dir = located.resource_dir();
    tracing::info!("Extracting {resource_dir} from {}", archive.display());

    let mut out_flag = std::ffi::OsString::from("-o");
    out_flag.push(out_dir.as_os_str());
    Cmd::new(&tools.seven_zip)
        .arg("x")
        .arg_path(archive)
        .arg(out_flag)
        .arg(format!("{resource_dir}*"))
        .arg("-y")
        .run()
        .with_context(|| format!("extracting {}", archive.display()))?;

    let resources_root = local_path(out_dir, &resource_dir);
    let app_archive = resources_root.join(APP_ARCHIVE_NAME);
    if !app_archive.is_file() {
        bail!("Extracted resources missing {}", app_archive.display());
    }
    Ok(resources_root)
}

/// Unpack an asar archive into `dest`.
pub fn unpack_app_archive(tools: &ToolPaths, app_archive: &Path, dest: &Path) -> Result<()> {
    tracing::info!("Unpacking {}", app_archive.display());
    Cmd::new(&tools.npx)
        .args(["--yes", "@electron/asar", "extract"])
        .arg_path(app_archive)
        .arg_path(dest)
        .run()
        .with_context(|| format!("unpacking {}", app_archive.display()))?;
    Ok(())
}

/// Map an archive path (either separator) onto the local filesystem.
fn local_path(base: &Path, archive_path: &str) -> PathBuf {
    archive_path
        .split(['/', '\\'])
        .filter(|part| !part.is_empty())
        .fold(base.to_path_buf(), |acc, part| acc.join(part))
}
