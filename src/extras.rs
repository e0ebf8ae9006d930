//! Files shipped next to the app rather than inside it: the Windows helper
//! binaries, a few resources lifted from the macOS bundle, and the icon.

use anyhow::Result;
use std::path::{Path, PathBuf};

use crate::error::RepackError;
use crate::filesystem::{copy_file, empty_dir, find_file_by_name};
use crate::icon;

pub const HELPER_BINARIES: &[&str] = &["codex.exe", "rg.exe"];
pub const BUNDLE_RESOURCES: &[&str] = &["THIRD_PARTY_NOTICES.txt", "notification.wav"];
pub const ICNS_NAME: &str = "electron.icns";
pub const ICO_NAME: &str = "app.ico";

#[derive(Debug, Clone)]
pub struct StagedExtras {
    pub binaries: Vec<PathBuf>,
    pub resources: Vec<PathBuf>,
    pub icon: PathBuf,
}

/// Stage everything into freshly emptied `win_binaries` and `win_extra`.
pub fn stage(
    binaries_package: &Path,
    resources_root: &Path,
    win_binaries: &Path,
    win_extra: &Path,
) -> Result<StagedExtras> {
    empty_dir(win_binaries)?;
    empty_dir(win_extra)?;

    let binaries = stage_binaries(binaries_package, win_binaries)?;
    let resources = stage_bundle_resources(resources_root, win_extra)?;

    let icns = resources_root.join(ICNS_NAME);
    if !icns.is_file() {
        return Err(RepackError::input(format!(
            "missing {ICNS_NAME} in resources: {}",
            icns.display()
        ))
        .into());
    }
    let icon = win_extra.join(ICO_NAME);
    icon::transcode(&icns, &icon)?;

    Ok(StagedExtras {
        binaries,
        resources,
        icon,
    })
}

/// Copy the helper executables, found anywhere under the package directory
/// regardless of case.
pub fn stage_binaries(package_dir: &Path, dest: &Path) -> Result<Vec<PathBuf>> {
    let mut staged = Vec::new();
    for name in HELPER_BINARIES {
        let found = find_file_by_name(package_dir, name).ok_or_else(|| {
            RepackError::input(format!(
                "failed to locate {name} under {}",
                package_dir.display()
            ))
        })?;
        let target = dest.join(name);
        tracing::info!("Staging {} -> {}", found.display(), target.display());
        copy_file(&found, &target)?;
        staged.push(target);
    }
    Ok(staged)
}

pub fn stage_bundle_resources(resources_root: &Path, dest: &Path) -> Result<Vec<PathBuf>> {
    let missing: Vec<&str> = BUNDLE_RESOURCES
        .iter()
        .copied()
        .filter(|name| !resources_root.join(name).is_file())
        .collect();
    if !missing.is_empty() {
        return Err(RepackError::input(format!(
            "missing {} in {}",
            missing.join(", "),
            resources_root.display()
        ))
        .into());
    }

    let mut staged = Vec::new();
    for name in BUNDLE_RESOURCES {
        let target = dest.join(name);
        copy_file(&resources_root.join(name), &target)?;
        staged.push(target);
    }
    Ok(staged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::classify;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn helper_binaries_found_case_insensitively() {
        let temp = TempDir::new().unwrap();
        let pkg = temp.path().join("codex-win32-x64");
        fs::create_dir_all(pkg.join("vendor/x86_64-pc-windows-msvc/codex")).unwrap();
        fs::create_dir_all(pkg.join("vendor/x86_64-pc-windows-msvc/path")).unwrap();
        fs::write(pkg.join("vendor/x86_64-pc-windows-msvc/codex/Codex.EXE"), b"MZ1").unwrap();
        fs::write(pkg.join("vendor/x86_64-pc-windows-msvc/path/rg.exe"), b"MZ2").unwrap();
        let dest = temp.path().join("win-binaries");

        let staged = stage_binaries(&pkg, &dest).unwrap();

        assert_eq!(staged, vec![dest.join("codex.exe"), dest.join("rg.exe")]);
        assert_eq!(fs::read(dest.join("codex.exe")).unwrap(), b"MZ1");
    }

    #[test]
    fn missing_helper_binary_is_input_error() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("codex.exe"), b"MZ").unwrap();

        let err = stage_binaries(temp.path(), &temp.path().join("out")).unwrap_err();
        assert!(matches!(classify(&err), Some(RepackError::Input(_))));
        assert!(err.to_string().contains("rg.exe"));
    }

    #[test]
    fn bundle_resources_are_all_or_nothing() {
        let temp = TempDir::new().unwrap();
        let resources = temp.path().join("Resources");
        fs::create_dir_all(&resources).unwrap();
        fs::write(resources.join("notification.wav"), b"RIFF").unwrap();
        let dest = temp.path().join("win-extra");

        let err = stage_bundle_resources(&resources, &dest).unwrap_err();
        assert!(err.to_string().contains("THIRD_PARTY_NOTICES.txt"));
        assert!(!dest.join("notification.wav").exists());

        fs::write(resources.join("THIRD_PARTY_NOTICES.txt"), "notices").unwrap();
        let staged = stage_bundle_resources(&resources, &dest).unwrap();
        assert_eq!(staged.len(), 2);
        assert!(dest.join("notification.wav").is_file());
    }
}
