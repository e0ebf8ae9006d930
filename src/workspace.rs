//! Workspace layout.
//!
//! Every intermediate and final artifact of a run lives under one root
//! directory. The root is wiped at the start of each run and belongs to that
//! run alone; preventing two runs from sharing it is the caller's job.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::RepackError;
use crate::filesystem::{canonical_path_lenient, empty_dir};

/// File name of the input archive inside `input/`.
pub const INPUT_ARCHIVE_NAME: &str = "Codex.dmg";
/// Generated installer-tool configuration.
pub const BUILDER_CONFIG_NAME: &str = "electron-builder.generated.json";

/// Immutable set of locations, all rooted under [`WorkspacePaths::root`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspacePaths {
    root: PathBuf,
    pub input_archive: PathBuf,
    /// 7-Zip extraction root for the source bundle.
    pub mac_resources: PathBuf,
    /// Unpacked application archive.
    pub app_unpacked: PathBuf,
    pub native_rebuild: PathBuf,
    /// Target-ready application tree handed to the installer tool.
    pub win_app_source: PathBuf,
    pub win_binaries: PathBuf,
    pub win_extra: PathBuf,
    pub release: PathBuf,
    pub builder_config: PathBuf,
}

impl WorkspacePaths {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            input_archive: root.join("input").join(INPUT_ARCHIVE_NAME),
            mac_resources: root.join("mac-resources"),
            app_unpacked: root.join("app-unpacked"),
            native_rebuild: root.join("native-rebuild"),
            win_app_source: root.join("win-app-source"),
            win_binaries: root.join("win-binaries"),
            win_extra: root.join("win-extra"),
            release: root.join("release"),
            builder_config: root.join(BUILDER_CONFIG_NAME),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn metadata_file(&self) -> PathBuf {
        self.release.join("build-metadata.json")
    }

    /// Refuse a root that is, or contains, any of `inputs`. Those would be
    /// deleted by [`WorkspacePaths::reset`].
    pub fn ensure_disjoint_from(&self, inputs: &[&Path]) -> Result<()> {
        let root = canonical_path_lenient(&self.root)?;
        for input in inputs {
            let resolved = canonical_path_lenient(input)?;
            if resolved.starts_with(&root) {
                return Err(RepackError::input(format!(
                    "workspace {} would delete {}; choose a dedicated workspace directory",
                    self.root.display(),
                    input.display()
                ))
                .into());
            }
        }
        Ok(())
    }

    /// Clear the whole workspace and recreate its top-level directories.
    pub fn reset(&self) -> Result<()> {
        tracing::info!("Resetting workspace {}", self.root.display());
        empty_dir(&self.root)?;
        let dirs: [&Path; 8] = [
            self.input_archive.parent().unwrap_or(&self.root),
            &self.mac_resources,
            &self.app_unpacked,
            &self.native_rebuild,
            &self.win_app_source,
            &self.win_binaries,
            &self.win_extra,
            &self.release,
        ];
        for dir in dirs {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn all_paths_are_under_root() {
        let ws = WorkspacePaths::new(Path::new("/tmp/repack-ws"));
        for path in [
            &ws.input_archive,
            &ws.mac_resources,
            &ws.app_unpacked,
            &ws.native_rebuild,
            &ws.win_app_source,
            &ws.win_binaries,
            &ws.win_extra,
            &ws.release,
            &ws.builder_config,
        ] {
            assert!(path.starts_with(ws.root()), "{} escapes root", path.display());
        }
        assert_eq!(
            ws.metadata_file(),
            PathBuf::from("/tmp/repack-ws/release/build-metadata.json")
        );
    }

    #[test]
    fn workspace_may_not_cover_inputs() {
        let temp = TempDir::new().unwrap();
        let toolkit = temp.path().join("toolkit");
        fs::create_dir_all(&toolkit).unwrap();
        let dmg = toolkit.join("Codex.dmg");
        fs::write(&dmg, b"dmg").unwrap();

        for root in [toolkit.clone(), temp.path().to_path_buf(), toolkit.join(".")] {
            let err = WorkspacePaths::new(&root)
                .ensure_disjoint_from(&[&toolkit, &dmg])
                .unwrap_err();
            assert!(matches!(
                crate::error::classify(&err),
                Some(RepackError::Input(_))
            ));
        }
        assert!(dmg.is_file());

        WorkspacePaths::new(&toolkit.join("build"))
            .ensure_disjoint_from(&[&toolkit, &dmg])
            .unwrap();
        WorkspacePaths::new(&temp.path().join("toolkit-build"))
            .ensure_disjoint_from(&[&toolkit, &dmg])
            .unwrap();
    }

    #[test]
    fn reset_clears_previous_run() {
        let temp = TempDir::new().unwrap();
        let ws = WorkspacePaths::new(&temp.path().join("ws"));
        fs::create_dir_all(&ws.release).unwrap();
        fs::write(ws.release.join("Codex-Setup-0.9.0.exe"), b"stale").unwrap();

        ws.reset().unwrap();

        assert!(ws.release.is_dir());
        assert!(ws.input_archive.parent().unwrap().is_dir());
        assert_eq!(fs::read_dir(&ws.release).unwrap().count(), 0);
    }
}
