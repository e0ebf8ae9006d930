//! electron-builder configuration and invocation.

use anyhow::Result;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::config::{AppIdentity, ToolPaths};
use crate::error::RepackError;
use crate::extras::{StagedExtras, ICO_NAME};
use crate::filesystem::write_json_atomic;
use crate::process::Cmd;
use crate::workspace::WorkspacePaths;

/// Native binaries must stay outside the asar archive to be loadable.
const ASAR_UNPACK: &[&str] = &[
    "**/*.node",
    "node_modules/node-pty/prebuilds/**",
    "node_modules/node-pty/build/**",
    "node_modules/better-sqlite3/build/**",
];

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuilderConfig {
    pub app_id: String,
    pub product_name: String,
    pub directories: Directories,
    pub icon: PathBuf,
    pub files: Vec<String>,
    pub asar: bool,
    pub asar_unpack: Vec<String>,
    pub npm_rebuild: bool,
    pub node_gyp_rebuild: bool,
    pub build_dependencies_from_source: bool,
    pub extra_resources: Vec<ExtraResource>,
    pub win: WinConfig,
    pub nsis: NsisConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Directories {
    pub app: PathBuf,
    pub output: PathBuf,
    pub build_resources: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtraResource {
    pub from: PathBuf,
    pub to: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WinConfig {
    pub target: Vec<WinTarget>,
    pub artifact_name: String,
    pub icon: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct WinTarget {
    pub target: String,
    pub arch: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NsisConfig {
    pub one_click: bool,
    pub per_machine: bool,
    pub allow_elevation: bool,
    pub allow_to_change_installation_directory: bool,
    pub installer_icon: String,
    pub uninstaller_icon: String,
    pub installer_header_icon: String,
}

/// `<prefix><version>.exe`
pub fn artifact_name(app: &AppIdentity, version: &str) -> String {
    format!("{}{}.exe", app.installer_prefix, version)
}

impl BuilderConfig {
    pub fn new(
        app: &AppIdentity,
        workspace: &WorkspacePaths,
        version: &str,
        extras: &StagedExtras,
    ) -> Self {
        let extra_resources = extras
            .binaries
            .iter()
            .chain(extras.resources.iter())
            .map(|from| ExtraResource {
                to: from
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                from: from.clone(),
            })
            .collect();

        Self {
            app_id: app.app_id.clone(),
            product_name: app.product_name.clone(),
            directories: Directories {
                app: workspace.win_app_source.clone(),
                output: workspace.release.clone(),
                build_resources: workspace.win_extra.clone(),
            },
            icon: extras.icon.clone(),
            files: vec!["**/*".to_string()],
            asar: true,
            asar_unpack: ASAR_UNPACK.iter().map(|s| s.to_string()).collect(),
            npm_rebuild: false,
            node_gyp_rebuild: false,
            build_dependencies_from_source: false,
            extra_resources,
            win: WinConfig {
                target: vec![WinTarget {
                    target: "nsis".to_string(),
                    arch: vec!["x64".to_string()],
                }],
                artifact_name: artifact_name(app, version),
                icon: extras.icon.clone(),
            },
            nsis: NsisConfig {
                one_click: false,
                per_machine: false,
                allow_elevation: true,
                allow_to_change_installation_directory: true,
                installer_icon: ICO_NAME.to_string(),
                uninstaller_icon: ICO_NAME.to_string(),
                installer_header_icon: ICO_NAME.to_string(),
            },
        }
    }
}

/// Write `config` to `config_path` and run electron-builder from `cwd`.
pub fn build_installer(
    tools: &ToolPaths,
    config: &BuilderConfig,
    config_path: &Path,
    cwd: &Path,
) -> Result<()> {
    write_json_atomic(config_path, config)?;
    tracing::info!("Running electron-builder ({})", config.win.artifact_name);

    let output = Cmd::new(&tools.npx)
        .args(["electron-builder", "--config"])
        .arg_path(config_path)
        .args(["--win", "nsis", "--x64", "--publish", "never"])
        .current_dir(cwd)
        .output()?;
    if !output.success() {
        return Err(RepackError::InstallerToolFailed {
            command: output.command.clone(),
            code: output.code,
            stderr_tail: output.stderr_tail(),
        }
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn staged(ws: &WorkspacePaths) -> StagedExtras {
        StagedExtras {
            binaries: vec![ws.win_binaries.join("codex.exe"), ws.win_binaries.join("rg.exe")],
            resources: vec![
                ws.win_extra.join("THIRD_PARTY_NOTICES.txt"),
                ws.win_extra.join("notification.wav"),
            ],
            icon: ws.win_extra.join("app.ico"),
        }
    }

    #[test]
    fn config_serializes_in_electron_builder_shape() {
        let ws = WorkspacePaths::new(Path::new("/ws"));
        let config = BuilderConfig::new(&AppIdentity::default(), &ws, "26.212.1", &staged(&ws));
        let value = serde_json::to_value(&config).unwrap();

        assert_eq!(value["appId"], "com.openai.codex");
        assert_eq!(value["directories"]["app"], "/ws/win-app-source");
        assert_eq!(value["directories"]["buildResources"], "/ws/win-extra");
        assert_eq!(value["win"]["artifactName"], "Codex-Setup-26.212.1.exe");
        assert_eq!(value["win"]["target"], json!([{ "target": "nsis", "arch": ["x64"] }]));
        assert_eq!(value["nsis"]["oneClick"], false);
        assert_eq!(value["nsis"]["allowToChangeInstallationDirectory"], true);
        assert_eq!(value["npmRebuild"], false);
        assert_eq!(value["asarUnpack"][0], "**/*.node");
        assert_eq!(
            value["extraResources"][1],
            json!({ "from": "/ws/win-binaries/rg.exe", "to": "rg.exe" })
        );
        assert_eq!(value["extraResources"].as_array().unwrap().len(), 4);
    }

    #[cfg(unix)]
    #[test]
    fn failing_builder_is_installer_tool_failed() {
        use crate::error::classify;
        use std::fs;
        use std::os::unix::fs::PermissionsExt;
        use tempfile::TempDir;

        let temp = TempDir::new().unwrap();
        let script = temp.path().join("fake-npx");
        fs::write(&script, "#!/bin/sh\necho '  ⨯ cannot find app.ico' >&2\nexit 2\n").unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
        let tools = ToolPaths {
            npx: script.display().to_string(),
            ..ToolPaths::default()
        };
        let ws = WorkspacePaths::new(&temp.path().join("ws"));
        let config = BuilderConfig::new(&AppIdentity::default(), &ws, "1.0.0", &staged(&ws));

        let err = build_installer(&tools, &config, &ws.builder_config, temp.path()).unwrap_err();

        match classify(&err) {
            Some(RepackError::InstallerToolFailed { code, stderr_tail, .. }) => {
                assert_eq!(*code, 2);
                assert!(stderr_tail.contains("cannot find app.ico"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(ws.builder_config.is_file());
    }
}
