//! Run configuration.
//!
//! [`RepackConfig`] is built once by the caller and handed to every stage.
//! Layering is built-in defaults, then an optional `repack.toml`, then
//! command-line overrides.
//!
//! ```toml
//! [source]
//! url = "https://example.invalid/Codex.dmg"
//!
//! [tools]
//! seven_zip = "7zz"
//!
//! [[patches]]
//! name = "force-win32-shell"
//! stage = "runtime_environment"
//! file = ".vite/build/main.js"
//! anchor = "process.platform"
//! literal = "shell:\"/bin/zsh\""
//! replacement = "shell:\"powershell.exe\""
//! context_radius = 4096
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::RepackError;
use crate::patchset::{PatchToml, RegisteredPatch};
use crate::workspace::WorkspacePaths;

pub const DEFAULT_DMG_URL: &str = "https://persistent.oaistatic.com/codex-app-prod/Codex.dmg";
pub const DEFAULT_LOCAL_DMG: &str = "Codex.dmg";
pub const DEFAULT_ELECTRON_VERSION: &str = "40.0.0";
pub const DEFAULT_NODE_PTY_VERSION: &str = "^1.1.0";
pub const DEFAULT_SQLITE_VERSION: &str = "^12.4.6";
pub const ELECTRON_HEADERS_URL: &str = "https://electronjs.org/headers";
pub const DEFAULT_BINARIES_PACKAGE: &str = "node_modules/@openai/codex-win32-x64";
pub const DEFAULT_WORKSPACE_DIR: &str = "build";
pub const CONFIG_FILENAME: &str = "repack.toml";

/// Program names (or paths) of the external tools.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    pub seven_zip: String,
    pub npm: String,
    pub npx: String,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            seven_zip: "7z".to_string(),
            npm: "npm".to_string(),
            npx: "npx".to_string(),
        }
    }
}

/// Identity of the produced Windows application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppIdentity {
    pub app_id: String,
    pub product_name: String,
    /// Installer file names are `<prefix><version>.exe`.
    pub installer_prefix: String,
}

impl Default for AppIdentity {
    fn default() -> Self {
        Self {
            app_id: "com.openai.codex".to_string(),
            product_name: "Codex".to_string(),
            installer_prefix: "Codex-Setup-".to_string(),
        }
    }
}

/// Where the input archive should come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRequest {
    /// Explicit local archive; wins over everything else.
    pub local_file: Option<PathBuf>,
    pub url: String,
    /// Whether `url` was chosen by the user rather than defaulted.
    pub explicit_url: bool,
    /// Checked before downloading when no URL was given explicitly.
    pub default_local_file: PathBuf,
}

/// Values supplied on the command line.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub dmg_url: Option<String>,
    pub dmg_file: Option<PathBuf>,
    pub electron_version: Option<String>,
    pub workspace: Option<PathBuf>,
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct RepackConfig {
    pub toolkit_root: PathBuf,
    pub workspace: WorkspacePaths,
    pub source: SourceRequest,
    /// ABI override; replaces the version declared by the source package.
    pub electron_override: Option<String>,
    pub tools: ToolPaths,
    pub app: AppIdentity,
    pub headers_url: String,
    pub binaries_package_dir: PathBuf,
    pub extra_patches: Vec<RegisteredPatch>,
    /// The TOML file that was layered in, if any.
    pub config_file: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RepackToml {
    source: Option<SourceToml>,
    tools: Option<ToolsToml>,
    app: Option<AppToml>,
    native: Option<NativeToml>,
    binaries: Option<BinariesToml>,
    #[serde(default)]
    patches: Vec<PatchToml>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SourceToml {
    url: Option<String>,
    local_file: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ToolsToml {
    seven_zip: Option<String>,
    npm: Option<String>,
    npx: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AppToml {
    app_id: Option<String>,
    product_name: Option<String>,
    installer_prefix: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct NativeToml {
    headers_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BinariesToml {
    package_dir: Option<String>,
}

impl RepackConfig {
    /// Defaults only, rooted at `toolkit_root`.
    pub fn defaults(toolkit_root: &Path) -> Self {
        Self {
            toolkit_root: toolkit_root.to_path_buf(),
            workspace: WorkspacePaths::new(&toolkit_root.join(DEFAULT_WORKSPACE_DIR)),
            source: SourceRequest {
                local_file: None,
                url: DEFAULT_DMG_URL.to_string(),
                explicit_url: false,
                default_local_file: toolkit_root.join(DEFAULT_LOCAL_DMG),
            },
            electron_override: None,
            tools: ToolPaths::default(),
            app: AppIdentity::default(),
            headers_url: ELECTRON_HEADERS_URL.to_string(),
            binaries_package_dir: toolkit_root.join(DEFAULT_BINARIES_PACKAGE),
            extra_patches: Vec::new(),
            config_file: None,
        }
    }

    /// Defaults, then the config file (if any), then command-line overrides.
    pub fn load(toolkit_root: &Path, cli: &CliOverrides) -> Result<Self> {
        let mut config = Self::defaults(toolkit_root);
        if let Some(path) = locate_config_file(toolkit_root, cli.config.as_deref())? {
            tracing::info!("Using config file {}", path.display());
            let text = fs::read_to_string(&path)
                .with_context(|| format!("reading config '{}'", path.display()))?;
            config.apply_toml_str(&text, &path)?;
            config.config_file = Some(path);
        }
        config.apply_cli(cli)?;
        Ok(config)
    }

    fn apply_toml_str(&mut self, text: &str, origin: &Path) -> Result<()> {
        let parsed: RepackToml = toml::from_str(text)
            .with_context(|| format!("parsing config '{}'", origin.display()))?;
        let root = self.toolkit_root.clone();

        if let Some(source) = parsed.source {
            if let Some(url) = source.url {
                self.source.url = url;
                self.source.explicit_url = true;
            }
            if let Some(local) = source.local_file {
                self.source.default_local_file = resolve_toolkit_path(&root, &local);
            }
        }
        if let Some(tools) = parsed.tools {
            if let Some(v) = tools.seven_zip {
                self.tools.seven_zip = v;
            }
            if let Some(v) = tools.npm {
                self.tools.npm = v;
            }
            if let Some(v) = tools.npx {
                self.tools.npx = v;
            }
        }
        if let Some(app) = parsed.app {
            if let Some(v) = app.app_id {
                self.app.app_id = v;
            }
            if let Some(v) = app.product_name {
                self.app.product_name = v;
            }
            if let Some(v) = app.installer_prefix {
                self.app.installer_prefix = v;
            }
        }
        if let Some(url) = parsed.native.and_then(|n| n.headers_url) {
            self.headers_url = url;
        }
        if let Some(dir) = parsed.binaries.and_then(|b| b.package_dir) {
            self.binaries_package_dir = resolve_toolkit_path(&root, &dir);
        }
        for patch in parsed.patches {
            let registered = patch
                .into_registered()
                .with_context(|| format!("invalid patch entry in '{}'", origin.display()))?;
            self.extra_patches.push(registered);
        }
        Ok(())
    }

    fn apply_cli(&mut self, cli: &CliOverrides) -> Result<()> {
        if let Some(url) = &cli.dmg_url {
            if url.trim().is_empty() {
                return Err(RepackError::input("--dmg-url must not be empty").into());
            }
            self.source.url = url.clone();
            self.source.explicit_url = true;
        }
        if let Some(file) = &cli.dmg_file {
            self.source.local_file = Some(resolve_toolkit_path(
                &self.toolkit_root,
                &file.to_string_lossy(),
            ));
        }
        if let Some(version) = &cli.electron_version {
            let version = version.trim();
            if version.is_empty() {
                return Err(RepackError::input("--electron-version must not be empty").into());
            }
            self.electron_override = Some(version.to_string());
        }
        if let Some(workspace) = &cli.workspace {
            let root = resolve_toolkit_path(&self.toolkit_root, &workspace.to_string_lossy());
            self.workspace = WorkspacePaths::new(&root);
        }
        Ok(())
    }
}

fn locate_config_file(toolkit_root: &Path, explicit: Option<&Path>) -> Result<Option<PathBuf>> {
    if let Some(path) = explicit {
        if !path.is_file() {
            return Err(RepackError::input(format!(
                "config file not found: {}",
                path.display()
            ))
            .into());
        }
        return Ok(Some(path.to_path_buf()));
    }
    let local = toolkit_root.join(CONFIG_FILENAME);
    if local.is_file() {
        return Ok(Some(local));
    }
    Ok(dirs::config_dir()
        .map(|dir| dir.join("codex-repack").join(CONFIG_FILENAME))
        .filter(|path| path.is_file()))
}

pub(crate) fn resolve_toolkit_path(toolkit_root: &Path, path: &str) -> PathBuf {
    let candidate = Path::new(path);
    if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        toolkit_root.join(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::classify;
    use crate::patchset::PatchStage;

    #[test]
    fn defaults_point_at_codex_release() {
        let config = RepackConfig::defaults(Path::new("/toolkit"));
        assert_eq!(config.source.url, DEFAULT_DMG_URL);
        assert!(!config.source.explicit_url);
        assert_eq!(
            config.source.default_local_file,
            PathBuf::from("/toolkit/Codex.dmg")
        );
        assert_eq!(config.workspace.root(), Path::new("/toolkit/build"));
        assert!(config.electron_override.is_none());
    }

    #[test]
    fn cli_overrides_win_over_defaults() {
        let mut config = RepackConfig::defaults(Path::new("/toolkit"));
        config
            .apply_cli(&CliOverrides {
                dmg_url: Some("https://mirror.invalid/Codex.dmg".to_string()),
                dmg_file: Some(PathBuf::from("inputs/Codex.dmg")),
                electron_version: Some(" 39.2.1 ".to_string()),
                workspace: Some(PathBuf::from("/tmp/ws")),
                config: None,
            })
            .unwrap();

        assert!(config.source.explicit_url);
        assert_eq!(
            config.source.local_file,
            Some(PathBuf::from("/toolkit/inputs/Codex.dmg"))
        );
        assert_eq!(config.electron_override.as_deref(), Some("39.2.1"));
        assert_eq!(config.workspace.root(), Path::new("/tmp/ws"));
    }

    #[test]
    fn empty_electron_override_is_input_error() {
        let mut config = RepackConfig::defaults(Path::new("/toolkit"));
        let err = config
            .apply_cli(&CliOverrides {
                electron_version: Some("  ".to_string()),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(classify(&err), Some(RepackError::Input(_))));
    }

    #[test]
    fn toml_layer_sets_tools_and_patches() {
        let mut config = RepackConfig::defaults(Path::new("/toolkit"));
        config
            .apply_toml_str(
                r#"
[tools]
seven_zip = "7zz"

[binaries]
package_dir = "vendor/codex-win32-x64"

[[patches]]
name = "normalize-path-sep"
stage = "path_normalization"
dir = "webview/assets"
file_pattern = '^index-.*\.js$'
anchor = "pathSep"
regex = 'sep:"/"'
replacement = 'sep:"\\"'
"#,
                Path::new("repack.toml"),
            )
            .unwrap();

        assert_eq!(config.tools.seven_zip, "7zz");
        assert_eq!(config.tools.npm, "npm");
        assert_eq!(
            config.binaries_package_dir,
            PathBuf::from("/toolkit/vendor/codex-win32-x64")
        );
        assert_eq!(config.extra_patches.len(), 1);
        assert_eq!(config.extra_patches[0].stage, PatchStage::PathNormalization);
    }

    #[test]
    fn toml_rejects_unknown_fields() {
        let mut config = RepackConfig::defaults(Path::new("/toolkit"));
        let result = config.apply_toml_str("[tools]\nzip = \"7z\"\n", Path::new("repack.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn missing_explicit_config_is_input_error() {
        let err = locate_config_file(
            Path::new("/toolkit"),
            Some(Path::new("/definitely/not/here/repack.toml")),
        )
        .unwrap_err();
        assert!(matches!(classify(&err), Some(RepackError::Input(_))));
    }

    #[test]
    fn load_records_toolkit_config_file() {
        let temp = tempfile::TempDir::new().unwrap();
        fs::write(temp.path().join(CONFIG_FILENAME), "[tools]\nnpx = \"npx-11\"\n").unwrap();

        let config = RepackConfig::load(temp.path(), &CliOverrides::default()).unwrap();

        assert_eq!(config.tools.npx, "npx-11");
        assert_eq!(config.config_file, Some(temp.path().join(CONFIG_FILENAME)));
    }
}
