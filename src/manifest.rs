//! Installer discovery, content hash and the build-metadata record.

use anyhow::{Context, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use time::OffsetDateTime;

use crate::error::RepackError;
use crate::filesystem::write_json_atomic;
use crate::patch::PatchResult;
use crate::source::SourceProvenance;
use crate::versions::VersionSet;

/// Newest `<prefix>*.exe` in `dir`, ignoring electron-builder's
/// `__uninstaller` by-products. Picking by mtime skips installers left over
/// from an earlier run.
pub fn find_installer(dir: &Path, prefix: &str) -> Result<PathBuf> {
    let mut newest: Option<(SystemTime, PathBuf)> = None;
    if dir.is_dir() {
        for entry in
            fs::read_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))?
        {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !is_installer_name(name, prefix) || !entry.file_type()?.is_file() {
                continue;
            }
            let modified = entry
                .metadata()?
                .modified()
                .with_context(|| format!("Failed to stat {name}"))?;
            let path = entry.path();
            let newer = match &newest {
                Some((best_time, best_path)) => {
                    (modified, &path) > (*best_time, best_path)
                }
                None => true,
            };
            if newer {
                newest = Some((modified, path));
            }
        }
    }

    newest.map(|(_, path)| path).ok_or_else(|| {
        RepackError::NoInstallerProduced {
            dir: dir.to_path_buf(),
            pattern: format!("{prefix}*.exe"),
        }
        .into()
    })
}

fn is_installer_name(name: &str, prefix: &str) -> bool {
    name.starts_with(prefix) && name.ends_with(".exe") && !name.contains("__uninstaller")
}

/// Streamed SHA-256 of a file as uppercase hex.
pub fn sha256_file(path: &Path) -> Result<String> {
    let f = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut r = BufReader::new(f);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = r.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:X}", hasher.finalize()))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatchRecord {
    pub name: String,
    pub path: PathBuf,
    pub applied: bool,
}

impl From<&PatchResult> for PatchRecord {
    fn from(result: &PatchResult) -> Self {
        Self {
            name: result.name.clone(),
            path: result.path.clone(),
            applied: result.occurrences > 0,
        }
    }
}

/// The durable record of a run, written next to the installer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildMetadata {
    pub version: String,
    pub electron_version: String,
    pub node_pty_version: String,
    pub sqlite_version: String,
    pub source_dmg_url: String,
    pub source_dmg_file: String,
    pub installer_file: PathBuf,
    pub installer_name: String,
    pub sha256: String,
    pub patches: Vec<PatchRecord>,
    pub generated_at_utc: String,
}

pub struct MetadataInputs<'a> {
    pub app_version: &'a str,
    pub versions: &'a VersionSet,
    pub provenance: &'a SourceProvenance,
    pub installer: &'a Path,
    pub sha256: &'a str,
    pub patches: &'a [PatchResult],
}

impl BuildMetadata {
    pub fn new(inputs: &MetadataInputs<'_>, generated_at_utc: String) -> Self {
        Self {
            version: inputs.app_version.to_string(),
            electron_version: inputs.versions.electron_version.clone(),
            node_pty_version: inputs.versions.node_pty_version.clone(),
            sqlite_version: inputs.versions.sqlite_version.clone(),
            source_dmg_url: inputs.provenance.url().to_string(),
            source_dmg_file: inputs.provenance.local_file(),
            installer_file: inputs.installer.to_path_buf(),
            installer_name: inputs
                .installer
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            sha256: inputs.sha256.to_string(),
            patches: inputs.patches.iter().map(PatchRecord::from).collect(),
            generated_at_utc,
        }
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        write_json_atomic(path, self)
    }
}

/// `YYYY-MM-DDTHH:MM:SSZ`
pub fn now_utc_rfc3339() -> String {
    let now = OffsetDateTime::now_utc();
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
        now.year(),
        now.month() as u8,
        now.day(),
        now.hour(),
        now.minute(),
        now.second()
    )
}
