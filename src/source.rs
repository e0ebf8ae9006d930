//! Input archive acquisition.
//!
//! Order: an explicit local file, then the conventional local `Codex.dmg`
//! (only when no URL was asked for), then a streamed download.

use anyhow::{bail, Context, Result};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::SourceRequest;
use crate::error::RepackError;
use crate::filesystem::{canonical_path, copy_file};

/// Where the input archive came from. Exactly one of the two.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceProvenance {
    Url(String),
    /// Absolute path of the local archive.
    LocalFile(PathBuf),
}

impl SourceProvenance {
    /// The URL, or an empty string.
    pub fn url(&self) -> &str {
        match self {
            Self::Url(url) => url,
            Self::LocalFile(_) => "",
        }
    }

    /// The local path, or an empty string.
    pub fn local_file(&self) -> String {
        match self {
            Self::Url(_) => String::new(),
            Self::LocalFile(path) => path.display().to_string(),
        }
    }
}

/// Decide where the archive will come from without touching it.
pub fn plan(request: &SourceRequest) -> Result<SourceProvenance> {
    if let Some(file) = &request.local_file {
        if !file.is_file() {
            return Err(
                RepackError::input(format!("DMG file not found: {}", file.display())).into(),
            );
        }
        return Ok(SourceProvenance::LocalFile(canonical_path(file)?));
    }

    if !request.explicit_url && request.default_local_file.is_file() {
        return Ok(SourceProvenance::LocalFile(canonical_path(
            &request.default_local_file,
        )?));
    }

    Ok(SourceProvenance::Url(request.url.clone()))
}

/// Place the planned input archive at `dest`.
pub fn acquire(provenance: &SourceProvenance, dest: &Path) -> Result<()> {
    match provenance {
        SourceProvenance::LocalFile(path) => {
            tracing::info!("Using local DMG {}", path.display());
            copy_file(path, dest)
        }
        SourceProvenance::Url(url) => {
            tracing::info!("Downloading {url}");
            download(url, dest)
        }
    }
}

/// Streamed HTTP GET into `dest`, via a `.part` file renamed on completion.
pub fn download(url: &str, dest: &Path) -> Result<()> {
    let client = reqwest::blocking::Client::builder()
        .user_agent(concat!("codex-repack/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(30))
        .timeout(None::<Duration>)
        .build()
        .context("building HTTP client")?;

    let mut response = client
        .get(url)
        .send()
        .with_context(|| format!("Download failed: {url}"))?;
    let status = response.status();
    if !status.is_success() {
        bail!("Download failed: {url}: HTTP {status}");
    }

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let part = dest.with_extension("part");
    let file =
        File::create(&part).with_context(|| format!("Failed to create {}", part.display()))?;
    let mut writer = BufWriter::new(file);
    let bytes = response
        .copy_to(&mut writer)
        .with_context(|| format!("Download interrupted: {url}"))?;
    writer.flush()?;
    fs::rename(&part, dest)
        .with_context(|| format!("Failed to move {} into place", part.display()))?;

    tracing::info!("Downloaded {bytes} bytes to {}", dest.display());
    Ok(())
}
