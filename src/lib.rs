//! Repackaging of the macOS Codex desktop app as a Windows installer.
//!
//! The input is the published `Codex.dmg`. The output is an NSIS installer
//! built by electron-builder, plus `build-metadata.json` describing how it
//! was made.
//!
//! # Architecture
//!
//! ```text
//! Codex.dmg
//!     │  source      local file or streamed download
//!     │  locator     find <volume>/Codex.app/Contents/Resources in `7z l`
//!     │  archive     7z extract, asar unpack
//!     ▼
//! app-unpacked/
//!     │  versions    Electron ABI, node-pty / better-sqlite3 ranges
//!     │  native      npm install against the Electron headers
//!     │  assemble    copy, swap native modules, package.json, patches
//!     ▼
//! win-app-source/ + win-binaries/ + win-extra/ (icon, notices)
//!     │  installer   electron-builder --win nsis --x64
//!     ▼
//! release/Codex-Setup-<version>.exe + build-metadata.json
//! ```
//!
//! Everything runs from one explicitly constructed [`config::RepackConfig`];
//! there is no global state. [`pipeline::run`] drives the whole sequence.
//!
//! # Example
//!
//! ```rust,no_run
//! use codex_repack::config::{CliOverrides, RepackConfig};
//! use std::path::Path;
//!
//! let config = RepackConfig::load(Path::new("."), &CliOverrides::default())?;
//! let outcome = codex_repack::pipeline::run(&config)?;
//! println!("{} {}", outcome.installer.display(), outcome.sha256);
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod archive;
pub mod assemble;
pub mod config;
pub mod error;
pub mod extras;
pub mod filesystem;
pub mod icon;
pub mod installer;
pub mod locator;
pub mod manifest;
pub mod native;
pub mod package;
pub mod patch;
pub mod patchset;
pub mod pipeline;
pub mod preflight;
pub mod process;
pub mod source;
pub mod versions;
pub mod workspace;

pub use error::{classify, RepackError};
pub use patch::{apply_patch, PatchResult, PatchSpec, Pattern};
