//! Failure taxonomy for the repack pipeline.
//!
//! Pipeline functions return [`anyhow::Result`] and attach path context as
//! they go. When a failure belongs to one of the categories below it is
//! raised as a [`RepackError`], which stays reachable through
//! `anyhow::Error::downcast_ref` no matter how much context is layered on
//! top of it.
//!
//! None of these are retryable. The workspace is wiped at the start of every
//! run, so the recovery path is always a fresh run.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepackError {
    /// Bad arguments, or a required local input that does not exist.
    #[error("invalid input: {0}")]
    Input(String),

    /// The archive listing contains no usable line for the marker.
    #[error("unable to find '{marker}' in archive listing")]
    ResourceNotFound { marker: String },

    /// No candidate file contains the patch anchor.
    #[error("patch '{patch}': no candidate file under '{}' contains anchor '{anchor}'", .root.display())]
    PatchTargetNotFound {
        patch: String,
        root: PathBuf,
        anchor: String,
    },

    /// The occurrence count of a patch pattern differs from the expected count.
    #[error(
        "patch '{patch}': expected {expected} occurrence(s) of '{pattern}' in '{}', found {actual}",
        .file.display()
    )]
    PatchInvariantViolated {
        patch: String,
        file: PathBuf,
        pattern: String,
        expected: usize,
        actual: usize,
    },

    /// The native toolchain exited non-zero.
    #[error("native module build failed ({command}), exit code {code}: {stderr_tail}")]
    NativeBuildFailed {
        command: String,
        code: i32,
        stderr_tail: String,
    },

    /// The native toolchain succeeded but an expected module directory is absent.
    #[error("native module '{module}' missing after build: {}", .path.display())]
    NativeArtifactMissing { module: String, path: PathBuf },

    /// No frame in the icon container carries a PNG payload.
    #[error("no PNG icon frames found in {}", .path.display())]
    NoIconFrames { path: PathBuf },

    /// The installer generator exited non-zero.
    #[error("installer tool failed ({command}), exit code {code}: {stderr_tail}")]
    InstallerToolFailed {
        command: String,
        code: i32,
        stderr_tail: String,
    },

    /// The installer generator left no file matching the naming convention.
    #[error("no installer matching '{pattern}' found in {}", .dir.display())]
    NoInstallerProduced { dir: PathBuf, pattern: String },

    /// A black-box archive tool (7-Zip, asar) exited non-zero.
    #[error("command failed ({command}), exit code {code}: {stderr_tail}")]
    ToolFailed {
        command: String,
        code: i32,
        stderr_tail: String,
    },
}

impl RepackError {
    pub fn input(message: impl Into<String>) -> Self {
        Self::Input(message.into())
    }
}

/// Find the [`RepackError`] at the root of an `anyhow` chain, if any.
pub fn classify(err: &anyhow::Error) -> Option<&RepackError> {
    err.chain().find_map(|cause| cause.downcast_ref::<RepackError>())
}
