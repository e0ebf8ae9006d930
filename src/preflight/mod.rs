//! Preflight checks for the repack run.
//!
//! Validates that the host has the external tools the pipeline drives before
//! the workspace is touched. A missing 7-Zip otherwise surfaces as a spawn
//! failure halfway through a download.
//!
//! # Example
//!
//! ```rust,no_run
//! use codex_repack::preflight::{command_exists, check_required_tools};
//!
//! if !command_exists("7z") {
//!     println!("7-Zip not installed");
//! }
//!
//! let tools = &[("npm", "Node.js"), ("npx", "Node.js")];
//! if let Err(e) = check_required_tools(tools) {
//!     eprintln!("{}", e);
//! }
//! ```

use anyhow::Result;

use crate::config::ToolPaths;
use crate::error::RepackError;

/// Check if a command resolves on `PATH` (or is an existing path).
pub fn command_exists(cmd: &str) -> bool {
    which::which(cmd).is_ok()
}

/// Each tuple is (command_name, where_to_get_it).
pub fn required_tools(tools: &ToolPaths) -> Vec<(&str, &'static str)> {
    vec![
        (tools.seven_zip.as_str(), "7-Zip (p7zip-full / 7zip)"),
        (tools.npm.as_str(), "Node.js"),
        (tools.npx.as_str(), "Node.js"),
    ]
}

/// Check that specific tools are available.
///
/// All missing tools are reported at once.
pub fn check_required_tools(tools: &[(&str, &str)]) -> Result<()> {
    let missing: Vec<_> = tools
        .iter()
        .filter(|(tool, _)| !command_exists(tool))
        .collect();

    if !missing.is_empty() {
        let msg = missing
            .iter()
            .map(|(t, p)| format!("{} (install: {})", t, p))
            .collect::<Vec<_>>()
            .join(", ");
        return Err(RepackError::input(format!("missing required host tools: {msg}")).into());
    }

    Ok(())
}

/// Check every tool named in the run configuration.
pub fn check_host_tools(tools: &ToolPaths) -> Result<()> {
    check_required_tools(&required_tools(tools))
}
