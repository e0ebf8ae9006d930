use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use codex_repack::config::{CliOverrides, RepackConfig};
use codex_repack::pipeline;
use fs2::FileExt;
use tracing_subscriber::EnvFilter;

/// Repackage the macOS Codex DMG as a Windows NSIS installer.
#[derive(Debug, Parser)]
#[command(name = "codex-repack", version)]
struct Cli {
    /// Download the DMG from this URL instead of the default release URL.
    #[arg(long, value_name = "URL")]
    dmg_url: Option<String>,

    /// Use a local DMG instead of downloading one.
    #[arg(long, value_name = "PATH")]
    dmg_file: Option<PathBuf>,

    /// Electron version to rebuild native modules against.
    #[arg(long, value_name = "VERSION")]
    electron_version: Option<String>,

    /// Toolkit root holding node_modules and the optional repack.toml.
    #[arg(long, value_name = "DIR", default_value = ".")]
    toolkit: PathBuf,

    /// Workspace directory (default: <toolkit>/build). Wiped on every run.
    #[arg(long, value_name = "DIR")]
    workspace: Option<PathBuf>,

    /// Config file (default: <toolkit>/repack.toml, then the user config dir).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Debug logging.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        // --help and --version
        Err(e) if !e.use_stderr() => e.exit(),
        Err(e) => {
            eprintln!("error: {}", usage_error_line(&e));
            return ExitCode::from(1);
        }
    };
    init_tracing(cli.verbose);

    match real_main(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(1)
        }
    }
}

/// First line of a clap error, without clap's own `error: ` label.
fn usage_error_line(err: &clap::Error) -> String {
    let rendered = err.to_string();
    let line = rendered
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("invalid arguments");
    line.strip_prefix("error: ").unwrap_or(line).to_string()
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn real_main(cli: Cli) -> Result<()> {
    let cwd = std::env::current_dir().context("reading current directory")?;
    let toolkit = cwd.join(&cli.toolkit);

    let config = RepackConfig::load(
        &toolkit,
        &CliOverrides {
            dmg_url: cli.dmg_url,
            dmg_file: cli.dmg_file.map(|file| cwd.join(file)),
            electron_version: cli.electron_version,
            workspace: cli.workspace.map(|dir| cwd.join(dir)),
            config: cli.config.map(|file| cwd.join(file)),
        },
    )?;

    let _lock = lock_workspace(config.workspace.root())?;
    let outcome = pipeline::run(&config)?;

    println!("Installer: {}", outcome.installer.display());
    println!("SHA256: {}", outcome.sha256);
    Ok(())
}

/// Exclusive advisory lock on `<workspace>.lock`, held until the returned
/// file is dropped.
fn lock_workspace(root: &Path) -> Result<File> {
    let mut lock_path = OsString::from(root.as_os_str());
    lock_path.push(".lock");
    let lock_path = PathBuf::from(lock_path);
    if let Some(parent) = lock_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    // Never unlink the lock file; a second process could lock a fresh inode.
    let lock_file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(&lock_path)
        .with_context(|| format!("Failed to create lock file: {}", lock_path.display()))?;

    if lock_file.try_lock_exclusive().is_err() {
        anyhow::bail!(
            "workspace is in use by another codex-repack run: {}",
            lock_path.display()
        );
    }
    Ok(lock_file)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_error(args: &[&str]) -> clap::Error {
        Cli::try_parse_from(std::iter::once("codex-repack").chain(args.iter().copied()))
            .unwrap_err()
    }

    #[test]
    fn flag_without_value_reports_one_line() {
        let err = parse_error(&["--dmg-url"]);
        assert!(err.use_stderr());

        let line = usage_error_line(&err);
        assert!(!line.contains('\n'));
        assert!(!line.starts_with("error:"));
        assert!(line.contains("--dmg-url"), "{line}");
    }

    #[test]
    fn unknown_flag_reports_one_line() {
        let line = usage_error_line(&parse_error(&["--dmg-path", "x.dmg"]));
        assert!(!line.contains('\n'));
        assert!(line.contains("--dmg-path"), "{line}");
    }

    #[test]
    fn help_is_not_an_error() {
        assert!(!parse_error(&["--help"]).use_stderr());
    }
}
