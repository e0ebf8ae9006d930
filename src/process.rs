//! Subprocess execution for the external tools the pipeline drives.
//!
//! Children inherit the caller's environment with explicit overrides layered
//! on top. Their stdout/stderr are echoed to ours as they arrive and buffered
//! at the same time, so a failure can quote what the tool said.

use anyhow::{Context, Result};
use std::ffi::{OsStr, OsString};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;

use crate::error::RepackError;

/// Lines of stderr kept in error messages.
const STDERR_TAIL_LINES: usize = 20;

/// Captured result of a finished child process.
#[derive(Debug, Clone)]
pub struct CmdOutput {
    pub command: String,
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CmdOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }

    /// The last few stderr lines, joined for a one-line error message.
    pub fn stderr_tail(&self) -> String {
        let lines: Vec<&str> = self
            .stderr
            .lines()
            .filter(|line| !line.trim().is_empty())
            .collect();
        let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
        lines[start..].join(" | ")
    }
}

/// Builder for one external command invocation.
#[derive(Debug, Clone)]
pub struct Cmd {
    program: OsString,
    args: Vec<OsString>,
    cwd: Option<PathBuf>,
    env: Vec<(OsString, OsString)>,
    echo: bool,
}

impl Cmd {
    pub fn new(program: impl AsRef<OsStr>) -> Self {
        Self {
            program: resolve_program(program.as_ref()),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
            echo: true,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    pub fn arg_path(self, path: &Path) -> Self {
        self.arg(path.as_os_str())
    }

    pub fn current_dir(mut self, dir: &Path) -> Self {
        self.cwd = Some(dir.to_path_buf());
        self
    }

    pub fn env(mut self, key: impl AsRef<OsStr>, value: impl AsRef<OsStr>) -> Self {
        self.env
            .push((key.as_ref().to_os_string(), value.as_ref().to_os_string()));
        self
    }

    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<OsStr>,
        V: AsRef<OsStr>,
    {
        for (key, value) in vars {
            self = self.env(key, value);
        }
        self
    }

    /// Buffer output without echoing it (for large machine-read output).
    pub fn quiet(mut self) -> Self {
        self.echo = false;
        self
    }

    /// Human-readable command line for logs and errors.
    pub fn display(&self) -> String {
        std::iter::once(&self.program)
            .chain(self.args.iter())
            .map(|part| part.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Run to completion. A non-zero exit is not an error here.
    pub fn output(&self) -> Result<CmdOutput> {
        let command = self.display();
        tracing::debug!(%command, cwd = ?self.cwd, "spawning");

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .envs(self.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }

        let mut child = cmd
            .spawn()
            .with_context(|| format!("Failed to execute: {command}"))?;

        let stdout = child.stdout.take().context("child stdout not captured")?;
        let stderr = child.stderr.take().context("child stderr not captured")?;
        let echo = self.echo;
        let out_reader = thread::spawn(move || tee(stdout, echo.then(io::stdout)));
        let err_reader = thread::spawn(move || tee(stderr, echo.then(io::stderr)));

        let status = child
            .wait()
            .with_context(|| format!("waiting for: {command}"))?;
        let stdout = join_reader(out_reader)?;
        let stderr = join_reader(err_reader)?;

        Ok(CmdOutput {
            command,
            code: status.code().unwrap_or(-1),
            stdout,
            stderr,
        })
    }

    /// Run and require a zero exit status.
    pub fn run(&self) -> Result<CmdOutput> {
        let output = self.output()?;
        if !output.success() {
            return Err(RepackError::ToolFailed {
                command: output.command.clone(),
                code: output.code,
                stderr_tail: output.stderr_tail(),
            }
            .into());
        }
        Ok(output)
    }
}

fn tee<R: Read, W: Write>(mut source: R, mut sink: Option<W>) -> io::Result<String> {
    let mut captured = Vec::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = source.read(&mut buf)?;
        if n == 0 {
            break;
        }
        if let Some(sink) = sink.as_mut() {
            sink.write_all(&buf[..n])?;
            sink.flush()?;
        }
        captured.extend_from_slice(&buf[..n]);
    }
    Ok(String::from_utf8_lossy(&captured).into_owned())
}

fn join_reader(handle: thread::JoinHandle<io::Result<String>>) -> Result<String> {
    handle
        .join()
        .map_err(|_| anyhow::anyhow!("output reader thread panicked"))?
        .context("reading child output")
}

/// npm and npx ship as `.cmd` shims on Windows.
fn resolve_program(program: &OsStr) -> OsString {
    if !cfg!(windows) {
        return program.to_os_string();
    }
    match program.to_str() {
        Some(name @ ("npm" | "npx")) => OsString::from(format!("{name}.cmd")),
        _ => program.to_os_string(),
    }
}
