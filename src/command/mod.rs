//! Argument-vector subprocess execution used by every lifecycle stage.
//!
//! Stages never build shell strings: each call describes the program and its
//! arguments as an [`Invocation`] and hands it to a [`CommandRunner`]. The
//! production [`SystemRunner`] spawns the child and waits for it; tests swap
//! in a scripted runner to observe the exact calls made.

mod output;

pub(crate) use self::output::render_failure;

use std::fmt;
use std::process::{Command, Stdio};

use camino::{Utf8Path, Utf8PathBuf};
use color_eyre::eyre::Context;
use tracing::debug;

use crate::error::ProvisionResult;
use crate::observability::LOG_TARGET;

/// Describes one subprocess call: program, arguments, working directory and
/// whether output should be captured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    program: Utf8PathBuf,
    args: Vec<String>,
    current_dir: Option<Utf8PathBuf>,
    capture: bool,
}

impl Invocation {
    /// Starts an invocation of `program` with no arguments.
    #[must_use]
    pub fn new(program: impl Into<Utf8PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
            capture: false,
        }
    }

    /// Appends a single argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments in order.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Runs the child from `dir` instead of the current working directory.
    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<Utf8PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Requests that stdout and stderr be captured rather than inherited.
    #[must_use]
    pub const fn capture_output(mut self) -> Self {
        self.capture = true;
        self
    }

    /// Program to execute.
    #[must_use]
    pub fn program(&self) -> &Utf8Path {
        &self.program
    }

    /// Arguments passed to the program.
    #[must_use]
    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    /// Working directory override, when set.
    #[must_use]
    pub fn working_dir(&self) -> Option<&Utf8Path> {
        self.current_dir.as_deref()
    }

    /// Whether output is captured.
    #[must_use]
    pub const fn captures_output(&self) -> bool {
        self.capture
    }

    /// Returns the file name of the program, falling back to the full path.
    #[must_use]
    pub fn program_name(&self) -> &str {
        self.program.file_name().unwrap_or(self.program.as_str())
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Exit status and captured streams of a finished child process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, or `None` when the child was terminated by a signal.
    pub exit_code: Option<i32>,
    /// Captured standard output; empty when output was inherited.
    pub stdout: String,
    /// Captured standard error; empty when output was inherited.
    pub stderr: String,
}

impl CommandOutput {
    /// Builds an output record.
    #[must_use]
    pub fn new(exit_code: Option<i32>, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    /// Successful exit with no output.
    #[must_use]
    pub const fn ok() -> Self {
        Self {
            exit_code: Some(0),
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    /// Whether the child exited with status zero.
    #[must_use]
    pub const fn success(&self) -> bool {
        matches!(self.exit_code, Some(0))
    }

    /// Stdout followed by stderr, for diagnostics that want one block of text.
    #[must_use]
    pub fn combined(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => format!("{}\n{}", self.stdout.trim_end(), self.stderr),
        }
    }
}

/// Executes subprocesses on behalf of the lifecycle stages.
///
/// Implementations must wait for the child to exit before returning. An `Err`
/// means the child could not be run at all; a child that ran and failed is
/// reported through [`CommandOutput::exit_code`].
#[cfg_attr(test, mockall::automock)]
pub trait CommandRunner {
    /// Runs `invocation` to completion.
    ///
    /// # Errors
    /// Returns an error when the program cannot be spawned or waited on.
    fn run(&self, invocation: &Invocation) -> ProvisionResult<CommandOutput>;
}

/// Runs invocations with [`std::process::Command`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, invocation: &Invocation) -> ProvisionResult<CommandOutput> {
        let mut command = Command::new(invocation.program().as_std_path());
        command.args(invocation.arguments());
        command.stdin(Stdio::null());
        if let Some(dir) = invocation.working_dir() {
            command.current_dir(dir.as_std_path());
        }
        debug!(
            target: LOG_TARGET,
            command = %invocation,
            capture = invocation.captures_output(),
            "running command"
        );

        if invocation.captures_output() {
            let output = command
                .output()
                .with_context(|| format!("failed to run {}", invocation.program()))?;
            Ok(CommandOutput::new(
                output.status.code(),
                String::from_utf8_lossy(&output.stdout),
                String::from_utf8_lossy(&output.stderr),
            ))
        } else {
            let status = command
                .status()
                .with_context(|| format!("failed to run {}", invocation.program()))?;
            Ok(CommandOutput::new(status.code(), "", ""))
        }
    }
}
