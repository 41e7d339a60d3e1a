//! Child process execution.
//!
//! [`ProcessRunner`] is the seam between the invoker and the operating
//! system. [`SystemRunner`] spawns a real child process and blocks until it
//! exits; tests substitute a generated mock.

use std::path::Path;
use std::process::Command;

/// Raw outcome of a finished child process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawOutput {
    /// Exit code, `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    /// Standard output decoded as text.
    pub stdout: String,
    /// Standard error decoded as text.
    pub stderr: String,
}

/// Runs a program to completion and captures its output.
#[cfg_attr(test, mockall::automock)]
pub trait ProcessRunner {
    /// Runs `program` with `args`, waiting for it to exit.
    ///
    /// # Errors
    ///
    /// Returns the system error if the process could not be started or its
    /// output could not be collected.
    fn run(&self, program: &Path, args: &[String]) -> std::io::Result<RawOutput>;
}

/// Runner backed by [`std::process::Command`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl ProcessRunner for SystemRunner {
    fn run(&self, program: &Path, args: &[String]) -> std::io::Result<RawOutput> {
        let output = Command::new(program).args(args).output()?;

        Ok(RawOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

impl RawOutput {
    /// Creates a successful output with the given stdout.
    #[must_use]
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Creates a failed output with the given exit code and stderr.
    #[must_use]
    pub fn failure(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code: Some(exit_code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}
