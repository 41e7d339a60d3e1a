//! Process invoker for the `multipass` binary.
//!
//! The invoker builds the full command line, runs it to completion, and
//! normalizes the outcome into a [`CommandResult`] or a single descriptive
//! [`InvokeError`]. It never retries and imposes no timeout.

use std::io::ErrorKind;

use crate::config::MultipassSettings;
use crate::error::{InvokeError, Result};

use super::locator::{LocateBinary, SearchPathLocator};
use super::runner::{ProcessRunner, SystemRunner};
use super::sink::{LogSink, NoopSink};
use super::types::CommandResult;

/// Maximum number of characters of stdout/stderr included in trace messages.
const PREVIEW_CHARS: usize = 512;

/// How an invocation's outcome is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvokeOptions {
    /// Parse stdout as JSON.
    pub expect_json: bool,
    /// Treat a nonzero exit code as an error.
    pub fail_on_nonzero: bool,
}

/// Runs the external binary and normalizes its result.
pub struct Invoker<R = SystemRunner, L = SearchPathLocator> {
    /// Binary name or explicit path.
    binary: String,
    /// Process runner.
    runner: R,
    /// Binary lookup strategy.
    locator: L,
    /// Trace message sink.
    sink: Box<dyn LogSink>,
}

impl Default for InvokeOptions {
    fn default() -> Self {
        Self {
            expect_json: false,
            fail_on_nonzero: true,
        }
    }
}

impl InvokeOptions {
    /// Options for a structured query: parse JSON, fail on nonzero exit.
    #[must_use]
    pub const fn json() -> Self {
        Self {
            expect_json: true,
            fail_on_nonzero: true,
        }
    }

    /// Returns these options with nonzero exits returned as results.
    #[must_use]
    pub const fn allow_nonzero(mut self) -> Self {
        self.fail_on_nonzero = false;
        self
    }
}

impl Invoker<SystemRunner, SearchPathLocator> {
    /// Creates an invoker running real processes according to `settings`.
    #[must_use]
    pub fn new(settings: &MultipassSettings) -> Self {
        Self::with_parts(
            settings.binary.clone(),
            SystemRunner,
            SearchPathLocator::from_settings(settings),
        )
    }
}

impl<R: ProcessRunner, L: LocateBinary> Invoker<R, L> {
    /// Creates an invoker from explicit parts.
    #[must_use]
    pub fn with_parts(binary: impl Into<String>, runner: R, locator: L) -> Self {
        Self {
            binary: binary.into(),
            runner,
            locator,
            sink: Box::new(NoopSink),
        }
    }

    /// Sets the trace message sink.
    #[must_use]
    pub fn with_sink(mut self, sink: impl LogSink + 'static) -> Self {
        self.sink = Box::new(sink);
        self
    }

    /// Returns the trace message sink.
    #[must_use]
    pub fn sink(&self) -> &dyn LogSink {
        self.sink.as_ref()
    }

    /// Returns the configured binary name.
    #[must_use]
    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Runs the binary with `args`.
    ///
    /// # Errors
    ///
    /// - [`InvokeError::BinaryNotFound`] if the binary cannot be located.
    /// - [`InvokeError::InvocationFailed`] if the process cannot be started.
    /// - [`InvokeError::CommandFailed`] on a nonzero exit when
    ///   `fail_on_nonzero` is set.
    /// - [`InvokeError::MalformedOutput`] if JSON was expected and stdout is
    ///   not valid JSON.
    pub fn invoke(&self, args: &[String], options: InvokeOptions) -> Result<CommandResult> {
        let command = self.command_line(args);
        self.sink.log(&format!("Executing: {command}"));

        let program = self
            .locator
            .locate(&self.binary)
            .map_err(|err| self.fail(err))?;

        let raw = self.runner.run(&program, args).map_err(|source| {
            if source.kind() == ErrorKind::NotFound {
                self.fail(InvokeError::BinaryNotFound {
                    binary: self.binary.clone(),
                    searched: program.display().to_string(),
                })
            } else {
                self.fail(InvokeError::InvocationFailed {
                    command: command.clone(),
                    source,
                })
            }
        })?;

        let exit_code = raw.exit_code.unwrap_or(-1);
        let stdout = raw.stdout.trim().to_string();
        let stderr = raw.stderr.trim().to_string();

        self.sink.log(&format!("Command returned code {exit_code}"));
        if !stdout.is_empty() {
            self.sink.log(&format!("stdout: {}", preview(&stdout)));
        }
        if !stderr.is_empty() {
            self.sink.log(&format!("stderr: {}", preview(&stderr)));
        }

        if options.fail_on_nonzero && exit_code != 0 {
            return Err(self.fail(InvokeError::CommandFailed {
                command,
                exit_code,
                stdout,
                stderr,
            }));
        }

        let json = if options.expect_json {
            match serde_json::from_str(&stdout) {
                Ok(value) => {
                    self.sink.log("Successfully parsed JSON output");
                    Some(value)
                }
                Err(e) => {
                    return Err(self.fail(InvokeError::MalformedOutput {
                        command,
                        stdout,
                        reason: e.to_string(),
                    }));
                }
            }
        } else {
            None
        };

        Ok(CommandResult {
            command,
            exit_code,
            stdout,
            stderr,
            json,
        })
    }

    fn command_line(&self, args: &[String]) -> String {
        std::iter::once(self.binary.as_str())
            .chain(args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Logs the error and converts it for propagation.
    fn fail(&self, err: InvokeError) -> crate::error::MultipassError {
        self.sink.log(&err.to_string());
        err.into()
    }
}

impl<R, L> std::fmt::Debug for Invoker<R, L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Invoker")
            .field("binary", &self.binary)
            .finish_non_exhaustive()
    }
}

/// Truncates `text` to at most [`PREVIEW_CHARS`] characters.
fn preview(text: &str) -> String {
    match text.char_indices().nth(PREVIEW_CHARS) {
        Some((end, _)) => format!("{}... ({} bytes total)", &text[..end], text.len()),
        None => text.to_string(),
    }
}
