//! Error types for the Multipass host manager.
//!
//! Failures fall into three families: bad desired-state input caught before
//! any process is launched, failures of the external `multipass` process, and
//! manifest loading problems.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the Multipass host manager.
#[derive(Debug, Error)]
pub enum MultipassError {
    /// Desired-state input was missing or invalid.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The external process could not be run or reported a failure.
    #[error("{0}")]
    Invoke(#[from] InvokeError),

    /// Manifest loading errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// One or more hosts of a manifest failed to reconcile.
    #[error("{failed} of {total} hosts failed to reconcile; first failure: {first_error}")]
    ApplyFailed {
        /// Number of failed hosts.
        failed: usize,
        /// Number of hosts in the manifest.
        total: usize,
        /// Message of the first failure.
        first_error: String,
    },

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Bad or missing required input, raised before any process is launched.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ValidationError {
    /// Description of the problem.
    pub message: String,
    /// Field that failed validation.
    pub field: Option<String>,
}

/// Failures of the external `multipass` process.
#[derive(Debug, Error)]
pub enum InvokeError {
    /// The binary could not be located.
    #[error("{binary} binary not found in PATH or search paths ({searched})")]
    BinaryNotFound {
        /// Binary name or path that was looked up.
        binary: String,
        /// Human-readable list of the locations that were probed.
        searched: String,
    },

    /// The process could not be started or its output could not be collected.
    #[error("Unexpected error running {command}: {source}")]
    InvocationFailed {
        /// The full command line.
        command: String,
        /// Underlying system error.
        #[source]
        source: std::io::Error,
    },

    /// The process exited unsuccessfully.
    #[error(
        "multipass command failed: {command}\nExit code: {exit_code}\nStdout: {stdout}\nStderr: {stderr}"
    )]
    CommandFailed {
        /// The full command line.
        command: String,
        /// Exit code, `-1` when the process was terminated by a signal.
        exit_code: i32,
        /// Captured standard output, trimmed.
        stdout: String,
        /// Captured standard error, trimmed.
        stderr: String,
    },

    /// Structured output was requested but stdout was not valid for it.
    #[error("Failed to parse JSON output of {command} ({reason}): {stdout}")]
    MalformedOutput {
        /// The full command line.
        command: String,
        /// The raw standard output.
        stdout: String,
        /// Parser message.
        reason: String,
    },
}

/// Manifest loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The manifest file was not found.
    #[error("Manifest file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The manifest could not be parsed.
    #[error("Failed to parse manifest: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },
}

/// Result type alias for Multipass host operations.
pub type Result<T> = std::result::Result<T, MultipassError>;

/// Phrases in the output of a failed `info` call that mean the instance is absent.
const MISSING_INSTANCE_MARKERS: &[&str] = &["not found", "does not exist"];

impl MultipassError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::Validation(ValidationError {
            message: message.into(),
            field: Some(field.into()),
        })
    }

    /// Returns true if this error reports a missing instance.
    #[must_use]
    pub fn indicates_missing_instance(&self) -> bool {
        matches!(self, Self::Invoke(err) if err.indicates_missing_instance())
    }
}

impl InvokeError {
    /// Returns true if this is a failed command whose output says the
    /// instance does not exist.
    ///
    /// This is a plain case-insensitive substring match on the captured
    /// stdout and stderr. A differently worded failure that happens to
    /// contain one of the phrases is also classified as missing.
    #[must_use]
    pub fn indicates_missing_instance(&self) -> bool {
        let Self::CommandFailed { stdout, stderr, .. } = self else {
            return false;
        };

        let stdout = stdout.to_lowercase();
        let stderr = stderr.to_lowercase();
        MISSING_INSTANCE_MARKERS
            .iter()
            .any(|marker| stderr.contains(marker) || stdout.contains(marker))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed(stderr: &str) -> InvokeError {
        InvokeError::CommandFailed {
            command: String::from("multipass info ghost-vm --format json"),
            exit_code: 2,
            stdout: String::new(),
            stderr: stderr.to_string(),
        }
    }

    #[test]
    fn test_missing_instance_classification() {
        assert!(failed("instance not found").indicates_missing_instance());
        assert!(
            failed("info failed: instance \"ghost\" does not exist").indicates_missing_instance()
        );
        assert!(failed("Instance Does Not Exist").indicates_missing_instance());
        assert!(!failed("permission denied").indicates_missing_instance());
    }

    #[test]
    fn test_only_command_failures_classify() {
        let err = InvokeError::BinaryNotFound {
            binary: String::from("multipass"),
            searched: String::from("/usr/bin"),
        };
        assert!(!err.indicates_missing_instance());

        let err = InvokeError::MalformedOutput {
            command: String::from("multipass info"),
            stdout: String::from("not found"),
            reason: String::from("expected value"),
        };
        assert!(!err.indicates_missing_instance());
    }

    #[test]
    fn test_command_failed_message_is_diagnosable() {
        let err = InvokeError::CommandFailed {
            command: String::from("multipass fail"),
            exit_code: 2,
            stdout: String::from("partial"),
            stderr: String::from("error"),
        };
        let msg = err.to_string();
        assert!(msg.contains("multipass fail"));
        assert!(msg.contains("Exit code: 2"));
        assert!(msg.contains("Stdout: partial"));
        assert!(msg.contains("Stderr: error"));
    }

    #[test]
    fn test_top_level_classification() {
        let err = MultipassError::from(failed("instance not found"));
        assert!(err.indicates_missing_instance());

        let err = MultipassError::validation("'image' is required", "image");
        assert!(!err.indicates_missing_instance());
    }
}
