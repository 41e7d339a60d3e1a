//! Multipass process integration module.
//!
//! This module runs the external `multipass` binary and turns its output
//! into typed results: locating the binary, spawning it, classifying the
//! exit status, and decoding structured `info` output.

pub mod commands;
mod invoker;
mod locator;
mod runner;
mod sink;
mod types;

pub use invoker::{InvokeOptions, Invoker};
pub use locator::{FixedLocator, LocateBinary, SearchPathLocator};
#[cfg(test)]
pub(crate) use runner::MockProcessRunner;
#[cfg(test)]
pub(crate) use sink::RecordingSink;
pub use runner::{ProcessRunner, RawOutput, SystemRunner};
pub use sink::{LogSink, NoopSink, TracingSink};
pub use types::{CommandResult, InfoResponse, InstanceInfo};
