//! CLI module for the Multipass host manager.
//!
//! This module provides the command-line interface standing in for the
//! configuration-management entry point.

mod commands;
mod output;

pub use commands::{Cli, Commands, HostArgs, OutputFormat};
pub use output::OutputFormatter;
