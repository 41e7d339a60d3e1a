//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{DesiredState, InstanceSpec, MultipassSettings};

/// Multipass hosts - idempotent management of local Multipass VMs.
#[derive(Parser, Debug)]
#[command(name = "multipass-hosts")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the hosts manifest.
    #[arg(short, long, global = true, env = "MULTIPASS_HOSTS_MANIFEST")]
    pub manifest: Option<PathBuf>,

    /// Name of, or path to, the multipass binary.
    #[arg(long, global = true)]
    pub binary: Option<String>,

    /// Extra directory searched for the binary after PATH (repeatable).
    #[arg(long = "search-path", global = true, value_name = "DIR")]
    pub search_paths: Vec<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ensure a single instance is present or absent.
    Host(HostArgs),

    /// List every instance and its observed state.
    List,

    /// Show the observed state of one instance.
    Info {
        /// Instance name.
        name: String,
    },

    /// Reconcile every host in the manifest.
    Apply {
        /// Continue with the remaining hosts after a failure.
        #[arg(long)]
        continue_on_error: bool,
    },

    /// Validate the hosts manifest.
    Validate {
        /// Show all warnings, not just errors.
        #[arg(short, long)]
        warnings: bool,
    },

    /// Run an arbitrary multipass command.
    Run {
        /// Return a nonzero exit as a result instead of failing.
        #[arg(long)]
        no_check: bool,

        /// Parse stdout as JSON.
        #[arg(long)]
        json: bool,

        /// Arguments passed to multipass.
        #[arg(last = true, required = true)]
        args: Vec<String>,
    },
}

/// Arguments of the `host` command.
#[derive(Args, Debug, Clone)]
pub struct HostArgs {
    /// Instance name.
    pub name: String,

    /// Image to launch (required when state is present).
    #[arg(long)]
    pub image: Option<String>,

    /// Number of CPUs.
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub cpus: Option<u32>,

    /// Memory size, e.g. 2G.
    #[arg(long)]
    pub memory: Option<String>,

    /// Disk size, e.g. 10G.
    #[arg(long)]
    pub disk: Option<String>,

    /// Cloud-init user data file.
    #[arg(long, alias = "cloud-init", value_name = "PATH")]
    pub init_script: Option<PathBuf>,

    /// Host network interface to attach.
    #[arg(long)]
    pub network: Option<String>,

    /// Desired state.
    #[arg(long, value_enum, default_value_t = DesiredState::Present)]
    pub state: DesiredState,
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

impl Cli {
    /// Applies the global binary flags on top of `settings`.
    ///
    /// Flags win over both the manifest and its environment overrides.
    #[must_use]
    pub fn merge_settings(&self, mut settings: MultipassSettings) -> MultipassSettings {
        if let Some(binary) = &self.binary {
            settings.binary.clone_from(binary);
        }
        if !self.search_paths.is_empty() {
            settings.search_paths.clone_from(&self.search_paths);
        }
        settings
    }
}

impl From<HostArgs> for InstanceSpec {
    fn from(args: HostArgs) -> Self {
        Self {
            name: args.name,
            image: args.image,
            cpus: args.cpus,
            memory: args.memory,
            disk: args.disk,
            init_script_path: args.init_script,
            network: args.network,
            state: args.state,
        }
    }
}
