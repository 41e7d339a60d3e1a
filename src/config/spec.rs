//! Desired-state types for managed instances.
//!
//! These structs map to the `multipass.hosts.yaml` manifest and to the
//! arguments of the `host` command. They describe what should exist, never
//! what currently exists.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default name of the external binary.
pub const DEFAULT_BINARY: &str = "multipass";

/// Directories probed after `PATH` when locating the binary.
pub const DEFAULT_SEARCH_PATHS: &[&str] = &["/opt/homebrew/bin", "/usr/local/bin"];

/// The root structure of a hosts manifest.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct HostsManifest {
    /// How to locate and run the external binary.
    #[serde(default)]
    pub multipass: MultipassSettings,
    /// Instances to reconcile, in order.
    #[serde(default)]
    pub hosts: Vec<InstanceSpec>,
}

/// Settings for locating the external binary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MultipassSettings {
    /// Binary name looked up on the search path, or an explicit path.
    #[serde(default = "default_binary")]
    pub binary: String,
    /// Extra directories probed after `PATH`.
    #[serde(default = "default_search_paths")]
    pub search_paths: Vec<PathBuf>,
}

/// Whether an instance should exist.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DesiredState {
    /// The instance must exist.
    #[default]
    Present,
    /// The instance must not exist.
    Absent,
}

/// Desired state of a single instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstanceSpec {
    /// Unique instance name.
    pub name: String,
    /// Image to launch from. Required only when creating.
    #[serde(default)]
    pub image: Option<String>,
    /// Number of virtual CPUs.
    #[serde(default)]
    pub cpus: Option<u32>,
    /// Memory size, passed through verbatim (e.g. `2G`).
    #[serde(default)]
    pub memory: Option<String>,
    /// Disk size, passed through verbatim (e.g. `10G`).
    #[serde(default)]
    pub disk: Option<String>,
    /// Cloud-init user data file.
    #[serde(default, alias = "cloud_init")]
    pub init_script_path: Option<PathBuf>,
    /// Host network interface to attach.
    #[serde(default)]
    pub network: Option<String>,
    /// Whether the instance should exist.
    #[serde(default)]
    pub state: DesiredState,
}

impl Default for MultipassSettings {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            search_paths: default_search_paths(),
        }
    }
}

impl InstanceSpec {
    /// Creates a descriptor with only a name; the instance defaults to present.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: None,
            cpus: None,
            memory: None,
            disk: None,
            init_script_path: None,
            network: None,
            state: DesiredState::Present,
        }
    }

    /// Sets the image.
    #[must_use]
    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    /// Sets the CPU count.
    #[must_use]
    pub const fn with_cpus(mut self, cpus: u32) -> Self {
        self.cpus = Some(cpus);
        self
    }

    /// Sets the memory size.
    #[must_use]
    pub fn with_memory(mut self, memory: impl Into<String>) -> Self {
        self.memory = Some(memory.into());
        self
    }

    /// Sets the disk size.
    #[must_use]
    pub fn with_disk(mut self, disk: impl Into<String>) -> Self {
        self.disk = Some(disk.into());
        self
    }

    /// Sets the cloud-init file.
    #[must_use]
    pub fn with_init_script(mut self, path: impl Into<PathBuf>) -> Self {
        self.init_script_path = Some(path.into());
        self
    }

    /// Sets the network interface.
    #[must_use]
    pub fn with_network(mut self, network: impl Into<String>) -> Self {
        self.network = Some(network.into());
        self
    }

    /// Sets the desired state.
    #[must_use]
    pub const fn with_state(mut self, state: DesiredState) -> Self {
        self.state = state;
        self
    }

    /// Resolves a relative init-script path against `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        if let Some(path) = &self.init_script_path
            && path.is_relative()
        {
            self.init_script_path = Some(base.join(path));
        }
    }
}

impl std::fmt::Display for DesiredState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Present => write!(f, "present"),
            Self::Absent => write!(f, "absent"),
        }
    }
}

fn default_binary() -> String {
    String::from(DEFAULT_BINARY)
}

fn default_search_paths() -> Vec<PathBuf> {
    DEFAULT_SEARCH_PATHS.iter().map(PathBuf::from).collect()
}
