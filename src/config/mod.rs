//! Configuration module for the Multipass host manager.
//!
//! This module handles all desired-state functionality:
//! - Parsing and deserializing `multipass.hosts.yaml`
//! - Environment overrides for locating the binary
//! - Validation of descriptors before any process is launched

mod spec;
mod parser;
mod validator;

pub use spec::{
    DEFAULT_BINARY, DEFAULT_SEARCH_PATHS, DesiredState, HostsManifest, InstanceSpec,
    MultipassSettings,
};
pub use parser::{
    ENV_BINARY, ENV_SEARCH_PATHS, ManifestParser, discover_settings, find_manifest_file,
};
pub use validator::{ConfigValidator, ValidationIssue, ValidationResult};
