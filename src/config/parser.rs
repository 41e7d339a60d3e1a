//! Manifest parser for loading hosts manifests.
//!
//! This module handles loading manifests from YAML files and environment
//! variables, with proper precedence and error handling.

use crate::error::{ConfigError, MultipassError, Result};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::spec::{HostsManifest, MultipassSettings};

/// Environment variable overriding the binary name or path.
pub const ENV_BINARY: &str = "MULTIPASS_BINARY";

/// Environment variable overriding the extra search paths.
pub const ENV_SEARCH_PATHS: &str = "MULTIPASS_SEARCH_PATHS";

/// Parser for hosts manifests.
#[derive(Debug, Default)]
pub struct ManifestParser {
    /// Base path for resolving relative paths.
    base_path: Option<PathBuf>,
}

impl ManifestParser {
    /// Creates a new manifest parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the base path for resolving relative paths.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Loads a manifest from a YAML file.
    ///
    /// Relative init-script paths are resolved against the base path, or
    /// against the manifest's directory when no base path is set.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<HostsManifest> {
        let path = path.as_ref();
        info!("Loading manifest from: {}", path.display());

        if !path.exists() {
            return Err(MultipassError::Config(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            MultipassError::Config(ConfigError::ParseError {
                message: format!("Failed to read file: {e}"),
                location: Some(path.display().to_string()),
            })
        })?;

        let mut manifest = self.parse_yaml(&content, Some(path))?;

        let base = self
            .base_path
            .clone()
            .or_else(|| path.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."));
        for host in &mut manifest.hosts {
            host.resolve_paths(&base);
        }

        Ok(manifest)
    }

    /// Parses a manifest from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<HostsManifest> {
        debug!("Parsing YAML manifest");

        let manifest: HostsManifest = serde_yaml::from_str(content).map_err(|e| {
            let location = source.map(|p| p.display().to_string());
            MultipassError::Config(ConfigError::ParseError {
                message: format!("YAML parse error: {e}"),
                location,
            })
        })?;

        debug!("Parsed manifest with {} host(s)", manifest.hosts.len());
        Ok(manifest)
    }

    /// Loads a manifest and applies environment variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_with_env(&self, path: impl AsRef<Path>) -> Result<HostsManifest> {
        let mut manifest = self.load_file(path)?;
        Self::apply_env_overrides(&mut manifest);
        Ok(manifest)
    }

    /// Applies environment variable overrides to the manifest.
    pub fn apply_env_overrides(manifest: &mut HostsManifest) {
        Self::apply_overrides_from(manifest, |key| std::env::var_os(key));
    }

    /// Applies overrides read through `lookup` instead of the process
    /// environment.
    ///
    /// An empty binary is ignored. The search paths use the platform's
    /// path-list syntax and empty entries are dropped.
    pub fn apply_overrides_from(
        manifest: &mut HostsManifest,
        lookup: impl Fn(&str) -> Option<OsString>,
    ) {
        if let Some(binary) = lookup(ENV_BINARY).and_then(|v| v.into_string().ok())
            && !binary.is_empty()
        {
            debug!("Overriding multipass.binary from environment");
            manifest.multipass.binary = binary;
        }

        if let Some(paths) = lookup(ENV_SEARCH_PATHS) {
            debug!("Overriding multipass.search_paths from environment");
            manifest.multipass.search_paths = std::env::split_paths(&paths)
                .filter(|p| !p.as_os_str().is_empty())
                .collect();
        }
    }

    /// Loads the .env file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the .env file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self
            .base_path
            .as_ref()
            .map_or_else(|| PathBuf::from(".env"), |p| p.join(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| {
                MultipassError::Config(ConfigError::ParseError {
                    message: format!("Failed to load .env file: {e}"),
                    location: Some(env_path.display().to_string()),
                })
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }
}

/// Default manifest file names to search for.
pub const DEFAULT_MANIFEST_FILES: &[&str] = &["multipass.hosts.yaml", "multipass.hosts.yml"];

/// Finds the manifest in the given directory or its parents.
///
/// # Errors
///
/// Returns an error if no manifest is found.
pub fn find_manifest_file(start_dir: impl AsRef<Path>) -> Result<PathBuf> {
    let start = start_dir.as_ref();
    let mut current = start.to_path_buf();

    loop {
        for filename in DEFAULT_MANIFEST_FILES {
            let manifest_path = current.join(filename);
            if manifest_path.exists() {
                info!("Found manifest: {}", manifest_path.display());
                return Ok(manifest_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    Err(MultipassError::Config(ConfigError::FileNotFound {
        path: start.join(DEFAULT_MANIFEST_FILES[0]),
    }))
}

/// Binary settings for commands that do not need the host list.
///
/// The manifest is discovered from `start_dir`. A missing manifest, or one
/// that cannot be parsed, falls back to the defaults. Environment overrides
/// apply in every case.
///
/// # Errors
///
/// Returns an error if a `.env` file cannot be loaded or the discovered
/// manifest cannot be read.
pub fn discover_settings(start_dir: impl AsRef<Path>) -> Result<MultipassSettings> {
    discover_settings_from(start_dir.as_ref(), |key| std::env::var_os(key))
}

fn discover_settings_from(
    start: &Path,
    lookup: impl Fn(&str) -> Option<OsString>,
) -> Result<MultipassSettings> {
    let mut manifest = match find_manifest_file(start) {
        Ok(path) => {
            let base = path
                .parent()
                .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
            let parser = ManifestParser::new().with_base_path(base);
            parser.load_dotenv()?;

            match parser.load_file(&path) {
                Ok(manifest) => manifest,
                Err(MultipassError::Config(ConfigError::ParseError { message, .. })) => {
                    warn!(
                        "Ignoring manifest {}, using default multipass settings: {message}",
                        path.display()
                    );
                    HostsManifest::default()
                }
                Err(e) => return Err(e),
            }
        }
        Err(MultipassError::Config(ConfigError::FileNotFound { .. })) => {
            debug!("No manifest found, using default multipass settings");
            ManifestParser::new().with_base_path(start).load_dotenv()?;
            HostsManifest::default()
        }
        Err(e) => return Err(e),
    };

    ManifestParser::apply_overrides_from(&mut manifest, lookup);
    Ok(manifest.multipass)
}
