//! Locating the external binary.
//!
//! The lookup runs once per invocation and never modifies the process
//! environment. `PATH` is probed first, then the configured search paths.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::config::MultipassSettings;
use crate::error::InvokeError;

/// Strategy for turning a binary name into an executable path.
pub trait LocateBinary {
    /// Resolves `binary` to a path.
    ///
    /// # Errors
    ///
    /// Returns [`InvokeError::BinaryNotFound`] if no candidate exists.
    fn locate(&self, binary: &str) -> Result<PathBuf, InvokeError>;
}

/// Probes `PATH` followed by a list of extra directories.
#[derive(Debug, Clone)]
pub struct SearchPathLocator {
    /// Directories probed after `PATH`.
    search_paths: Vec<PathBuf>,
    /// Fixed `PATH` value; the live environment is read when unset.
    path_env: Option<OsString>,
}

/// Always resolves to one path.
#[derive(Debug, Clone)]
pub struct FixedLocator {
    path: PathBuf,
}

impl SearchPathLocator {
    /// Creates a locator probing `PATH` and then `search_paths`.
    #[must_use]
    pub const fn new(search_paths: Vec<PathBuf>) -> Self {
        Self {
            search_paths,
            path_env: None,
        }
    }

    /// Creates a locator from manifest settings.
    #[must_use]
    pub fn from_settings(settings: &MultipassSettings) -> Self {
        Self::new(settings.search_paths.clone())
    }

    /// Uses `path_env` instead of the live `PATH` variable.
    #[must_use]
    pub fn with_path_env(mut self, path_env: impl Into<OsString>) -> Self {
        self.path_env = Some(path_env.into());
        self
    }

    fn candidate_dirs(&self) -> Vec<PathBuf> {
        let path_env = self
            .path_env
            .clone()
            .or_else(|| std::env::var_os("PATH"))
            .unwrap_or_default();

        std::env::split_paths(&path_env)
            .filter(|dir| !dir.as_os_str().is_empty())
            .chain(self.search_paths.iter().cloned())
            .collect()
    }
}

impl LocateBinary for SearchPathLocator {
    fn locate(&self, binary: &str) -> Result<PathBuf, InvokeError> {
        let requested = Path::new(binary);

        // Anything with a directory component is taken as an explicit path.
        if requested.components().count() > 1 {
            if is_executable(requested) {
                return Ok(requested.to_path_buf());
            }
            return Err(InvokeError::BinaryNotFound {
                binary: binary.to_string(),
                searched: requested.display().to_string(),
            });
        }

        let dirs = self.candidate_dirs();
        if let Some(found) = dirs
            .iter()
            .map(|dir| dir.join(binary))
            .find(|candidate| is_executable(candidate))
        {
            return Ok(found);
        }

        Err(InvokeError::BinaryNotFound {
            binary: binary.to_string(),
            searched: dirs
                .iter()
                .map(|d| d.display().to_string())
                .collect::<Vec<_>>()
                .join(", "),
        })
    }
}

impl FixedLocator {
    /// Creates a locator that always answers `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl LocateBinary for FixedLocator {
    fn locate(&self, _binary: &str) -> Result<PathBuf, InvokeError> {
        Ok(self.path.clone())
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    std::fs::metadata(path).is_ok_and(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file() || path.with_extension("exe").is_file()
}
