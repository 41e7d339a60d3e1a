//! Validation of desired-state descriptors.
//!
//! Everything here runs before any process is launched. Checks that need
//! the filesystem at creation time (the init-script file) live in the
//! reconciler instead.

use crate::error::{MultipassError, Result};
use std::collections::HashSet;
use tracing::debug;

use super::spec::{DesiredState, HostsManifest, InstanceSpec};

/// Validator for descriptors and manifests.
#[derive(Debug, Default)]
pub struct ConfigValidator;

/// Validation result containing all problems found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationIssue>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation problem.
#[derive(Debug)]
pub struct ValidationIssue {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl ConfigValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates a single descriptor.
    ///
    /// # Errors
    ///
    /// Returns the first validation error found.
    pub fn validate_instance(&self, spec: &InstanceSpec) -> Result<ValidationResult> {
        let mut result = ValidationResult::default();
        Self::check_instance(spec, "", &mut result);
        result.into_result()
    }

    /// Validates a whole manifest.
    ///
    /// # Errors
    ///
    /// Returns the first validation error found.
    pub fn validate(&self, manifest: &HostsManifest) -> Result<ValidationResult> {
        self.check(manifest).into_result()
    }

    /// Collects every problem in a manifest without failing.
    #[must_use]
    pub fn check(&self, manifest: &HostsManifest) -> ValidationResult {
        let mut result = ValidationResult::default();

        if manifest.multipass.binary.trim().is_empty() {
            result.errors.push(ValidationIssue {
                field: String::from("multipass.binary"),
                message: String::from("Binary name cannot be empty"),
            });
        }

        if manifest.hosts.is_empty() {
            result.warnings.push(String::from("No hosts defined in manifest"));
        }

        let mut seen_names = HashSet::new();
        for (i, host) in manifest.hosts.iter().enumerate() {
            let prefix = format!("hosts[{i}].");

            if !seen_names.insert(host.name.as_str()) {
                result.errors.push(ValidationIssue {
                    field: format!("{prefix}name"),
                    message: format!("Duplicate host name: {}", host.name),
                });
            }

            Self::check_instance(host, &prefix, &mut result);
        }

        result
    }

    fn check_instance(spec: &InstanceSpec, prefix: &str, result: &mut ValidationResult) {
        if spec.name.is_empty() {
            result.errors.push(ValidationIssue {
                field: format!("{prefix}name"),
                message: String::from("Instance name cannot be empty"),
            });
        } else if !is_valid_name(&spec.name) {
            result.errors.push(ValidationIssue {
                field: format!("{prefix}name"),
                message: format!(
                    "Instance name '{}' is invalid. Must start with a letter and contain only letters, digits and hyphens.",
                    spec.name
                ),
            });
        }

        if spec.state == DesiredState::Present && spec.image.as_deref().is_none_or(str::is_empty) {
            result.errors.push(ValidationIssue {
                field: format!("{prefix}image"),
                message: String::from("'image' is required when state=present"),
            });
        }

        if spec.cpus == Some(0) {
            result.errors.push(ValidationIssue {
                field: format!("{prefix}cpus"),
                message: String::from("CPU count must be at least 1"),
            });
        }

        for (field, value) in [("memory", &spec.memory), ("disk", &spec.disk)] {
            if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
                result
                    .warnings
                    .push(format!("{prefix}{field}: empty size is ignored by multipass"));
            }
        }

        if spec.state == DesiredState::Absent && spec.image.is_some() {
            result
                .warnings
                .push(format!("{prefix}image: ignored when state=absent"));
        }
    }
}

/// Validates that a name is an acceptable instance name.
/// Names start with a letter, contain letters, digits and hyphens, and do
/// not end with a hyphen.
fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();

    let Some(first) = chars.next() else {
        return false;
    };
    if !first.is_ascii_alphabetic() {
        return false;
    }

    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return false;
    }

    !name.ends_with('-')
}

impl ValidationResult {
    /// Returns true if validation passed (no errors).
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the number of warnings.
    #[must_use]
    pub const fn warning_count(&self) -> usize {
        self.warnings.len()
    }

    /// Converts into an error carrying the first problem, if any.
    ///
    /// # Errors
    ///
    /// Returns a validation error for the first collected error.
    pub fn into_result(self) -> Result<Self> {
        match self.errors.first() {
            None => {
                debug!("Validation passed with {} warning(s)", self.warnings.len());
                Ok(self)
            }
            Some(first) => Err(MultipassError::validation(
                first.message.clone(),
                first.field.clone(),
            )),
        }
    }
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;

    #[test]
    fn test_valid_name() {
        assert!(is_valid_name("web"));
        assert!(is_valid_name("itest-1a2b3c4d"));
        assert!(is_valid_name("Primary"));
    }

    #[test]
    fn test_invalid_name() {
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("1web"));
        assert!(!is_valid_name("web_1"));
        assert!(!is_valid_name("web-"));
        assert!(!is_valid_name("web vm"));
    }

    #[test]
    fn test_present_requires_image() {
        let err = ConfigValidator::new()
            .validate_instance(&InstanceSpec::new("web"))
            .expect_err("image is required");

        assert!(matches!(
            err,
            MultipassError::Validation(ValidationError { ref field, .. })
                if field.as_deref() == Some("image")
        ));
    }

    #[test]
    fn test_absent_needs_no_image() {
        let spec = InstanceSpec::new("web").with_state(DesiredState::Absent);
        let result = ConfigValidator::new()
            .validate_instance(&spec)
            .expect("absent without image is valid");
        assert!(result.is_valid());
    }

    #[test]
    fn test_zero_cpus_rejected() {
        let spec = InstanceSpec::new("web").with_image("jammy").with_cpus(0);
        assert!(ConfigValidator::new().validate_instance(&spec).is_err());
    }

    #[test]
    fn test_manifest_duplicate_names() {
        let manifest = HostsManifest {
            hosts: vec![
                InstanceSpec::new("web").with_image("jammy"),
                InstanceSpec::new("web").with_image("noble"),
            ],
            ..HostsManifest::default()
        };

        let err = ConfigValidator::new()
            .validate(&manifest)
            .expect_err("duplicates are rejected");
        assert!(err.to_string().contains("Duplicate host name: web"));
    }

    #[test]
    fn test_manifest_warnings() {
        let manifest = HostsManifest {
            hosts: vec![
                InstanceSpec::new("web").with_image("jammy").with_memory(" "),
                InstanceSpec::new("db")
                    .with_image("jammy")
                    .with_state(DesiredState::Absent),
            ],
            ..HostsManifest::default()
        };

        let result = ConfigValidator::new().validate(&manifest).expect("valid");
        assert_eq!(result.warning_count(), 2);
    }
    #[test]
    fn test_check_collects_every_error() {
        let manifest = HostsManifest {
            hosts: vec![
                InstanceSpec::new("web"),
                InstanceSpec::new("db_1").with_image("jammy").with_cpus(0),
            ],
            ..HostsManifest::default()
        };

        let result = ConfigValidator::new().check(&manifest);
        assert!(!result.is_valid());
        let rendered: Vec<String> = result.errors.iter().map(ToString::to_string).collect();
        assert_eq!(rendered.len(), 3);
        assert!(rendered[0].starts_with("hosts[0].image: "));
        assert!(rendered[1].starts_with("hosts[1].name: "));
        assert!(rendered[2].starts_with("hosts[1].cpus: "));

        let err = result.into_result().expect_err("invalid manifest");
        assert!(err.to_string().contains("'image' is required"));
    }
}
