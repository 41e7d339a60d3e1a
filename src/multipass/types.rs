//! Types produced by invocations and `info` queries.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::error::InvokeError;

/// Normalized result of one invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandResult {
    /// The full command line that was run.
    pub command: String,
    /// Exit code, `-1` when the process was terminated by a signal.
    pub exit_code: i32,
    /// Trimmed standard output.
    pub stdout: String,
    /// Trimmed standard error.
    pub stderr: String,
    /// Parsed stdout, present only when structured output was requested.
    pub json: Option<Value>,
}

/// Observed state of one instance, as reported by `multipass info`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct InstanceInfo {
    /// Instance name (the key of the `info` mapping).
    #[serde(default)]
    pub name: String,
    /// Lifecycle state, e.g. `Running`, `Stopped`, `Starting`.
    #[serde(default)]
    pub state: String,
    /// IPv4 addresses in reported order.
    #[serde(default)]
    pub ipv4: Vec<String>,
    /// Image release description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release: Option<String>,
    /// Image hash.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_hash: Option<String>,
    /// Every other reported field, passed through untouched.
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

/// Top-level shape of `multipass info --format json`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InfoResponse {
    /// Per-instance records keyed by name.
    #[serde(default)]
    pub info: BTreeMap<String, InstanceInfo>,
    /// Errors reported alongside the records.
    #[serde(default)]
    pub errors: Vec<Value>,
}

impl CommandResult {
    /// Returns true if the process exited with code zero.
    #[must_use]
    pub const fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Deserializes the parsed payload into `T`.
    ///
    /// A missing payload is treated as JSON `null`.
    ///
    /// # Errors
    ///
    /// Returns [`InvokeError::MalformedOutput`] if the payload does not have
    /// the expected shape.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, InvokeError> {
        let payload = self.json.clone().unwrap_or(Value::Null);
        serde_json::from_value(payload).map_err(|e| InvokeError::MalformedOutput {
            command: self.command.clone(),
            stdout: self.stdout.clone(),
            reason: e.to_string(),
        })
    }
}

impl InfoResponse {
    /// Consumes the response, filling in each record's name from its key.
    #[must_use]
    pub fn into_instances(self) -> BTreeMap<String, InstanceInfo> {
        self.info
            .into_iter()
            .map(|(name, mut info)| {
                info.name.clone_from(&name);
                (name, info)
            })
            .collect()
    }
}

impl InstanceInfo {
    /// Returns the first IPv4 address, if any.
    #[must_use]
    pub fn primary_ipv4(&self) -> Option<&str> {
        self.ipv4.first().map(String::as_str)
    }
}
