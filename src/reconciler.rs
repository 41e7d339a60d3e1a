//! Reconciler for instance desired state.
//!
//! Each operation queries the current state through the [`Invoker`],
//! compares it with the desired state, and issues at most one corrective
//! action. Nothing is retried and nothing is rolled back: if the query that
//! follows a successful launch fails, the new instance is left as it is.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::config::{ConfigValidator, DesiredState, InstanceSpec};
use crate::error::{MultipassError, Result};
use crate::multipass::{
    InfoResponse, InstanceInfo, InvokeOptions, Invoker, LocateBinary, ProcessRunner, commands,
};

/// Reconciler for instance desired state.
#[derive(Debug)]
pub struct Reconciler<'a, R, L> {
    /// Process invoker.
    invoker: &'a Invoker<R, L>,
    /// Descriptor validator.
    validator: ConfigValidator,
    /// Keep going after a failed host in [`Reconciler::apply`].
    continue_on_error: bool,
}

/// Result of reconciling one instance.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ReconciliationResult {
    /// Whether a mutating command was issued.
    pub changed: bool,
    /// Human-readable summary.
    pub message: String,
    /// Observed state after the operation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<InstanceInfo>,
}

/// Outcome of one host during [`Reconciler::apply`].
#[derive(Debug, Clone, Serialize)]
pub struct HostOutcome {
    /// Instance name.
    pub name: String,
    /// Desired state that was applied.
    pub state: DesiredState,
    /// Reconciliation result, if the host succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ReconciliationResult>,
    /// Error message, if the host failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Report of reconciling a whole manifest.
#[derive(Debug, Clone, Serialize)]
pub struct ApplyReport {
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished.
    pub finished_at: DateTime<Utc>,
    /// Per-host outcomes, in manifest order.
    pub outcomes: Vec<HostOutcome>,
    /// Number of hosts that changed.
    pub changed: usize,
    /// Number of hosts already converged.
    pub unchanged: usize,
    /// Number of hosts that failed.
    pub failed: usize,
    /// Number of hosts not attempted after a failure.
    pub skipped: usize,
}

impl<'a, R: ProcessRunner, L: LocateBinary> Reconciler<'a, R, L> {
    /// Creates a new reconciler.
    #[must_use]
    pub const fn new(invoker: &'a Invoker<R, L>) -> Self {
        Self {
            invoker,
            validator: ConfigValidator::new(),
            continue_on_error: false,
        }
    }

    /// Sets whether [`Reconciler::apply`] continues after a failed host.
    #[must_use]
    pub const fn with_continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    fn log(&self, message: &str) {
        self.invoker.sink().log(message);
    }

    /// Returns the observed state of `name`, or `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns any invocation error other than a missing-instance failure.
    pub fn query(&self, name: &str) -> Result<Option<InstanceInfo>> {
        let result = match self
            .invoker
            .invoke(&commands::info(name), InvokeOptions::json())
        {
            Ok(result) => result,
            Err(err) if err.indicates_missing_instance() => {
                self.log(&format!("VM '{name}' not found."));
                return Ok(None);
            }
            Err(err) => return Err(err),
        };

        let response: InfoResponse = result.decode()?;
        Ok(response.into_instances().remove(name))
    }

    /// Ensures the instance described by `spec` exists, launching it if needed.
    ///
    /// The image is checked before anything is run. The init-script file is
    /// checked only when the instance has to be created.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a missing image or init-script file,
    /// or any invocation error.
    pub fn ensure_present(&self, spec: &InstanceSpec) -> Result<ReconciliationResult> {
        let Some(image) = spec.image.as_deref().filter(|i| !i.is_empty()) else {
            return Err(MultipassError::validation(
                "'image' is required when state=present",
                "image",
            ));
        };

        if let Some(existing) = self.query(&spec.name)? {
            self.log(&format!("VM '{}' already exists.", spec.name));
            return Ok(ReconciliationResult {
                changed: false,
                message: format!("VM '{}' already exists", spec.name),
                info: Some(existing),
            });
        }

        if let Some(path) = &spec.init_script_path {
            if !path.exists() {
                return Err(MultipassError::validation(
                    format!("Cloud-init file not found: {}", path.display()),
                    "init_script_path",
                ));
            }
            self.log(&format!("Using cloud-init config: {}", path.display()));
        }
        if let Some(network) = &spec.network {
            self.log(&format!("Attaching VM to network interface: {network}"));
        }

        let args = commands::launch(spec, image);
        self.log(&format!(
            "Creating VM '{}' with command: {} {}",
            spec.name,
            self.invoker.binary(),
            args.join(" ")
        ));
        self.invoker.invoke(&args, InvokeOptions::default())?;

        let info = self.query(&spec.name)?;

        Ok(ReconciliationResult {
            changed: true,
            message: format!("VM '{}' created", spec.name),
            info,
        })
    }

    /// Ensures `name` does not exist, deleting and purging it if needed.
    ///
    /// # Errors
    ///
    /// Returns any invocation error.
    pub fn ensure_absent(&self, name: &str) -> Result<ReconciliationResult> {
        if self.query(name)?.is_none() {
            self.log(&format!("VM '{name}' does not exist. No action needed."));
            return Ok(ReconciliationResult {
                changed: false,
                message: format!("VM '{name}' is already absent"),
                info: None,
            });
        }

        self.log(&format!("Deleting VM '{name}'"));
        self.invoker
            .invoke(&commands::delete(name), InvokeOptions::default())?;
        self.invoker
            .invoke(&commands::purge(), InvokeOptions::default())?;

        Ok(ReconciliationResult {
            changed: true,
            message: format!("VM '{name}' was deleted"),
            info: None,
        })
    }

    /// Lists every instance keyed by name.
    ///
    /// # Errors
    ///
    /// Returns any invocation error.
    pub fn list_all(&self) -> Result<BTreeMap<String, InstanceInfo>> {
        self.log("Listing all Multipass instances");

        let result = self
            .invoker
            .invoke(&commands::info_all(), InvokeOptions::json())?;
        let response: InfoResponse = result.decode()?;
        for error in &response.errors {
            self.log(&format!("multipass reported an error while listing: {error}"));
        }
        Ok(response.into_instances())
    }

    /// Validates `spec` and converges it according to its desired state.
    ///
    /// # Errors
    ///
    /// Returns a validation error before anything is run, or any error from
    /// the underlying operation.
    pub fn reconcile(&self, spec: &InstanceSpec) -> Result<ReconciliationResult> {
        self.validator.validate_instance(spec)?;

        match spec.state {
            DesiredState::Present => self.ensure_present(spec),
            DesiredState::Absent => self.ensure_absent(&spec.name),
        }
    }

    /// Reconciles every host in order.
    ///
    /// Stops at the first failure unless continue-on-error is set; hosts
    /// after the failure are counted as skipped.
    #[must_use]
    pub fn apply(&self, hosts: &[InstanceSpec]) -> ApplyReport {
        let started_at = Utc::now();
        let mut report = ApplyReport {
            started_at,
            finished_at: started_at,
            outcomes: Vec::with_capacity(hosts.len()),
            changed: 0,
            unchanged: 0,
            failed: 0,
            skipped: 0,
        };

        for (index, host) in hosts.iter().enumerate() {
            match self.reconcile(host) {
                Ok(result) => {
                    if result.changed {
                        report.changed += 1;
                    } else {
                        report.unchanged += 1;
                    }
                    report.outcomes.push(HostOutcome {
                        name: host.name.clone(),
                        state: host.state,
                        result: Some(result),
                        error: None,
                    });
                }
                Err(err) => {
                    self.log(&format!("Failed to reconcile '{}': {err}", host.name));
                    report.failed += 1;
                    report.outcomes.push(HostOutcome {
                        name: host.name.clone(),
                        state: host.state,
                        result: None,
                        error: Some(err.to_string()),
                    });

                    if !self.continue_on_error {
                        report.skipped = hosts.len() - index - 1;
                        break;
                    }
                }
            }
        }

        report.finished_at = Utc::now();
        report
    }
}

impl ApplyReport {
    /// Returns true if every host converged.
    #[must_use]
    pub const fn success(&self) -> bool {
        self.failed == 0 && self.skipped == 0
    }
}

impl std::fmt::Display for ReconciliationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = if self.changed { "changed" } else { "ok" };
        write!(f, "{status}: {}", self.message)?;
        if let Some(info) = &self.info {
            write!(f, " (state: {}", info.state)?;
            if let Some(ip) = info.primary_ipv4() {
                write!(f, ", ipv4: {ip}")?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

impl std::fmt::Display for ApplyReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Applied {} hosts: {} changed, {} unchanged, {} failed, {} skipped",
            self.outcomes.len(),
            self.changed,
            self.unchanged,
            self.failed,
            self.skipped
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{InvokeError, ValidationError};
    use crate::multipass::{FixedLocator, MockProcessRunner, RawOutput};
    use crate::multipass::RecordingSink;
    use mockall::Sequence;
    use std::path::Path;
    use std::sync::Arc;
    use tempfile::TempDir;

    type TestInvoker = Invoker<MockProcessRunner, FixedLocator>;

    fn invoker(runner: MockProcessRunner) -> TestInvoker {
        Invoker::with_parts("multipass", runner, FixedLocator::new("/usr/bin/multipass"))
    }

    fn info_json(name: &str, state: &str) -> String {
        serde_json::json!({
            "errors": [],
            "info": { name: { "state": state, "ipv4": ["192.168.64.2"], "release": "20.04" } }
        })
        .to_string()
    }

    fn missing(name: &str) -> RawOutput {
        RawOutput::failure(2, format!("info failed: instance \"{name}\" does not exist"))
    }

    fn first_arg_is(expected: &'static str) -> impl Fn(&Path, &[String]) -> bool + Send + 'static {
        move |_: &Path, args: &[String]| args.first().map(String::as_str) == Some(expected)
    }

    #[test]
    fn test_query_returns_observed_info() {
        let mut runner = MockProcessRunner::new();
        runner
            .expect_run()
            .withf(|_: &Path, args: &[String]| args == ["info", "myvm", "--format", "json"])
            .times(1)
            .returning(|_, _| Ok(RawOutput::success(info_json("myvm", "Running"))));

        let invoker = invoker(runner);
        let info = Reconciler::new(&invoker)
            .query("myvm")
            .expect("query succeeds")
            .expect("instance exists");

        assert_eq!(info.name, "myvm");
        assert_eq!(info.state, "Running");
        assert_eq!(info.ipv4, ["192.168.64.2"]);
    }

    #[test]
    fn test_query_not_found_is_absent() {
        let mut runner = MockProcessRunner::new();
        runner
            .expect_run()
            .returning(|_, _| Ok(RawOutput::failure(2, "instance not found")));

        let invoker = invoker(runner);
        assert!(Reconciler::new(&invoker).query("ghost-vm").expect("absent").is_none());
    }

    #[test]
    fn test_query_other_failure_propagates() {
        let mut runner = MockProcessRunner::new();
        runner
            .expect_run()
            .returning(|_, _| Ok(RawOutput::failure(1, "permission denied")));

        let invoker = invoker(runner);
        let err = Reconciler::new(&invoker)
            .query("ghost-vm")
            .expect_err("propagated");

        assert!(matches!(
            err,
            MultipassError::Invoke(InvokeError::CommandFailed { ref stderr, .. })
                if stderr == "permission denied"
        ));
    }

    #[test]
    fn test_query_name_missing_from_payload_is_absent() {
        let mut runner = MockProcessRunner::new();
        runner
            .expect_run()
            .returning(|_, _| Ok(RawOutput::success(info_json("other", "Running"))));

        let invoker = invoker(runner);
        assert!(Reconciler::new(&invoker).query("myvm").expect("ok").is_none());
    }

    #[test]
    fn test_ensure_present_without_image_runs_nothing() {
        let mut runner = MockProcessRunner::new();
        runner.expect_run().never();

        let invoker = invoker(runner);
        let err = Reconciler::new(&invoker)
            .ensure_present(&InstanceSpec::new("vm1"))
            .expect_err("image required");

        assert!(matches!(err, MultipassError::Validation(_)));
    }

    #[test]
    fn test_ensure_present_missing_init_script_launches_nothing() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let mut runner = MockProcessRunner::new();
        runner
            .expect_run()
            .withf(first_arg_is("info"))
            .times(1)
            .returning(|_, _| Ok(missing("vm1")));
        runner.expect_run().withf(first_arg_is("launch")).never();

        let spec = InstanceSpec::new("vm1")
            .with_image("20.04")
            .with_init_script(temp.path().join("missing.yaml"));
        let invoker = invoker(runner);
        let err = Reconciler::new(&invoker)
            .ensure_present(&spec)
            .expect_err("init script must exist");

        assert!(matches!(
            err,
            MultipassError::Validation(ValidationError { ref field, .. })
                if field.as_deref() == Some("init_script_path")
        ));
    }

    #[test]
    fn test_ensure_present_creates_then_is_idempotent() {
        let mut seq = Sequence::new();
        let mut runner = MockProcessRunner::new();
        runner
            .expect_run()
            .times(1)
            .in_sequence(&mut seq)
            .withf(first_arg_is("info"))
            .returning(|_, _| Ok(missing("vm1")));
        runner
            .expect_run()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|_: &Path, args: &[String]| {
                args == ["launch", "20.04", "--name", "vm1", "--cpus", "2", "--memory", "1G"]
            })
            .returning(|_, _| Ok(RawOutput::success("Launched: vm1")));
        runner
            .expect_run()
            .times(3)
            .in_sequence(&mut seq)
            .withf(first_arg_is("info"))
            .returning(|_, _| Ok(RawOutput::success(info_json("vm1", "Running"))));

        let invoker = invoker(runner);
        let reconciler = Reconciler::new(&invoker);
        let spec = InstanceSpec::new("vm1")
            .with_image("20.04")
            .with_cpus(2)
            .with_memory("1G");

        let first = reconciler.ensure_present(&spec).expect("created");
        assert!(first.changed);
        assert!(first.message.contains("created"));
        assert_eq!(first.info.as_ref().map(|i| i.state.as_str()), Some("Running"));

        let second = reconciler.ensure_present(&spec).expect("unchanged");
        assert!(!second.changed);
        assert!(second.message.contains("already exists"));

        let fresh = reconciler.query("vm1").expect("query");
        assert_eq!(second.info, fresh);
    }

    #[test]
    fn test_ensure_present_with_init_script() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let script = temp.path().join("user-data.yaml");
        std::fs::write(&script, "#cloud-config\n").expect("write script");
        let expected_path = script.display().to_string();

        let mut seq = Sequence::new();
        let mut runner = MockProcessRunner::new();
        runner
            .expect_run()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(missing("vm1")));
        runner
            .expect_run()
            .times(1)
            .in_sequence(&mut seq)
            .withf(move |_: &Path, args: &[String]| {
                args.ends_with(&[String::from("--cloud-init"), expected_path.clone()])
            })
            .returning(|_, _| Ok(RawOutput::success("")));
        runner
            .expect_run()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(RawOutput::success(info_json("vm1", "Starting"))));

        let invoker = invoker(runner);
        let spec = InstanceSpec::new("vm1").with_image("focal").with_init_script(&script);
        let result = Reconciler::new(&invoker).ensure_present(&spec).expect("created");
        assert!(result.changed);
    }

    #[test]
    fn test_ensure_present_failed_requery_propagates() {
        let mut seq = Sequence::new();
        let mut runner = MockProcessRunner::new();
        runner
            .expect_run()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(missing("vm1")));
        runner
            .expect_run()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(RawOutput::success("")));
        runner
            .expect_run()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(RawOutput::failure(1, "daemon unavailable")));

        let invoker = invoker(runner);
        let spec = InstanceSpec::new("vm1").with_image("20.04");
        assert!(Reconciler::new(&invoker).ensure_present(&spec).is_err());
    }

    #[test]
    fn test_ensure_absent_when_missing_issues_no_mutation() {
        let mut runner = MockProcessRunner::new();
        runner
            .expect_run()
            .withf(first_arg_is("info"))
            .times(1)
            .returning(|_, _| Ok(missing("ghost")));
        runner.expect_run().withf(first_arg_is("delete")).never();
        runner.expect_run().withf(first_arg_is("purge")).never();

        let invoker = invoker(runner);
        let result = Reconciler::new(&invoker).ensure_absent("ghost").expect("ok");
        assert!(!result.changed);
        assert!(result.message.contains("already absent"));
        assert!(result.info.is_none());
    }

    #[test]
    fn test_ensure_absent_deletes_then_purges() {
        let mut seq = Sequence::new();
        let mut runner = MockProcessRunner::new();
        runner
            .expect_run()
            .times(1)
            .in_sequence(&mut seq)
            .withf(first_arg_is("info"))
            .returning(|_, _| Ok(RawOutput::success(info_json("existing", "Running"))));
        runner
            .expect_run()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|_: &Path, args: &[String]| args == ["delete", "existing"])
            .returning(|_, _| Ok(RawOutput::success("")));
        runner
            .expect_run()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|_: &Path, args: &[String]| args == ["purge"])
            .returning(|_, _| Ok(RawOutput::success("")));

        let invoker = invoker(runner);
        let result = Reconciler::new(&invoker).ensure_absent("existing").expect("deleted");
        assert!(result.changed);
        assert!(result.message.contains("deleted"));
    }

    #[test]
    fn test_ensure_absent_failed_delete_skips_purge() {
        let mut seq = Sequence::new();
        let mut runner = MockProcessRunner::new();
        runner
            .expect_run()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(RawOutput::success(info_json("existing", "Running"))));
        runner
            .expect_run()
            .times(1)
            .in_sequence(&mut seq)
            .withf(first_arg_is("delete"))
            .returning(|_, _| Ok(RawOutput::failure(1, "delete failed")));
        runner.expect_run().withf(first_arg_is("purge")).never();

        let invoker = invoker(runner);
        assert!(Reconciler::new(&invoker).ensure_absent("existing").is_err());
    }

    #[test]
    fn test_list_all() {
        let payload = serde_json::json!({
            "info": {
                "vm1": { "state": "Running" },
                "vm2": { "state": "Stopped" }
            }
        })
        .to_string();

        let mut runner = MockProcessRunner::new();
        runner
            .expect_run()
            .withf(|_: &Path, args: &[String]| args == ["info", "--format", "json"])
            .times(1)
            .returning(move |_, _| Ok(RawOutput::success(payload.clone())));

        let invoker = invoker(runner);
        let instances = Reconciler::new(&invoker).list_all().expect("listed");

        assert_eq!(instances.len(), 2);
        assert_eq!(instances["vm1"].state, "Running");
        assert_eq!(instances["vm2"].state, "Stopped");
        assert_eq!(instances["vm2"].name, "vm2");
    }

    #[test]
    fn test_list_all_traces_reported_errors() {
        let payload = serde_json::json!({
            "errors": ["cannot reach instance vm2"],
            "info": { "vm1": { "state": "Running" } }
        })
        .to_string();

        let mut runner = MockProcessRunner::new();
        runner
            .expect_run()
            .returning(move |_, _| Ok(RawOutput::success(payload.clone())));

        let sink = Arc::new(RecordingSink::default());
        let invoker = invoker(runner).with_sink(Arc::clone(&sink));
        let instances = Reconciler::new(&invoker).list_all().expect("listed");

        assert_eq!(instances.len(), 1);
        assert!(sink.contains("cannot reach instance vm2"));
    }

    #[test]
    fn test_list_all_without_info_key_is_empty() {
        let mut runner = MockProcessRunner::new();
        runner
            .expect_run()
            .returning(|_, _| Ok(RawOutput::success("{}")));

        let invoker = invoker(runner);
        assert!(Reconciler::new(&invoker).list_all().expect("listed").is_empty());
    }

    #[test]
    fn test_list_all_failure_propagates() {
        let mut runner = MockProcessRunner::new();
        runner
            .expect_run()
            .returning(|_, _| Ok(RawOutput::failure(1, "instance not found")));

        let invoker = invoker(runner);
        assert!(Reconciler::new(&invoker).list_all().is_err());
    }

    #[test]
    fn test_list_all_malformed_output() {
        let mut runner = MockProcessRunner::new();
        runner
            .expect_run()
            .returning(|_, _| Ok(RawOutput::success("Not JSON")));

        let invoker = invoker(runner);
        let err = Reconciler::new(&invoker).list_all().expect_err("malformed");
        assert!(matches!(
            err,
            MultipassError::Invoke(InvokeError::MalformedOutput { ref stdout, .. })
                if stdout == "Not JSON"
        ));
    }

    #[test]
    fn test_reconcile_validates_before_running() {
        let mut runner = MockProcessRunner::new();
        runner.expect_run().never();

        let invoker = invoker(runner);
        let spec = InstanceSpec::new("bad_name").with_image("20.04");
        assert!(matches!(
            Reconciler::new(&invoker).reconcile(&spec),
            Err(MultipassError::Validation(_))
        ));
    }

    #[test]
    fn test_apply_stops_at_first_failure() {
        let mut runner = MockProcessRunner::new();
        runner
            .expect_run()
            .times(1)
            .returning(|_, _| Ok(RawOutput::failure(1, "permission denied")));

        let invoker = invoker(runner);
        let hosts = vec![
            InstanceSpec::new("web").with_state(DesiredState::Absent),
            InstanceSpec::new("db").with_state(DesiredState::Absent),
            InstanceSpec::new("cache").with_state(DesiredState::Absent),
        ];

        let report = Reconciler::new(&invoker).apply(&hosts);
        assert_eq!(report.failed, 1);
        assert_eq!(report.skipped, 2);
        assert_eq!(report.outcomes.len(), 1);
        assert!(!report.success());
    }

    #[test]
    fn test_apply_continue_on_error() {
        let mut seq = Sequence::new();
        let mut runner = MockProcessRunner::new();
        runner
            .expect_run()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(RawOutput::failure(1, "permission denied")));
        runner
            .expect_run()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(missing("db")));

        let invoker = invoker(runner);
        let hosts = vec![
            InstanceSpec::new("web").with_state(DesiredState::Absent),
            InstanceSpec::new("db").with_state(DesiredState::Absent),
        ];

        let report = Reconciler::new(&invoker)
            .with_continue_on_error(true)
            .apply(&hosts);
        assert_eq!(report.failed, 1);
        assert_eq!(report.unchanged, 1);
        assert_eq!(report.skipped, 0);
        assert!(report.outcomes[0].error.is_some());
        assert!(report.to_string().contains("1 failed"));
    }
}
