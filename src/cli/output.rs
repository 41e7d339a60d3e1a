//! Output formatting for CLI commands.
//!
//! Text mode is for people; JSON mode mirrors the result records so that
//! other tools can consume them.

use colored::Colorize;
use serde_json::json;
use std::collections::BTreeMap;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::config::ValidationResult;
use crate::multipass::{CommandResult, InstanceInfo};
use crate::reconciler::{ApplyReport, ReconciliationResult};

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Instance row for table display.
#[derive(Tabled)]
struct InstanceRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "IPv4")]
    ipv4: String,
    #[tabled(rename = "Release")]
    release: String,
}

/// Apply outcome row for table display.
#[derive(Tabled)]
struct OutcomeRow {
    #[tabled(rename = "Host")]
    name: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Result")]
    result: String,
    #[tabled(rename = "Message")]
    message: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats the result of reconciling one instance.
    #[must_use]
    pub fn format_result(&self, result: &ReconciliationResult) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(result).unwrap_or_default(),
            OutputFormat::Text => {
                let marker = if result.changed {
                    "changed".yellow()
                } else {
                    "ok".green()
                };
                let mut output = format!("{marker}: {}\n", result.message);
                if let Some(info) = &result.info {
                    output.push_str(&Self::format_info_text(info));
                }
                output
            }
        }
    }

    /// Formats the observed state of one instance, or its absence.
    #[must_use]
    pub fn format_info(&self, name: &str, info: Option<&InstanceInfo>) -> String {
        match self.format {
            OutputFormat::Json => {
                let value = json!({ "name": name, "present": info.is_some(), "info": info });
                serde_json::to_string_pretty(&value).unwrap_or_default()
            }
            OutputFormat::Text => info.map_or_else(
                || format!("{} VM '{name}' does not exist\n", "-".dimmed()),
                Self::format_info_text,
            ),
        }
    }

    fn format_info_text(info: &InstanceInfo) -> String {
        let mut output = String::new();
        let _ = writeln!(output, "   Name:    {}", info.name);
        let _ = writeln!(output, "   State:   {}", Self::format_state(&info.state));
        let _ = writeln!(
            output,
            "   IPv4:    {}",
            if info.ipv4.is_empty() {
                String::from("--")
            } else {
                info.ipv4.join(", ")
            }
        );
        if let Some(release) = &info.release {
            let _ = writeln!(output, "   Release: {release}");
        }
        output
    }

    /// Formats the full instance listing.
    #[must_use]
    pub fn format_instances(&self, instances: &BTreeMap<String, InstanceInfo>) -> String {
        match self.format {
            OutputFormat::Json => {
                let value = json!({ "changed": false, "instances": instances });
                serde_json::to_string_pretty(&value).unwrap_or_default()
            }
            OutputFormat::Text => {
                if instances.is_empty() {
                    return String::from("No instances found.\n");
                }

                let rows: Vec<InstanceRow> = instances
                    .values()
                    .map(|info| InstanceRow {
                        name: info.name.clone(),
                        state: Self::format_state(&info.state),
                        ipv4: info.primary_ipv4().unwrap_or("--").to_string(),
                        release: info.release.clone().unwrap_or_default(),
                    })
                    .collect();

                let mut output = Table::new(rows).to_string();
                let _ = write!(output, "\n\n{} instance(s)\n", instances.len());
                output
            }
        }
    }

    /// Formats a manifest-wide apply report.
    #[must_use]
    pub fn format_apply(&self, report: &ApplyReport) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(report).unwrap_or_default(),
            OutputFormat::Text => {
                if report.outcomes.is_empty() {
                    return String::from("No hosts to apply.\n");
                }

                let rows: Vec<OutcomeRow> = report
                    .outcomes
                    .iter()
                    .map(|outcome| {
                        let (result, message) = match (&outcome.result, &outcome.error) {
                            (Some(r), _) if r.changed => {
                                ("changed".yellow().to_string(), r.message.clone())
                            }
                            (Some(r), _) => ("ok".green().to_string(), r.message.clone()),
                            (None, Some(e)) => ("failed".red().to_string(), Self::truncate(e, 60)),
                            (None, None) => ("unknown".dimmed().to_string(), String::new()),
                        };
                        OutcomeRow {
                            name: outcome.name.clone(),
                            state: outcome.state.to_string(),
                            result,
                            message,
                        }
                    })
                    .collect();

                let mut output = Table::new(rows).to_string();
                let status = if report.success() {
                    "✓".green()
                } else {
                    "✗".red()
                };
                let elapsed = report.finished_at - report.started_at;
                let _ = write!(
                    output,
                    "\n\n{status} {report} in {}ms\n",
                    elapsed.num_milliseconds()
                );
                output
            }
        }
    }

    /// Formats manifest validation results.
    #[must_use]
    pub fn format_validation(
        &self,
        result: &ValidationResult,
        host_count: usize,
        show_warnings: bool,
    ) -> String {
        match self.format {
            OutputFormat::Json => {
                let errors: Vec<String> = result.errors.iter().map(ToString::to_string).collect();
                let value = json!({
                    "valid": result.is_valid(),
                    "hosts": host_count,
                    "errors": errors,
                    "warnings": result.warnings,
                });
                serde_json::to_string_pretty(&value).unwrap_or_default()
            }
            OutputFormat::Text => {
                let mut output = if result.is_valid() {
                    format!("{} Manifest is valid ({host_count} host(s))\n", "✓".green())
                } else {
                    let mut summary = format!(
                        "{} Manifest has {} error(s):\n",
                        "✗".red(),
                        result.errors.len()
                    );
                    for issue in &result.errors {
                        let _ = writeln!(summary, "   - {issue}");
                    }
                    summary
                };
                if show_warnings && !result.warnings.is_empty() {
                    let _ = write!(
                        output,
                        "\n{} Warnings ({}):\n",
                        "⚠".yellow(),
                        result.warning_count()
                    );
                    for warning in &result.warnings {
                        let _ = writeln!(output, "   - {warning}");
                    }
                }
                output
            }
        }
    }

    /// Formats the result of a raw `run` invocation.
    #[must_use]
    pub fn format_command(&self, result: &CommandResult) -> String {
        match self.format {
            OutputFormat::Json => {
                let value = json!({
                    "changed": true,
                    "rc": result.exit_code,
                    "stdout": result.stdout,
                    "stderr": result.stderr,
                    "json": result.json,
                });
                serde_json::to_string_pretty(&value).unwrap_or_default()
            }
            OutputFormat::Text => {
                let mut output = String::new();
                if !result.stdout.is_empty() {
                    let _ = writeln!(output, "{}", result.stdout);
                }
                if !result.stderr.is_empty() {
                    let _ = writeln!(output, "{}", result.stderr.dimmed());
                }
                if !result.success() {
                    let _ = writeln!(output, "{} exit code {}", "⚠".yellow(), result.exit_code);
                }
                output
            }
        }
    }

    /// Formats a failure for the error channel.
    #[must_use]
    pub fn format_failure(&self, message: &str) -> String {
        match self.format {
            OutputFormat::Json => {
                let value = json!({ "failed": true, "changed": false, "message": message });
                serde_json::to_string_pretty(&value).unwrap_or_default()
            }
            OutputFormat::Text => format!("{} {message}", "Error:".red()),
        }
    }

    /// Colors a lifecycle state.
    fn format_state(state: &str) -> String {
        match state {
            "Running" => state.green().to_string(),
            "Starting" | "Restarting" | "Suspending" => state.yellow().to_string(),
            "Stopped" | "Suspended" | "Deleted" => state.red().to_string(),
            _ => state.dimmed().to_string(),
        }
    }

    /// Truncates a string to a maximum number of characters.
    fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len {
            s.to_string()
        } else {
            let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
            format!("{kept}...")
        }
    }
}
