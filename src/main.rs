//! Multipass hosts CLI entrypoint.
//!
//! Success prints the result record and exits 0; any failure prints a single
//! descriptive message and exits 1.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use multipass_hosts::cli::{Cli, Commands, OutputFormatter};
use multipass_hosts::config::{
    ConfigValidator, HostsManifest, InstanceSpec, ManifestParser, MultipassSettings,
    discover_settings, find_manifest_file,
};
use multipass_hosts::error::{MultipassError, Result};
use multipass_hosts::multipass::{InvokeOptions, Invoker, TracingSink};
use multipass_hosts::reconciler::Reconciler;

use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.log_json);

    let formatter = OutputFormatter::new(cli.output);
    match run(&cli, &formatter).and_then(|output| emit(&output).map_err(MultipassError::from)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if let Err(write_err) = emit(&formatter.format_failure(&e.to_string())) {
                debug!("Failed to write failure to stdout: {write_err}");
            }
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system.
fn init_logging(verbose: bool, json: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Writes a command's output to stdout.
fn emit(output: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{}", output.trim_end())?;
    stdout.flush()
}

/// Runs the selected command, returning what should be printed.
fn run(cli: &Cli, formatter: &OutputFormatter) -> Result<String> {
    match &cli.command {
        Commands::Host(args) => {
            let settings = load_settings(cli)?;
            let spec = InstanceSpec::from(args.clone());
            cmd_host(&settings, &spec, formatter)
        }
        Commands::List => cmd_list(&load_settings(cli)?, formatter),
        Commands::Info { name } => cmd_info(&load_settings(cli)?, name, formatter),
        Commands::Apply { continue_on_error } => {
            let manifest = load_manifest(cli)?;
            cmd_apply(cli, &manifest, *continue_on_error, formatter)
        }
        Commands::Validate { warnings } => {
            let manifest = load_manifest(cli)?;
            let result = ConfigValidator::new().check(&manifest);
            let output = formatter.format_validation(&result, manifest.hosts.len(), *warnings);
            if !result.is_valid() {
                emit(&output)?;
            }
            result.into_result().map(|_| output)
        }
        Commands::Run {
            no_check,
            json,
            args,
        } => {
            let invoker = build_invoker(&load_settings(cli)?);
            let mut options = if *json {
                InvokeOptions::json()
            } else {
                InvokeOptions::default()
            };
            if *no_check {
                options = options.allow_nonzero();
            }
            let result = invoker.invoke(args, options)?;
            Ok(formatter.format_command(&result))
        }
    }
}

/// Ensure one instance is present or absent.
fn cmd_host(
    settings: &MultipassSettings,
    spec: &InstanceSpec,
    formatter: &OutputFormatter,
) -> Result<String> {
    info!("Reconciling VM '{}' to state {}", spec.name, spec.state);

    let invoker = build_invoker(settings);
    let result = Reconciler::new(&invoker).reconcile(spec)?;

    info!("{result}");
    Ok(formatter.format_result(&result))
}

/// List all instances.
fn cmd_list(settings: &MultipassSettings, formatter: &OutputFormatter) -> Result<String> {
    let invoker = build_invoker(settings);
    let instances = Reconciler::new(&invoker).list_all()?;

    debug!("Found {} instance(s)", instances.len());
    Ok(formatter.format_instances(&instances))
}

/// Show one instance.
fn cmd_info(
    settings: &MultipassSettings,
    name: &str,
    formatter: &OutputFormatter,
) -> Result<String> {
    let invoker = build_invoker(settings);
    let info = Reconciler::new(&invoker).query(name)?;
    Ok(formatter.format_info(name, info.as_ref()))
}

/// Reconcile every host in the manifest.
fn cmd_apply(
    cli: &Cli,
    manifest: &HostsManifest,
    continue_on_error: bool,
    formatter: &OutputFormatter,
) -> Result<String> {
    ConfigValidator::new().validate(manifest)?;

    let settings = cli.merge_settings(manifest.multipass.clone());
    let invoker = build_invoker(&settings);
    let report = Reconciler::new(&invoker)
        .with_continue_on_error(continue_on_error)
        .apply(&manifest.hosts);

    info!("{report}");
    let output = formatter.format_apply(&report);

    if report.success() {
        Ok(output)
    } else {
        emit(&output)?;
        let first_error = report
            .outcomes
            .iter()
            .find_map(|o| o.error.as_deref().map(|e| format!("host '{}': {e}", o.name)))
            .unwrap_or_default();
        Err(MultipassError::ApplyFailed {
            failed: report.failed,
            total: manifest.hosts.len(),
            first_error,
        })
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Creates an invoker that traces through `tracing`.
fn build_invoker(settings: &MultipassSettings) -> Invoker {
    Invoker::new(settings).with_sink(TracingSink)
}

/// Resolves the manifest path, if one is available.
fn resolve_manifest_path(cli: &Cli) -> Result<PathBuf> {
    cli.manifest
        .as_ref()
        .map_or_else(|| find_manifest_file("."), |path| Ok(path.clone()))
}

/// Loads and env-overrides the manifest.
fn load_manifest(cli: &Cli) -> Result<HostsManifest> {
    let manifest_file = resolve_manifest_path(cli)?;
    debug!("Loading manifest from: {}", manifest_file.display());

    let base = manifest_file
        .parent()
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    let parser = ManifestParser::new().with_base_path(base);
    parser.load_dotenv()?;

    parser.load_with_env(&manifest_file)
}

/// Binary settings for single-instance commands.
///
/// An explicit manifest must load. A discovered one only contributes its
/// `multipass` section when it parses. CLI flags always win.
fn load_settings(cli: &Cli) -> Result<MultipassSettings> {
    let settings = if cli.manifest.is_some() {
        load_manifest(cli)?.multipass
    } else {
        discover_settings(".")?
    };

    Ok(cli.merge_settings(settings))
}
