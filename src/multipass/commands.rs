//! Argument lists for the `multipass` subcommands this crate issues.

use crate::config::InstanceSpec;

/// Flag requesting a single JSON document on stdout.
const FORMAT_JSON: [&str; 2] = ["--format", "json"];

/// `info <name> --format json`.
#[must_use]
pub fn info(name: &str) -> Vec<String> {
    let mut args = vec![String::from("info"), name.to_string()];
    args.extend(FORMAT_JSON.iter().map(|s| (*s).to_string()));
    args
}

/// `info --format json` for every instance.
#[must_use]
pub fn info_all() -> Vec<String> {
    let mut args = vec![String::from("info")];
    args.extend(FORMAT_JSON.iter().map(|s| (*s).to_string()));
    args
}

/// `launch <image> --name <name>` plus a flag for each optional field that is set.
///
/// The caller guarantees the image is present.
#[must_use]
pub fn launch(spec: &InstanceSpec, image: &str) -> Vec<String> {
    let mut args = vec![
        String::from("launch"),
        image.to_string(),
        String::from("--name"),
        spec.name.clone(),
    ];

    if let Some(cpus) = spec.cpus {
        args.push(String::from("--cpus"));
        args.push(cpus.to_string());
    }
    if let Some(memory) = &spec.memory {
        args.push(String::from("--memory"));
        args.push(memory.clone());
    }
    if let Some(disk) = &spec.disk {
        args.push(String::from("--disk"));
        args.push(disk.clone());
    }
    if let Some(network) = &spec.network {
        args.push(String::from("--network"));
        args.push(network.clone());
    }
    if let Some(path) = &spec.init_script_path {
        args.push(String::from("--cloud-init"));
        args.push(path.display().to_string());
    }

    args
}

/// `delete <name>`; the instance stays recoverable until purged.
#[must_use]
pub fn delete(name: &str) -> Vec<String> {
    vec![String::from("delete"), name.to_string()]
}

/// `purge`, reclaiming every deleted instance.
#[must_use]
pub fn purge() -> Vec<String> {
    vec![String::from("purge")]
}
