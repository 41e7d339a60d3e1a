// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(warnings)]                    // All warnings are treated as errors
#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(dead_code)]                   // Unused code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![deny(unused_imports)]              // Unused imports are forbidden
#![deny(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Multipass Hosts
//!
//! Idempotent lifecycle management for Multipass virtual machines.
//!
//! ## Overview
//!
//! Given a desired-state description of a VM (name, image, resources,
//! optional cloud-init script, `present` or `absent`), this crate inspects
//! the current state through the `multipass` command-line tool and performs
//! only the actions needed to converge:
//!
//! - Query a single instance, treating "not found" as absence
//! - Launch a missing instance and report what is running
//! - Delete and purge an existing instance
//! - List every instance Multipass knows about
//!
//! Every operation reports whether it changed anything, so repeated runs
//! with the same input are no-ops.
//!
//! ## Modules
//!
//! - [`config`]: Host descriptors, manifest parsing and validation
//! - [`multipass`]: Locating and invoking the `multipass` binary
//! - [`reconciler`]: Converging instances to their desired state
//! - [`cli`]: Command-line interface
//! - [`error`]: Error types
//!
//! ## Example
//!
//! ```yaml
//! multipass:
//!   binary: multipass
//!
//! hosts:
//!   - name: web
//!     image: "22.04"
//!     cpus: 2
//!     memory: 2G
//!     disk: 10G
//!     cloud_init: cloud-init/web.yaml
//!   - name: legacy
//!     state: absent
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod cli;
pub mod config;
pub mod error;
pub mod multipass;
pub mod reconciler;

// ============================================================================
// Re-exports
// ============================================================================

pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{ConfigValidator, DesiredState, HostsManifest, InstanceSpec, ManifestParser};
pub use error::{MultipassError, Result};
pub use multipass::{CommandResult, InstanceInfo, InvokeOptions, Invoker};
pub use reconciler::{ApplyReport, ReconciliationResult, Reconciler};
