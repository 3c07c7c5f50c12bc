//! payg-flow CLI library
//!
//! Command-line front end for the PAYG handset checkout flow: resolves the
//! run configuration, picks a browser backend, drives the scenario matrix
//! and reports progress.

#![warn(missing_docs)]
#![allow(clippy::format_push_string)]

mod commands;
mod config;
mod error;
mod output;
mod runner;

pub use commands::{Cli, ColorArg, Commands, ConfigArgs, ListArgs, RunArgs, SourceArgs};
pub use config::{CliConfig, ColorChoice, Verbosity};
pub use error::{CliError, CliResult};
pub use output::{format_outcome, ProgressReporter};
pub use runner::{apply_run_args, resolve_config, select_launcher, FlowRunner};
