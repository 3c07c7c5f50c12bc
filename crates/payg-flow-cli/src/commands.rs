//! CLI command definitions using clap

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// payg-flow: end-to-end test of the pay-as-you-go handset checkout
#[derive(Parser, Debug)]
#[command(name = "payg-flow")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (failures only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output (auto, always, never)
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorArg,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the checkout flow for every scenario
    Run(RunArgs),

    /// List the scenarios a run would execute
    List(ListArgs),

    /// Show the resolved configuration
    Config(ConfigArgs),
}

/// Where the run configuration comes from
#[derive(Args, Debug, Clone, Default)]
pub struct SourceArgs {
    /// YAML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Debug profile: visible window, slow motion, chatty log
    #[arg(long, env = "PAYG_FLOW_DEBUG")]
    pub debug: bool,

    /// Home page of the site under test
    #[arg(long)]
    pub base_url: Option<String>,

    /// Scenario as HANDSET:PLAN (repeatable; replaces the matrix)
    #[arg(short, long = "scenario", value_name = "HANDSET:PLAN")]
    pub scenarios: Vec<String>,
}

/// Arguments for the run command
#[derive(Args, Debug, Clone, Default)]
#[allow(clippy::struct_excessive_bools)]
pub struct RunArgs {
    /// Configuration sources
    #[command(flatten)]
    pub source: SourceArgs,

    /// Scenarios to run at once
    #[arg(short = 'j', long, default_value = "1")]
    pub jobs: usize,

    /// Skip remaining scenarios after the first that does not pass
    #[arg(long)]
    pub fail_fast: bool,

    /// Diagnostic log file
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Directory for per-scenario recordings
    #[arg(long)]
    pub video_dir: Option<PathBuf>,

    /// Do not record video
    #[arg(long)]
    pub no_video: bool,

    /// Per-step wait budget in milliseconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Write a JSON run report to this path
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Run against the built-in simulated storefront instead of a browser
    #[arg(long)]
    pub simulate: bool,

    /// Handset cards the simulated storefront shows
    #[arg(long, default_value = "8", requires = "simulate")]
    pub simulate_handsets: usize,
}

/// Arguments for the list command
#[derive(Args, Debug, Clone, Default)]
pub struct ListArgs {
    /// Configuration sources
    #[command(flatten)]
    pub source: SourceArgs,

    /// Also print each scenario's steps
    #[arg(long)]
    pub steps: bool,
}

/// Arguments for the config command
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// Configuration sources
    #[command(flatten)]
    pub source: SourceArgs,

    /// Print as JSON instead of YAML
    #[arg(long)]
    pub json: bool,
}

/// Color argument
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum ColorArg {
    /// Automatic color detection
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

impl From<ColorArg> for crate::config::ColorChoice {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::Auto => Self::Auto,
            ColorArg::Always => Self::Always,
            ColorArg::Never => Self::Never,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    mod cli_tests {
        use super::*;

        #[test]
        fn test_verify_cli() {
            use clap::CommandFactory;
            Cli::command().debug_assert();
        }

        #[test]
        fn test_parse_run_with_scenarios() {
            let cli = Cli::parse_from([
                "payg-flow",
                "run",
                "--scenario",
                "1:0",
                "-s",
                "0:2",
                "-j",
                "3",
                "--fail-fast",
                "--simulate",
            ]);
            match cli.command {
                Commands::Run(args) => {
                    assert_eq!(args.source.scenarios, vec!["1:0", "0:2"]);
                    assert_eq!(args.jobs, 3);
                    assert!(args.fail_fast);
                    assert!(args.simulate);
                    assert_eq!(args.simulate_handsets, 8);
                }
                other => panic!("expected run, got {other:?}"),
            }
        }

        #[test]
        fn test_global_flags_after_subcommand() {
            let cli = Cli::parse_from(["payg-flow", "list", "-vv", "--color", "never"]);
            assert_eq!(cli.verbose, 2);
            assert!(matches!(cli.color, ColorArg::Never));
        }

        #[test]
        fn test_simulate_handsets_requires_simulate() {
            let parsed =
                Cli::try_parse_from(["payg-flow", "run", "--simulate-handsets", "3"]);
            assert!(parsed.is_err());
        }
    }
}
