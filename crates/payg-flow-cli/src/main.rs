//! payg-flow: run the PAYG handset checkout journey
//!
//! ## Usage
//!
//! ```bash
//! payg-flow run                       # Full scenario matrix in chromium
//! payg-flow run -s 1:0 -j 4 --debug   # One scenario, visible window
//! payg-flow run --simulate            # Against the built-in storefront
//! payg-flow list --steps              # What a run would do
//! payg-flow config --json             # Resolved configuration
//! ```

use clap::Parser;
use payg_flow_cli::{Cli, CliConfig, CliResult, ColorChoice, Commands, FlowRunner, Verbosity};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> CliResult<()> {
    let cli = Cli::parse();

    let config = build_config(&cli);
    init_tracing(config.verbosity);
    console::set_colors_enabled(config.color.should_color());

    let runner = FlowRunner::new(config);
    match cli.command {
        Commands::Run(args) => runner.run(&args).map(|_| ()),
        Commands::List(args) => {
            print!("{}", runner.list(&args)?);
            Ok(())
        }
        Commands::Config(args) => {
            println!("{}", runner.render_config(&args)?.trim_end());
            Ok(())
        }
    }
}

fn build_config(cli: &Cli) -> CliConfig {
    CliConfig::new()
        .with_verbosity(Verbosity::from_flags(cli.verbose, cli.quiet))
        .with_color(ColorChoice::from(cli.color))
}

fn init_tracing(verbosity: Verbosity) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.log_filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
