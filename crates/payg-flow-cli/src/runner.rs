//! Command execution: configuration resolution, runs, listings

use crate::commands::{ConfigArgs, ListArgs, RunArgs, SourceArgs};
use crate::config::CliConfig;
use crate::error::{CliError, CliResult};
use crate::output::ProgressReporter;
use payg_flow::{
    ConfigOverrides, DiagnosticSink, FlowExecutor, Launcher, Profile, RunConfig, RunObserver,
    RunSummary, ScenarioMatrix, ScenarioRunner, Storefront,
};
use std::sync::Arc;

/// Resolve the run configuration.
///
/// Precedence, lowest first: profile defaults, config file, debug switch
/// (`--debug` or the environment), command-line flags.
pub fn resolve_config(source: &SourceArgs) -> CliResult<RunConfig> {
    let overrides = match &source.config {
        Some(path) => ConfigOverrides::load(path)?,
        None => ConfigOverrides::default(),
    };
    let forced = if source.debug {
        Some(Profile::Debug)
    } else {
        Profile::from_env()
    };
    let mut config = overrides.apply_to(forced);

    if let Some(url) = &source.base_url {
        config = config.with_base_url(url.clone());
    }
    if !source.scenarios.is_empty() {
        let matrix = ScenarioMatrix::parse_all(&source.scenarios)
            .map_err(|e| CliError::invalid_argument(e.to_string()))?;
        config = config.with_scenarios(matrix);
    }
    Ok(config)
}

/// Layer the `run` flags on top of a resolved configuration
#[must_use]
pub fn apply_run_args(mut config: RunConfig, args: &RunArgs) -> RunConfig {
    if let Some(path) = &args.log_file {
        config = config.with_log_path(path.clone());
    }
    if let Some(dir) = &args.video_dir {
        config = config.with_video_dir(dir.clone());
    }
    if args.no_video {
        config = config.with_record_video(false);
    }
    if let Some(ms) = args.timeout {
        config = config.with_step_timeout_ms(ms);
    }
    config
}

/// Pick the browser backend for a run
pub fn select_launcher(args: &RunArgs) -> CliResult<Arc<dyn Launcher>> {
    if args.simulate {
        let store = Storefront::new().with_handsets(args.simulate_handsets);
        return Ok(Arc::new(store.launcher()));
    }
    #[cfg(feature = "browser")]
    {
        Ok(Arc::new(payg_flow::CdpLauncher))
    }
    #[cfg(not(feature = "browser"))]
    {
        Err(CliError::invalid_argument(
            "built without the `browser` feature; pass --simulate",
        ))
    }
}

/// Executes CLI commands
#[derive(Debug)]
pub struct FlowRunner {
    config: CliConfig,
}

impl FlowRunner {
    /// Create a new runner
    #[must_use]
    pub const fn new(config: CliConfig) -> Self {
        Self { config }
    }

    /// CLI settings in effect
    #[must_use]
    pub const fn config(&self) -> &CliConfig {
        &self.config
    }

    fn adjust_verbosity(&self, mut config: RunConfig) -> RunConfig {
        if self.config.verbosity.is_quiet() {
            config.verbosity = 0;
        } else if self.config.verbosity.is_verbose() {
            config.verbosity = config.verbosity.max(1);
        }
        config
    }

    /// Run every configured scenario and report the outcome.
    ///
    /// # Errors
    ///
    /// [`CliError::RunFailed`] when any scenario did not pass.
    pub fn run(&self, args: &RunArgs) -> CliResult<RunSummary> {
        let config = apply_run_args(resolve_config(&args.source)?, args);
        let config = self.adjust_verbosity(config);
        config.validate()?;

        let launcher = select_launcher(args)?;
        let sink = Arc::new(DiagnosticSink::open(&config.log_path, config.verbosity));
        let matrix = config.scenarios.clone();
        tracing::info!(
            scenarios = matrix.len(),
            jobs = args.jobs,
            simulate = args.simulate,
            "starting run"
        );

        let mut reporter =
            ProgressReporter::new(self.config.color.should_color(), self.config.verbosity.is_quiet());
        reporter.header("PAYG checkout");
        reporter.start_progress(matrix.len() as u64, "Running");
        let reporter = Arc::new(reporter);
        let observer: Arc<dyn RunObserver> = Arc::clone(&reporter) as Arc<dyn RunObserver>;

        let runner = ScenarioRunner::new(Arc::new(config), launcher, sink)
            .with_jobs(args.jobs)
            .with_fail_fast(args.fail_fast)
            .with_observer(observer);

        let runtime = tokio::runtime::Runtime::new()?;
        let summary = runtime.block_on(runner.run_all(&matrix));
        reporter.finish();
        let summary = summary?;
        reporter.summary(&summary);

        if let Some(path) = &args.report {
            summary
                .write_json(path)
                .map_err(|e| CliError::report_generation(e.to_string()))?;
            reporter.info(&format!("Report written to {}", path.display()));
        }

        if summary.all_passed() {
            Ok(summary)
        } else {
            Err(CliError::RunFailed {
                failed: summary.total() - summary.passed_count(),
                total: summary.total(),
            })
        }
    }

    /// Render the scenario list
    pub fn list(&self, args: &ListArgs) -> CliResult<String> {
        let config = resolve_config(&args.source)?;
        let executor = FlowExecutor::new(
            config.base_url.clone(),
            Arc::new(DiagnosticSink::disabled(0)),
        );

        let mut out = String::new();
        for scenario in config.scenarios.iter() {
            out.push_str(&format!("{}\t{scenario}\n", scenario.id()));
            if args.steps {
                for (n, plan) in executor.plan(*scenario).iter().enumerate() {
                    out.push_str(&format!("  {:>2}. [{}] {}\n", n + 1, plan.step, plan.message));
                }
            }
        }
        Ok(out)
    }

    /// Render the resolved configuration as YAML or JSON
    pub fn render_config(&self, args: &ConfigArgs) -> CliResult<String> {
        let config = resolve_config(&args.source)?;
        if args.json {
            serde_json::to_string_pretty(&config).map_err(|e| CliError::config(e.to_string()))
        } else {
            serde_yaml_ng::to_string(&config).map_err(|e| CliError::config(e.to_string()))
        }
    }
}
