//! Scenario runner: the matrix against one shared session.
//!
//! Each scenario gets a fresh page from the isolation provider and runs the
//! flow once. Scenarios run one at a time by default or up to `jobs` at
//! once; failures never cross scenario boundaries.

use crate::config::RunConfig;
use crate::driver::Launcher;
use crate::flow::{FlowExecutor, FlowLocators, FlowStep};
use crate::ident::IdSource;
use crate::isolation::IsolationProvider;
use crate::result::{FlowError, FlowResult, StepFailure};
use crate::scenario::{Scenario, ScenarioMatrix};
use crate::session::{SessionHandle, SessionProvider};
use crate::sink::DiagnosticSink;
use futures::stream::{self, StreamExt};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How a scenario ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    /// Checkout reached
    Passed,
    /// An assertion, post-condition or bounds check did not hold
    Failed,
    /// Anything else went wrong
    Broken,
    /// Not started because an earlier scenario did not pass
    Skipped,
}

impl Verdict {
    /// Verdict for a flow failure
    #[must_use]
    pub const fn for_error(error: &FlowError) -> Self {
        if error.is_assertion() {
            Self::Failed
        } else {
            Self::Broken
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Broken => "broken",
            Self::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// Result of one scenario
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioOutcome {
    /// Scenario that ran
    pub scenario: Scenario,
    /// Verdict
    pub verdict: Verdict,
    /// Step that failed
    pub failed_step: Option<FlowStep>,
    /// Failure message
    pub failure: Option<String>,
    /// Context the scenario ran in
    pub context_id: Option<String>,
    /// Recording of the context
    pub video: Option<PathBuf>,
    /// Steps completed before the end
    pub steps_completed: usize,
    /// Wall-clock time in milliseconds
    pub duration_ms: u64,
}

impl ScenarioOutcome {
    /// Outcome for a scenario that never started
    #[must_use]
    pub const fn skipped(scenario: Scenario) -> Self {
        Self {
            scenario,
            verdict: Verdict::Skipped,
            failed_step: None,
            failure: None,
            context_id: None,
            video: None,
            steps_completed: 0,
            duration_ms: 0,
        }
    }

    fn broken(scenario: Scenario, error: &FlowError, duration: Duration) -> Self {
        Self {
            scenario,
            verdict: Verdict::Broken,
            failed_step: None,
            failure: Some(error.to_string()),
            context_id: None,
            video: None,
            steps_completed: 0,
            duration_ms: duration.as_millis() as u64,
        }
    }

    /// Whether the scenario passed
    #[must_use]
    pub fn passed(&self) -> bool {
        self.verdict == Verdict::Passed
    }
}

/// Everything a run produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Session the run used
    pub session_id: String,
    /// Outcomes in matrix order
    pub outcomes: Vec<ScenarioOutcome>,
    /// Wall-clock time in milliseconds
    pub duration_ms: u64,
}

impl RunSummary {
    fn count(&self, verdict: Verdict) -> usize {
        self.outcomes.iter().filter(|o| o.verdict == verdict).count()
    }

    /// Passed scenarios
    #[must_use]
    pub fn passed_count(&self) -> usize {
        self.count(Verdict::Passed)
    }

    /// Failed scenarios
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.count(Verdict::Failed)
    }

    /// Broken scenarios
    #[must_use]
    pub fn broken_count(&self) -> usize {
        self.count(Verdict::Broken)
    }

    /// Skipped scenarios
    #[must_use]
    pub fn skipped_count(&self) -> usize {
        self.count(Verdict::Skipped)
    }

    /// Scenario count
    #[must_use]
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    /// Whether every scenario passed
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.outcomes.iter().all(ScenarioOutcome::passed)
    }

    /// Outcomes that did not pass
    #[must_use]
    pub fn failures(&self) -> Vec<&ScenarioOutcome> {
        self.outcomes.iter().filter(|o| !o.passed()).collect()
    }

    /// Pretty JSON report
    pub fn to_json(&self) -> FlowResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the JSON report, creating parent directories
    pub fn write_json(&self, path: &Path) -> FlowResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

/// Progress callbacks
pub trait RunObserver: Send + Sync + fmt::Debug {
    /// A scenario is about to open its page
    fn on_start(&self, _scenario: Scenario) {}

    /// A scenario ended, skipped ones included
    fn on_finish(&self, _outcome: &ScenarioOutcome) {}
}

/// Runs a scenario matrix
#[derive(Debug)]
pub struct ScenarioRunner {
    sessions: SessionProvider,
    isolation: IsolationProvider,
    executor: Arc<FlowExecutor>,
    jobs: usize,
    fail_fast: bool,
    observer: Option<Arc<dyn RunObserver>>,
}

impl ScenarioRunner {
    /// Runner launching through `launcher`
    #[must_use]
    pub fn new(
        config: Arc<RunConfig>,
        launcher: Arc<dyn Launcher>,
        sink: Arc<DiagnosticSink>,
    ) -> Self {
        let executor = FlowExecutor::new(config.base_url.clone(), Arc::clone(&sink));
        Self {
            sessions: SessionProvider::new(Arc::clone(&config), launcher, Arc::clone(&sink)),
            isolation: IsolationProvider::new(config, sink),
            executor: Arc::new(executor),
            jobs: 1,
            fail_fast: false,
            observer: None,
        }
    }

    /// Run up to `jobs` scenarios at once (at least one)
    #[must_use]
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    /// Skip scenarios not yet started after the first that does not pass
    #[must_use]
    pub const fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    /// Receive progress callbacks
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn RunObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Replace the flow's locators
    #[must_use]
    pub fn with_locators(mut self, locators: FlowLocators) -> Self {
        let executor = (*self.executor).clone().with_locators(locators);
        self.executor = Arc::new(executor);
        self
    }

    /// Use deterministic ids for sessions and contexts
    #[must_use]
    pub fn with_ids(mut self, sessions: Arc<dyn IdSource>, contexts: Arc<dyn IdSource>) -> Self {
        self.sessions = self.sessions.with_ids(sessions);
        self.isolation = self.isolation.with_ids(contexts);
        self
    }

    /// Concurrency limit
    #[must_use]
    pub const fn jobs(&self) -> usize {
        self.jobs
    }

    /// Run every scenario of `matrix` on one session.
    ///
    /// # Errors
    ///
    /// Only session acquisition errors; scenario failures are outcomes.
    pub async fn run_all(&self, matrix: &ScenarioMatrix) -> FlowResult<RunSummary> {
        let started = Instant::now();
        let (session_id, mut indexed) = self
            .sessions
            .with_session(|session| {
                async move {
                    let stop = AtomicBool::new(false);
                    let (stop, session) = (&stop, &session);
                    let indexed: Vec<(usize, ScenarioOutcome)> =
                        stream::iter(matrix.iter().copied().enumerate())
                            .map(move |(i, scenario)| async move {
                                let outcome = if self.fail_fast && stop.load(Ordering::SeqCst) {
                                    ScenarioOutcome::skipped(scenario)
                                } else {
                                    let outcome = self.run_one(session, scenario).await;
                                    if self.fail_fast && !outcome.passed() {
                                        stop.store(true, Ordering::SeqCst);
                                    }
                                    outcome
                                };
                                if let Some(observer) = &self.observer {
                                    observer.on_finish(&outcome);
                                }
                                (i, outcome)
                            })
                            .buffer_unordered(self.jobs)
                            .collect()
                            .await;
                    (session.id().to_string(), indexed)
                }
                .boxed()
            })
            .await?;

        indexed.sort_by_key(|(i, _)| *i);
        let summary = RunSummary {
            session_id,
            outcomes: indexed.into_iter().map(|(_, o)| o).collect(),
            duration_ms: started.elapsed().as_millis() as u64,
        };
        tracing::info!(
            session = %summary.session_id,
            passed = summary.passed_count(),
            failed = summary.failed_count(),
            broken = summary.broken_count(),
            skipped = summary.skipped_count(),
            "run finished"
        );
        Ok(summary)
    }

    /// Run one scenario in a fresh page on `session`. Never fails; every
    /// problem becomes the outcome's verdict.
    pub async fn run_one(&self, session: &SessionHandle, scenario: Scenario) -> ScenarioOutcome {
        if let Some(observer) = &self.observer {
            observer.on_start(scenario);
        }
        let started = Instant::now();
        let executor = Arc::clone(&self.executor);
        let attempt = AssertUnwindSafe(self.isolation.with_page(session, move |page| {
            async move { executor.run(page, scenario).await }.boxed()
        }))
        .catch_unwind()
        .await;
        let elapsed = started.elapsed();

        let outcome = match attempt {
            Err(panic) => ScenarioOutcome::broken(scenario, &FlowError::from_panic(&*panic), elapsed),
            Ok(Err(e)) => ScenarioOutcome::broken(scenario, &e, elapsed),
            Ok(Ok(run)) => {
                let (verdict, failed_step, failure, steps_completed) = match run.value {
                    Ok(report) => (Verdict::Passed, None, None, report.steps.len()),
                    Err(StepFailure { step, cause, .. }) => (
                        Verdict::for_error(&cause),
                        Some(step),
                        Some(cause.to_string()),
                        step.position(),
                    ),
                };
                ScenarioOutcome {
                    scenario,
                    verdict,
                    failed_step,
                    failure,
                    context_id: Some(run.context_id.to_string()),
                    video: run.video,
                    steps_completed,
                    duration_ms: elapsed.as_millis() as u64,
                }
            }
        };

        match outcome.verdict {
            Verdict::Passed => tracing::info!(%scenario, "scenario passed"),
            verdict => tracing::warn!(
                %scenario,
                %verdict,
                step = ?outcome.failed_step,
                failure = outcome.failure.as_deref().unwrap_or_default(),
                "scenario did not pass"
            ),
        }
        outcome
    }
}
