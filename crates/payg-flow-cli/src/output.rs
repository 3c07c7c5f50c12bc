//! Output formatting and progress reporting

use console::{style, Style, Term};
use indicatif::{ProgressBar, ProgressStyle};
use payg_flow::{RunObserver, RunSummary, Scenario, ScenarioOutcome, Verdict};
use std::time::Duration;

/// One line describing how a scenario ended
#[must_use]
pub fn format_outcome(outcome: &ScenarioOutcome) -> String {
    let head = format!(
        "{} ({}) {} in {}ms",
        outcome.scenario.id(),
        outcome.scenario,
        outcome.verdict,
        outcome.duration_ms
    );
    let mut line = match (&outcome.failed_step, &outcome.failure) {
        (Some(step), Some(failure)) => format!("{head} at {step}: {failure}"),
        (None, Some(failure)) => format!("{head}: {failure}"),
        _ => head,
    };
    if let Some(video) = &outcome.video {
        line.push_str(&format!(" [video: {}]", video.display()));
    }
    line
}

/// Progress reporter for a scenario run
#[derive(Debug)]
pub struct ProgressReporter {
    term: Term,
    progress_bar: Option<ProgressBar>,
    /// Whether to use colors
    pub use_color: bool,
    /// Quiet mode
    pub quiet: bool,
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new(true, false)
    }
}

impl ProgressReporter {
    /// Create a new progress reporter
    #[must_use]
    pub fn new(use_color: bool, quiet: bool) -> Self {
        Self {
            term: Term::stdout(),
            progress_bar: None,
            use_color,
            quiet,
        }
    }

    /// Start a progress bar over `total` scenarios
    pub fn start_progress(&mut self, total: u64, message: &str) {
        if self.quiet {
            return;
        }

        let pb = ProgressBar::new(total);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        pb.set_message(message.to_string());
        self.progress_bar = Some(pb);
    }

    /// Finish progress bar
    pub fn finish(&self) {
        if let Some(ref pb) = self.progress_bar {
            pb.finish_and_clear();
        }
    }

    fn line(&self, text: &str) {
        // Keep the bar from overwriting the line
        match &self.progress_bar {
            Some(pb) => pb.suspend(|| {
                let _ = self.term.write_line(text);
            }),
            None => {
                let _ = self.term.write_line(text);
            }
        }
    }

    fn prefixed(&self, symbol: &str, plain: &str, color: Style, message: &str) {
        let prefix = if self.use_color {
            color.bold().apply_to(symbol).to_string()
        } else {
            plain.to_string()
        };
        self.line(&format!("{prefix} {message}"));
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        if self.quiet {
            return;
        }
        self.prefixed("✓", "PASS", Style::new().green(), message);
    }

    /// Print a failure message
    pub fn failure(&self, message: &str) {
        // Always print failures, even in quiet mode
        self.prefixed("✗", "FAIL", Style::new().red(), message);
    }

    /// Print a broken-scenario message
    pub fn broken(&self, message: &str) {
        self.prefixed("!", "BROKEN", Style::new().magenta(), message);
    }

    /// Print a warning message
    pub fn warning(&self, message: &str) {
        if self.quiet {
            return;
        }
        self.prefixed("⚠", "WARN", Style::new().yellow(), message);
    }

    /// Print an info message
    pub fn info(&self, message: &str) {
        if self.quiet {
            return;
        }
        self.prefixed("ℹ", "INFO", Style::new().blue(), message);
    }

    /// Print a section header
    pub fn header(&self, title: &str) {
        if self.quiet {
            return;
        }

        let styled = if self.use_color {
            style(title).bold().underlined().to_string()
        } else {
            format!("=== {title} ===")
        };

        self.line("");
        self.line(&styled);
    }

    /// Print the run summary
    pub fn summary(&self, summary: &RunSummary) {
        let passed = summary.passed_count();
        let failed = summary.failed_count();
        let broken = summary.broken_count();
        let skipped = summary.skipped_count();
        if self.quiet && summary.all_passed() {
            return;
        }

        let duration_secs = Duration::from_millis(summary.duration_ms).as_secs_f64();
        let total = summary.total();
        self.line("");

        if self.use_color {
            let passed_style = Style::new().green().bold();
            let failed_style = Style::new().red().bold();
            let skipped_style = Style::new().yellow();

            let status = if summary.all_passed() {
                passed_style.apply_to("PASSED")
            } else {
                failed_style.apply_to("FAILED")
            };

            self.line(&format!(
                "{} {} scenarios in {:.2}s ({} passed, {} failed, {} broken, {} skipped)",
                status,
                total,
                duration_secs,
                passed_style.apply_to(passed),
                failed_style.apply_to(failed),
                failed_style.apply_to(broken),
                skipped_style.apply_to(skipped)
            ));
        } else {
            let status = if summary.all_passed() {
                "PASSED"
            } else {
                "FAILED"
            };
            self.line(&format!(
                "{status} {total} scenarios in {duration_secs:.2}s ({passed} passed, {failed} failed, {broken} broken, {skipped} skipped)"
            ));
        }
    }
}

impl RunObserver for ProgressReporter {
    fn on_start(&self, scenario: Scenario) {
        if let Some(ref pb) = self.progress_bar {
            pb.set_message(scenario.id());
        }
    }

    fn on_finish(&self, outcome: &ScenarioOutcome) {
        let line = format_outcome(outcome);
        match outcome.verdict {
            Verdict::Passed => self.success(&line),
            Verdict::Failed => self.failure(&line),
            Verdict::Broken => self.broken(&line),
            Verdict::Skipped => self.warning(&line),
        }
        if let Some(ref pb) = self.progress_bar {
            pb.inc(1);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use payg_flow::FlowStep;
    use std::path::PathBuf;

    fn outcome(verdict: Verdict) -> ScenarioOutcome {
        let mut outcome = ScenarioOutcome::skipped(Scenario::new(5, 0));
        outcome.verdict = verdict;
        outcome.duration_ms = 42;
        outcome
    }

    mod format_tests {
        use super::*;

        #[test]
        fn test_passed_line() {
            let mut o = outcome(Verdict::Passed);
            o.video = Some(PathBuf::from("videos/ab12cd34.gif"));
            assert_eq!(
                format_outcome(&o),
                "h5-p0 (handset #5, plan #0) passed in 42ms [video: videos/ab12cd34.gif]"
            );
        }

        #[test]
        fn test_failed_line_names_step() {
            let mut o = outcome(Verdict::Failed);
            o.failed_step = Some(FlowStep::HandsetSelect);
            o.failure = Some("Index 5 is out of range".into());
            let line = format_outcome(&o);
            assert!(line.contains("failed in 42ms at HandsetSelect: Index 5"));
        }

        #[test]
        fn test_broken_line_without_step() {
            let mut o = outcome(Verdict::Broken);
            o.failure = Some("Browser context error: gone".into());
            assert!(format_outcome(&o).ends_with("broken in 42ms: Browser context error: gone"));
        }
    }

    mod progress_reporter_tests {
        use super::*;

        #[test]
        fn test_new_reporter() {
            let reporter = ProgressReporter::new(true, false);
            assert!(reporter.use_color);
            assert!(!reporter.quiet);
        }

        #[test]
        fn test_quiet_reporter_has_no_bar() {
            let mut reporter = ProgressReporter::new(false, true);
            reporter.start_progress(3, "Running");
            assert!(reporter.progress_bar.is_none());
            reporter.failure("shown");
        }

        #[test]
        fn test_observer_advances_bar() {
            let mut reporter = ProgressReporter::new(false, false);
            reporter.start_progress(2, "Running");
            reporter.on_start(Scenario::new(0, 0));
            reporter.on_finish(&outcome(Verdict::Passed));
            reporter.on_finish(&outcome(Verdict::Skipped));
            assert_eq!(reporter.progress_bar.as_ref().unwrap().position(), 2);
            reporter.finish();
        }

        #[test]
        fn test_summary_variants() {
            let reporter = ProgressReporter::new(false, false);
            let summary = RunSummary {
                session_id: "s1".into(),
                outcomes: vec![outcome(Verdict::Passed), outcome(Verdict::Broken)],
                duration_ms: 1500,
            };
            reporter.summary(&summary);
            reporter.header("Scenarios");
        }
    }
}
