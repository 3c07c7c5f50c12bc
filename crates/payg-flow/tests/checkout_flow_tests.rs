//! End-to-end runs of the checkout journey against the simulated storefront.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use futures::FutureExt;
use payg_flow::{
    DiagnosticSink, FlowError, FlowExecutor, FlowLocators, FlowStep, IsolationProvider, Locator,
    Role, RunConfig, Scenario, ScenarioMatrix, ScenarioRunner, SequentialIds, SessionProvider,
    Storefront, TextMatch, Verdict, CONTEXT_LABEL, FLOW_LABEL,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

// ===== Helpers =====

fn fast() -> RunConfig {
    RunConfig::default()
        .with_record_video(false)
        .with_step_timeout_ms(5_000)
        .with_poll_interval_ms(5)
        .with_settle_ms(60)
}

fn runner(store: &Storefront, config: RunConfig) -> (ScenarioRunner, Arc<DiagnosticSink>) {
    let sink = Arc::new(DiagnosticSink::disabled(0).with_capture());
    let runner = ScenarioRunner::new(
        Arc::new(config),
        Arc::new(store.launcher()),
        Arc::clone(&sink),
    );
    (runner, sink)
}

struct Fixtures {
    sessions: SessionProvider,
    isolation: IsolationProvider,
    executor: Arc<FlowExecutor>,
}

fn fixtures(store: &Storefront, config: RunConfig) -> Fixtures {
    let config = Arc::new(config);
    let sink = Arc::new(DiagnosticSink::disabled(0));
    Fixtures {
        sessions: SessionProvider::new(
            Arc::clone(&config),
            Arc::new(store.launcher()),
            Arc::clone(&sink),
        ),
        isolation: IsolationProvider::new(Arc::clone(&config), Arc::clone(&sink)),
        executor: Arc::new(FlowExecutor::new(config.base_url.clone(), sink)),
    }
}

// ===== Matrix runs =====

#[tokio::test]
async fn default_matrix_reaches_checkout_for_every_scenario() {
    let store = Storefront::new();
    let (runner, sink) = runner(&store, fast());
    let runner = runner.with_jobs(4);
    let summary = runner.run_all(&ScenarioMatrix::default()).await.unwrap();

    assert_eq!(summary.total(), 8);
    assert!(summary.all_passed(), "{:#?}", summary.failures());
    let order: Vec<Scenario> = summary.outcomes.iter().map(|o| o.scenario).collect();
    assert_eq!(order, ScenarioMatrix::default().iter().copied().collect::<Vec<_>>());
    for outcome in &summary.outcomes {
        assert_eq!(outcome.steps_completed, FlowStep::ALL.len());
    }
    assert_eq!(sink.entries_mentioning("Expecting checkout").len(), 8);
    assert_eq!(sink.entries_mentioning("torn down. Video at").len(), 8);

    let stats = store.stats();
    assert_eq!(stats.launches, 1);
    assert_eq!(stats.contexts_opened, 8);
    assert_eq!(stats.live_browsers(), 0);
    assert_eq!(stats.open_contexts(), 0);
}

#[tokio::test]
async fn ordinal_past_the_last_handset_fails_fast() {
    let store = Storefront::new()
        .with_handsets(5)
        .with_render_delay(Duration::from_millis(10));
    let (runner, _) = runner(&store, fast().with_step_timeout_ms(30_000));
    let started = Instant::now();
    let summary = runner
        .run_all(&ScenarioMatrix::from_pairs([(5, 0)]))
        .await
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(10));
    let outcome = &summary.outcomes[0];
    assert_eq!(outcome.verdict, Verdict::Failed);
    assert_eq!(outcome.failed_step, Some(FlowStep::HandsetSelect));
    let failure = outcome.failure.as_deref().unwrap();
    assert!(failure.contains("Index 5"), "{failure}");
    assert!(failure.contains("only 5"), "{failure}");
}

#[tokio::test]
async fn ordinal_past_the_last_plan_fails_at_plan_select() {
    let store = Storefront::new().with_plans(3);
    let (runner, _) = runner(&store, fast().with_step_timeout_ms(30_000));
    let summary = runner
        .run_all(&ScenarioMatrix::from_pairs([(0, 3)]))
        .await
        .unwrap();

    let outcome = &summary.outcomes[0];
    assert_eq!(outcome.verdict, Verdict::Failed);
    assert_eq!(outcome.failed_step, Some(FlowStep::PlanSelect));
    let failure = outcome.failure.as_deref().unwrap();
    assert!(failure.contains("Index 3"), "{failure}");
    assert!(failure.contains("only 3"), "{failure}");
}

#[tokio::test]
async fn queries_failing_after_navigation_do_not_fail_the_flow() {
    let store = Storefront::new().with_navigation_glitch(2);
    let (runner, _) = runner(&store, fast());
    let summary = runner
        .run_all(&ScenarioMatrix::from_pairs([(0, 0), (3, 1)]))
        .await
        .unwrap();
    assert!(summary.all_passed(), "{:#?}", summary.failures());
    assert_eq!(store.stats().open_contexts(), 0);
}

#[tokio::test]
async fn repeated_scenario_yields_same_verdict() {
    let store = Storefront::new().with_handsets(5);
    let (runner, _) = runner(&store, fast());
    let summary = runner
        .run_all(&ScenarioMatrix::from_pairs([(0, 0), (5, 0), (0, 0), (5, 0)]))
        .await
        .unwrap();
    let verdicts: Vec<Verdict> = summary.outcomes.iter().map(|o| o.verdict).collect();
    assert_eq!(
        verdicts,
        vec![Verdict::Passed, Verdict::Failed, Verdict::Passed, Verdict::Failed]
    );
}

#[tokio::test]
async fn broken_checkout_fails_the_final_check() {
    let store = Storefront::new().with_broken_checkout();
    let (runner, _) = runner(&store, fast().with_step_timeout_ms(300));
    let summary = runner
        .run_all(&ScenarioMatrix::from_pairs([(0, 0)]))
        .await
        .unwrap();
    let outcome = &summary.outcomes[0];
    assert_eq!(outcome.verdict, Verdict::Failed);
    assert_eq!(outcome.failed_step, Some(FlowStep::Verify));
    assert_eq!(outcome.steps_completed, FlowStep::ALL.len() - 1);
}

#[tokio::test]
async fn concurrent_failures_stay_isolated() {
    let store = Storefront::new().with_out_of_stock(2);
    let (runner, _) = runner(&store, fast().with_step_timeout_ms(400));
    let runner = runner.with_jobs(3);
    let summary = runner
        .run_all(&ScenarioMatrix::from_pairs([(1, 0), (2, 0), (3, 0)]))
        .await
        .unwrap();
    let verdicts: Vec<Verdict> = summary.outcomes.iter().map(|o| o.verdict).collect();
    assert_eq!(
        verdicts,
        vec![Verdict::Passed, Verdict::Failed, Verdict::Passed]
    );
    assert_eq!(store.stats().open_contexts(), 0);
}

// ===== Fixture lifecycle =====

#[tokio::test]
async fn acquire_then_release_leaves_nothing_live() {
    let store = Storefront::new();
    let fx = fixtures(&store, fast());
    let session = fx.sessions.acquire().await.unwrap();
    let page = fx.isolation.open(&session).await.unwrap();
    fx.isolation.close(page).await;
    fx.sessions.release(session).await.unwrap();

    assert!(!fx.sessions.is_active());
    assert_eq!(store.stats().live_browsers(), 0);
    assert_eq!(store.stats().open_contexts(), 0);
}

#[tokio::test]
async fn release_without_acquire_is_rejected() {
    let store = Storefront::new();
    let owner = fixtures(&store, fast());
    let stranger = fixtures(&store, fast());
    let session = owner.sessions.acquire().await.unwrap();

    assert!(matches!(
        stranger.sessions.release(session.clone()).await,
        Err(FlowError::NoActiveSession)
    ));
    owner.sessions.release(session).await.unwrap();
}

#[tokio::test]
async fn release_force_closes_open_contexts() {
    let store = Storefront::new();
    let fx = fixtures(&store, fast());
    let session = fx.sessions.acquire().await.unwrap();
    let mut page = fx.isolation.open(&session).await.unwrap();
    assert_eq!(session.open_contexts(), 1);
    fx.sessions.release(session).await.unwrap();
    assert_eq!(store.stats().live_browsers(), 0);
    assert_eq!(store.stats().open_contexts(), 0);
    assert!(page.goto("https://www.vodafone.ie").await.is_err());
    drop(page);
}

#[tokio::test]
async fn contexts_do_not_share_cookie_consent() {
    let store = Storefront::new();
    let fx = fixtures(&store, fast());
    let reject = Locator::role(Role::Button, TextMatch::contains("Reject"));
    let payg = FlowLocators::default().payg_category;

    let session = fx.sessions.acquire().await.unwrap();
    let mut first = fx.isolation.open(&session).await.unwrap();
    let mut second = fx.isolation.open(&session).await.unwrap();
    assert_ne!(first.id(), second.id());

    first.goto("https://www.vodafone.ie").await.unwrap();
    first.click(&reject).await.unwrap();
    second.goto("https://www.vodafone.ie").await.unwrap();

    assert!(first.wait_visible(&payg).await.unwrap());
    assert!(second.is_visible(&reject).await.unwrap());
    assert!(!second.is_visible(&payg).await.unwrap());

    fx.isolation.close(first).await;
    fx.isolation.close(second).await;
    fx.sessions.release(session).await.unwrap();
}

#[tokio::test]
async fn first_scenario_ends_on_visible_secure_checkout() {
    let store = Storefront::new();
    let fx = fixtures(&store, fast());
    let session = fx.sessions.acquire().await.unwrap();
    let executor = Arc::clone(&fx.executor);
    let run = fx
        .isolation
        .with_page(&session, move |page| {
            async move {
                let report = executor.run(page, Scenario::new(0, 0)).await;
                let visible = page
                    .is_visible(&FlowLocators::default().secure_checkout)
                    .await;
                (report, visible)
            }
            .boxed()
        })
        .await
        .unwrap();
    let (report, visible) = run.value;
    assert_eq!(report.unwrap().steps, FlowStep::ALL.to_vec());
    assert!(visible.unwrap());
    fx.sessions.release(session).await.unwrap();
}

// ===== Diagnostics =====

#[tokio::test]
async fn diagnostic_log_lines_are_timestamped_and_labelled() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("logs/log.log");
    let store = Storefront::new();
    let sink = Arc::new(DiagnosticSink::open(&log, 0));
    let runner = ScenarioRunner::new(
        Arc::new(fast()),
        Arc::new(store.launcher()),
        Arc::clone(&sink),
    )
    .with_ids(
        Arc::new(SequentialIds::new("browser-", 1)),
        Arc::new(SequentialIds::new("ctx-", 1)),
    );
    runner
        .run_all(&ScenarioMatrix::from_pairs([(3, 0)]))
        .await
        .unwrap();

    let text = std::fs::read_to_string(&log).unwrap();
    let line = regex::Regex::new(r"^\[\d{2}/\d{2}/\d{4}, \d{2}:\d{2}:\d{2}\] \[([^\]]+)\] (.+)$")
        .unwrap();
    let parsed: Vec<(String, String)> = text
        .lines()
        .map(|l| {
            let caps = line.captures(l).unwrap_or_else(|| panic!("bad line: {l}"));
            (caps[1].to_string(), caps[2].to_string())
        })
        .collect();

    assert_eq!(parsed.first().unwrap().1, "New browser (browser-1) being created...");
    assert_eq!(parsed.last().unwrap().1, "Browser browser-1 torn down");
    assert!(parsed.contains(&(FLOW_LABEL.to_string(), "Selecting phone #3".to_string())));
    assert!(parsed.contains(&(
        CONTEXT_LABEL.to_string(),
        "Context ctx-1 torn down. Video at <none>".to_string()
    )));
}

#[tokio::test]
async fn each_context_writes_its_own_recording() {
    let dir = tempfile::tempdir().unwrap();
    let store = Storefront::new();
    let config = fast()
        .with_record_video(true)
        .with_video_dir(dir.path().join("videos"));
    let (runner, sink) = runner(&store, config);
    let summary = runner
        .with_jobs(2)
        .run_all(&ScenarioMatrix::from_pairs([(0, 0), (1, 0)]))
        .await
        .unwrap();

    let videos: Vec<_> = summary
        .outcomes
        .iter()
        .map(|o| o.video.clone().unwrap())
        .collect();
    assert_ne!(videos[0], videos[1]);
    for (outcome, video) in summary.outcomes.iter().zip(&videos) {
        let context = outcome.context_id.as_deref().unwrap();
        assert!(video.ends_with(format!("{context}.gif")));
        assert_eq!(&std::fs::read(video).unwrap()[0..6], b"GIF89a");
        let logged = sink.entries_mentioning(&format!("Context {context} torn down"));
        assert!(logged[0].message.ends_with(&video.display().to_string()));
    }
}

// ===== Live site =====

#[cfg(feature = "browser")]
#[tokio::test]
#[ignore = "drives the live site in a local chromium"]
async fn live_site_first_scenario() {
    let config = RunConfig::resolve(None).unwrap().with_record_video(false);
    let sink = Arc::new(DiagnosticSink::open(&config.log_path, 1));
    let runner = ScenarioRunner::new(
        Arc::new(config),
        Arc::new(payg_flow::CdpLauncher),
        sink,
    );
    let summary = runner
        .run_all(&ScenarioMatrix::from_pairs([(0, 0)]))
        .await
        .unwrap();
    assert!(summary.all_passed(), "{:#?}", summary.failures());
}
