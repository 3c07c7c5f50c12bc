//! Property-based tests for scenario parsing and ordinal bounds.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use payg_flow::{
    DiagnosticSink, FlowStep, RunConfig, Scenario, ScenarioMatrix, ScenarioRunner, Storefront,
    Verdict,
};
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;

fn run_once(handsets: usize, scenario: Scenario) -> Verdict {
    let store = Storefront::new()
        .with_handsets(handsets)
        .with_render_delay(Duration::ZERO);
    let config = RunConfig::default()
        .with_record_video(false)
        .with_step_timeout_ms(2_000)
        .with_poll_interval_ms(2)
        .with_settle_ms(20);
    let runner = ScenarioRunner::new(
        Arc::new(config),
        Arc::new(store.launcher()),
        Arc::new(DiagnosticSink::disabled(0)),
    );
    let rt = tokio::runtime::Runtime::new().unwrap();
    let summary = rt
        .block_on(runner.run_all(&ScenarioMatrix::new(vec![scenario])))
        .unwrap();
    let outcome = &summary.outcomes[0];
    if outcome.verdict == Verdict::Failed {
        assert_eq!(outcome.failed_step, Some(FlowStep::HandsetSelect));
    }
    outcome.verdict
}

proptest! {
    /// "h:p" parses back to the pair it was built from
    #[test]
    fn prop_scenario_parses_from_pair(h in 0usize..100, p in 0usize..100) {
        let parsed: Scenario = format!("{h}:{p}").parse().unwrap();
        prop_assert_eq!(parsed, Scenario::new(h, p));
        prop_assert_eq!(parsed.id(), format!("h{h}-p{p}"));
    }

    /// Matrix iteration is stable and restartable
    #[test]
    fn prop_matrix_order_is_stable(pairs in prop::collection::vec((0usize..10, 0usize..3), 0..12)) {
        let matrix = ScenarioMatrix::from_pairs(pairs.clone());
        let first: Vec<_> = matrix.iter().map(|s| (s.handset_index, s.plan_index)).collect();
        let second: Vec<_> = matrix.iter().map(|s| (s.handset_index, s.plan_index)).collect();
        prop_assert_eq!(&first, &pairs);
        prop_assert_eq!(first, second);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    /// A handset ordinal passes exactly when that many cards are rendered
    #[test]
    fn prop_handset_ordinal_bounds(handsets in 1usize..7, index in 0usize..8) {
        let verdict = run_once(handsets, Scenario::new(index, 0));
        if index < handsets {
            prop_assert_eq!(verdict, Verdict::Passed);
        } else {
            prop_assert_eq!(verdict, Verdict::Failed);
        }
    }
}
