//! End-to-end cycle behavior with scripted capability providers.

use crucible::capability::{analysis, generation, packaging, testing, CapabilitySet};
use crucible::capability::{Analyzer, Backend, ContainerPackager, TestHarness};
use crucible::config::Settings;
use crucible::cycle::{CycleOutcome, DevelopmentCycle};
use crucible::testkit::{
    artifact_reply, sample_spec, CancellingBackend, ScriptedBackend, StallingHarness,
    StaticAnalyzer, StaticHarness,
};
use crucible::Error;
use std::sync::Arc;
use std::time::Duration;

fn settings(target: u32, max_iterations: u32) -> Settings {
    let mut settings = Settings::default();
    settings.cycle.target_score = target;
    settings.cycle.max_iterations = max_iterations;
    settings
}

fn capabilities(
    backend: Arc<dyn Backend>,
    harness: Arc<dyn TestHarness>,
    analyzer: Arc<dyn Analyzer>,
    settings: &Settings,
    with_packaging: bool,
) -> CapabilitySet {
    CapabilitySet::new(
        generation::host(backend, &settings.generation).unwrap(),
        testing::host(harness).unwrap(),
        analysis::host(analyzer).unwrap(),
        with_packaging.then(|| packaging::host(Arc::new(ContainerPackager)).unwrap()),
    )
}

/// All checks pass and the analyzer reports 80/65, so the first iteration
/// scores 40 + 32 + 13 = 85 against a target of 80.
#[tokio::test]
async fn target_reached_on_first_iteration_stops_the_cycle() {
    let settings = settings(80, 3);
    let backend = Arc::new(ScriptedBackend::new([artifact_reply("svc")]));
    let set = capabilities(
        Arc::clone(&backend) as Arc<dyn Backend>,
        Arc::new(StaticHarness::passing()),
        Arc::new(StaticAnalyzer {
            quality: 80.0,
            performance: 65.0,
        }),
        &settings,
        false,
    );

    let cycle = DevelopmentCycle::new(set, settings);
    let result = cycle.run(&sample_spec("payments")).await.unwrap();

    assert!(result.success);
    assert_eq!(result.outcome, CycleOutcome::Succeeded);
    assert_eq!(result.iterations.len(), 1);
    assert_eq!(result.final_score.total, 85);
    assert_eq!(result.final_artifact.unwrap().service_name, "svc");
    assert_eq!(backend.call_count(), 1);
}

/// Failing checks and a 50/50 analyzer pin every iteration at 50: partial
/// test credit 20, static 20, performance 10. The budget is spent in full
/// and the tie between equal scores goes to the latest artifact.
#[tokio::test]
async fn exhausted_budget_returns_latest_of_tied_artifacts() {
    let settings = settings(80, 3);
    let backend = Arc::new(ScriptedBackend::new([
        artifact_reply("svc-1"),
        artifact_reply("svc-2"),
        artifact_reply("svc-3"),
    ]));
    let set = capabilities(
        Arc::clone(&backend) as Arc<dyn Backend>,
        Arc::new(StaticHarness::failing_checks()),
        Arc::new(StaticAnalyzer {
            quality: 50.0,
            performance: 50.0,
        }),
        &settings,
        false,
    );

    let cycle = DevelopmentCycle::new(set, settings);
    let result = cycle.run(&sample_spec("payments")).await.unwrap();

    assert!(!result.success);
    assert_eq!(result.outcome, CycleOutcome::Exhausted);
    assert_eq!(result.iterations.len(), 3);
    for record in &result.iterations {
        assert_eq!(record.quality_score.total, 50);
        assert!(record.error.is_none());
    }
    assert_eq!(result.final_artifact.unwrap().service_name, "svc-3");
    assert_eq!(backend.call_count(), 3);
}

#[tokio::test]
async fn iteration_budget_is_never_exceeded() {
    let settings = settings(99, 4);
    let backend = Arc::new(ScriptedBackend::new([artifact_reply("svc")]));
    let set = capabilities(
        Arc::clone(&backend) as Arc<dyn Backend>,
        Arc::new(StaticHarness::failing_checks()),
        Arc::new(StaticAnalyzer {
            quality: 10.0,
            performance: 10.0,
        }),
        &settings,
        false,
    );

    let cycle = DevelopmentCycle::new(set, settings);
    let result = cycle.run(&sample_spec("payments")).await.unwrap();

    assert_eq!(result.iterations.len(), 4);
    assert_eq!(result.outcome, CycleOutcome::Exhausted);
}

/// A test-stage timeout in the middle of the budget is recorded on that
/// iteration, scored partially from the surviving stages, and does not
/// stop the remaining iterations.
#[tokio::test]
async fn test_stage_timeout_is_recorded_and_cycle_continues() {
    let mut settings = settings(80, 3);
    settings
        .timeouts
        .per_backend
        .insert("testing".to_string(), 1);

    let backend = Arc::new(ScriptedBackend::new([
        artifact_reply("svc-1"),
        artifact_reply("svc-2"),
        artifact_reply("svc-3"),
    ]));
    // The second syntax check is the first test call of iteration 2.
    let harness = StallingHarness::new(
        StaticHarness::failing_checks(),
        2,
        Duration::from_secs(10),
    );
    let set = capabilities(
        Arc::clone(&backend) as Arc<dyn Backend>,
        Arc::new(harness),
        Arc::new(StaticAnalyzer {
            quality: 50.0,
            performance: 50.0,
        }),
        &settings,
        false,
    );

    let cycle = DevelopmentCycle::new(set, settings);
    let result = cycle.run(&sample_spec("payments")).await.unwrap();

    assert_eq!(result.iterations.len(), 3);
    let timed_out = &result.iterations[1];
    assert!(timed_out.error.as_deref().unwrap().contains("timed out"));
    assert_eq!(timed_out.quality_score.test_component, 0);
    // Analysis still ran, so the score is partial rather than zero.
    assert_eq!(timed_out.quality_score.total, 30);
    assert!(result.iterations[2].error.is_none());
    assert_eq!(result.iterations[2].quality_score.total, 50);
    assert!(!result.success);
}

/// Cancellation is observed between iterations: the iteration in flight
/// finishes, then the loop stops and the best artifact so far is returned.
#[tokio::test]
async fn cancellation_stops_at_the_decide_boundary() {
    let settings = settings(99, 5);
    let inner = ScriptedBackend::new([
        artifact_reply("svc-1"),
        artifact_reply("svc-2"),
        artifact_reply("svc-3"),
    ]);
    let token = crucible::cycle::CancelToken::new();
    // The token flips during iteration 2's generation call, so the loop
    // must still finish that iteration before stopping.
    let backend = Arc::new(CancellingBackend::new(inner, 2, token.clone()));
    let set = capabilities(
        Arc::clone(&backend) as Arc<dyn Backend>,
        Arc::new(StaticHarness::failing_checks()),
        Arc::new(StaticAnalyzer {
            quality: 50.0,
            performance: 50.0,
        }),
        &settings,
        false,
    );

    let cycle = DevelopmentCycle::with_cancel_token(set, settings, token);
    let result = cycle.run(&sample_spec("payments")).await.unwrap();

    assert_eq!(result.outcome, CycleOutcome::Cancelled);
    assert_eq!(result.iterations.len(), 2);
    assert!(!result.success);
    assert_eq!(result.final_artifact.unwrap().service_name, "svc-2");
}

#[tokio::test]
async fn pre_cancelled_cycle_runs_no_iterations() {
    let settings = settings(80, 3);
    let backend = Arc::new(ScriptedBackend::new([artifact_reply("svc")]));
    let set = capabilities(
        Arc::clone(&backend) as Arc<dyn Backend>,
        Arc::new(StaticHarness::passing()),
        Arc::new(StaticAnalyzer {
            quality: 80.0,
            performance: 65.0,
        }),
        &settings,
        false,
    );

    let cycle = DevelopmentCycle::new(set, settings);
    cycle.cancel_token().cancel();
    let result = cycle.run(&sample_spec("payments")).await.unwrap();

    assert_eq!(result.outcome, CycleOutcome::Cancelled);
    assert!(result.iterations.is_empty());
    assert!(result.final_artifact.is_none());
    assert_eq!(backend.call_count(), 0);
}

/// A reply that can never be normalized falls back to the deterministic
/// template artifact, without recording an iteration error.
#[tokio::test]
async fn unparseable_reply_falls_back_to_template_artifact() {
    let settings = settings(99, 2);
    let backend = Arc::new(ScriptedBackend::new([
        "Sure! Here is the implementation you asked for.".to_string(),
    ]));
    let set = capabilities(
        Arc::clone(&backend) as Arc<dyn Backend>,
        Arc::new(StaticHarness::failing_checks()),
        Arc::new(StaticAnalyzer {
            quality: 50.0,
            performance: 50.0,
        }),
        &settings,
        false,
    );

    let cycle = DevelopmentCycle::new(set, settings);
    let result = cycle.run(&sample_spec("payments")).await.unwrap();

    assert_eq!(result.iterations.len(), 2);
    let first = &result.iterations[0];
    assert!(first.error.is_none());
    assert_eq!(
        first.artifact.metadata.get("fallback"),
        Some(&serde_json::Value::Bool(true))
    );
    assert_eq!(first.artifact.service_name, "payments");
}

#[tokio::test]
async fn malformed_specification_aborts_before_any_iteration() {
    let settings = settings(80, 3);
    let backend = Arc::new(ScriptedBackend::new([artifact_reply("svc")]));
    let set = capabilities(
        Arc::clone(&backend) as Arc<dyn Backend>,
        Arc::new(StaticHarness::passing()),
        Arc::new(StaticAnalyzer {
            quality: 80.0,
            performance: 65.0,
        }),
        &settings,
        false,
    );

    let cycle = DevelopmentCycle::new(set, settings);
    let mut spec = sample_spec("payments");
    spec.scenarios.clear();

    let err = cycle.run(&spec).await.unwrap_err();
    assert!(matches!(err, Error::Specification(_)));
    assert_eq!(backend.call_count(), 0);
}

#[tokio::test]
async fn packaging_renders_only_after_success() {
    let mut ok_settings = settings(80, 3);
    ok_settings.cycle.package_artifacts = true;
    let set = capabilities(
        Arc::new(ScriptedBackend::new([artifact_reply("svc")])),
        Arc::new(StaticHarness::passing()),
        Arc::new(StaticAnalyzer {
            quality: 80.0,
            performance: 65.0,
        }),
        &ok_settings,
        true,
    );
    let result = DevelopmentCycle::new(set, ok_settings)
        .run(&sample_spec("payments"))
        .await
        .unwrap();
    let packaging = result.packaging.expect("successful cycle packages");
    assert!(packaging.dockerfile.contains("FROM"));
    assert!(packaging.compose.contains("svc:"));

    let mut failing_settings = settings(99, 2);
    failing_settings.cycle.package_artifacts = true;
    let set = capabilities(
        Arc::new(ScriptedBackend::new([artifact_reply("svc")])),
        Arc::new(StaticHarness::failing_checks()),
        Arc::new(StaticAnalyzer {
            quality: 50.0,
            performance: 50.0,
        }),
        &failing_settings,
        true,
    );
    let result = DevelopmentCycle::new(set, failing_settings)
        .run(&sample_spec("payments"))
        .await
        .unwrap();
    assert!(result.packaging.is_none());
}

/// Refinement may regress; the final artifact is the best one, not the
/// last one.
#[tokio::test]
async fn regressing_refinement_keeps_the_best_artifact() {
    let settings = settings(99, 2);
    // Second reply carries an unimplemented body, so the analyzer's
    // completeness penalty tanks the static component.
    let regressed = serde_json::json!({
        "mainModule": "def pay(order):\n    raise NotImplementedError\n",
        "testModule": "def test_pay():\n    assert True\n",
        "dependencies": ["pytest"],
        "serviceName": "svc-regressed",
    })
    .to_string();
    let backend = Arc::new(ScriptedBackend::new([artifact_reply("svc-good"), regressed]));
    let set = capabilities(
        Arc::clone(&backend) as Arc<dyn Backend>,
        Arc::new(StaticHarness::passing()),
        Arc::new(analysis::HeuristicAnalyzer::default()),
        &settings,
        false,
    );

    let cycle = DevelopmentCycle::new(set, settings);
    let result = cycle.run(&sample_spec("payments")).await.unwrap();

    assert_eq!(result.iterations.len(), 2);
    assert!(
        result.iterations[1].quality_score.total < result.iterations[0].quality_score.total,
        "second iteration should regress"
    );
    assert_eq!(result.final_artifact.unwrap().service_name, "svc-good");
}
