use std::time::Duration;

use token_harness::domain::ApiAction;
use token_harness::load::{ActionWeights, LoadPlan, run_load};
use token_harness::state_model::RepeatLoginPolicy;

use crate::helpers::spawn_harness;

#[tokio::test]
async fn a_load_run_under_success_rules_has_no_failures() {
    // Arrange: scaled-down version of the 50-actor/60-second plan.
    let harness = spawn_harness(RepeatLoginPolicy::Rejected).await;
    let plan = LoadPlan {
        actors: 8,
        spawn_rate_per_second: 100.0,
        duration: Duration::from_secs(2),
        weights: ActionWeights::default(),
        transport_retries: 1,
        seed: Some(7),
    };

    // Act
    let report = run_load(harness.client.clone(), plan).await;

    // Assert
    assert!(report.total > 0, "no samples were collected");
    assert_eq!(
        report.failures, 0,
        "contract failures under all-success rules: {report:?}"
    );
    // Every actor starts with LOGIN, so LOGIN samples must exist; with a
    // 2 second run ACTION samples are effectively guaranteed too.
    assert!(report.per_action.contains_key("LOGIN"));
    assert!(report.per_action.contains_key("ACTION"));
    // Loopback stub latency sits far below any realistic production bound.
    let p95 = report.p95(ApiAction::Action).unwrap();
    assert!(p95 < Duration::from_millis(500), "p95 was {p95:?}");
}

#[tokio::test]
async fn action_samples_outnumber_logout_samples_roughly_three_to_one() {
    // Arrange
    let harness = spawn_harness(RepeatLoginPolicy::Rejected).await;
    let plan = LoadPlan {
        actors: 6,
        spawn_rate_per_second: 100.0,
        duration: Duration::from_secs(3),
        weights: ActionWeights::default(),
        transport_retries: 0,
        seed: Some(11),
    };

    // Act
    let report = run_load(harness.client.clone(), plan).await;

    // Assert: wide bounds; this checks the weighting is wired through,
    // not the exact distribution.
    let actions = report.per_action["ACTION"].count as f64;
    let logouts = report.per_action["LOGOUT"].count as f64;
    assert!(logouts > 0.0);
    let ratio = actions / logouts;
    assert!((1.5..=6.0).contains(&ratio), "ratio was {ratio}");
}

#[tokio::test]
async fn upstream_failures_are_sampled_not_fatal() {
    // Arrange: every /doAction call fails, so each ACTION sample records a
    // contract failure while the run itself completes.
    let harness = spawn_harness(RepeatLoginPolicy::Rejected).await;
    harness
        .controller
        .configure(&[token_harness::mock_controller::MockRule {
            path: token_harness::mock_controller::UpstreamPath::DoAction,
            token_prefix: None,
            response: token_harness::mock_controller::MockResponse::error(500),
        }])
        .await
        .expect("Failed to configure the mock");
    let plan = LoadPlan {
        actors: 4,
        spawn_rate_per_second: 100.0,
        duration: Duration::from_secs(2),
        weights: ActionWeights::default(),
        transport_retries: 0,
        seed: Some(3),
    };

    // Act
    let report = run_load(harness.client.clone(), plan).await;

    // Assert
    let action_stats = &report.per_action["ACTION"];
    assert!(action_stats.count > 0);
    assert_eq!(action_stats.failures, action_stats.count);
    // LOGIN and LOGOUT are untouched by the /doAction rule.
    assert_eq!(report.per_action["LOGIN"].failures, 0);

    harness.controller.reset().await.unwrap();
}
