use std::sync::LazyLock;
use std::time::Duration;

use secrecy::Secret;
use token_harness::api_client::ApiClient;
use token_harness::mock_controller::MockDependencyController;
use token_harness::runner::ScenarioRunner;
use token_harness::scenario::ScenarioConfig;
use token_harness::state_model::RepeatLoginPolicy;
use token_harness::telemetry::{get_subscriber, init_subscriber};

use crate::stub::{ApiStubConfig, UpstreamMockHandle, spawn_api, spawn_upstream_mock};

pub const API_KEY: &str = "test-api-key";

// Ensure that the `tracing` stack is only initialised once using `LazyLock`
static TRACING: LazyLock<()> = LazyLock::new(|| {
    let default_filter_level = "info".to_string();
    let subscriber_name = "test".to_string();
    if std::env::var("TEST_LOG").is_ok() {
        let subscriber = get_subscriber(subscriber_name, default_filter_level, std::io::stdout);
        init_subscriber(subscriber);
    } else {
        let subscriber = get_subscriber(subscriber_name, default_filter_level, std::io::sink);
        init_subscriber(subscriber);
    }
});

pub struct TestHarness {
    pub upstream_mock: UpstreamMockHandle,
    pub client: ApiClient,
    pub controller: MockDependencyController,
    pub runner: ScenarioRunner,
    pub scenario_config: ScenarioConfig,
}

impl TestHarness {
    /// Requests served by the upstream mock's matching endpoints so far.
    pub fn upstream_hits(&self) -> usize {
        self.upstream_mock.hits()
    }
}

pub async fn spawn_harness(repeat_login: RepeatLoginPolicy) -> TestHarness {
    spawn_harness_with(repeat_login, false).await
}

pub async fn spawn_harness_with(
    repeat_login: RepeatLoginPolicy,
    silent_logout_on_unknown: bool,
) -> TestHarness {
    LazyLock::force(&TRACING);

    let upstream_mock = spawn_upstream_mock().await;
    let api_address = spawn_api(ApiStubConfig {
        api_key: API_KEY.to_owned(),
        upstream_base_url: upstream_mock.address.clone(),
        repeat_login,
        silent_logout_on_unknown,
    })
    .await;

    let client = ApiClient::new(
        api_address.clone(),
        Secret::new(API_KEY.to_owned()),
        Duration::from_secs(2),
    );
    let controller =
        MockDependencyController::new(upstream_mock.address.clone(), Duration::from_secs(2));
    // Start from the known-default rules, exactly like a fresh mock
    // container seeded with success mappings.
    controller
        .reset()
        .await
        .expect("Failed to install default mock rules");

    let runner = ScenarioRunner::new(client.clone(), controller.clone());
    TestHarness {
        upstream_mock,
        client,
        controller,
        runner,
        scenario_config: ScenarioConfig::default(),
    }
}
