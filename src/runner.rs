//! Sequential execution of functional scenarios.
//!
//! The runner owns the per-scenario lifecycle: install mock rules, walk the
//! steps through the client, verify each observed outcome, and always put
//! the mock back into its default state, even when a step fails, so no
//! scenario leaks rules into the next.

use crate::api_client::{ActionRequest, ApiClient, ApiClientError, ApiKey};
use crate::mock_controller::{MockControlError, MockDependencyController};
use crate::scenario::{ApiKeySpec, Scenario, ScenarioStep};
use crate::verifier::{ContractViolation, StepContext, StepOutcome, verify};

#[derive(thiserror::Error, Debug)]
pub enum ScenarioError {
    /// Rules could not be installed or confirmed; verification would be
    /// meaningless, so the scenario never starts.
    #[error("failed to configure the upstream mock")]
    MockSetup(#[from] MockControlError),
    /// The API-under-test was unreachable mid-scenario. Environment
    /// failure: reported, never retried.
    #[error("transport failure at step {step}")]
    Transport {
        step: usize,
        #[source]
        source: ApiClientError,
    },
    #[error(transparent)]
    Contract(#[from] ContractViolation),
}

#[derive(Debug, Default)]
pub struct SuiteReport {
    pub passed: Vec<String>,
    pub failed: Vec<(String, ScenarioError)>,
}

impl SuiteReport {
    pub fn all_passed(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct ScenarioRunner {
    client: ApiClient,
    mock: MockDependencyController,
}

impl ScenarioRunner {
    pub fn new(client: ApiClient, mock: MockDependencyController) -> Self {
        Self { client, mock }
    }

    /// Runs one scenario to completion. The mock is reset afterwards on
    /// every exit path; a failing reset is logged but does not mask the
    /// scenario's own outcome.
    #[tracing::instrument(name = "Running scenario", skip(self, scenario), fields(scenario = %scenario.name))]
    pub async fn run(&self, scenario: &Scenario) -> Result<(), ScenarioError> {
        let configured = self.mock.configure(&scenario.rules).await;
        let outcome = match configured {
            Ok(()) => self.run_steps(scenario).await,
            Err(e) => Err(ScenarioError::MockSetup(e)),
        };
        if let Err(e) = self.mock.reset().await {
            tracing::warn!(error = %e, scenario = %scenario.name, "failed to reset the upstream mock");
        }
        outcome
    }

    /// Runs every scenario in order, collecting pass/fail per scenario.
    /// A failing scenario never stops the suite.
    pub async fn run_all(&self, scenarios: &[Scenario]) -> SuiteReport {
        let mut report = SuiteReport::default();
        for scenario in scenarios {
            match self.run(scenario).await {
                Ok(()) => {
                    tracing::info!(scenario = %scenario.name, "scenario passed");
                    report.passed.push(scenario.name.clone());
                }
                Err(e) => {
                    tracing::error!(scenario = %scenario.name, error = %e, "scenario failed");
                    report.failed.push((scenario.name.clone(), e));
                }
            }
        }
        report
    }

    async fn run_steps(&self, scenario: &Scenario) -> Result<(), ScenarioError> {
        for (index, step) in scenario.steps.iter().enumerate() {
            let ctx = StepContext {
                scenario: scenario.name.clone(),
                step: index,
                token: step.token.as_str().to_owned(),
                action: step.action,
            };
            let outcome = self.execute_step(&scenario.name, step, index).await?;
            verify(&ctx, &outcome, &step.expected)?;
        }
        Ok(())
    }

    /// Classifies the client result per the error taxonomy: a timeout is a
    /// verifiable outcome, an unexpected body is a contract violation, and
    /// a transport failure aborts the scenario.
    async fn execute_step(
        &self,
        scenario_name: &str,
        step: &ScenarioStep,
        index: usize,
    ) -> Result<StepOutcome, ScenarioError> {
        let request = ActionRequest {
            token: step.token.clone(),
            action: step.action,
        };
        let api_key = match &step.api_key {
            ApiKeySpec::Configured => ApiKey::Configured,
            ApiKeySpec::Custom(key) => ApiKey::Custom(key),
            ApiKeySpec::Omitted => ApiKey::Omitted,
        };
        match self.client.execute_with(&request, api_key, step.deadline).await {
            Ok(result) => Ok(StepOutcome::Completed(result)),
            Err(ApiClientError::Timeout { deadline, elapsed }) => {
                Ok(StepOutcome::TimedOut { deadline, elapsed })
            }
            Err(e @ ApiClientError::UnexpectedBody { .. }) => {
                let ctx = StepContext {
                    scenario: scenario_name.to_owned(),
                    step: index,
                    token: step.token.as_str().to_owned(),
                    action: step.action,
                };
                Err(ContractViolation::new(&ctx, e.to_string()).into())
            }
            Err(e @ ApiClientError::Transport(_)) => Err(ScenarioError::Transport {
                step: index,
                source: e,
            }),
        }
    }
}
