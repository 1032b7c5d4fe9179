//! Concurrent load generation against the API-under-test.
//!
//! Each virtual actor owns one session and walks the state machine
//! independently, picking its next action from a weighted distribution over
//! the actions that are legal in its current state. Every response is still
//! checked against the transition table, so the load run doubles as a
//! contract check under concurrency.

use std::collections::BTreeMap;
use std::time::Duration;

use rand::SeedableRng;
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use serde::Serialize;
use tokio::time::Instant;

use crate::api_client::{ActionRequest, ApiClient, ApiClientError, ResultStatus};
use crate::domain::{ApiAction, Token};
use crate::state_model::{
    ExpectedStatus, RepeatLoginPolicy, Session, SessionState, UpstreamBehavior,
    expected_transition,
};

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ActionWeights {
    pub login: u32,
    pub action: u32,
    pub logout: u32,
}

impl ActionWeights {
    /// An authenticated actor draws from `action` and `logout`; at least
    /// one of the two must carry a nonzero weight or the distribution is
    /// empty. Checked when a plan is built from settings, before any actor
    /// spawns.
    pub fn validate(&self) -> Result<(), String> {
        if self.action == 0 && self.logout == 0 {
            Err("at least one of the ACTION and LOGOUT weights must be nonzero".to_owned())
        } else {
            Ok(())
        }
    }
}

impl Default for ActionWeights {
    fn default() -> Self {
        // ACTION three times as likely as LOGIN or LOGOUT.
        Self {
            login: 1,
            action: 3,
            logout: 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadPlan {
    pub actors: u32,
    pub spawn_rate_per_second: f64,
    pub duration: Duration,
    pub weights: ActionWeights,
    /// Bounded retry on transport failures only; timeouts are never
    /// retried (the sample is the data).
    pub transport_retries: u32,
    /// When set, actor RNGs are derived from this seed and the token
    /// streams become reproducible.
    pub seed: Option<u64>,
}

impl Default for LoadPlan {
    fn default() -> Self {
        Self {
            actors: 50,
            spawn_rate_per_second: 10.0,
            duration: Duration::from_secs(60),
            weights: ActionWeights::default(),
            transport_retries: 1,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SampleOutcome {
    Pass,
    ContractFailure,
    Timeout,
    Transport,
}

#[derive(Debug, Clone, Copy)]
pub struct Sample {
    pub action: ApiAction,
    pub latency: Duration,
    pub outcome: SampleOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct LatencyPercentiles {
    pub p50_ms: u64,
    pub p90_ms: u64,
    pub p95_ms: u64,
    pub p99_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActionStats {
    pub count: usize,
    pub failures: usize,
    pub timeouts: usize,
    pub latency: LatencyPercentiles,
}

impl ActionStats {
    pub fn failure_rate(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.failures as f64 / self.count as f64
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadReport {
    pub run_id: String,
    pub total: usize,
    pub failures: usize,
    pub per_action: BTreeMap<String, ActionStats>,
}

impl LoadReport {
    pub fn failure_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.failures as f64 / self.total as f64
        }
    }

    pub fn p95(&self, action: ApiAction) -> Option<Duration> {
        self.per_action
            .get(action.as_str())
            .map(|stats| Duration::from_millis(stats.latency.p95_ms))
    }
}

/// Picks the next action for an actor. Only state-legal actions enter the
/// distribution: LOGIN is the sole choice before authentication, and a
/// terminated actor never gets stuck because its caller starts a fresh
/// session first.
fn choose_action(state: SessionState, weights: &ActionWeights, rng: &mut StdRng) -> ApiAction {
    match state {
        SessionState::Unauthenticated => ApiAction::Login,
        SessionState::Authenticated => {
            let choices = [
                (ApiAction::Action, weights.action),
                (ApiAction::Logout, weights.logout),
            ];
            let dist = WeightedIndex::new(choices.iter().map(|(_, w)| *w))
                .expect("weights were validated when the plan was built");
            choices[dist.sample(rng)].0
        }
        SessionState::Terminated => {
            unreachable!("terminated actors start a fresh session before choosing")
        }
    }
}

async fn actor_loop(
    client: ApiClient,
    weights: ActionWeights,
    transport_retries: u32,
    stop_at: Instant,
    mut rng: StdRng,
) -> Vec<Sample> {
    let mut samples = Vec::new();
    let mut session = Session::new(Token::generate_with(&mut rng));
    while Instant::now() < stop_at {
        if session.state() == SessionState::Terminated {
            // One-shot logout: the old session is gone for good, so the
            // actor moves on with a new token.
            session = Session::new(Token::generate_with(&mut rng));
        }
        let action = choose_action(session.state(), &weights, &mut rng);
        let expected = expected_transition(
            session.state(),
            action,
            UpstreamBehavior::Success,
            RepeatLoginPolicy::Rejected,
        );
        let request = ActionRequest {
            token: session.token().clone().into(),
            action,
        };

        // Latency is per attempt: a retried call reports the final
        // attempt only, so retries never inflate the percentiles.
        let mut attempt = 0u32;
        let (result, latency) = loop {
            let started = Instant::now();
            match client.execute(&request).await {
                Err(ApiClientError::Transport(e)) if attempt < transport_retries => {
                    attempt += 1;
                    tracing::debug!(error = %e, attempt, "retrying after transport failure");
                }
                other => break (other, started.elapsed()),
            }
        };

        let outcome = match result {
            Ok(result) => {
                let matches_contract = matches!(
                    (expected.status, result.status),
                    (ExpectedStatus::Ok, ResultStatus::Ok)
                        | (ExpectedStatus::Error, ResultStatus::Error)
                );
                if matches_contract {
                    SampleOutcome::Pass
                } else {
                    SampleOutcome::ContractFailure
                }
            }
            Err(ApiClientError::Timeout { .. }) => SampleOutcome::Timeout,
            Err(ApiClientError::UnexpectedBody { .. }) => SampleOutcome::ContractFailure,
            Err(ApiClientError::Transport(_)) => SampleOutcome::Transport,
        };
        samples.push(Sample {
            action,
            latency,
            outcome,
        });
        match outcome {
            // A lost or late call proves nothing about the server's side
            // of the session. The token is abandoned rather than guessed
            // at, so the actor stays inside the transition table.
            SampleOutcome::Timeout | SampleOutcome::Transport => {
                session = Session::new(Token::generate_with(&mut rng));
            }
            // A completed response means the server acted; the model is
            // the source of truth for where the session ends up.
            _ => session.advance(expected.next_state),
        }
    }
    samples
}

/// Runs the full actor pool and aggregates per-action statistics.
///
/// Actors share nothing mutable: each owns its session and RNG, and samples
/// come back through the task join handles. Timeouts and upstream failures
/// are data, never a reason to stop the run.
#[tracing::instrument(name = "Running load", skip(client, plan), fields(run_id = tracing::field::Empty))]
pub async fn run_load(client: ApiClient, plan: LoadPlan) -> LoadReport {
    let run_id = uuid::Uuid::new_v4().to_string();
    tracing::Span::current().record("run_id", run_id.as_str());
    tracing::info!(
        actors = plan.actors,
        duration_secs = plan.duration.as_secs(),
        "starting load run"
    );

    let stop_at = Instant::now() + plan.duration;
    let spawn_gap = if plan.spawn_rate_per_second > 0.0 {
        Duration::from_secs_f64(1.0 / plan.spawn_rate_per_second)
    } else {
        Duration::ZERO
    };
    let mut handles = Vec::with_capacity(plan.actors as usize);
    for actor_index in 0..plan.actors {
        let rng = match plan.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(actor_index as u64)),
            None => StdRng::from_entropy(),
        };
        handles.push(tokio::spawn(actor_loop(
            client.clone(),
            plan.weights,
            plan.transport_retries,
            stop_at,
            rng,
        )));
        if actor_index + 1 < plan.actors {
            tokio::time::sleep(spawn_gap).await;
        }
    }

    let mut samples = Vec::new();
    for handle in handles {
        match handle.await {
            Ok(actor_samples) => samples.extend(actor_samples),
            Err(e) => tracing::error!(error = %e, "load actor panicked"),
        }
    }
    aggregate(run_id, &samples)
}

fn aggregate(run_id: String, samples: &[Sample]) -> LoadReport {
    let mut per_action = BTreeMap::new();
    for action in ApiAction::ALL {
        let subset: Vec<&Sample> = samples.iter().filter(|s| s.action == action).collect();
        if subset.is_empty() {
            continue;
        }
        let mut latencies: Vec<Duration> = subset.iter().map(|s| s.latency).collect();
        latencies.sort_unstable();
        let failures = subset
            .iter()
            .filter(|s| s.outcome != SampleOutcome::Pass)
            .count();
        let timeouts = subset
            .iter()
            .filter(|s| s.outcome == SampleOutcome::Timeout)
            .count();
        per_action.insert(
            action.as_str().to_owned(),
            ActionStats {
                count: subset.len(),
                failures,
                timeouts,
                latency: LatencyPercentiles {
                    p50_ms: percentile(&latencies, 50).as_millis() as u64,
                    p90_ms: percentile(&latencies, 90).as_millis() as u64,
                    p95_ms: percentile(&latencies, 95).as_millis() as u64,
                    p99_ms: percentile(&latencies, 99).as_millis() as u64,
                },
            },
        );
    }
    LoadReport {
        run_id,
        total: samples.len(),
        failures: samples
            .iter()
            .filter(|s| s.outcome != SampleOutcome::Pass)
            .count(),
        per_action,
    }
}

/// Nearest-rank percentile over a sorted slice.
fn percentile(sorted: &[Duration], p: u32) -> Duration {
    debug_assert!((1..=100).contains(&p));
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let rank = (sorted.len() * p as usize).div_ceil(100).max(1);
    sorted[rank - 1]
}
