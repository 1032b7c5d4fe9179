//! Deterministic scenario catalogue for the functional/contract suite.
//!
//! Every scenario carries its own per-step expectations, derived from the
//! state model's transition table at generation time. That keeps the
//! verifier generic: no scenario-specific assertions are duplicated
//! anywhere else.

use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::domain::{ApiAction, TOKEN_LENGTH, Token, TokenSubmission};
use crate::mock_controller::{MockRule, UpstreamPath};
use crate::state_model::{
    ExpectedStatus, RepeatLoginPolicy, Session, UpstreamBehavior, expected_transition,
};

/// Token prefix that upstream-error rules match on.
pub const ERROR_PREFIX: &str = "INVALID";
/// Token prefix that upstream-delay rules match on.
pub const DELAY_PREFIX: &str = "SLOW";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiKeySpec {
    Configured,
    Custom(String),
    Omitted,
}

/// What the verifier holds a step's observed outcome against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepExpectation {
    pub status: ExpectedStatus,
    pub http_status: Option<u16>,
    pub min_latency: Option<Duration>,
    pub max_latency: Option<Duration>,
}

impl StepExpectation {
    pub fn status_only(status: ExpectedStatus) -> Self {
        Self {
            status,
            http_status: None,
            min_latency: None,
            max_latency: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScenarioStep {
    pub token: TokenSubmission,
    pub action: ApiAction,
    pub api_key: ApiKeySpec,
    /// Overrides the client's configured deadline; set by delay scenarios
    /// so the latency window and the deadline agree by construction.
    pub deadline: Option<Duration>,
    pub expected: StepExpectation,
}

#[derive(Debug, Clone)]
pub struct Scenario {
    pub name: String,
    /// Installed before the first step, first-match-wins, immutable while
    /// the scenario runs.
    pub rules: Vec<MockRule>,
    pub steps: Vec<ScenarioStep>,
}

#[derive(Debug, Clone)]
pub struct ScenarioConfig {
    /// Seed for token generation. Equal seeds produce identical catalogues.
    pub seed: u64,
    /// The per-call deadline delay scenarios are written against.
    pub client_deadline: Duration,
    /// Slack applied to latency windows to absorb scheduling jitter.
    pub latency_tolerance: Duration,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            client_deadline: Duration::from_secs(1),
            latency_tolerance: Duration::from_millis(300),
        }
    }
}

impl ScenarioConfig {
    /// Upstream delay for the slow-but-successful scenario: long enough to
    /// observe, comfortably below the deadline.
    fn slow_delay(&self) -> Duration {
        self.client_deadline / 2
    }

    /// Upstream delay for the timeout scenarios: well past the deadline,
    /// so the client's own timer must fire first.
    fn timeout_delay(&self) -> Duration {
        self.client_deadline * 3
    }
}

/// Walks a single session through the state machine, deriving each step's
/// expectation from the transition table.
struct SessionScript {
    session: Session,
    policy: RepeatLoginPolicy,
    steps: Vec<ScenarioStep>,
}

impl SessionScript {
    fn new(token: Token, policy: RepeatLoginPolicy) -> Self {
        Self {
            session: Session::new(token),
            policy,
            steps: Vec::new(),
        }
    }

    fn step(mut self, action: ApiAction, upstream: UpstreamBehavior) -> Self {
        let outcome = expected_transition(self.session.state(), action, upstream, self.policy);
        self.steps.push(ScenarioStep {
            token: self.session.token().clone().into(),
            action,
            api_key: ApiKeySpec::Configured,
            deadline: None,
            expected: StepExpectation::status_only(outcome.status),
        });
        self.session.advance(outcome.next_state);
        self
    }

    fn into_scenario(self, name: &str, rules: Vec<MockRule>) -> Scenario {
        Scenario {
            name: name.to_owned(),
            rules,
            steps: self.steps,
        }
    }
}

/// The full functional catalogue. Covers every (state, action) pair of the
/// transition table from a fresh session, plus the boundary scenarios.
/// The repeat-login ambiguity is generated for the given policy only; use
/// [`repeat_login_scenarios`] to obtain both labelled variants.
pub fn functional_catalogue(config: &ScenarioConfig, policy: RepeatLoginPolicy) -> Vec<Scenario> {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let catalogue = vec![
        happy_path(),
        action_before_login(&mut rng),
        logout_before_login(&mut rng),
        action_on_unknown_token(&mut rng),
        logout_unknown_token(&mut rng),
        double_logout(&mut rng),
        action_after_logout(&mut rng),
        relogin_after_logout(&mut rng),
        repeat_login(&mut rng, policy),
        malformed_tokens(),
        missing_api_key(&mut rng),
        wrong_api_key(&mut rng),
        login_upstream_500(&mut rng),
        action_upstream_500(&mut rng),
        login_upstream_slow_but_ok(&mut rng, config),
        login_upstream_timeout(&mut rng, config),
        action_upstream_timeout(&mut rng, config),
    ];
    for scenario in &catalogue {
        debug_assert!(!scenario.steps.is_empty(), "{} has no steps", scenario.name);
    }
    catalogue
}

/// Both answers to the open question "is a second LOGIN idempotent?", as
/// separate, explicitly named scenarios.
pub fn repeat_login_scenarios(config: &ScenarioConfig) -> Vec<Scenario> {
    let mut rng = StdRng::seed_from_u64(config.seed);
    vec![
        repeat_login(&mut rng, RepeatLoginPolicy::Idempotent),
        repeat_login(&mut rng, RepeatLoginPolicy::Rejected),
    ]
}

fn happy_path() -> Scenario {
    // The canonical smoke token: LOGIN -> ACTION -> LOGOUT must be OK, OK, OK.
    let token = Token::parse("A".repeat(TOKEN_LENGTH)).expect("the all-A token is valid");
    SessionScript::new(token, RepeatLoginPolicy::Rejected)
        .step(ApiAction::Login, UpstreamBehavior::Success)
        .step(ApiAction::Action, UpstreamBehavior::Success)
        .step(ApiAction::Logout, UpstreamBehavior::Success)
        .into_scenario("happy-path-lifecycle", Vec::new())
}

fn action_before_login(rng: &mut StdRng) -> Scenario {
    SessionScript::new(Token::generate_with(rng), RepeatLoginPolicy::Rejected)
        .step(ApiAction::Action, UpstreamBehavior::Success)
        .into_scenario("action-before-login", Vec::new())
}

fn logout_before_login(rng: &mut StdRng) -> Scenario {
    SessionScript::new(Token::generate_with(rng), RepeatLoginPolicy::Rejected)
        .step(ApiAction::Logout, UpstreamBehavior::Success)
        .into_scenario("logout-before-login", Vec::new())
}

fn action_on_unknown_token(rng: &mut StdRng) -> Scenario {
    // A token the system has never seen: no session can exist for it.
    SessionScript::new(Token::generate_with(rng), RepeatLoginPolicy::Rejected)
        .step(ApiAction::Action, UpstreamBehavior::Success)
        .into_scenario("action-on-unknown-token", Vec::new())
}

fn logout_unknown_token(rng: &mut StdRng) -> Scenario {
    // Open question: some implementations answer LOGOUT-of-unknown with a
    // silent OK. The model expects ERROR; a silent-OK server fails this
    // scenario loudly instead of being quietly accepted.
    SessionScript::new(Token::generate_with(rng), RepeatLoginPolicy::Rejected)
        .step(ApiAction::Logout, UpstreamBehavior::Success)
        .into_scenario("logout-unknown-token", Vec::new())
}

fn double_logout(rng: &mut StdRng) -> Scenario {
    SessionScript::new(Token::generate_with(rng), RepeatLoginPolicy::Rejected)
        .step(ApiAction::Login, UpstreamBehavior::Success)
        .step(ApiAction::Logout, UpstreamBehavior::Success)
        .step(ApiAction::Logout, UpstreamBehavior::Success)
        .into_scenario("double-logout", Vec::new())
}

fn action_after_logout(rng: &mut StdRng) -> Scenario {
    SessionScript::new(Token::generate_with(rng), RepeatLoginPolicy::Rejected)
        .step(ApiAction::Login, UpstreamBehavior::Success)
        .step(ApiAction::Logout, UpstreamBehavior::Success)
        .step(ApiAction::Action, UpstreamBehavior::Success)
        .into_scenario("action-after-logout", Vec::new())
}

fn relogin_after_logout(rng: &mut StdRng) -> Scenario {
    // A LOGIN on a terminated token opens a new logical session.
    SessionScript::new(Token::generate_with(rng), RepeatLoginPolicy::Rejected)
        .step(ApiAction::Login, UpstreamBehavior::Success)
        .step(ApiAction::Logout, UpstreamBehavior::Success)
        .step(ApiAction::Login, UpstreamBehavior::Success)
        .step(ApiAction::Action, UpstreamBehavior::Success)
        .into_scenario("relogin-after-logout", Vec::new())
}

fn repeat_login(rng: &mut StdRng, policy: RepeatLoginPolicy) -> Scenario {
    let name = match policy {
        RepeatLoginPolicy::Idempotent => "repeat-login-idempotent",
        RepeatLoginPolicy::Rejected => "repeat-login-rejected",
    };
    SessionScript::new(Token::generate_with(rng), policy)
        .step(ApiAction::Login, UpstreamBehavior::Success)
        .step(ApiAction::Login, UpstreamBehavior::Success)
        // Whichever way the ambiguity is resolved, the session must still
        // be usable afterwards.
        .step(ApiAction::Action, UpstreamBehavior::Success)
        .into_scenario(name, Vec::new())
}

/// Malformed tokens must be rejected for every action, without any
/// upstream call being made.
fn malformed_tokens() -> Scenario {
    let malformed = [
        "A".repeat(TOKEN_LENGTH - 1),           // too short
        "A".repeat(TOKEN_LENGTH + 1),           // too long
        "a".repeat(TOKEN_LENGTH),               // lowercase
        format!("{}!", "A".repeat(TOKEN_LENGTH - 1)), // forbidden symbol
        String::new(),                          // empty
    ];
    let mut steps = Vec::new();
    for raw in malformed {
        debug_assert!(Token::parse(raw.clone()).is_err());
        for action in ApiAction::ALL {
            steps.push(ScenarioStep {
                token: TokenSubmission::Malformed(raw.clone()),
                action,
                api_key: ApiKeySpec::Configured,
                deadline: None,
                expected: StepExpectation::status_only(ExpectedStatus::Error),
            });
        }
    }
    Scenario {
        name: "malformed-tokens".to_owned(),
        rules: Vec::new(),
        steps,
    }
}

fn missing_api_key(rng: &mut StdRng) -> Scenario {
    let token = Token::generate_with(rng);
    let steps = ApiAction::ALL
        .into_iter()
        .map(|action| ScenarioStep {
            token: token.clone().into(),
            action,
            api_key: ApiKeySpec::Omitted,
            deadline: None,
            expected: StepExpectation::status_only(ExpectedStatus::Error),
        })
        .collect();
    Scenario {
        name: "missing-api-key".to_owned(),
        rules: Vec::new(),
        steps,
    }
}

fn wrong_api_key(rng: &mut StdRng) -> Scenario {
    let token = Token::generate_with(rng);
    let steps = ApiAction::ALL
        .into_iter()
        .map(|action| ScenarioStep {
            token: token.clone().into(),
            action,
            api_key: ApiKeySpec::Custom("not-the-configured-key".to_owned()),
            deadline: None,
            expected: StepExpectation::status_only(ExpectedStatus::Error),
        })
        .collect();
    Scenario {
        name: "wrong-api-key".to_owned(),
        rules: Vec::new(),
        steps,
    }
}

fn login_upstream_500(rng: &mut StdRng) -> Scenario {
    let token = Token::generate_with_prefix(rng, ERROR_PREFIX);
    SessionScript::new(token, RepeatLoginPolicy::Rejected)
        .step(ApiAction::Login, UpstreamBehavior::Failure)
        // The failed LOGIN must not have created a session.
        .step(ApiAction::Action, UpstreamBehavior::Success)
        .into_scenario(
            "login-upstream-500",
            vec![MockRule::error_for_prefix(UpstreamPath::Auth, ERROR_PREFIX, 500)],
        )
}

fn action_upstream_500(rng: &mut StdRng) -> Scenario {
    let token = Token::generate_with_prefix(rng, ERROR_PREFIX);
    SessionScript::new(token, RepeatLoginPolicy::Rejected)
        .step(ApiAction::Login, UpstreamBehavior::Success)
        .step(ApiAction::Action, UpstreamBehavior::Failure)
        // The failed ACTION leaves the session authenticated.
        .step(ApiAction::Logout, UpstreamBehavior::Success)
        .into_scenario(
            "action-upstream-500",
            vec![MockRule::error_for_prefix(UpstreamPath::DoAction, ERROR_PREFIX, 500)],
        )
}

fn login_upstream_slow_but_ok(rng: &mut StdRng, config: &ScenarioConfig) -> Scenario {
    let token = Token::generate_with_prefix(rng, DELAY_PREFIX);
    let delay = config.slow_delay();
    let step = ScenarioStep {
        token: token.into(),
        action: ApiAction::Login,
        api_key: ApiKeySpec::Configured,
        deadline: Some(config.client_deadline),
        expected: StepExpectation {
            status: ExpectedStatus::Ok,
            http_status: Some(200),
            // Latency proves the delay rule was actually applied.
            min_latency: Some(delay),
            max_latency: Some(config.client_deadline + config.latency_tolerance),
        },
    };
    Scenario {
        name: "login-upstream-slow-but-ok".to_owned(),
        rules: vec![MockRule::delay_for_prefix(UpstreamPath::Auth, DELAY_PREFIX, delay)],
        steps: vec![step],
    }
}

fn login_upstream_timeout(rng: &mut StdRng, config: &ScenarioConfig) -> Scenario {
    let token = Token::generate_with_prefix(rng, DELAY_PREFIX);
    let step = ScenarioStep {
        token: token.into(),
        action: ApiAction::Login,
        api_key: ApiKeySpec::Configured,
        deadline: Some(config.client_deadline),
        expected: StepExpectation {
            status: ExpectedStatus::Timeout,
            http_status: None,
            // The client's own deadline must fire, not the mock's delay:
            // elapsed time sits right at the deadline, well short of the
            // configured delay.
            min_latency: Some(config.client_deadline.saturating_sub(config.latency_tolerance)),
            max_latency: Some(config.client_deadline + config.latency_tolerance),
        },
    };
    Scenario {
        name: "login-upstream-timeout".to_owned(),
        rules: vec![MockRule::delay_for_prefix(
            UpstreamPath::Auth,
            DELAY_PREFIX,
            config.timeout_delay(),
        )],
        steps: vec![step],
    }
}

fn action_upstream_timeout(rng: &mut StdRng, config: &ScenarioConfig) -> Scenario {
    let token = Token::generate_with_prefix(rng, DELAY_PREFIX);
    let login = ScenarioStep {
        token: token.clone().into(),
        action: ApiAction::Login,
        api_key: ApiKeySpec::Configured,
        deadline: None,
        expected: StepExpectation::status_only(ExpectedStatus::Ok),
    };
    let action = ScenarioStep {
        token: token.clone().into(),
        action: ApiAction::Action,
        api_key: ApiKeySpec::Configured,
        deadline: Some(config.client_deadline),
        expected: StepExpectation {
            status: ExpectedStatus::Timeout,
            http_status: None,
            min_latency: Some(config.client_deadline.saturating_sub(config.latency_tolerance)),
            max_latency: Some(config.client_deadline + config.latency_tolerance),
        },
    };
    // The abandoned ACTION does not tear the session down.
    let logout = ScenarioStep {
        token: token.into(),
        action: ApiAction::Logout,
        api_key: ApiKeySpec::Configured,
        deadline: None,
        expected: StepExpectation::status_only(ExpectedStatus::Ok),
    };
    Scenario {
        name: "action-upstream-timeout".to_owned(),
        rules: vec![MockRule::delay_for_prefix(
            UpstreamPath::DoAction,
            DELAY_PREFIX,
            config.timeout_delay(),
        )],
        steps: vec![login, action, logout],
    }
}
