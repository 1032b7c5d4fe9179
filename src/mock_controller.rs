//! Driver for the upstream mock's administrative interface.
//!
//! The upstream authorization/action service is replaced by a
//! WireMock-compatible server. This controller translates semantic intents
//! ("return 500 for tokens with this prefix", "delay /auth responses") into
//! the stub-mapping documents the mock understands. It performs no business
//! logic of its own.

use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use serde_json::{Value, json};

/// The two upstream endpoints the API-under-test calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamPath {
    Auth,
    DoAction,
}

impl UpstreamPath {
    pub fn as_str(&self) -> &str {
        match self {
            UpstreamPath::Auth => "/auth",
            UpstreamPath::DoAction => "/doAction",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockResponse {
    pub http_status: u16,
    pub delay: Option<Duration>,
}

impl MockResponse {
    pub fn success() -> Self {
        Self {
            http_status: 200,
            delay: None,
        }
    }

    pub fn error(http_status: u16) -> Self {
        Self {
            http_status,
            delay: None,
        }
    }

    pub fn delayed(delay: Duration) -> Self {
        Self {
            http_status: 200,
            delay: Some(delay),
        }
    }
}

/// One matching rule for the upstream mock.
///
/// Rules live in an *ordered list*: the first rule that matches a request
/// wins. Priorities sent to the mock are derived from list position, never
/// assigned by hand, so two rules can never be silently ambiguous.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockRule {
    pub path: UpstreamPath,
    /// `None` matches every token on this path.
    pub token_prefix: Option<String>,
    pub response: MockResponse,
}

impl MockRule {
    pub fn success_for_all(path: UpstreamPath) -> Self {
        Self {
            path,
            token_prefix: None,
            response: MockResponse::success(),
        }
    }

    pub fn error_for_prefix(path: UpstreamPath, prefix: &str, http_status: u16) -> Self {
        Self {
            path,
            token_prefix: Some(prefix.to_owned()),
            response: MockResponse::error(http_status),
        }
    }

    pub fn delay_for_prefix(path: UpstreamPath, prefix: &str, delay: Duration) -> Self {
        Self {
            path,
            token_prefix: Some(prefix.to_owned()),
            response: MockResponse::delayed(delay),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum MockControlError {
    /// The mock's admin interface could not be reached. Fatal to the
    /// scenario: verification is meaningless without the rules active.
    #[error("mock admin interface unreachable")]
    Unreachable(#[source] reqwest::Error),
    #[error("mock admin interface rejected the request with status {status}")]
    AdminRejected { status: u16 },
    #[error("mock reports {actual} installed mappings, expected {expected}")]
    ConfirmationMismatch { expected: usize, actual: usize },
}

#[derive(Serialize)]
struct StubMapping {
    priority: u32,
    request: Value,
    response: Value,
}

/// Default rule set: unconditional success on both upstream endpoints.
pub fn default_rules() -> Vec<MockRule> {
    vec![
        MockRule::success_for_all(UpstreamPath::Auth),
        MockRule::success_for_all(UpstreamPath::DoAction),
    ]
}

#[derive(Clone, Debug)]
pub struct MockDependencyController {
    base_url: String,
    http_client: Client,
}

impl MockDependencyController {
    pub fn new(base_url: String, admin_timeout: Duration) -> Self {
        let http_client = Client::builder()
            .timeout(admin_timeout)
            .build()
            .expect("failed to build the reqwest client");
        Self {
            base_url,
            http_client,
        }
    }

    /// Installs `rules` (first-match-wins) followed by the unconditional
    /// success defaults, then confirms the full set is visible on the
    /// admin interface. Returns only once the mock is guaranteed to serve
    /// the new rules; callers rely on this as a happens-before barrier.
    #[tracing::instrument(name = "Configuring upstream mock rules", skip(self, rules))]
    pub async fn configure(&self, rules: &[MockRule]) -> Result<(), MockControlError> {
        self.clear_mappings().await?;
        let mut installed = 0usize;
        for (position, rule) in rules.iter().chain(default_rules().iter()).enumerate() {
            self.install(rule, position as u32 + 1).await?;
            installed += 1;
        }
        self.confirm_installed(installed).await
    }

    /// Restores the known-default rule set (unconditional success) so one
    /// scenario's rules never leak into the next.
    #[tracing::instrument(name = "Resetting upstream mock", skip(self))]
    pub async fn reset(&self) -> Result<(), MockControlError> {
        self.configure(&[]).await
    }

    async fn clear_mappings(&self) -> Result<(), MockControlError> {
        let url = format!("{}/__admin/reset", self.base_url);
        let response = self
            .http_client
            .post(&url)
            .send()
            .await
            .map_err(MockControlError::Unreachable)?;
        Self::check_admin_status(&response)
    }

    async fn install(&self, rule: &MockRule, priority: u32) -> Result<(), MockControlError> {
        let url = format!("{}/__admin/mappings", self.base_url);
        let response = self
            .http_client
            .post(&url)
            .json(&Self::to_mapping(rule, priority))
            .send()
            .await
            .map_err(MockControlError::Unreachable)?;
        Self::check_admin_status(&response)
    }

    async fn confirm_installed(&self, expected: usize) -> Result<(), MockControlError> {
        let url = format!("{}/__admin/mappings", self.base_url);
        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(MockControlError::Unreachable)?;
        Self::check_admin_status(&response)?;
        let body: Value = response.json().await.map_err(MockControlError::Unreachable)?;
        let actual = body
            .get("mappings")
            .and_then(Value::as_array)
            .map(Vec::len)
            .unwrap_or(0);
        if actual != expected {
            return Err(MockControlError::ConfirmationMismatch { expected, actual });
        }
        Ok(())
    }

    fn check_admin_status(response: &reqwest::Response) -> Result<(), MockControlError> {
        if response.status().is_success() {
            Ok(())
        } else {
            Err(MockControlError::AdminRejected {
                status: response.status().as_u16(),
            })
        }
    }

    fn to_mapping(rule: &MockRule, priority: u32) -> StubMapping {
        let mut request = json!({
            "method": "POST",
            "urlPath": rule.path.as_str(),
        });
        if let Some(prefix) = &rule.token_prefix {
            request["bodyPatterns"] = json!([{ "matches": format!("token={prefix}.*") }]);
        }
        let mut response = json!({ "status": rule.response.http_status });
        if let Some(delay) = rule.response.delay {
            response["fixedDelayMilliseconds"] = json!(delay.as_millis() as u64);
        }
        StubMapping {
            priority,
            request,
            response,
        }
    }
}
