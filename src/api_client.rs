use std::time::{Duration, Instant};

use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde_json::Value;

use crate::domain::{ApiAction, TokenSubmission};

/// One request to the API-under-test, exactly as it goes on the wire.
#[derive(Debug, Clone)]
pub struct ActionRequest {
    pub token: TokenSubmission,
    pub action: ApiAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultStatus {
    Ok,
    Error,
}

/// A well-formed response from the API-under-test.
///
/// The raw body is kept so the verifier can check response shape, not just
/// the extracted status.
#[derive(Debug, Clone)]
pub struct ActionResult {
    pub status: ResultStatus,
    pub message: Option<String>,
    pub http_status: u16,
    pub latency: Duration,
    pub body: Value,
}

/// Which key goes in the `X-Api-Key` header. A missing or wrong key is a
/// deliberately tested case, so the client must be able to produce both.
#[derive(Debug, Clone, Copy)]
pub enum ApiKey<'a> {
    Configured,
    Custom(&'a str),
    Omitted,
}

#[derive(thiserror::Error, Debug)]
pub enum ApiClientError {
    /// No response within the deadline. The call is abandoned; nothing
    /// keeps retrying in the background.
    #[error("no response within {deadline:?} (elapsed {elapsed:?})")]
    Timeout { deadline: Duration, elapsed: Duration },
    /// The API-under-test itself could not be reached. Environment
    /// failure, not a behavior under test.
    #[error("transport failure talking to the API under test")]
    Transport(#[source] reqwest::Error),
    /// The response arrived but is not one of the two documented body
    /// shapes. Surfaced to the verifier rather than swallowed.
    #[error("unexpected response body (http {http_status}): {body}")]
    UnexpectedBody { http_status: u16, body: String },
}

/// Client for the token-lifecycle endpoint of the API-under-test.
///
/// It never retries: retry policy belongs to the caller, because it differs
/// between functional tests (none, timing matters) and load generation
/// (bounded).
#[derive(Clone, Debug)]
pub struct ApiClient {
    base_url: String,
    http_client: Client,
    api_key: Secret<String>,
    deadline: Duration,
}

impl ApiClient {
    pub fn new(base_url: String, api_key: Secret<String>, deadline: Duration) -> Self {
        // Per-request timeouts are set explicitly in `execute_with` so a
        // scenario can tighten the deadline; the builder carries no default.
        let http_client = Client::builder()
            .build()
            .expect("failed to build the reqwest client");
        Self {
            base_url,
            http_client,
            api_key,
            deadline,
        }
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Executes a request with the configured key and deadline.
    pub async fn execute(&self, request: &ActionRequest) -> Result<ActionResult, ApiClientError> {
        self.execute_with(request, ApiKey::Configured, None).await
    }

    /// Executes a request with full control over key and deadline.
    #[tracing::instrument(
        name = "Executing action against the API under test",
        skip(self, api_key),
        fields(token = %request.token.as_str(), action = %request.action)
    )]
    pub async fn execute_with(
        &self,
        request: &ActionRequest,
        api_key: ApiKey<'_>,
        deadline: Option<Duration>,
    ) -> Result<ActionResult, ApiClientError> {
        let url = format!("{}/endpoint", self.base_url);
        let deadline = deadline.unwrap_or(self.deadline);
        let form = [
            ("token", request.token.as_str()),
            ("action", request.action.as_str()),
        ];

        let mut builder = self.http_client.post(&url).form(&form).timeout(deadline);
        builder = match api_key {
            ApiKey::Configured => builder.header("X-Api-Key", self.api_key.expose_secret()),
            ApiKey::Custom(key) => builder.header("X-Api-Key", key),
            ApiKey::Omitted => builder,
        };

        let started = Instant::now();
        let response = builder.send().await.map_err(|e| {
            let elapsed = started.elapsed();
            if e.is_timeout() {
                ApiClientError::Timeout { deadline, elapsed }
            } else {
                ApiClientError::Transport(e)
            }
        })?;
        let http_status = response.status().as_u16();
        let raw = response.text().await.map_err(|e| {
            if e.is_timeout() {
                ApiClientError::Timeout {
                    deadline,
                    elapsed: started.elapsed(),
                }
            } else {
                ApiClientError::Transport(e)
            }
        })?;
        let latency = started.elapsed();

        Self::classify(http_status, &raw, latency)
    }

    fn classify(
        http_status: u16,
        raw: &str,
        latency: Duration,
    ) -> Result<ActionResult, ApiClientError> {
        let unexpected = || ApiClientError::UnexpectedBody {
            http_status,
            body: raw.chars().take(200).collect(),
        };
        let body: Value = serde_json::from_str(raw).map_err(|_| unexpected())?;
        let result = body.get("result").and_then(Value::as_str).ok_or_else(unexpected)?;
        let status = match result {
            "OK" if http_status == 200 => ResultStatus::Ok,
            "ERROR" => ResultStatus::Error,
            _ => return Err(unexpected()),
        };
        let message = body
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_owned);
        Ok(ActionResult {
            status,
            message,
            http_status,
            latency,
            body,
        })
    }
}
