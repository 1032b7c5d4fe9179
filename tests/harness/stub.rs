//! In-process stand-ins for the two external processes the harness drives:
//! a reference implementation of the token-lifecycle API and a
//! WireMock-compatible upstream mock (admin subset + matching endpoints).
//!
//! These exist so the integration suite can exercise the full pipeline
//! rule installation through the admin API, the API's upstream calls, and
//! contract verification, without docker.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use axum::extract::{Form, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{Value, json};

use token_harness::state_model::RepeatLoginPolicy;

// --- upstream mock ---------------------------------------------------------

#[derive(Debug, Clone)]
struct StoredMapping {
    priority: u32,
    url_path: String,
    token_prefix: Option<String>,
    status: u16,
    delay: Duration,
}

#[derive(Clone)]
struct MockState {
    mappings: Arc<RwLock<Vec<StoredMapping>>>,
    hits: Arc<AtomicUsize>,
}

pub struct UpstreamMockHandle {
    pub address: String,
    hits: Arc<AtomicUsize>,
}

impl UpstreamMockHandle {
    /// Total requests served on /auth and /doAction since spawn.
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

pub async fn spawn_upstream_mock() -> UpstreamMockHandle {
    let state = MockState {
        mappings: Arc::new(RwLock::new(Vec::new())),
        hits: Arc::new(AtomicUsize::new(0)),
    };
    let hits = state.hits.clone();
    let app = Router::new()
        .route("/__admin/mappings", post(create_mapping).get(list_mappings))
        .route("/__admin/reset", post(reset_mappings))
        .route("/auth", post(serve_auth))
        .route("/doAction", post(serve_do_action))
        .with_state(state);
    let address = serve(app).await;
    UpstreamMockHandle { address, hits }
}

async fn create_mapping(
    State(state): State<MockState>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    let priority = body["priority"].as_u64().unwrap_or(u64::from(u32::MAX)) as u32;
    let url_path = body["request"]["urlPath"].as_str().unwrap_or("").to_owned();
    // The controller encodes prefixes as `token=PREFIX.*` body patterns.
    let token_prefix = body["request"]["bodyPatterns"][0]["matches"]
        .as_str()
        .and_then(|pattern| pattern.strip_prefix("token="))
        .and_then(|rest| rest.strip_suffix(".*"))
        .map(str::to_owned);
    let status = body["response"]["status"].as_u64().unwrap_or(200) as u16;
    let delay = Duration::from_millis(
        body["response"]["fixedDelayMilliseconds"]
            .as_u64()
            .unwrap_or(0),
    );
    state.mappings.write().unwrap().push(StoredMapping {
        priority,
        url_path,
        token_prefix,
        status,
        delay,
    });
    (StatusCode::CREATED, Json(body))
}

async fn list_mappings(State(state): State<MockState>) -> impl IntoResponse {
    let mappings = state.mappings.read().unwrap();
    let listed: Vec<Value> = mappings
        .iter()
        .map(|m| json!({ "request": { "urlPath": m.url_path } }))
        .collect();
    Json(json!({ "mappings": listed, "meta": { "total": listed.len() } }))
}

async fn reset_mappings(State(state): State<MockState>) -> StatusCode {
    state.mappings.write().unwrap().clear();
    StatusCode::OK
}

async fn serve_auth(
    state: State<MockState>,
    form: Form<std::collections::HashMap<String, String>>,
) -> Response {
    serve_upstream(state, "/auth", form).await
}

async fn serve_do_action(
    state: State<MockState>,
    form: Form<std::collections::HashMap<String, String>>,
) -> Response {
    serve_upstream(state, "/doAction", form).await
}

async fn serve_upstream(
    State(state): State<MockState>,
    url_path: &'static str,
    Form(fields): Form<std::collections::HashMap<String, String>>,
) -> Response {
    state.hits.fetch_add(1, Ordering::SeqCst);
    let token = fields.get("token").cloned().unwrap_or_default();
    let matched = {
        let mut mappings = state.mappings.read().unwrap().clone();
        mappings.sort_by_key(|m| m.priority);
        mappings.into_iter().find(|m| {
            m.url_path == url_path
                && m.token_prefix
                    .as_deref()
                    .is_none_or(|prefix| token.starts_with(prefix))
        })
    };
    match matched {
        Some(mapping) => {
            if !mapping.delay.is_zero() {
                tokio::time::sleep(mapping.delay).await;
            }
            StatusCode::from_u16(mapping.status)
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
                .into_response()
        }
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

// --- reference API-under-test ----------------------------------------------

/// How the stub resolves the two underspecified behaviors. The harness
/// treats both answers as explicit scenarios, so the stub must be able to
/// play either side.
#[derive(Clone)]
pub struct ApiStubConfig {
    pub api_key: String,
    pub upstream_base_url: String,
    pub repeat_login: RepeatLoginPolicy,
    /// When true, LOGOUT on an unknown token answers OK instead of ERROR.
    pub silent_logout_on_unknown: bool,
}

#[derive(Clone)]
struct ApiState {
    config: ApiStubConfig,
    authenticated: Arc<Mutex<HashSet<String>>>,
    http_client: reqwest::Client,
}

pub async fn spawn_api(config: ApiStubConfig) -> String {
    let state = ApiState {
        config,
        authenticated: Arc::new(Mutex::new(HashSet::new())),
        http_client: reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap(),
    };
    let app = Router::new()
        .route("/endpoint", post(endpoint))
        .with_state(state);
    serve(app).await
}

fn ok_body() -> Json<Value> {
    Json(json!({ "result": "OK" }))
}

fn error_body(message: &str) -> Json<Value> {
    Json(json!({ "result": "ERROR", "message": message }))
}

fn valid_token(token: &str) -> bool {
    token.len() == 32
        && token
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
}

async fn endpoint(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Form(fields): Form<std::collections::HashMap<String, String>>,
) -> Response {
    let presented_key = headers.get("X-Api-Key").and_then(|v| v.to_str().ok());
    if presented_key != Some(state.config.api_key.as_str()) {
        return (StatusCode::UNAUTHORIZED, error_body("Invalid API key")).into_response();
    }

    let token = fields.get("token").cloned().unwrap_or_default();
    if !valid_token(&token) {
        return (StatusCode::OK, error_body("Invalid token format")).into_response();
    }

    match fields.get("action").map(String::as_str) {
        Some("LOGIN") => login(&state, token).await.into_response(),
        Some("ACTION") => action(&state, token).await.into_response(),
        Some("LOGOUT") => logout(&state, token).into_response(),
        _ => (StatusCode::OK, error_body("Unknown action")).into_response(),
    }
}

async fn login(state: &ApiState, token: String) -> (StatusCode, Json<Value>) {
    let already_authenticated = state.authenticated.lock().unwrap().contains(&token);
    if already_authenticated {
        return match state.config.repeat_login {
            RepeatLoginPolicy::Idempotent => (StatusCode::OK, ok_body()),
            RepeatLoginPolicy::Rejected => (StatusCode::OK, error_body("Already logged in")),
        };
    }
    match call_upstream(state, "/auth", &token).await {
        Ok(status) if status.is_success() => {
            state.authenticated.lock().unwrap().insert(token);
            (StatusCode::OK, ok_body())
        }
        Ok(status) => (
            StatusCode::OK,
            error_body(&format!("External service returned {}", status.as_u16())),
        ),
        Err(_) => (StatusCode::OK, error_body("External service unavailable")),
    }
}

async fn action(state: &ApiState, token: String) -> (StatusCode, Json<Value>) {
    let authenticated = state.authenticated.lock().unwrap().contains(&token);
    if !authenticated {
        return (StatusCode::OK, error_body("Token not found"));
    }
    match call_upstream(state, "/doAction", &token).await {
        Ok(status) if status.is_success() => (StatusCode::OK, ok_body()),
        Ok(status) => (
            StatusCode::OK,
            error_body(&format!("External service returned {}", status.as_u16())),
        ),
        Err(_) => (StatusCode::OK, error_body("External service unavailable")),
    }
}

fn logout(state: &ApiState, token: String) -> (StatusCode, Json<Value>) {
    let removed = state.authenticated.lock().unwrap().remove(&token);
    if removed {
        (StatusCode::OK, ok_body())
    } else if state.config.silent_logout_on_unknown {
        (StatusCode::OK, ok_body())
    } else {
        (StatusCode::OK, error_body("Token not found"))
    }
}

async fn call_upstream(
    state: &ApiState,
    path: &str,
    token: &str,
) -> Result<reqwest::StatusCode, reqwest::Error> {
    let url = format!("{}{}", state.config.upstream_base_url, path);
    let response = state
        .http_client
        .post(&url)
        .form(&[("token", token)])
        .send()
        .await?;
    Ok(response.status())
}

// --- shared ----------------------------------------------------------------

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind a random port");
    let address = format!("http://127.0.0.1:{}", listener.local_addr().unwrap().port());
    tokio::spawn(async move {
        axum::serve(listener, app)
            .await
            .expect("stub server crashed");
    });
    address
}
