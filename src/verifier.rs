//! Generic contract verification.
//!
//! One function checks every scenario step against its expectation; no
//! per-scenario assertion code exists anywhere else. A failed check carries
//! enough context to diagnose without re-running the suite.

use std::time::Duration;

use serde_json::Value;

use crate::api_client::{ActionResult, ResultStatus};
use crate::domain::ApiAction;
use crate::scenario::StepExpectation;
use crate::state_model::ExpectedStatus;

/// What actually happened at one scenario step, as far as the contract is
/// concerned. Transport failures never reach the verifier: they abort the
/// scenario instead.
#[derive(Debug, Clone)]
pub enum StepOutcome {
    Completed(ActionResult),
    TimedOut { deadline: Duration, elapsed: Duration },
}

/// Identifies the step being verified, for diagnostics.
#[derive(Debug, Clone)]
pub struct StepContext {
    pub scenario: String,
    pub step: usize,
    pub token: String,
    pub action: ApiAction,
}

#[derive(thiserror::Error, Debug, Clone)]
#[error(
    "contract violation in '{scenario}' step {step} ({action} on token {token}): {detail}"
)]
pub struct ContractViolation {
    pub scenario: String,
    pub step: usize,
    pub token: String,
    pub action: ApiAction,
    pub detail: String,
}

impl ContractViolation {
    pub fn new(ctx: &StepContext, detail: String) -> Self {
        Self {
            scenario: ctx.scenario.clone(),
            step: ctx.step,
            token: ctx.token.clone(),
            action: ctx.action,
            detail,
        }
    }
}

pub fn verify(
    ctx: &StepContext,
    outcome: &StepOutcome,
    expected: &StepExpectation,
) -> Result<(), ContractViolation> {
    let fail = |detail: String| Err(ContractViolation::new(ctx, detail));

    let latency = match outcome {
        StepOutcome::Completed(result) => {
            match (expected.status, result.status) {
                (ExpectedStatus::Ok, ResultStatus::Ok) => check_ok_shape(ctx, &result.body)?,
                (ExpectedStatus::Error, ResultStatus::Error) => {
                    check_error_shape(ctx, &result.body)?
                }
                (want, _) => {
                    return fail(format!(
                        "expected {want:?}, got {:?} (http {}, body {})",
                        result.status, result.http_status, result.body
                    ));
                }
            }
            if let Some(want) = expected.http_status {
                if result.http_status != want {
                    return fail(format!(
                        "expected http status {want}, got {}",
                        result.http_status
                    ));
                }
            }
            result.latency
        }
        StepOutcome::TimedOut { deadline, elapsed } => {
            if expected.status != ExpectedStatus::Timeout {
                return fail(format!(
                    "expected {:?}, got a client timeout after {elapsed:?} (deadline {deadline:?})",
                    expected.status
                ));
            }
            *elapsed
        }
    };

    if let Some(floor) = expected.min_latency {
        if latency < floor {
            return fail(format!(
                "latency {latency:?} below the expected floor {floor:?}"
            ));
        }
    }
    if let Some(ceiling) = expected.max_latency {
        if latency > ceiling {
            return fail(format!(
                "latency {latency:?} above the expected ceiling {ceiling:?}"
            ));
        }
    }
    Ok(())
}

/// An OK response is exactly `{"result":"OK"}` and nothing more.
fn check_ok_shape(ctx: &StepContext, body: &Value) -> Result<(), ContractViolation> {
    let well_formed = body
        .as_object()
        .is_some_and(|map| map.len() == 1 && map.get("result").and_then(Value::as_str) == Some("OK"));
    if well_formed {
        Ok(())
    } else {
        Err(ContractViolation::new(
            ctx,
            format!("OK response has unexpected shape: {body}"),
        ))
    }
}

/// An ERROR response carries `result == "ERROR"` and a non-empty message.
fn check_error_shape(ctx: &StepContext, body: &Value) -> Result<(), ContractViolation> {
    let result = body.get("result").and_then(Value::as_str);
    let message = body.get("message").and_then(Value::as_str).unwrap_or("");
    if result == Some("ERROR") && !message.is_empty() {
        Ok(())
    } else {
        Err(ContractViolation::new(
            ctx,
            format!("ERROR response has unexpected shape: {body}"),
        ))
    }
}
