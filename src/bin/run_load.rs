//! Load-test entry point.
//!
//! Reads the layered configuration, resets the upstream mock to its
//! unconditional-success defaults, runs the actor pool, and prints the
//! aggregated report as JSON to stdout. Exits non-zero if the failure rate
//! or the configured p95 bound is breached, so CI can gate on it.

use anyhow::Context;
use token_harness::configuration::get_configuration;
use token_harness::domain::ApiAction;
use token_harness::load::run_load;
use token_harness::telemetry::{get_subscriber, init_subscriber};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = get_subscriber("token-harness".into(), "info".into(), std::io::stderr);
    init_subscriber(subscriber);

    let configuration = get_configuration().context("Failed to read configuration.")?;
    let client = configuration.api.client();
    let controller = configuration.mock.controller();

    // The run is only meaningful under known mock rules.
    controller
        .reset()
        .await
        .context("Failed to reset the upstream mock before the run.")?;

    let plan = configuration
        .load
        .plan()
        .map_err(anyhow::Error::msg)
        .context("Invalid load settings.")?;
    let report = run_load(client, plan).await;
    println!("{}", serde_json::to_string_pretty(&report)?);

    let mut breached = false;
    if report.failure_rate() > 0.01 {
        tracing::error!(
            failure_rate = report.failure_rate(),
            "failure rate above threshold"
        );
        breached = true;
    }
    let bound = configuration.load.p95_bound();
    for action in ApiAction::ALL {
        if let Some(p95) = report.p95(action) {
            if p95 > bound {
                tracing::error!(action = %action, p95_ms = p95.as_millis() as u64, "p95 above bound");
                breached = true;
            }
        }
    }
    if breached {
        std::process::exit(1);
    }
    Ok(())
}
