//! Step Executor - executes a single planned step from a JSON file
//!
//! Usage: `step-executor <step.json>`. The resulting step, execution record
//! included, is printed to stdout.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info};

use step_executor::balance::BalanceChecker;
use step_executor::chain::{ChainRegistry, RemoteSigner, RpcConnection};
use step_executor::config::Settings;
use step_executor::executor::{ExecutionOptions, StepExecutor, StepOutcome};
use step_executor::metrics;
use step_executor::quote::StepReconciler;
use step_executor::receiving::StatusPoller;
use step_executor::service::StepServiceClient;
use step_executor::step::Step;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    init_logging();

    info!("Starting Step Executor v{}", env!("CARGO_PKG_VERSION"));

    let step_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .context("usage: step-executor <step.json>")?;

    // Load configuration
    let settings = Settings::load()?;
    info!(
        "Loaded configuration for {} chains",
        settings.enabled_chains().len()
    );

    let raw = std::fs::read_to_string(&step_path)
        .with_context(|| format!("Failed to read step file: {:?}", step_path))?;
    let mut step: Step = serde_json::from_str(&raw).context("Failed to parse step")?;
    if step.id.is_empty() {
        step.id = uuid::Uuid::new_v4().to_string();
    }

    let executor = build_executor(&settings)?;
    let options = ExecutionOptions::new(settings.executor.allow_interaction);

    let result = executor.execute_step(&mut step, &options).await;

    println!("{}", serde_json::to_string_pretty(&step)?);
    debug!("Metrics:\n{}", metrics::encode());

    match result {
        Ok(StepOutcome::Done) => {
            info!(step_id = %step.id, "Step done");
            Ok(())
        }
        Ok(StepOutcome::ActionRequired) => {
            info!(step_id = %step.id, "Step halted awaiting user action");
            Ok(())
        }
        Err(e) => {
            error!(step_id = %step.id, "Step execution failed: {}", e);
            std::process::exit(1);
        }
    }
}

/// Wire the remote collaborators described by the settings
fn build_executor(settings: &Settings) -> Result<StepExecutor> {
    let service_for_quotes = StepServiceClient::new(&settings.api)?;
    let service_for_status = StepServiceClient::new(&settings.api)?;

    let signer = Arc::new(RemoteSigner::new(&settings.signer));
    let connection = Arc::new(RpcConnection::new(&settings.rpc, &settings.executor));
    let balance = Arc::new(BalanceChecker::new(RpcConnection::new(
        &settings.rpc,
        &settings.executor,
    )));
    let reconciler = Arc::new(StepReconciler::new(service_for_quotes));
    let waiter = Arc::new(StatusPoller::from_config(
        service_for_status,
        &settings.executor,
    ));
    let chains = Arc::new(ChainRegistry::from_settings(settings));

    Ok(StepExecutor::new(
        signer,
        connection,
        balance,
        reconciler,
        waiter,
        chains,
        settings.executor.clone(),
    ))
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info,step_executor=debug,reqwest=warn,hyper=warn")
    });

    // Logs go to stderr; stdout carries the step JSON
    let json = std::env::var("LOG_FORMAT").map(|f| f == "json").unwrap_or(false);
    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_thread_ids(true).with_writer(std::io::stderr))
            .init();
    }
}
