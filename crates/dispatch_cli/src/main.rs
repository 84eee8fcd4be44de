//! `dispatchd`: the control surface for the fleet dispatch engine.
//!
//! `run` starts a fully-wired [`dispatch_core::Engine`] against a NATS
//! broker. `submit`/`status`/`cancel` are local dev-parity commands: the
//! store is in-memory and per-process (no persistent query engine is in
//! scope), so these spin up an ephemeral engine against
//! the in-memory loopback bus rather than reach across a process boundary
//! — see DESIGN.md for the tradeoff. Exit codes: 0 success,
//! 2 configuration error, 3 broker unreachable, 4 store unreachable.

use std::io::Read;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use dispatch_core::bus::{Bus, NatsBus};
use dispatch_core::config::DispatchConfig;
use dispatch_core::error::DispatchError;
use dispatch_core::eta::{DefaultEtaModel, EtaModel};
use dispatch_core::geo::{Geocoder, NullGeocoder, RegionHint};
use dispatch_core::ingest::RawSubmission;
use dispatch_core::Engine;
use tracing::{error, info};

#[derive(Parser)]
#[command(
    name = "dispatchd",
    about = "Fleet dispatch engine: bidding coordinator, global matcher, driver/job store"
)]
struct Cli {
    /// Message broker URL (overrides BROKER_URL).
    #[arg(long, global = true, env = "BROKER_URL")]
    broker_url: Option<String>,
    /// Store backend URI (overrides STORE_URL). Only `memory://` is
    /// currently supported.
    #[arg(long, global = true, env = "STORE_URL")]
    store_url: Option<String>,
    /// Optional layered config file (e.g. dispatch.toml).
    #[arg(long, global = true)]
    config_file: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the engine and run until interrupted.
    Run,
    /// Submit a JobRequest JSON on stdin and print the admitted job id.
    Submit,
    /// Print the current status of a job.
    Status {
        job_id: String,
    },
    /// Cancel an in-flight job.
    Cancel {
        job_id: String,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "dispatch_core=info,dispatch_cli=info".into()))
        .init();

    let cli = Cli::parse();
    let runtime = tokio::runtime::Runtime::new().expect("failed to start tokio runtime");
    runtime.block_on(dispatch(cli))
}

async fn dispatch(cli: Cli) -> ExitCode {
    let mut config = match DispatchConfig::load(cli.config_file.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "configuration error");
            return ExitCode::from(2);
        }
    };
    if let Some(broker) = cli.broker_url {
        config.broker_url = broker;
    }
    if let Some(store) = cli.store_url {
        config.store_url = store;
    }

    match cli.command {
        Commands::Run => cmd_run(config).await,
        Commands::Submit => cmd_submit(config).await,
        Commands::Status { job_id } => cmd_status(config, &job_id).await,
        Commands::Cancel { job_id } => cmd_cancel(config, &job_id).await,
    }
}

/// Maps a [`DispatchError`] to its process exit code. Returns
/// a plain `u8` (rather than `ExitCode`, which has no `PartialEq`/`Debug`)
/// so the mapping itself stays unit-testable; call sites convert with
/// `ExitCode::from`.
fn exit_code_for(err: &DispatchError) -> u8 {
    match err {
        DispatchError::Config(_) => 2,
        DispatchError::Publish { .. } | DispatchError::Subscribe { .. } => 3,
        DispatchError::StoreUnavailable(_) => 4,
        _ => 1,
    }
}

/// Only `memory://` is implemented; anything else is an unreachable store
/// per the exit-code contract (no durable backend exists to reach).
fn check_store_url(config: &DispatchConfig) -> Result<(), DispatchError> {
    if config.store_url == "memory://" {
        Ok(())
    } else {
        Err(DispatchError::StoreUnavailable(config.store_url.clone()))
    }
}

fn fail(err: &DispatchError) -> ExitCode {
    ExitCode::from(exit_code_for(err))
}

async fn cmd_run(config: DispatchConfig) -> ExitCode {
    if let Err(e) = check_store_url(&config) {
        error!(error = %e, "store unreachable");
        return fail(&e);
    }

    let bus: Arc<dyn Bus> = match NatsBus::connect(&config.broker_url, config.bus_retry).await {
        Ok(b) => Arc::new(b),
        Err(e) => {
            error!(error = %e, broker_url = %config.broker_url, "broker unreachable");
            return fail(&e);
        }
    };
    let eta_model: Arc<dyn EtaModel> = Arc::new(DefaultEtaModel::default());
    let geocoder: Arc<dyn Geocoder> = Arc::new(NullGeocoder);
    let engine = Engine::with_dependencies(config, bus, eta_model, geocoder);

    info!("dispatchd running; press ctrl-c to stop");
    if tokio::signal::ctrl_c().await.is_err() {
        error!("failed to install ctrl-c handler; shutting down immediately");
    }
    engine.shutdown();
    ExitCode::SUCCESS
}

async fn cmd_submit(config: DispatchConfig) -> ExitCode {
    if let Err(e) = check_store_url(&config) {
        error!(error = %e, "store unreachable");
        return fail(&e);
    }

    let mut body = String::new();
    if let Err(e) = std::io::stdin().read_to_string(&mut body) {
        error!(error = %e, "failed to read submission from stdin");
        return ExitCode::FAILURE;
    }
    let raw: RawSubmission = match serde_json::from_str(&body) {
        Ok(r) => r,
        Err(e) => {
            error!(error = %e, "submission is not valid JSON");
            return ExitCode::FAILURE;
        }
    };

    let engine = Engine::start(config);
    match engine.intake.submit(raw, RegionHint::default()).await {
        Ok(job_id) => {
            println!("{job_id}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "submission rejected");
            fail(&e)
        }
    }
}

async fn cmd_status(config: DispatchConfig, job_id: &str) -> ExitCode {
    if let Err(e) = check_store_url(&config) {
        error!(error = %e, "store unreachable");
        return fail(&e);
    }

    let engine = Engine::start(config);
    match engine.store.get_job(job_id) {
        Some(job) => {
            match serde_json::to_string_pretty(&job) {
                Ok(json) => println!("{json}"),
                Err(e) => error!(error = %e, "failed to serialize job"),
            }
            ExitCode::SUCCESS
        }
        None => {
            error!(job_id, "unknown job");
            fail(&DispatchError::UnknownJob(job_id.to_string()))
        }
    }
}

async fn cmd_cancel(config: DispatchConfig, job_id: &str) -> ExitCode {
    if let Err(e) = check_store_url(&config) {
        error!(error = %e, "store unreachable");
        return fail(&e);
    }

    let engine = Engine::start(config);
    if engine.store.get_job(job_id).is_none() {
        error!(job_id, "unknown job");
        return fail(&DispatchError::UnknownJob(job_id.to_string()));
    }
    engine.coordinator.cancel(job_id.to_string()).await;
    // Give the actor a turn to process the cancellation before the
    // ephemeral engine (and its store) drop.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    println!("cancelled");
    ExitCode::SUCCESS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_maps_to_exit_code_two() {
        assert_eq!(exit_code_for(&DispatchError::Config("bad".into())), 2);
    }

    #[test]
    fn store_unavailable_maps_to_exit_code_four() {
        assert_eq!(exit_code_for(&DispatchError::StoreUnavailable("postgres://".into())), 4);
    }

    #[test]
    fn broker_unreachable_maps_to_exit_code_three() {
        let err = DispatchError::Subscribe { topic: "<connect>".into(), source: anyhow::anyhow!("refused") };
        assert_eq!(exit_code_for(&err), 3);
    }

    #[test]
    fn unreachable_store_url_is_rejected_before_starting_the_engine() {
        let mut config = DispatchConfig::default();
        config.store_url = "postgres://localhost/dispatch".to_string();
        assert!(check_store_url(&config).is_err());
    }

    #[test]
    fn memory_store_url_passes() {
        let config = DispatchConfig::default();
        assert!(check_store_url(&config).is_ok());
    }
}
