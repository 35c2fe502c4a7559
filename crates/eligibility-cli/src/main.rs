//! # eligibility
//!
//! Command-line front end for the eligibility runtime. Runs one check
//! against the configured upstream, or inspects a request offline.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use eligibility_core::{service_types, validate, EligibilityRequest, RequestFingerprint};
use eligibility_runtime::store::connect_store;
use eligibility_runtime::{EligibilityOrchestrator, RuntimeConfig};

const DEFAULT_LOG_FILTER: &str = "eligibility=info";

#[derive(Parser)]
#[command(name = "eligibility")]
#[command(about = "Run and inspect patient eligibility checks")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one eligibility check and print the response envelope
    Check {
        /// Runtime configuration (YAML)
        #[arg(short, long)]
        config: PathBuf,

        /// Eligibility request (JSON)
        #[arg(short, long)]
        request: PathBuf,

        /// Correlation id to propagate; generated when omitted
        #[arg(long)]
        correlation_id: Option<String>,
    },

    /// Validate a request without contacting the upstream
    Validate {
        #[arg(short, long)]
        request: PathBuf,
    },

    /// Print the cache fingerprint of a request
    Fingerprint {
        #[arg(short, long)]
        request: PathBuf,
    },

    /// List supported service-type codes
    ServiceTypes {
        /// Print as JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

#[derive(Serialize)]
struct ServiceTypeRow {
    code: &'static str,
    name: &'static str,
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Check {
            config,
            request,
            correlation_id,
        } => run_check(&config, &request, correlation_id).await,
        Commands::Validate { request } => run_validate(&request),
        Commands::Fingerprint { request } => {
            let request = load_request(&request)?;
            println!("{}", RequestFingerprint::of(&request));
            Ok(ExitCode::SUCCESS)
        }
        Commands::ServiceTypes { json } => {
            print_service_types(json)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn run_check(
    config_path: &Path,
    request_path: &Path,
    correlation_id: Option<String>,
) -> Result<ExitCode> {
    let config = RuntimeConfig::from_file(config_path)
        .with_context(|| format!("loading config {}", config_path.display()))?;
    config.validate().context("invalid runtime config")?;

    let store = connect_store(&config.store)
        .await
        .context("connecting to key-value store")?;
    let orchestrator = EligibilityOrchestrator::builder()
        .config(config)
        .store(store)
        .build()
        .context("building orchestrator")?;

    let body = read_file(request_path)?;
    let envelope = orchestrator.handle_json(&body, correlation_id).await;

    for metrics in orchestrator.breaker_metrics() {
        tracing::debug!(
            breaker = %metrics.name,
            state = ?metrics.state,
            attempts = metrics.attempts,
            failures = metrics.failures,
            "Breaker state after check"
        );
    }

    println!("{}", serde_json::to_string_pretty(&envelope)?);

    if envelope.success {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

fn run_validate(path: &Path) -> Result<ExitCode> {
    let body = read_file(path)?;
    let outcome = EligibilityRequest::from_json(&body).and_then(|request| validate(&request));

    match outcome {
        Ok(()) => {
            println!("{}: valid", path.display());
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            println!("{}: {} violation(s)", path.display(), e.violations().len());
            for violation in e.violations() {
                println!("  - {}", violation);
            }
            Ok(ExitCode::FAILURE)
        }
    }
}

fn print_service_types(json: bool) -> Result<()> {
    if json {
        let rows: Vec<ServiceTypeRow> = service_types::all()
            .map(|(code, name)| ServiceTypeRow { code, name })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        for (code, name) in service_types::all() {
            println!("{:<4} {}", code, name);
        }
    }
    Ok(())
}

fn load_request(path: &Path) -> Result<EligibilityRequest> {
    let body = read_file(path)?;
    EligibilityRequest::from_json(&body)
        .with_context(|| format!("parsing request {}", path.display()))
}

fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}
