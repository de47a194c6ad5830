//! Aeonisk session core CLI
//!
//! `run` executes a configured session to completion, `replay` reconstructs
//! narrative from a log, `validate` checks the log invariants.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use aeonisk_engine::agents::StructuredCallConfig;
use aeonisk_engine::infrastructure::{
    LlmPort, OpenAiCompatClient, ResilientLlmClient, RetryConfig, SessionDice,
};
use aeonisk_engine::log::{read_log, validate, verify_snapshot_determinism, TranscriptDoc};
use aeonisk_engine::{load_session_config, AppConfig, SessionCoordinator};

#[derive(Parser)]
#[command(name = "aeonisk", about = "Aeonisk multi-agent session core", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Execute a session to completion from a JSON config.
    Run {
        /// Path to the session config (JSON).
        config: PathBuf,
    },
    /// Reconstruct and print narrative from a session log.
    Replay {
        /// Path to a session JSONL log.
        log: PathBuf,
    },
    /// Run the log invariants and report pass/fail with counts.
    Validate {
        /// Path to a session JSONL log.
        log: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize logging; LOG_LEVEL overrides the default filter.
    let filter = std::env::var("LOG_LEVEL")
        .ok()
        .or_else(|| std::env::var("RUST_LOG").ok())
        .unwrap_or_else(|| "aeonisk_engine=info".to_string());
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(filter))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let code = match cli.command {
        Command::Run { config } => run_session(config).await,
        Command::Replay { log } => replay(log),
        Command::Validate { log } => validate_log(log),
    };
    std::process::exit(code);
}

async fn run_session(config_path: PathBuf) -> i32 {
    let session_config = match load_session_config(&config_path) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{e}");
            return e.exit_code();
        }
    };

    let app_config = AppConfig::from_env();
    tracing::info!("Starting session '{}'", session_config.session_name);
    tracing::info!("  LLM endpoint: {}", app_config.base_url);
    tracing::info!("  Model: {}", app_config.model);

    let base_client = OpenAiCompatClient::from_config(&app_config);
    let factory = move |model: Option<&str>| -> Arc<dyn LlmPort> {
        let client = match model {
            Some(model) => base_client.with_model(model),
            None => base_client.clone(),
        };
        Arc::new(ResilientLlmClient::new(
            Arc::new(client),
            RetryConfig::default(),
        ))
    };

    let dice = Box::new(SessionDice::from_seed(
        session_config.scenario.seed.as_deref(),
    ));
    let cancel = CancellationToken::new();

    let mut coordinator = match SessionCoordinator::new(
        session_config,
        &factory,
        dice,
        StructuredCallConfig::default(),
        cancel.clone(),
    ) {
        Ok(coordinator) => coordinator,
        Err(e) => {
            tracing::error!("{e}");
            return e.exit_code();
        }
    };
    tracing::info!("  Log: {}", coordinator.log_path().display());

    // Ctrl-C cancels all in-flight agent tasks; the coordinator emits a
    // final aborted session_end before exiting.
    let cancel_on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("shutdown signal received, cancelling session");
            cancel_on_signal.cancel();
        }
    });

    match coordinator.run().await {
        Ok(outcome) => {
            tracing::info!("Session complete: {}", outcome.as_str());
            0
        }
        Err(e) => {
            tracing::error!("Session aborted: {e}");
            e.exit_code()
        }
    }
}

fn replay(log_path: PathBuf) -> i32 {
    match read_log(&log_path) {
        Ok(records) => {
            if let Err(e) = verify_snapshot_determinism(&records) {
                tracing::warn!("snapshot determinism: {e}");
            }
            let transcript = TranscriptDoc::from_records(&records);
            println!("{}", transcript.render_text());
            0
        }
        Err(e) => {
            tracing::error!("{e}");
            e.exit_code()
        }
    }
}

fn validate_log(log_path: PathBuf) -> i32 {
    let records = match read_log(&log_path) {
        Ok(records) => records,
        Err(e) => {
            tracing::error!("{e}");
            return e.exit_code();
        }
    };
    let report = validate(&records);
    for check in &report.checks {
        let status = if check.passed { "PASS" } else { "FAIL" };
        println!(
            "{status} {name} ({examined} examined, {violations} violations)",
            name = check.name,
            examined = check.examined,
            violations = check.violations.len(),
        );
        for violation in &check.violations {
            println!("  - {violation}");
        }
    }
    match verify_snapshot_determinism(&records) {
        Ok(count) => println!("PASS snapshot_determinism ({count} examined, 0 violations)"),
        Err(e) => {
            println!("FAIL snapshot_determinism: {e}");
            return 2;
        }
    }
    if report.passed() {
        0
    } else {
        2
    }
}
