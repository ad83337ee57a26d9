//! taskdeck - a command-line client for the taskdeck task service.
//!
//! Every command goes through the authenticated API client from
//! `taskdeck-core`; an expired session is reported with a hint to log in
//! again rather than handled here.

mod cli;
mod commands;
mod output;

use std::io;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use taskdeck_core::{ApiClient, ApiError, Config, SessionEvent};

use crate::cli::Cli;

/// Log file prefix inside the cache directory
const LOG_FILE_PREFIX: &str = "taskdeck.log";

/// Initialize the tracing subscriber for logging.
///
/// Returns the file writer guard, which must live until exit so buffered
/// lines are flushed.
fn init_tracing(log_dir: Option<PathBuf>) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

fn report(err: &anyhow::Error) {
    eprintln!("Error: {}", err);
    match err.downcast_ref::<ApiError>() {
        Some(ApiError::ValidationFailure { detail, .. }) | Some(ApiError::InvalidCredentials(detail)) => {
            for line in output::field_errors(detail) {
                eprintln!("{}", line);
            }
        }
        Some(ApiError::AuthorizationDenied) => {
            eprintln!("The server rejected your credentials. Try `taskdeck login`.");
        }
        Some(e) if e.is_transient() => {
            eprintln!("The server could not be reached reliably; try again shortly.");
        }
        _ => {}
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let mut config = Config::load()?;
    let _guard = init_tracing(config.cache_dir().ok());
    info!(api = %config.api_base_url, "taskdeck starting");

    let client = ApiClient::new(&config)?;
    let mut events = client.subscribe();

    let result = commands::run(&client, &mut config, cli.command).await;

    while let Ok(event) = events.try_recv() {
        if event == SessionEvent::Expired {
            eprintln!("Your session has expired. Run `taskdeck login` to sign in again.");
        }
    }

    if let Err(e) = result {
        error!(error = %e, "Command failed");
        report(&e);
        std::process::exit(1);
    }
    Ok(())
}
