use std::process::ExitCode;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use skimmer::app::SkimmerError;
use skimmer::cli::{commands, Cli, Commands};
use skimmer::config::Config;

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("skimmer=info")),
        )
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        // A cancelled run is a clean stop, not a failure.
        Err(SkimmerError::Cancelled) => ExitCode::SUCCESS,
        Err(SkimmerError::Session(e)) => {
            error!("Cannot proceed without a usable session: {}", e);
            ExitCode::from(2)
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::from(1)
        }
    }
}

async fn run() -> Result<(), SkimmerError> {
    let cli = Cli::parse();

    let mut config = match cli.config {
        Some(ref path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    match cli.command {
        Commands::Run { headed, count } => {
            if headed {
                config.browser.headless = false;
            }
            if let Some(count) = count {
                config.reader.target_discovery_count = count;
            }

            let cancel = CancellationToken::new();
            let ctrl_c = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Interrupt received, finishing the current step");
                    ctrl_c.cancel();
                }
            });

            commands::run(&config, cancel).await?;
        }
        Commands::CheckSession => {
            commands::check_session(&config)?;
        }
    }

    Ok(())
}
