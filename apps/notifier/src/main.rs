mod config;
mod dispatch;
mod errors;
mod filter;
mod models;
mod persist;
mod render;
mod router;
mod scheduler;
mod source;
mod state;
mod transport;
mod watermark;

#[cfg(test)]
mod testing;

use std::future::Future;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::scheduler::Scheduler;
use crate::state::AppState;

/// Polls security advisory feeds and mails new notices to subscribers.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Path to the JSON configuration file; a default one is written if missing
    #[arg(env = "NOTIFIER_CONFIG")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::try_parse().unwrap_or_else(|e| match e.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => e.exit(),
        _ => {
            let _ = e.print();
            std::process::exit(1);
        }
    });

    // Load configuration first; its log level seeds the tracing filter
    let config = Config::load(&args.config)
        .with_context(|| format!("could not load {}", args.config.display()))?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.log_level))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting {} v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    let subscribers = config.validate().context("invalid configuration")?;
    let state = AppState::from_config(&config, subscribers)?;
    let shutdown = register_signal_handlers().context("could not install signal handlers")?;

    info!("Entering main loop");
    Scheduler::new(state).run(shutdown).await;

    info!("Stopped");
    Ok(())
}

fn register_signal_handlers() -> std::io::Result<impl Future<Output = ()>> {
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    Ok(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("Caught SIGTERM, stopping after the current cycle"),
            _ = sigint.recv() => info!("Caught SIGINT, stopping after the current cycle"),
        }
    })
}
