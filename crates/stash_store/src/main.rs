// Stash node binary entry point: configuration, logging, the engine with
// its periodic saver, and ctrl-c driven graceful shutdown.

use std::io::IsTerminal;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use stash_store::{Config, PeriodicSaver, Stash};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Enable ANSI colors only when stdout is a terminal and NO_COLOR is unset.
    let ansi = std::io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none();
    tracing_subscriber::fmt()
        .with_ansi(ansi)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = Config::parse();
    info!(
        store_file = %config.store_file.display(),
        store_interval = ?config.store_interval,
        restore = config.restore,
        "stash server starting"
    );

    let stash = Arc::new(Stash::new(&config).context("open stash")?);
    let saver = PeriodicSaver::spawn(Arc::clone(&stash), config.store_interval)
        .context("start periodic saver")?;

    shutdown_signal().await?;
    info!("shutdown signal received");

    if let Some(saver) = saver {
        saver.stop();
    }
    info!("stash server stopped");
    Ok(())
}

/// Resolves on SIGINT, SIGTERM, or SIGQUIT.
#[cfg(unix)]
async fn shutdown_signal() -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate()).context("install SIGTERM handler")?;
    let mut quit = signal(SignalKind::quit()).context("install SIGQUIT handler")?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res.context("wait for ctrl-c")?,
        _ = terminate.recv() => {}
        _ = quit.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn shutdown_signal() -> anyhow::Result<()> {
    tokio::signal::ctrl_c().await.context("wait for ctrl-c")
}
