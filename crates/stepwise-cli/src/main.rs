mod cli;
mod commands;
mod output;

use anyhow::Context;
use clap::Parser;
use stepwise_core::{CancellationToken, DriverRegistry};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing();

    let config = cli.resolve_config().context("failed to load configuration")?;
    let registry = registry()?;

    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping before the next migration");
            token.cancel();
        }
    });

    let report = commands::run(&cli.command, &config, &registry, &cancel).await?;
    println!("{}", output::render(&report, cli.json));
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Every adapter this binary ships with.
fn registry() -> anyhow::Result<DriverRegistry> {
    let mut registry = DriverRegistry::new();
    stepwise_sqlite::register(&mut registry).context("failed to register sqlite driver")?;
    Ok(registry)
}
