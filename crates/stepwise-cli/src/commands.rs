use anyhow::Context;
use stepwise_config::MigrateConfig;
use stepwise_core::{
    CancellationToken, DriverRegistry, File, Handle, MigrationFile, Version, Versions,
};
use tracing::warn;

use crate::cli::Command;

/// What a command produced, for printing.
#[derive(Debug)]
pub enum Report {
    Done(&'static str),
    Created(MigrationFile),
    Version(Version),
    Versions(Versions),
    Pending(Vec<File>),
}

/// Open a handle from `config`, run `command` and close the handle.
pub async fn run(
    command: &Command,
    config: &MigrateConfig,
    registry: &DriverRegistry,
    cancel: &CancellationToken,
) -> anyhow::Result<Report> {
    let mut handle =
        Handle::from_config(registry, config).context("failed to open migration handle")?;
    let outcome = execute(&mut handle, command, cancel).await;
    if let Err(e) = handle.close() {
        warn!("failed to close connection: {e}");
    }
    outcome
}

async fn execute(
    handle: &mut Handle,
    command: &Command,
    cancel: &CancellationToken,
) -> anyhow::Result<Report> {
    let report = match command {
        Command::Create { name } => {
            Report::Created(handle.create(name).context("failed to create migration")?)
        }
        Command::Up => {
            handle.up(cancel).await.context("up failed")?;
            Report::Done("up")
        }
        Command::Down => {
            handle.down(cancel).await.context("down failed")?;
            Report::Done("down")
        }
        Command::Redo => {
            handle.redo(cancel).await.context("redo failed")?;
            Report::Done("redo")
        }
        Command::Reset => {
            handle.reset(cancel).await.context("reset failed")?;
            Report::Done("reset")
        }
        Command::Migrate { n } => {
            handle
                .migrate(*n, cancel)
                .await
                .with_context(|| format!("migrate {n} failed"))?;
            Report::Done("migrate")
        }
        Command::Apply { version } => {
            handle
                .apply_version(Version::new(*version), cancel)
                .await
                .with_context(|| format!("failed to apply {version}"))?;
            Report::Done("apply")
        }
        Command::Rollback { version } => {
            handle
                .rollback_version(Version::new(*version), cancel)
                .await
                .with_context(|| format!("failed to roll back {version}"))?;
            Report::Done("rollback")
        }
        Command::Version => Report::Version(
            handle
                .version(cancel)
                .await
                .context("failed to read version")?,
        ),
        Command::Versions => Report::Versions(
            handle
                .versions(cancel)
                .await
                .context("failed to read versions")?,
        ),
        Command::Pending => Report::Pending(
            handle
                .pending_migrations(cancel)
                .await
                .context("failed to list pending migrations")?,
        ),
    };
    Ok(report)
}
