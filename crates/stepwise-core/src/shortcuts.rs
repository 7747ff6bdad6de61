//! One-shot helpers: open a handle, run one operation, close the handle.

use std::path::Path;

use stepwise_common::{Result, Version, Versions};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::file::{File, MigrationFile};
use crate::handle::Handle;
use crate::registry::DriverRegistry;

fn finish<T>(handle: Handle, outcome: Result<T>) -> Result<T> {
    if let Err(e) = handle.close() {
        warn!("failed to close migration handle: {e}");
    }
    outcome
}

pub async fn up(
    registry: &DriverRegistry,
    url: &str,
    path: &Path,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut handle = Handle::open(registry, url, path)?;
    let outcome = handle.up(cancel).await;
    finish(handle, outcome)
}

pub async fn down(
    registry: &DriverRegistry,
    url: &str,
    path: &Path,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut handle = Handle::open(registry, url, path)?;
    let outcome = handle.down(cancel).await;
    finish(handle, outcome)
}

pub async fn redo(
    registry: &DriverRegistry,
    url: &str,
    path: &Path,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut handle = Handle::open(registry, url, path)?;
    let outcome = handle.redo(cancel).await;
    finish(handle, outcome)
}

pub async fn reset(
    registry: &DriverRegistry,
    url: &str,
    path: &Path,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut handle = Handle::open(registry, url, path)?;
    let outcome = handle.reset(cancel).await;
    finish(handle, outcome)
}

pub async fn migrate(
    registry: &DriverRegistry,
    url: &str,
    path: &Path,
    n: i64,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut handle = Handle::open(registry, url, path)?;
    let outcome = handle.migrate(n, cancel).await;
    finish(handle, outcome)
}

pub async fn version(
    registry: &DriverRegistry,
    url: &str,
    path: &Path,
    cancel: &CancellationToken,
) -> Result<Version> {
    let mut handle = Handle::open(registry, url, path)?;
    let outcome = handle.version(cancel).await;
    finish(handle, outcome)
}

pub async fn versions(
    registry: &DriverRegistry,
    url: &str,
    path: &Path,
    cancel: &CancellationToken,
) -> Result<Versions> {
    let mut handle = Handle::open(registry, url, path)?;
    let outcome = handle.versions(cancel).await;
    finish(handle, outcome)
}

pub async fn pending_migrations(
    registry: &DriverRegistry,
    url: &str,
    path: &Path,
    cancel: &CancellationToken,
) -> Result<Vec<File>> {
    let mut handle = Handle::open(registry, url, path)?;
    let outcome = handle.pending_migrations(cancel).await;
    finish(handle, outcome)
}

/// Create a new migration pair. Opens the driver only to learn its file
/// extension and template.
pub fn create(
    registry: &DriverRegistry,
    url: &str,
    path: &Path,
    name: &str,
) -> Result<MigrationFile> {
    let handle = Handle::open(registry, url, path)?;
    let outcome = handle.create(name);
    finish(handle, outcome)
}
