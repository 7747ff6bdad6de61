//! Creation of new up/down migration file pairs.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use stepwise_common::{Direction, Error, Result, Version};
use tracing::info;

use crate::file::{File, MigrationFile};
use crate::scan;

/// Write `{version}_{name}.up.{ext}` and its down counterpart into `dir`.
///
/// The version is `now` formatted as `%Y%m%d%H%M%S`, bumped past the
/// highest version already on disk so two calls within one second still
/// order correctly. Existing files are never overwritten.
pub fn create_migration(
    dir: &Path,
    extension: &str,
    template: &[u8],
    name: &str,
    now: DateTime<Utc>,
) -> Result<MigrationFile> {
    let name = validate_name(name)?;

    std::fs::create_dir_all(dir)?;
    let pattern = scan::filename_regex(extension)?;
    let existing = scan::read_migration_files(dir, &pattern)?;

    let candidate: Version = now
        .format("%Y%m%d%H%M%S")
        .to_string()
        .parse()
        .map_err(|e| Error::Other(format!("failed to derive version from clock: {e}")))?;
    let version = match existing.last_version() {
        Some(latest) if latest >= candidate => latest.next(),
        _ => candidate,
    };

    let up = write_file(dir, extension, template, version, &name, Direction::Up)?;
    let down = write_file(dir, extension, template, version, &name, Direction::Down)?;
    info!("created migration {version}_{name}");

    Ok(MigrationFile {
        version,
        up: Some(up),
        down: Some(down),
    })
}

fn validate_name(name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() || trimmed.contains(['/', '\\']) {
        return Err(Error::InvalidName(name.to_string()));
    }
    Ok(trimmed.replace(' ', "_"))
}

fn write_file(
    dir: &Path,
    extension: &str,
    template: &[u8],
    version: Version,
    name: &str,
    direction: Direction,
) -> Result<File> {
    let filename = format!("{version}_{name}.{direction}.{extension}");
    let path = dir.join(&filename);
    let mut out = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
        .map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("failed to create {}: {e}", path.display()),
            ))
        })?;
    out.write_all(template)?;
    Ok(File::new(dir, filename, version, name, direction).with_content(template))
}
