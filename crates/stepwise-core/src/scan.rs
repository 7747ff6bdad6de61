//! Discovery of migration files in a directory.

use std::collections::BTreeMap;
use std::path::Path;

use regex::Regex;
use stepwise_common::{Direction, Error, Result, Version};
use tracing::debug;

use crate::file::{File, MigrationFile, MigrationFiles};

/// Pattern matching `{version}_{name}.{up|down}.{extension}[.tpl]`.
pub fn filename_regex(extension: &str) -> Result<Regex> {
    let pattern = format!(
        r"^([0-9]+)_(.*)\.(up|down)\.{}(?:\.tpl)?$",
        regex::escape(extension)
    );
    Regex::new(&pattern)
        .map_err(|e| Error::Config(format!("invalid filename pattern for {extension:?}: {e}")))
}

/// Split a filename into version, name and direction. `None` when the name
/// is not a migration.
pub fn parse_filename(filename: &str, pattern: &Regex) -> Option<(Version, String, Direction)> {
    let caps = pattern.captures(filename)?;
    let version = caps.get(1)?.as_str().parse::<Version>().ok()?;
    let name = caps.get(2)?.as_str().to_string();
    let direction = match caps.get(3)?.as_str() {
        "up" => Direction::Up,
        "down" => Direction::Down,
        _ => return None,
    };
    Some((version, name, direction))
}

/// Read every migration in `dir`, pairing up and down files by version.
///
/// Entries that do not match `pattern` are skipped. Two files claiming the
/// same version and direction are rejected.
pub fn read_migration_files(dir: &Path, pattern: &Regex) -> Result<MigrationFiles> {
    let entries = std::fs::read_dir(dir).map_err(|e| {
        Error::Io(std::io::Error::new(
            e.kind(),
            format!("failed to read migrations directory {}: {e}", dir.display()),
        ))
    })?;

    let mut filenames = Vec::new();
    for entry in entries {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            continue;
        }
        if let Ok(name) = entry.file_name().into_string() {
            filenames.push(name);
        }
    }
    filenames.sort();

    let mut by_version: BTreeMap<Version, MigrationFile> = BTreeMap::new();
    for filename in filenames {
        let Some((version, name, direction)) = parse_filename(&filename, pattern) else {
            continue;
        };
        let migration = by_version.entry(version).or_insert_with(|| MigrationFile {
            version,
            up: None,
            down: None,
        });
        let slot = migration.slot_mut(direction);
        if let Some(existing) = slot {
            return Err(Error::DuplicateMigration {
                version,
                first: existing.filename.clone(),
                second: filename,
            });
        }
        *slot = Some(File::new(dir, filename, version, name, direction));
    }

    debug!(
        "found {} migrations in {}",
        by_version.len(),
        dir.display()
    );
    Ok(MigrationFiles::new(by_version.into_values().collect()))
}
