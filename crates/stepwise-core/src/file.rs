use std::path::PathBuf;

use stepwise_common::{Direction, Error, Result, Version};
use tracing::debug;

use crate::template;

const TEMPLATE_SUFFIX: &str = ".tpl";

/// One migration script on disk, e.g. `20240102150405_add_users.up.sql`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct File {
    /// Directory holding the file.
    pub dir: PathBuf,
    pub filename: String,
    pub version: Version,
    /// Migration name parsed from the filename.
    pub name: String,
    pub direction: Direction,
    content: Option<Vec<u8>>,
}

impl File {
    pub fn new(
        dir: impl Into<PathBuf>,
        filename: impl Into<String>,
        version: Version,
        name: impl Into<String>,
        direction: Direction,
    ) -> Self {
        Self {
            dir: dir.into(),
            filename: filename.into(),
            version,
            name: name.into(),
            direction,
            content: None,
        }
    }

    /// Attach content up front; it will never be read from disk.
    pub fn with_content(mut self, content: impl Into<Vec<u8>>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(&self.filename)
    }

    pub fn is_template(&self) -> bool {
        self.filename.ends_with(TEMPLATE_SUFFIX)
    }

    /// Content if it has been loaded.
    pub fn content(&self) -> Option<&[u8]> {
        self.content.as_deref()
    }

    /// Load the content from disk on first use. Template files are rendered
    /// against the process environment before being stored.
    pub fn read_content(&mut self) -> Result<&[u8]> {
        if self.content.is_none() {
            let path = self.path();
            let raw = std::fs::read(&path).map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!("failed to read {}: {e}", path.display()),
                ))
            })?;
            let content = if self.is_template() {
                debug!("rendering template {}", self.filename);
                let text = String::from_utf8(raw).map_err(|e| Error::Template {
                    file: self.filename.clone(),
                    message: format!("not valid UTF-8: {e}"),
                })?;
                template::render_with_env(&self.filename, &text)?.into_bytes()
            } else {
                raw
            };
            self.content = Some(content);
        }
        Ok(self.content.as_deref().unwrap_or_default())
    }

    /// Content as text, loading it first if needed.
    pub fn read_text(&mut self) -> Result<&str> {
        let filename = self.filename.clone();
        let bytes = self.read_content()?;
        std::str::from_utf8(bytes)
            .map_err(|e| Error::Driver(format!("{filename} is not valid UTF-8: {e}")))
    }
}

/// The up and down scripts sharing one version. At least one side is
/// present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFile {
    pub version: Version,
    pub up: Option<File>,
    pub down: Option<File>,
}

impl MigrationFile {
    pub fn file(&self, direction: Direction) -> Option<&File> {
        match direction {
            Direction::Up => self.up.as_ref(),
            Direction::Down => self.down.as_ref(),
        }
    }

    pub(crate) fn slot_mut(&mut self, direction: Direction) -> &mut Option<File> {
        match direction {
            Direction::Up => &mut self.up,
            Direction::Down => &mut self.down,
        }
    }
}

/// Every migration found in a directory, ascending by version.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationFiles(Vec<MigrationFile>);

impl MigrationFiles {
    pub fn new(mut files: Vec<MigrationFile>) -> Self {
        files.sort_by_key(|f| f.version);
        Self(files)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MigrationFile> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[MigrationFile] {
        &self.0
    }

    /// Highest version on disk, if any.
    pub fn last_version(&self) -> Option<Version> {
        self.0.iter().map(|f| f.version).max()
    }

    pub fn get(&self, version: Version) -> Option<&MigrationFile> {
        self.0.iter().find(|f| f.version == version)
    }
}

impl<'a> IntoIterator for &'a MigrationFiles {
    type Item = &'a MigrationFile;
    type IntoIter = std::slice::Iter<'a, MigrationFile>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
