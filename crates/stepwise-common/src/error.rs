use std::time::Duration;

use thiserror::Error;

use crate::version::{Direction, Version};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("duplicate migration file version {version}: {first:?} and {second:?}")]
    DuplicateMigration {
        version: Version,
        first: String,
        second: String,
    },

    #[error("template error in {file}: {message}")]
    Template { file: String, message: String },

    #[error("invalid migration name {0:?}")]
    InvalidName(String),

    #[error("lock error: {0}")]
    Lock(String),

    #[error("timed out after {0:?} waiting for the migration lock")]
    LockTimeout(Duration),

    #[error("canceled while waiting for the migration lock")]
    Canceled,

    #[error("interrupted before applying version {version}")]
    Interrupted { version: Version },

    #[error("driver error: {0}")]
    Driver(String),

    #[error("{stage}-hook for migration {file:?} failed: {message}")]
    Hook {
        stage: &'static str,
        file: String,
        message: String,
    },

    #[error("migration {version} ({name}) failed: {source}")]
    Step {
        version: Version,
        name: String,
        #[source]
        source: Box<Error>,
    },

    #[error("version {0} is already applied")]
    AlreadyApplied(Version),

    #[error("version {0} is not applied")]
    NotApplied(Version),

    #[error("no `{direction}` migration file for version {version}")]
    MissingFile {
        version: Version,
        direction: Direction,
    },

    #[error("{0}")]
    Poisoned(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Attach the offending file's identity to a per-step failure.
    pub fn in_step(self, version: Version, name: impl Into<String>) -> Self {
        Error::Step {
            version,
            name: name.into(),
            source: Box::new(self),
        }
    }
}
