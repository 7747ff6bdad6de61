use std::path::PathBuf;

use clap::{Parser, Subcommand};
use stepwise_common::Result;
use stepwise_config::{ConfigLoader, MigrateConfig};

#[derive(Debug, Parser)]
#[command(name = "stepwise", version, about = "Versioned schema migrations")]
pub struct Cli {
    /// Database locator; its scheme picks the driver (e.g. sqlite3://app.db)
    #[arg(long, global = true)]
    pub url: Option<String>,

    /// Directory holding the migration files
    #[arg(long, global = true)]
    pub path: Option<PathBuf>,

    /// Config file (.yml, .yaml or .toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Give up waiting for the migration lock after this many seconds
    #[arg(long, global = true, value_name = "SECONDS")]
    pub lock_timeout: Option<u64>,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Create a new up/down migration pair
    Create { name: String },
    /// Apply all pending migrations
    Up,
    /// Roll back all applied migrations
    Down,
    /// Roll back the last migration and apply it again
    Redo,
    /// Roll back everything, then apply everything
    Reset,
    /// Apply the next N migrations, or roll back the last N when negative
    Migrate {
        #[arg(allow_negative_numbers = true)]
        n: i64,
    },
    /// Apply one specific version
    Apply { version: u64 },
    /// Roll back one specific version
    Rollback { version: u64 },
    /// Print the current version
    Version,
    /// Print every applied version
    Versions,
    /// List pending migrations
    Pending,
}

impl Cli {
    /// Config file, then `STEPWISE_*` variables, then flags.
    pub fn resolve_config(&self) -> Result<MigrateConfig> {
        self.resolve_config_with_env(|key| std::env::var(key).ok())
    }

    pub fn resolve_config_with_env<F>(&self, lookup: F) -> Result<MigrateConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let loader = match &self.config {
            Some(file) => ConfigLoader::new().with_file(file),
            None => ConfigLoader::new(),
        };
        let mut config = loader.load_with_env(lookup)?;
        if let Some(url) = &self.url {
            config.url = Some(url.clone());
        }
        if let Some(path) = &self.path {
            config.path = path.clone();
        }
        if let Some(secs) = self.lock_timeout {
            config.lock_timeout_secs = Some(secs);
        }
        Ok(config)
    }
}
