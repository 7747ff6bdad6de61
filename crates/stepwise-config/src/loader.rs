use std::path::{Path, PathBuf};

use stepwise_common::{Error, Result};
use tracing::{debug, info};

use crate::model::MigrateConfig;

pub const ENV_URL: &str = "STEPWISE_URL";
pub const ENV_PATH: &str = "STEPWISE_PATH";
pub const ENV_LOCK_TIMEOUT: &str = "STEPWISE_LOCK_TIMEOUT";

/// Builds a [`MigrateConfig`] from an optional config file followed by
/// environment overrides.
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    file: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    /// Load using the real process environment.
    pub fn load(&self) -> Result<MigrateConfig> {
        self.load_with_env(|key| std::env::var(key).ok())
    }

    /// Load with an explicit variable lookup, so callers control what
    /// "the environment" means.
    pub fn load_with_env<F>(&self, lookup: F) -> Result<MigrateConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match &self.file {
            Some(path) => load_file(path)?,
            None => MigrateConfig::default(),
        };
        apply_env_overrides(&mut config, lookup)?;
        Ok(config)
    }
}

/// Parse a config file, picking the format from its extension.
pub fn load_file(path: &Path) -> Result<MigrateConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("failed to read {}: {e}", path.display()))
    })?;

    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    let config = match ext {
        "yml" | "yaml" => serde_yaml::from_str(&contents)
            .map_err(|e| Error::Config(format!("YAML parse error: {e}")))?,
        "toml" => {
            toml::from_str(&contents).map_err(|e| Error::Config(format!("TOML parse error: {e}")))?
        }
        other => {
            return Err(Error::Config(format!(
                "unsupported config extension: {other}"
            )));
        }
    };
    info!("config loaded from {}", path.display());
    Ok(config)
}

fn apply_env_overrides<F>(config: &mut MigrateConfig, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = lookup(ENV_URL).filter(|v| !v.is_empty()) {
        debug!("{ENV_URL} overrides configured url");
        config.url = Some(url);
    }
    if let Some(path) = lookup(ENV_PATH).filter(|v| !v.is_empty()) {
        debug!("{ENV_PATH} overrides configured path");
        config.path = PathBuf::from(path);
    }
    if let Some(raw) = lookup(ENV_LOCK_TIMEOUT).filter(|v| !v.is_empty()) {
        let secs = raw.trim().parse::<u64>().map_err(|e| {
            Error::Config(format!("invalid {ENV_LOCK_TIMEOUT} value {raw:?}: {e}"))
        })?;
        config.lock_timeout_secs = Some(secs);
    }
    Ok(())
}
