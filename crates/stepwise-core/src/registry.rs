use std::collections::BTreeMap;
use std::sync::Arc;

use stepwise_common::{Error, Result};
use tracing::debug;

use crate::driver::Driver;

/// Opens a driver for a connection locator.
pub type DriverFactory = Arc<dyn Fn(&str) -> Result<Box<dyn Driver>> + Send + Sync>;

/// Maps URL schemes to adapter factories.
///
/// Built once at startup; each adapter crate exposes a `register` function
/// that adds its schemes.
#[derive(Default, Clone)]
pub struct DriverRegistry {
    factories: BTreeMap<String, DriverFactory>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, scheme: &str, factory: F) -> Result<()>
    where
        F: Fn(&str) -> Result<Box<dyn Driver>> + Send + Sync + 'static,
    {
        if scheme.is_empty() || !scheme.chars().all(is_scheme_char) {
            return Err(Error::Config(format!("invalid driver scheme {scheme:?}")));
        }
        if self.factories.contains_key(scheme) {
            return Err(Error::Config(format!(
                "driver for scheme '{scheme}' registered twice"
            )));
        }
        debug!("registered driver for {scheme}://");
        self.factories.insert(scheme.to_string(), Arc::new(factory));
        Ok(())
    }

    pub fn contains(&self, scheme: &str) -> bool {
        self.factories.contains_key(scheme)
    }

    /// Registered schemes, sorted.
    pub fn schemes(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Open a driver for `url`, picking the adapter by its scheme.
    pub fn open(&self, url: &str) -> Result<Box<dyn Driver>> {
        let scheme =
            scheme_of(url).ok_or_else(|| Error::Config(format!("no scheme found in {url:?}")))?;
        let factory = self
            .factories
            .get(scheme)
            .ok_or_else(|| Error::Config(format!("driver '{scheme}' not found")))?;
        factory(url)
    }
}

impl std::fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverRegistry")
            .field("schemes", &self.schemes())
            .finish()
    }
}

/// Scheme of a URL-like locator: the word characters before `://`.
pub fn scheme_of(url: &str) -> Option<&str> {
    let (scheme, _) = url.split_once("://")?;
    (!scheme.is_empty() && scheme.chars().all(is_scheme_char)).then_some(scheme)
}

/// Strip one leading dot and reject an empty extension.
pub fn normalize_extension(ext: &str) -> Result<String> {
    let ext = ext.strip_prefix('.').unwrap_or(ext);
    if ext.is_empty() {
        return Err(Error::Config("migration file extension is empty".into()));
    }
    Ok(ext.to_string())
}

fn is_scheme_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}
