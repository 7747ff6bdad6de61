use stepwise_common::{Result, Version, Versions};

use crate::file::File;

/// Optional features an adapter declares up front. The engine only calls
/// `lock`/`unlock` when `locking` is set and only seeds new files from
/// `file_template` when `templates` is set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub locking: bool,
    pub templates: bool,
}

/// Store adapter consumed by the engine.
///
/// Calls are blocking from the engine's point of view. A driver instance
/// owns one connection and is used from one task at a time.
pub trait Driver: Send {
    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }

    /// Extension of migration files for this store, without a leading dot.
    fn file_extension(&self) -> &str;

    /// Seed content for newly created migration files.
    fn file_template(&self) -> Option<&[u8]> {
        None
    }

    /// Apply (up) or roll back (down) one file and record the change in the
    /// store's version bookkeeping as part of the same operation.
    fn migrate(&mut self, file: &mut File) -> Result<()>;

    /// Highest applied version, zero when none.
    fn version(&mut self) -> Result<Version> {
        Ok(self.versions()?.latest())
    }

    /// All applied versions, most recent first.
    fn versions(&mut self) -> Result<Versions>;

    /// Run one ad hoc statement outside the migration flow.
    fn execute(&mut self, statement: &str) -> Result<()>;

    /// Take the store's exclusive advisory lock, waiting as long as needed.
    fn lock(&mut self) -> Result<()> {
        Ok(())
    }

    fn unlock(&mut self) -> Result<()> {
        Ok(())
    }

    /// Release the connection. Last call on the driver.
    fn close(&mut self) -> Result<()>;
}
