//! SQLite adapter. Register it once at startup:
//!
//! ```no_run
//! let mut registry = stepwise_core::DriverRegistry::new();
//! stepwise_sqlite::register(&mut registry).unwrap();
//! let handle = stepwise_core::Handle::open(&registry, "sqlite3://app.db", "migrations");
//! ```

mod driver;
mod target;

pub use driver::SqliteDriver;

use stepwise_common::Result;
use stepwise_core::{Driver, DriverRegistry};

pub const SCHEME: &str = "sqlite3";

/// Table holding one row per applied version.
pub const VERSIONS_TABLE: &str = "schema_migrations";

pub(crate) const FILE_TEMPLATE: &[u8] = b"
-- Each statement MUST end with a semicolon (;) followed by a newline.
-- The whole migration runs inside one transaction by default.
-- Place statements between \"-- TXBEGIN\" and \"-- TXEND\" comments for custom transactions:
--   - a migration CAN hold several separate transactions
--   - statements outside TXBEGIN/TXEND blocks run without a transaction.
-- Add \"-- NOTX\" above all statements to disable the default transaction.
--   It is implied when TXBEGIN/TXEND is used.
";

/// Make `sqlite3://` locators available to `registry`.
pub fn register(registry: &mut DriverRegistry) -> Result<()> {
    registry.register(SCHEME, |url| {
        let driver: Box<dyn Driver> = Box::new(SqliteDriver::open(url)?);
        Ok(driver)
    })
}
