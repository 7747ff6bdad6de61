//! Versioned migration engine.
//!
//! Migration scripts live in one directory as
//! `{version}_{name}.{up|down}.{extension}[.tpl]`. A [`Handle`] pairs that
//! directory with one [`Driver`] connection and applies the scripts in
//! version order under the store's advisory lock.

pub mod algebra;
pub mod create;
pub mod driver;
pub mod file;
pub mod handle;
mod lock;
pub mod registry;
pub mod scan;
pub mod shortcuts;
pub mod template;

pub use driver::{Capabilities, Driver};
pub use file::{File, MigrationFile, MigrationFiles};
pub use handle::{Handle, Hook, HookError, State};
pub use registry::{DriverFactory, DriverRegistry};
pub use stepwise_common::{Direction, Error, Result, Version, Versions};
pub use tokio_util::sync::CancellationToken;
