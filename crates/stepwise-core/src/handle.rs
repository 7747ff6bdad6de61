//! The migration handle: one driver connection plus one migrations directory.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use regex::Regex;
use stepwise_common::{Direction, Error, Result, Version, Versions};
use stepwise_config::MigrateConfig;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::create::create_migration;
use crate::driver::{Capabilities, Driver};
use crate::file::{File, MigrationFile, MigrationFiles};
use crate::lock::{self, SharedAbandoned, SharedDriver};
use crate::registry::{DriverRegistry, normalize_extension};
use crate::scan;

pub type HookError = Box<dyn std::error::Error + Send + Sync>;

/// Callback run around every migrated file. Returning an error stops the
/// operation.
pub type Hook = Arc<dyn Fn(&File) -> std::result::Result<(), HookError> + Send + Sync>;

/// Lifecycle of a [`Handle`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum State {
    Ready,
    /// An operation holds the advisory lock.
    Locked,
    /// The lock could not be released; the connection has been closed and
    /// every call fails with the stored reason.
    Poisoned(String),
}

pub struct Handle {
    driver: SharedDriver,
    abandoned: SharedAbandoned,
    migrations_path: PathBuf,
    state: State,
    capabilities: Capabilities,
    extension: String,
    template: Vec<u8>,
    pattern: Regex,
    pre_hook: Option<Hook>,
    post_hook: Option<Hook>,
    lock_timeout: Option<Duration>,
}

impl Handle {
    pub fn new(driver: Box<dyn Driver>, migrations_path: impl Into<PathBuf>) -> Result<Self> {
        let capabilities = driver.capabilities();
        let extension = normalize_extension(driver.file_extension())?;
        let template = if capabilities.templates {
            driver.file_template().map(<[u8]>::to_vec).unwrap_or_default()
        } else {
            Vec::new()
        };
        let pattern = scan::filename_regex(&extension)?;

        Ok(Self {
            driver: Arc::new(Mutex::new(driver)),
            abandoned: SharedAbandoned::default(),
            migrations_path: migrations_path.into(),
            state: State::Ready,
            capabilities,
            extension,
            template,
            pattern,
            pre_hook: None,
            post_hook: None,
            lock_timeout: None,
        })
    }

    /// Open the adapter registered for `url`'s scheme.
    pub fn open(
        registry: &DriverRegistry,
        url: &str,
        migrations_path: impl Into<PathBuf>,
    ) -> Result<Self> {
        let driver = registry.open(url)?;
        Self::new(driver, migrations_path)
    }

    pub fn from_config(registry: &DriverRegistry, config: &MigrateConfig) -> Result<Self> {
        let url = config
            .url
            .as_deref()
            .ok_or_else(|| Error::Config("no database url configured".into()))?;
        let handle = Self::open(registry, url, &config.path)?;
        Ok(match config.lock_timeout() {
            Some(limit) => handle.with_lock_timeout(limit),
            None => handle,
        })
    }

    pub fn with_hooks(self, pre: Hook, post: Hook) -> Self {
        self.with_pre_hook(pre).with_post_hook(post)
    }

    pub fn with_pre_hook(mut self, hook: Hook) -> Self {
        self.pre_hook = Some(hook);
        self
    }

    pub fn with_post_hook(mut self, hook: Hook) -> Self {
        self.post_hook = Some(hook);
        self
    }

    /// Give up waiting for the advisory lock after `limit`.
    pub fn with_lock_timeout(mut self, limit: Duration) -> Self {
        self.lock_timeout = Some(limit);
        self
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn migrations_path(&self) -> &Path {
        &self.migrations_path
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn lock_timeout(&self) -> Option<Duration> {
        self.lock_timeout
    }

    /// Apply every pending migration.
    pub async fn up(&mut self, cancel: &CancellationToken) -> Result<()> {
        let took = self.acquire(cancel).await?;
        let outcome = self.run_selected(cancel, |files, versions| files.pending(versions));
        self.release(took, outcome)
    }

    /// Roll back every applied migration.
    pub async fn down(&mut self, cancel: &CancellationToken) -> Result<()> {
        let took = self.acquire(cancel).await?;
        let outcome = self.run_selected(cancel, |files, versions| files.applied(versions));
        self.release(took, outcome)
    }

    /// Apply the next `n` pending migrations, or roll back the last `-n`
    /// applied ones when `n` is negative.
    pub async fn migrate(&mut self, n: i64, cancel: &CancellationToken) -> Result<()> {
        let took = self.acquire(cancel).await?;
        let outcome = self.run_selected(cancel, |files, versions| files.relative(n, versions));
        self.release(took, outcome)
    }

    /// Roll back the last applied migration and apply it again.
    pub async fn redo(&mut self, cancel: &CancellationToken) -> Result<()> {
        let took = self.acquire(cancel).await?;
        let outcome = match self.migrate(-1, cancel).await {
            Ok(()) => self.migrate(1, cancel).await,
            Err(e) => Err(e),
        };
        self.release(took, outcome)
    }

    /// Roll everything back, then apply everything.
    pub async fn reset(&mut self, cancel: &CancellationToken) -> Result<()> {
        let took = self.acquire(cancel).await?;
        let outcome = match self.down(cancel).await {
            Ok(()) => self.up(cancel).await,
            Err(e) => Err(e),
        };
        self.release(took, outcome)
    }

    /// Apply exactly one version, regardless of order.
    pub async fn apply_version(&mut self, version: Version, cancel: &CancellationToken) -> Result<()> {
        self.migrate_version(version, Direction::Up, cancel).await
    }

    /// Roll back exactly one applied version.
    pub async fn rollback_version(
        &mut self,
        version: Version,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.migrate_version(version, Direction::Down, cancel).await
    }

    pub async fn version(&mut self, cancel: &CancellationToken) -> Result<Version> {
        let took = self.acquire(cancel).await?;
        let outcome = self.driver().and_then(|mut driver| driver.version());
        self.release(took, outcome)
    }

    pub async fn versions(&mut self, cancel: &CancellationToken) -> Result<Versions> {
        let took = self.acquire(cancel).await?;
        let outcome = self.driver().and_then(|mut driver| driver.versions());
        self.release(took, outcome)
    }

    /// Up files that `up` would run, in order.
    pub async fn pending_migrations(&mut self, cancel: &CancellationToken) -> Result<Vec<File>> {
        let took = self.acquire(cancel).await?;
        let outcome = self.current().map(|(files, versions)| files.pending(&versions));
        self.release(took, outcome)
    }

    /// Write a new up/down pair named `name`. Touches only the filesystem.
    pub fn create(&self, name: &str) -> Result<MigrationFile> {
        self.check_usable()?;
        create_migration(
            &self.migrations_path,
            &self.extension,
            &self.template,
            name,
            Utc::now(),
        )
    }

    /// Close the driver connection. If a lock wait this handle gave up on
    /// still owns the connection, that wait closes it when it returns.
    pub fn close(self) -> Result<()> {
        if matches!(self.state, State::Poisoned(_)) {
            return Ok(());
        }
        lock::close(&self.driver, &self.abandoned)
    }

    async fn migrate_version(
        &mut self,
        version: Version,
        direction: Direction,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let took = self.acquire(cancel).await?;
        let outcome = self.run_single(version, direction, cancel);
        self.release(took, outcome)
    }

    fn run_selected<F>(&mut self, cancel: &CancellationToken, select: F) -> Result<()>
    where
        F: FnOnce(&MigrationFiles, &Versions) -> Vec<File>,
    {
        let (files, versions) = self.current()?;
        self.apply(select(&files, &versions), cancel)
    }

    fn run_single(
        &mut self,
        version: Version,
        direction: Direction,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let (files, versions) = self.current()?;
        match (direction, versions.contains(version)) {
            (Direction::Up, true) => return Err(Error::AlreadyApplied(version)),
            (Direction::Down, false) => return Err(Error::NotApplied(version)),
            _ => {}
        }
        let file = files
            .get(version)
            .and_then(|m| m.file(direction))
            .cloned()
            .ok_or(Error::MissingFile { version, direction })?;
        self.apply(vec![file], cancel)
    }

    /// Fresh view of the directory and the store.
    fn current(&self) -> Result<(MigrationFiles, Versions)> {
        let files = scan::read_migration_files(&self.migrations_path, &self.pattern)?;
        let versions = self.driver()?.versions()?;
        Ok((files, versions))
    }

    fn apply(&mut self, files: Vec<File>, cancel: &CancellationToken) -> Result<()> {
        if files.is_empty() {
            info!("no migrations to run");
            return Ok(());
        }
        let count = files.len();
        for mut file in files {
            let (version, name) = (file.version, file.name.clone());
            self.step(&mut file, cancel)
                .map_err(|e| e.in_step(version, name))?;
        }
        info!("ran {count} migration(s)");
        Ok(())
    }

    fn step(&self, file: &mut File, cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(Error::Interrupted {
                version: file.version,
            });
        }
        run_hook("pre", self.pre_hook.as_ref(), file)?;
        info!("migrating {} {}", file.direction, file.filename);
        self.driver()?.migrate(file)?;
        run_hook("post", self.post_hook.as_ref(), file)
    }

    /// Take the advisory lock unless this handle already holds it. Returns
    /// whether this call took it and must release it.
    async fn acquire(&mut self, cancel: &CancellationToken) -> Result<bool> {
        if let Some(reason) = lock::late_failure(&self.abandoned) {
            self.state = State::Poisoned(reason);
        }
        self.check_usable()?;
        if self.state == State::Locked {
            return Ok(false);
        }
        if cancel.is_cancelled() {
            return Err(Error::Canceled);
        }
        if self.capabilities.locking {
            debug!("waiting for migration lock");
            lock::acquire(&self.driver, &self.abandoned, cancel, self.lock_timeout).await?;
            debug!("migration lock acquired");
        }
        self.state = State::Locked;
        Ok(true)
    }

    fn release<T>(&mut self, took: bool, outcome: Result<T>) -> Result<T> {
        if !took {
            return outcome;
        }
        self.state = State::Ready;
        if !self.capabilities.locking {
            return outcome;
        }

        let Err(e) = self.driver().and_then(|mut driver| driver.unlock()) else {
            debug!("migration lock released");
            return outcome;
        };
        let reason = format!(
            "connection closed, this handle is no longer usable - failed to unlock database after last session: {e}"
        );
        if let Ok(mut driver) = self.driver() {
            if let Err(close) = driver.close() {
                warn!("failed to close connection after unlock failure: {close}");
            }
        }
        error!("{reason}");
        self.state = State::Poisoned(reason.clone());
        match outcome {
            Ok(_) => Err(Error::Poisoned(reason)),
            Err(e) => Err(e),
        }
    }

    fn check_usable(&self) -> Result<()> {
        if let State::Poisoned(reason) = &self.state {
            return Err(Error::Poisoned(reason.clone()));
        }
        match lock::late_failure(&self.abandoned) {
            Some(reason) => Err(Error::Poisoned(reason)),
            None => Ok(()),
        }
    }

    fn driver(&self) -> Result<MutexGuard<'_, Box<dyn Driver>>> {
        self.driver
            .lock()
            .map_err(|_| Error::Driver("driver mutex poisoned".into()))
    }
}

impl std::fmt::Debug for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handle")
            .field("migrations_path", &self.migrations_path)
            .field("state", &self.state)
            .field("capabilities", &self.capabilities)
            .field("extension", &self.extension)
            .field("lock_timeout", &self.lock_timeout)
            .finish_non_exhaustive()
    }
}

fn run_hook(stage: &'static str, hook: Option<&Hook>, file: &File) -> Result<()> {
    let Some(hook) = hook else {
        return Ok(());
    };
    hook(file).map_err(|e| Error::Hook {
        stage,
        file: file.filename.clone(),
        message: e.to_string(),
    })
}
