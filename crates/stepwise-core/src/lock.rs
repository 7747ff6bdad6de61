//! Advisory lock acquisition raced against cancellation and a deadline.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use stepwise_common::{Error, Result};
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::driver::Driver;

pub(crate) type SharedDriver = Arc<Mutex<Box<dyn Driver>>>;

const WAITING: u8 = 0;
const SETTLED: u8 = 1;
const ABANDONED: u8 = 2;

/// Lock waits the handle stopped waiting for but that still own the driver.
#[derive(Debug, Default)]
pub(crate) struct Abandoned {
    in_flight: usize,
    /// The handle was closed while a wait was still in flight.
    close_when_idle: bool,
    /// A late grant could not be released and the connection was closed.
    failure: Option<String>,
}

pub(crate) type SharedAbandoned = Arc<Mutex<Abandoned>>;

fn bookkeeping(abandoned: &Mutex<Abandoned>) -> MutexGuard<'_, Abandoned> {
    abandoned.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Wait for the driver's lock on a blocking task.
///
/// Whichever of grant, cancellation or timeout settles the shared state
/// first decides the outcome. A grant that arrives after the caller gave
/// up is released by the waiting task itself, while it still owns the
/// driver, so the handle never holds a lock it reported as failed.
pub(crate) async fn acquire(
    driver: &SharedDriver,
    abandoned: &SharedAbandoned,
    cancel: &CancellationToken,
    timeout: Option<Duration>,
) -> Result<()> {
    let state = Arc::new(AtomicU8::new(WAITING));

    let mut wait = tokio::task::spawn_blocking({
        let driver = Arc::clone(driver);
        let abandoned = Arc::clone(abandoned);
        let state = Arc::clone(&state);
        move || -> Result<()> {
            let settle = || {
                state
                    .compare_exchange(WAITING, SETTLED, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
            };
            let Ok(mut guard) = driver.lock() else {
                if settle() {
                    return Err(Error::Lock("driver mutex poisoned".into()));
                }
                bookkeeping(&abandoned).in_flight -= 1;
                return Ok(());
            };
            let locked = guard.lock();
            if settle() {
                return locked;
            }
            finish_abandoned(&mut guard, locked, &abandoned);
            Ok(())
        }
    });

    let deadline = async {
        match timeout {
            Some(limit) => {
                tokio::time::sleep(limit).await;
                limit
            }
            None => std::future::pending().await,
        }
    };

    let gave_up = tokio::select! {
        biased;
        joined = &mut wait => return flatten(joined),
        _ = cancel.cancelled() => Error::Canceled,
        limit = deadline => Error::LockTimeout(limit),
    };

    // Counted under the bookkeeping mutex so the waiter cannot finish
    // before it is counted.
    let won = {
        let mut pending = bookkeeping(abandoned);
        let won = state
            .compare_exchange(WAITING, ABANDONED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if won {
            pending.in_flight += 1;
        }
        won
    };
    if !won {
        debug!("migration lock wait settled while giving up, keeping the outcome");
        return flatten(wait.await);
    }

    debug!("stopped waiting for the migration lock: {gave_up}");
    tokio::spawn(async move {
        if let Err(e) = wait.await {
            warn!("abandoned lock wait did not complete: {e}");
        }
    });
    Err(gave_up)
}

/// Runs on the waiting task once a wait nobody is listening to returns.
fn finish_abandoned(
    driver: &mut Box<dyn Driver>,
    locked: Result<()>,
    abandoned: &Mutex<Abandoned>,
) {
    let failure = match locked {
        Ok(()) => {
            warn!("migration lock granted after the caller gave up, releasing it");
            driver.unlock().err().map(|e| {
                format!(
                    "connection closed, this handle is no longer usable - failed to unlock database after abandoned lock wait: {e}"
                )
            })
        }
        Err(e) => {
            debug!("abandoned lock wait failed: {e}");
            None
        }
    };

    let mut pending = bookkeeping(abandoned);
    pending.in_flight -= 1;
    let already_closed = pending.failure.is_some();
    let idle_close = pending.close_when_idle && pending.in_flight == 0;
    if !already_closed && (failure.is_some() || idle_close) {
        if let Err(e) = driver.close() {
            warn!("failed to close connection after abandoned lock wait: {e}");
        }
    }
    if let Some(reason) = failure {
        error!("{reason}");
        pending.failure.get_or_insert(reason);
    }
}

/// Reason the connection was closed by an abandoned wait, if it was.
pub(crate) fn late_failure(abandoned: &SharedAbandoned) -> Option<String> {
    bookkeeping(abandoned).failure.clone()
}

/// Close the driver, or leave the close to the last abandoned wait when one
/// still owns it.
pub(crate) fn close(driver: &SharedDriver, abandoned: &SharedAbandoned) -> Result<()> {
    {
        let mut pending = bookkeeping(abandoned);
        if pending.failure.is_some() {
            return Ok(());
        }
        if pending.in_flight > 0 {
            debug!(
                "closing once {} abandoned lock wait(s) return",
                pending.in_flight
            );
            pending.close_when_idle = true;
            return Ok(());
        }
    }
    driver
        .lock()
        .map_err(|_| Error::Driver("driver mutex poisoned".into()))?
        .close()
}

fn flatten(joined: std::result::Result<Result<()>, JoinError>) -> Result<()> {
    joined.map_err(|e| Error::Lock(format!("lock task failed: {e}")))?
}
