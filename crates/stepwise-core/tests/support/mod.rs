//! Recording in-memory driver shared by the engine tests.

#![allow(dead_code)]

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;

use stepwise_core::{Capabilities, Direction, Driver, Error, File, Result, Version, Versions};

/// Everything the fake store saw, plus the failures it should inject.
#[derive(Debug, Default)]
pub struct Recorder {
    pub applied: BTreeSet<u64>,
    /// `"{direction} {version}"` per migrate call, in order.
    pub migrated: Vec<String>,
    /// Lock bookkeeping and close calls, in order.
    pub calls: Vec<&'static str>,
    pub fail_on: Option<(Direction, u64)>,
    pub fail_lock: bool,
    pub fail_unlock: bool,
}

/// Blocks `lock()` until opened.
#[derive(Clone, Default)]
pub struct Gate(Arc<(Mutex<bool>, Condvar)>);

impl Gate {
    pub fn open(&self) {
        let (open, signal) = &*self.0;
        *open.lock().unwrap() = true;
        signal.notify_all();
    }

    fn wait(&self) {
        let (open, signal) = &*self.0;
        let guard = open.lock().unwrap();
        let _ = signal
            .wait_timeout_while(guard, Duration::from_secs(5), |open| !*open)
            .unwrap();
    }
}

#[derive(Clone, Default)]
pub struct Store(Arc<Mutex<Recorder>>);

impl Store {
    pub fn get(&self) -> MutexGuard<'_, Recorder> {
        self.0.lock().unwrap()
    }

    pub fn applied(&self) -> Vec<u64> {
        self.get().applied.iter().copied().collect()
    }

    pub fn migrated(&self) -> Vec<String> {
        self.get().migrated.clone()
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.get().calls.clone()
    }

    pub fn driver(&self) -> FakeDriver {
        FakeDriver {
            store: self.clone(),
            capabilities: Capabilities::default(),
            gate: None,
        }
    }

    pub fn locking_driver(&self) -> FakeDriver {
        FakeDriver {
            store: self.clone(),
            capabilities: Capabilities {
                locking: true,
                templates: true,
            },
            gate: None,
        }
    }

    /// Poll until `check` holds, for state changed by detached tasks.
    pub async fn eventually(&self, check: impl Fn(&Recorder) -> bool) -> bool {
        for _ in 0..200 {
            if check(&self.get()) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }
}

pub struct FakeDriver {
    store: Store,
    capabilities: Capabilities,
    gate: Option<Gate>,
}

impl FakeDriver {
    pub fn gated(mut self, gate: &Gate) -> Self {
        self.gate = Some(gate.clone());
        self
    }

    pub fn boxed(self) -> Box<dyn Driver> {
        Box::new(self)
    }
}

pub const TEMPLATE: &[u8] = b"-- fake template\n";

impl Driver for FakeDriver {
    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn file_extension(&self) -> &str {
        ".sql"
    }

    fn file_template(&self) -> Option<&[u8]> {
        Some(TEMPLATE)
    }

    fn migrate(&mut self, file: &mut File) -> Result<()> {
        file.read_content()?;
        let mut rec = self.store.get();
        let version = file.version.get();
        rec.migrated.push(format!("{} {version}", file.direction));
        if rec.fail_on == Some((file.direction, version)) {
            return Err(Error::Driver(format!("boom in {}", file.filename)));
        }
        match file.direction {
            Direction::Up => rec.applied.insert(version),
            Direction::Down => rec.applied.remove(&version),
        };
        Ok(())
    }

    fn versions(&mut self) -> Result<Versions> {
        Ok(self
            .store
            .get()
            .applied
            .iter()
            .map(|v| Version::new(*v))
            .collect())
    }

    fn execute(&mut self, _statement: &str) -> Result<()> {
        Ok(())
    }

    fn lock(&mut self) -> Result<()> {
        if let Some(gate) = &self.gate {
            gate.wait();
        }
        let mut rec = self.store.get();
        if rec.fail_lock {
            return Err(Error::Lock("lock refused".into()));
        }
        rec.calls.push("lock");
        Ok(())
    }

    fn unlock(&mut self) -> Result<()> {
        let mut rec = self.store.get();
        if rec.fail_unlock {
            return Err(Error::Driver("connection reset".into()));
        }
        rec.calls.push("unlock");
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.store.get().calls.push("close");
        Ok(())
    }
}

/// Write an up and a down file for each `(version, name)`.
pub fn write_pairs(dir: &Path, pairs: &[(u64, &str)]) {
    for (version, name) in pairs {
        for direction in ["up", "down"] {
            std::fs::write(
                dir.join(format!("{version}_{name}.{direction}.sql")),
                format!("-- {name} {direction}\n"),
            )
            .unwrap();
        }
    }
}
