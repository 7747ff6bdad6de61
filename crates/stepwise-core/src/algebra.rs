//! Selection of the files an operation should run.
//!
//! The applied-version set reported by the store is the only source of
//! truth: a version is pending exactly when it is absent from that set, no
//! matter where it sorts relative to the applied ones.

use std::cmp::Reverse;

use stepwise_common::Versions;

use crate::file::{File, MigrationFiles};

impl MigrationFiles {
    /// Up files for every version not yet applied, ascending.
    pub fn pending(&self, versions: &Versions) -> Vec<File> {
        let mut migrations: Vec<_> = self.iter().collect();
        migrations.sort_by_key(|m| m.version);
        migrations
            .into_iter()
            .filter(|m| !versions.contains(m.version))
            .filter_map(|m| m.up.clone())
            .collect()
    }

    /// Down files for every applied version, most recent first.
    pub fn applied(&self, versions: &Versions) -> Vec<File> {
        let mut migrations: Vec<_> = self.iter().collect();
        migrations.sort_by_key(|m| Reverse(m.version));
        migrations
            .into_iter()
            .filter(|m| versions.contains(m.version))
            .filter_map(|m| m.down.clone())
            .collect()
    }

    /// Step `n` migrations from the current state: forward when positive,
    /// backward when negative. Requests beyond what is available are
    /// clamped.
    pub fn relative(&self, n: i64, versions: &Versions) -> Vec<File> {
        let files = match n {
            0 => return Vec::new(),
            n if n > 0 => self.pending(versions),
            _ => self.applied(versions),
        };
        let take = usize::try_from(n.unsigned_abs()).unwrap_or(usize::MAX);
        files.into_iter().take(take).collect()
    }
}
