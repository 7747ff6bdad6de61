use rusqlite::{Connection, params};
use stepwise_common::{Direction, Error, Result, Version};
use stepwise_script::{ScriptTarget, TargetError};

use crate::VERSIONS_TABLE;

/// Runs a parsed script on one connection and, inside the default
/// transaction, records the version change.
pub(crate) struct SqliteTarget<'a> {
    pub(crate) conn: &'a Connection,
    pub(crate) version: Version,
    pub(crate) direction: Direction,
}

impl ScriptTarget for SqliteTarget<'_> {
    fn begin(&mut self) -> std::result::Result<(), TargetError> {
        self.conn.execute_batch("BEGIN").map_err(TargetError::new)
    }

    fn execute(&mut self, statement: &str) -> std::result::Result<(), TargetError> {
        self.conn.execute_batch(statement).map_err(TargetError::new)
    }

    fn commit(&mut self) -> std::result::Result<(), TargetError> {
        self.conn.execute_batch("COMMIT").map_err(TargetError::new)
    }

    fn rollback(&mut self) -> std::result::Result<(), TargetError> {
        self.conn.execute_batch("ROLLBACK").map_err(TargetError::new)
    }

    fn before_commit(&mut self) -> std::result::Result<(), TargetError> {
        record(self.conn, self.version, self.direction).map_err(TargetError::new)
    }
}

/// Insert the version on up, delete it on down.
pub(crate) fn record(conn: &Connection, version: Version, direction: Direction) -> Result<()> {
    let value = i64::try_from(version.get())
        .map_err(|_| Error::Driver(format!("version {version} does not fit in SQLite INTEGER")))?;
    let sql = match direction {
        Direction::Up => format!("INSERT INTO {VERSIONS_TABLE} (version) VALUES (?1)"),
        Direction::Down => format!("DELETE FROM {VERSIONS_TABLE} WHERE version = ?1"),
    };
    conn.execute(&sql, params![value])
        .map_err(|e| Error::Driver(format!("failed to update {VERSIONS_TABLE}: {e}")))?;
    Ok(())
}
