use rusqlite::Connection;
use stepwise_common::{Error, Result, Version, Versions};
use stepwise_core::{Capabilities, Driver, File};
use stepwise_script::Script;
use tracing::{debug, info};

use crate::target::{SqliteTarget, record};
use crate::{FILE_TEMPLATE, SCHEME, VERSIONS_TABLE};

const MEMORY: &str = ":memory:";

/// One SQLite connection with a `schema_migrations` table.
///
/// SQLite serialises writers with its own file lock, so the adapter does not
/// declare advisory locking.
pub struct SqliteDriver {
    conn: Option<Connection>,
}

impl SqliteDriver {
    /// Open `sqlite3://{path}`. An empty path or `:memory:` opens a private
    /// in-memory database.
    pub fn open(url: &str) -> Result<Self> {
        let path = url
            .strip_prefix(SCHEME)
            .and_then(|rest| rest.strip_prefix("://"))
            .ok_or_else(|| Error::Config(format!("invalid {SCHEME}:// url {url:?}")))?;

        let conn = if path.is_empty() || path == MEMORY {
            Connection::open_in_memory()
                .map_err(|e| Error::Driver(format!("failed to open in-memory database: {e}")))?
        } else {
            info!("opening sqlite database at {path}");
            Connection::open(path)
                .map_err(|e| Error::Driver(format!("failed to open database: {e}")))?
        };
        Self::from_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        Self::open(&format!("{SCHEME}://{MEMORY}"))
    }

    /// Adopt an already open connection.
    pub fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(|e| Error::Driver(format!("failed to set pragmas: {e}")))?;
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {VERSIONS_TABLE} (version INTEGER PRIMARY KEY NOT NULL);"
        ))
        .map_err(|e| Error::Driver(format!("failed to create {VERSIONS_TABLE}: {e}")))?;
        Ok(Self { conn: Some(conn) })
    }

    fn connection(&self) -> Result<&Connection> {
        self.conn
            .as_ref()
            .ok_or_else(|| Error::Driver("connection is closed".into()))
    }
}

impl Driver for SqliteDriver {
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            locking: false,
            templates: true,
        }
    }

    fn file_extension(&self) -> &str {
        "sql"
    }

    fn file_template(&self) -> Option<&[u8]> {
        Some(FILE_TEMPLATE)
    }

    fn migrate(&mut self, file: &mut File) -> Result<()> {
        let script = Script::parse(file.read_text()?)
            .map_err(|e| Error::Driver(format!("failed to parse {}: {e}", file.filename)))?;
        let conn = self.connection()?;
        let mut target = SqliteTarget {
            conn,
            version: file.version,
            direction: file.direction,
        };

        script
            .execute(&mut target)
            .map_err(|e| Error::Driver(e.to_string()))?;

        // Without the whole-file transaction there was nowhere to record
        // the version atomically.
        if script.no_tx() || script.is_empty() {
            record(conn, file.version, file.direction).map_err(|e| {
                Error::Driver(format!(
                    "migration {} was applied, but recording it failed: {e}",
                    file.version
                ))
            })?;
        }
        debug!("{} {} recorded", file.direction, file.version);
        Ok(())
    }

    fn versions(&mut self) -> Result<Versions> {
        let conn = self.connection()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT version FROM {VERSIONS_TABLE} ORDER BY version DESC"
            ))
            .map_err(|e| Error::Driver(format!("failed to prepare query: {e}")))?;
        let rows = stmt
            .query_map([], |row| row.get::<_, i64>(0))
            .map_err(|e| Error::Driver(format!("failed to read versions: {e}")))?;

        let mut versions = Vec::new();
        for row in rows {
            let value = row.map_err(|e| Error::Driver(format!("failed to read version: {e}")))?;
            let value = u64::try_from(value)
                .map_err(|_| Error::Driver(format!("negative version {value} in {VERSIONS_TABLE}")))?;
            versions.push(Version::new(value));
        }
        Ok(Versions::new(versions))
    }

    fn execute(&mut self, statement: &str) -> Result<()> {
        self.connection()?
            .execute_batch(statement)
            .map_err(|e| Error::Driver(format!("failed to execute statement: {e}")))
    }

    fn close(&mut self) -> Result<()> {
        let Some(conn) = self.conn.take() else {
            return Ok(());
        };
        conn.close()
            .map_err(|(_, e)| Error::Driver(format!("failed to close database: {e}")))
    }
}
