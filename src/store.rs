use rusqlite::{Connection, OpenFlags};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::Error;

pub const DEFAULT_DATABASE: &str = "stomp_server.db";
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS users (
        username            TEXT PRIMARY KEY,
        password            TEXT,
        registration_date   TEXT
    );

    CREATE TABLE IF NOT EXISTS login_history (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        username    TEXT,
        login_time  TEXT,
        logout_time TEXT
    );

    CREATE TABLE IF NOT EXISTS file_tracking (
        id              INTEGER PRIMARY KEY AUTOINCREMENT,
        username        TEXT,
        filename        TEXT,
        upload_time     TEXT,
        game_channel    TEXT
    );
";

/// Location and connection settings of the SQLite file shared by every connection handler.
///
/// The store is cheap to clone. It holds no open database handle: each caller opens its own
/// connection, and concurrent access is arbitrated by SQLite's own locking (WAL journal plus a
/// busy timeout), so there is no lock around store access in this process.
#[derive(Debug, Clone)]
pub struct Store {
    path: Arc<PathBuf>,
    busy_timeout: Duration,
}

impl Store {
    pub fn new(path: impl Into<PathBuf>, busy_timeout: Duration) -> Store {
        Store {
            path: Arc::new(path.into()),
            busy_timeout,
        }
    }

    /// Creates the relations if they don't exist yet. Safe to run against an already initialized
    /// store. Must succeed before any connection is accepted.
    pub fn bootstrap(&self) -> Result<(), Error> {
        let conn = Connection::open(self.path.as_path())?;
        conn.busy_timeout(self.busy_timeout)?;

        // WAL lets readers proceed while a writer holds the lock.
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(SCHEMA)?;

        info!("Database initialized at {}", self.path.display());
        Ok(())
    }

    /// Opens a fresh connection to an existing store. The file is never created here, a missing
    /// store is reported as an error.
    pub fn connect(&self) -> rusqlite::Result<Connection> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(self.path.as_path(), flags)?;
        conn.busy_timeout(self.busy_timeout)?;
        Ok(conn)
    }
}
