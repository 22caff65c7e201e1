mod error;
mod helpers;
mod migrations;
mod queries;
mod summaries;
mod usage;
mod users;

use std::path::Path;
use std::time::Duration;

use rusqlite::Connection;

pub use error::{DbError, Result};
pub use queries::{DEFAULT_DAY_HISTORY, DEFAULT_MONTH_HISTORY};
pub use summaries::SummaryUpdate;

pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(5_000);

pub struct Db {
    conn: Connection,
}

impl Db {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_busy_timeout(path, DEFAULT_BUSY_TIMEOUT)
    }

    /// Opens the database; writers wait up to `busy_timeout` on a locked file.
    pub fn open_with_busy_timeout(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "temp_store", "MEMORY")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(busy_timeout)?;
        Ok(Self { conn })
    }
}
