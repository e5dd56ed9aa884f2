use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::path::Path;

pub mod accounts;
pub mod queries;
pub mod reminders;
pub mod schema;
pub mod timetables;

pub fn init_database(db_path: &Path) -> Result<Connection> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(db_path)?;

    // Enable WAL mode
    let mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    log::debug!("SQLite journal mode: {}", mode);
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    configure(&conn)?;

    Ok(conn)
}

/// Per-connection setup shared by file and in-memory databases.
pub fn configure(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.busy_timeout(std::time::Duration::from_secs(5))?;
    schema::create_tables(conn)?;
    Ok(())
}

pub fn to_millis(instant: DateTime<Utc>) -> i64 {
    instant.timestamp_millis()
}

pub fn from_millis(millis: i64, column: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(column, millis))
}

pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
