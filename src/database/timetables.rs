use rusqlite::{Connection, OptionalExtension};

use super::now_millis;
use crate::error::{AppError, AppResult};
use crate::models::Timetable;

fn clean_name(name: &str) -> AppResult<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::validation("name required"));
    }
    Ok(name)
}

pub fn list_timetables(conn: &Connection, owner_id: i64) -> AppResult<Vec<Timetable>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, owner_id FROM timetables WHERE owner_id = ?1 ORDER BY name, id",
    )?;
    let timetables = stmt
        .query_map([owner_id], |row| {
            Ok(Timetable {
                id: row.get(0)?,
                name: row.get(1)?,
                owner_id: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(timetables)
}

pub fn get_timetable(conn: &Connection, owner_id: i64, id: i64) -> AppResult<Timetable> {
    conn.query_row(
        "SELECT id, name, owner_id FROM timetables WHERE id = ?1 AND owner_id = ?2",
        [id, owner_id],
        |row| {
            Ok(Timetable {
                id: row.get(0)?,
                name: row.get(1)?,
                owner_id: row.get(2)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| AppError::not_found(format!("timetable {}", id)))
}

fn find_by_name(conn: &Connection, owner_id: i64, name: &str) -> AppResult<Option<Timetable>> {
    let timetable = conn
        .query_row(
            "SELECT id, name, owner_id FROM timetables WHERE owner_id = ?1 AND name = ?2",
            rusqlite::params![owner_id, name],
            |row| {
                Ok(Timetable {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    owner_id: row.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(timetable)
}

/// Creating an existing name returns the existing timetable.
pub fn create_timetable(conn: &Connection, owner_id: i64, name: &str) -> AppResult<Timetable> {
    let name = clean_name(name)?;
    conn.execute(
        "INSERT INTO timetables (name, owner_id, created_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(owner_id, name) DO NOTHING",
        rusqlite::params![name, owner_id, now_millis()],
    )?;
    find_by_name(conn, owner_id, name)?
        .ok_or_else(|| AppError::not_found(format!("timetable '{}'", name)))
}

pub fn rename_timetable(conn: &Connection, owner_id: i64, id: i64, name: &str) -> AppResult<Timetable> {
    let name = clean_name(name)?;
    let current = get_timetable(conn, owner_id, id)?;
    if current.name == name {
        return Ok(current);
    }
    if find_by_name(conn, owner_id, name)?.is_some() {
        return Err(AppError::Conflict(format!("a timetable named '{}' already exists", name)));
    }

    conn.execute(
        "UPDATE timetables SET name = ?1 WHERE id = ?2 AND owner_id = ?3",
        rusqlite::params![name, id, owner_id],
    )?;
    Ok(Timetable {
        name: name.to_string(),
        ..current
    })
}

/// Deletes the timetable and its entries. Returns the number of entries removed.
pub fn delete_timetable(conn: &Connection, owner_id: i64, id: i64) -> AppResult<usize> {
    get_timetable(conn, owner_id, id)?;

    let tx = conn.unchecked_transaction()?;
    let entries = tx.execute("DELETE FROM entries WHERE timetable_id = ?1", [id])?;
    tx.execute(
        "DELETE FROM timetables WHERE id = ?1 AND owner_id = ?2",
        [id, owner_id],
    )?;
    tx.commit()?;

    log::info!("Deleted timetable {} with {} entries", id, entries);
    Ok(entries)
}

/// Deletes every timetable of the owner, cascading to entries.
pub fn delete_all_timetables(conn: &Connection, owner_id: i64) -> AppResult<usize> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "DELETE FROM entries WHERE timetable_id IN (SELECT id FROM timetables WHERE owner_id = ?1)",
        [owner_id],
    )?;
    let removed = tx.execute("DELETE FROM timetables WHERE owner_id = ?1", [owner_id])?;
    tx.commit()?;

    log::info!("Deleted all {} timetables of user {}", removed, owner_id);
    Ok(removed)
}
