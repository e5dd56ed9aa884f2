use chrono::{DateTime, Utc};
use rusqlite::Connection;

use super::to_millis;
use crate::error::AppResult;
use crate::models::Entry;

/// An entry whose reminder is due, with the owner it should be delivered to.
#[derive(Debug, Clone, PartialEq)]
pub struct DueReminder {
    pub entry: Entry,
    pub owner_id: i64,
    pub reminder_at: DateTime<Utc>,
}

/// Entries with `reminder_at <= now`, oldest reminder first.
pub fn due_reminders(conn: &Connection, now: DateTime<Utc>, limit: usize) -> AppResult<Vec<DueReminder>> {
    let mut stmt = conn.prepare(
        "SELECT e.id, e.title, e.description, e.date, e.precision, e.tags,
                e.recurrence_rule, e.reminder_at, e.timetable_id, e.created_at, t.owner_id
         FROM entries e
         JOIN timetables t ON t.id = e.timetable_id
         WHERE e.reminder_at IS NOT NULL AND e.reminder_at <= ?1
         ORDER BY e.reminder_at ASC, e.id ASC
         LIMIT ?2",
    )?;

    let due = stmt
        .query_map(rusqlite::params![to_millis(now), limit as i64], |row| {
            let entry = super::queries::entry_from_row(row)?;
            let owner_id: i64 = row.get(10)?;
            Ok((entry, owner_id))
        })?
        .collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .filter_map(|(entry, owner_id)| {
            let reminder_at = entry.reminder_at?;
            Some(DueReminder {
                entry,
                owner_id,
                reminder_at,
            })
        })
        .collect();
    Ok(due)
}

/// Clears the reminder only if it still holds `expected`.
///
/// Returns false when another sweep (or an API call) changed it first; the
/// caller must then skip delivery.
pub fn claim_reminder(conn: &Connection, entry_id: i64, expected: DateTime<Utc>) -> AppResult<bool> {
    let changed = conn.execute(
        "UPDATE entries SET reminder_at = NULL WHERE id = ?1 AND reminder_at = ?2",
        rusqlite::params![entry_id, to_millis(expected)],
    )?;
    Ok(changed == 1)
}
